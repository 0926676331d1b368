//! Sync coordinator
//!
//! Turns realtime events into cache invalidations and user notifications,
//! and owns the realtime channel for the lifetime of each session.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::ledger::DedupLedger;
use crate::cache::{DomainTag, QueryCache};
use crate::notify::Notifier;
use crate::realtime::{ChannelConnector, ChannelEvent, ChannelHandle, RealtimeEvent};
use crate::session::{SessionState, SessionStore};

/// Coordinator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No session, no channel
    Disconnected,
    /// Session active, waiting for the channel to come up
    Connecting,
    /// Channel established for the current session
    Connected,
}

/// What handling one message did
#[derive(Debug, Clone, PartialEq)]
pub struct MessageOutcome {
    /// The recognized event, if any
    pub event: Option<RealtimeEvent>,
    /// A notification was emitted
    pub notified: bool,
    /// Domains invalidated
    pub targets: &'static [DomainTag],
    /// Cached keys marked stale
    pub invalidated: usize,
}

impl MessageOutcome {
    fn ignored() -> Self {
        Self {
            event: None,
            notified: false,
            targets: &[],
            invalidated: 0,
        }
    }
}

/// Realtime sync coordinator
///
/// All message handling happens on the task that drives `run` (or on the
/// caller of `handle_message`), in delivery order.
pub struct SyncCoordinator {
    cache: QueryCache,
    notifier: Arc<dyn Notifier>,
    ledger: DedupLedger,
    state: watch::Sender<ChannelState>,
}

impl SyncCoordinator {
    pub fn new(cache: QueryCache, notifier: Arc<dyn Notifier>) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            cache,
            notifier,
            ledger: DedupLedger::new(),
            state,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Process one inbound message
    ///
    /// Unrecognized messages are ignored. A recognized event notifies the
    /// user at most once per fingerprint within the dedup window, and always
    /// invalidates its target domains.
    pub fn handle_message(&mut self, name: &str, payload: &Value) -> MessageOutcome {
        let Some(event) = RealtimeEvent::classify(name, payload) else {
            return MessageOutcome::ignored();
        };

        let notified = self.ledger.should_notify(&event.fingerprint());
        if notified {
            self.notifier.notify(event.notification());
        }

        let targets = event.invalidation_targets();
        let invalidated = self.cache.invalidate_all(targets);
        debug!(
            "Handled '{}': notified={}, invalidated {} key(s)",
            name, notified, invalidated
        );

        MessageOutcome {
            event: Some(event),
            notified,
            targets,
            invalidated,
        }
    }

    /// Start a session
    ///
    /// The ledger is already empty: a new coordinator starts with an empty
    /// one and `end_session` clears it.
    pub fn begin_session(&mut self) {
        self.set_state(ChannelState::Connecting);
    }

    /// End the current session, emptying the ledger and cancelling its timers
    pub fn end_session(&mut self) {
        self.ledger.clear();
        self.set_state(ChannelState::Disconnected);
    }

    /// Follow the session, holding a channel open while it is authenticated
    ///
    /// Runs until the session store goes away. Dropping the future tears the
    /// channel down.
    pub async fn run(mut self, session: Arc<SessionStore>, connector: &dyn ChannelConnector) {
        let mut session_rx = session.subscribe();

        loop {
            let current = *session_rx.borrow_and_update();
            let token = if current.authenticated {
                session.token()
            } else {
                None
            };

            let Some(token) = token else {
                self.set_state(ChannelState::Disconnected);
                if session_rx.changed().await.is_err() {
                    break;
                }
                continue;
            };

            info!("Opening realtime channel for session {}", current.epoch);
            self.begin_session();
            let mut channel = connector.connect(&token);
            let keep_running = self
                .pump(&mut channel, &mut session_rx, current)
                .await;
            channel.shutdown();
            self.end_session();

            if !keep_running {
                break;
            }
        }

        info!("Sync coordinator stopped");
    }

    /// Handle channel events until the session changes
    ///
    /// Returns false when the session store is gone.
    async fn pump(
        &mut self,
        channel: &mut ChannelHandle,
        session_rx: &mut watch::Receiver<SessionState>,
        session: SessionState,
    ) -> bool {
        let mut channel_open = true;

        loop {
            // Session changes win over queued messages
            tokio::select! {
                biased;

                changed = session_rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    let current = *session_rx.borrow();
                    if current.epoch != session.epoch {
                        info!("Session ended, closing realtime channel");
                        return true;
                    }
                }

                event = channel.events.recv(), if channel_open => match event {
                    Some(ChannelEvent::Connected) => {
                        info!("Realtime sync active");
                        self.set_state(ChannelState::Connected);
                    }
                    Some(ChannelEvent::Disconnected) => {
                        debug!("Realtime channel dropped, waiting for reconnect");
                    }
                    Some(ChannelEvent::Message { name, payload }) => {
                        if session_rx.borrow().epoch != session.epoch {
                            debug!("Dropping '{}' received after the session ended", name);
                            return true;
                        }
                        self.handle_message(&name, &payload);
                    }
                    Some(ChannelEvent::Error(e)) => {
                        debug!("Realtime channel error: {}", e);
                    }
                    None => {
                        warn!("Realtime channel task ended unexpectedly");
                        channel_open = false;
                    }
                },
            }
        }
    }

    fn set_state(&self, new: ChannelState) {
        self.state.send_if_modified(|state| {
            if *state == new {
                return false;
            }
            debug!("Sync state {:?} -> {:?}", state, new);
            *state = new;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryKey;
    use crate::error::ApiError;
    use crate::models::{Role, User};
    use crate::notify::{Notification, NotificationLevel};
    use crate::realtime::{ChannelCommand, ChannelEndpoint, ORDER_CREATED, STOCK_UPDATED};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn coordinator() -> (
        SyncCoordinator,
        QueryCache,
        mpsc::UnboundedReceiver<Notification>,
    ) {
        let cache = QueryCache::new();
        let (tx, rx) = mpsc::unbounded_channel();
        (SyncCoordinator::new(cache.clone(), Arc::new(tx)), cache, rx)
    }

    async fn seed(cache: &QueryCache, key: &QueryKey) {
        cache
            .fetch(key, || async { Ok::<_, ApiError>(json!({"seeded": true})) })
            .await
            .unwrap();
        assert!(!cache.is_stale(key));
    }

    fn order_payload() -> Value {
        json!({
            "orderId": "o1",
            "userName": "Alice",
            "itemCount": 2,
            "totalAmount": 19.98
        })
    }

    fn stock_payload() -> Value {
        json!({
            "productId": "p1",
            "productName": "Widget",
            "type": "IN",
            "change": 5,
            "newStock": 12
        })
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[tokio::test]
    async fn test_unrecognized_message_does_nothing() {
        let (mut coordinator, cache, mut rx) = coordinator();
        let key = QueryKey::new(DomainTag::Products);
        seed(&cache, &key).await;

        let outcome = coordinator.handle_message("user:joined", &json!({"id": "u1"}));

        assert!(outcome.event.is_none());
        assert!(outcome.targets.is_empty());
        assert!(!cache.is_stale(&key));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_order_created_notifies_and_invalidates() {
        let (mut coordinator, cache, mut rx) = coordinator();
        let orders = QueryKey::new(DomainTag::Orders).with("page", 1);
        let stats = QueryKey::new(DomainTag::DashboardStats);
        let products = QueryKey::new(DomainTag::Products);
        for key in [&orders, &stats, &products] {
            seed(&cache, key).await;
        }

        let outcome = coordinator.handle_message(ORDER_CREATED, &order_payload());
        assert!(outcome.notified);
        assert_eq!(outcome.invalidated, 2);

        let notifications = drain(&mut rx);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].level, NotificationLevel::Success);
        let text = notifications[0].text();
        assert!(text.contains("Alice"));
        assert!(text.contains("$19.98"));

        assert!(cache.is_stale(&orders));
        assert!(cache.is_stale(&stats));
        assert!(!cache.is_stale(&products));
        // Stale data stays readable
        assert_eq!(cache.get(&orders), Some(json!({"seeded": true})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_stock_event_notifies_once_but_invalidates_twice() {
        let (mut coordinator, cache, mut rx) = coordinator();
        let keys = [
            QueryKey::new(DomainTag::Products),
            QueryKey::new(DomainTag::Inventory),
            QueryKey::new(DomainTag::DashboardStats),
        ];
        for key in &keys {
            seed(&cache, key).await;
        }

        let first = coordinator.handle_message(STOCK_UPDATED, &stock_payload());
        assert!(first.notified);
        assert!(keys.iter().all(|k| cache.is_stale(k)));

        for key in &keys {
            seed(&cache, key).await;
        }
        tokio::time::advance(Duration::from_millis(1500)).await;

        let second = coordinator.handle_message(STOCK_UPDATED, &stock_payload());
        assert!(!second.notified);
        assert_eq!(second.invalidated, 3);
        assert!(keys.iter().all(|k| cache.is_stale(k)));

        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stock_events_outside_window_notify_twice() {
        let (mut coordinator, _cache, mut rx) = coordinator();

        assert!(coordinator.handle_message(STOCK_UPDATED, &stock_payload()).notified);
        tokio::time::advance(Duration::from_millis(2000)).await;
        assert!(coordinator.handle_message(STOCK_UPDATED, &stock_payload()).notified);

        let notifications = drain(&mut rx);
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].title, "Stock added: Widget");
    }

    #[tokio::test]
    async fn test_new_session_resets_ledger() {
        let (mut coordinator, _cache, mut rx) = coordinator();

        coordinator.begin_session();
        assert!(coordinator.handle_message(ORDER_CREATED, &order_payload()).notified);
        assert!(!coordinator.handle_message(ORDER_CREATED, &order_payload()).notified);
        coordinator.end_session();
        assert_eq!(coordinator.state(), ChannelState::Disconnected);

        coordinator.begin_session();
        assert_eq!(coordinator.state(), ChannelState::Connecting);
        assert!(coordinator.handle_message(ORDER_CREATED, &order_payload()).notified);
        assert_eq!(drain(&mut rx).len(), 2);
    }

    // ==================== Session-driven lifecycle ====================

    #[derive(Clone, Default)]
    struct FakeConnector {
        opened: Arc<Mutex<Vec<(String, ChannelEndpoint)>>>,
    }

    impl ChannelConnector for FakeConnector {
        fn connect(&self, token: &str) -> ChannelHandle {
            let (handle, endpoint) = ChannelHandle::pair();
            self.opened
                .lock()
                .unwrap()
                .push((token.to_string(), endpoint));
            handle
        }
    }

    impl FakeConnector {
        async fn next_channel(&self) -> (String, ChannelEndpoint) {
            timeout(Duration::from_secs(5), async {
                loop {
                    if let Some(opened) = self.opened.lock().unwrap().pop() {
                        return opened;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("no channel opened")
        }
    }

    fn user() -> User {
        User {
            id: "u1".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            role: Role::Staff,
            created_at: Utc::now(),
        }
    }

    async fn wait_for_state(rx: &mut watch::Receiver<ChannelState>, want: ChannelState) {
        timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
            .await
            .expect("timed out waiting for state")
            .expect("coordinator gone");
    }

    async fn next_notification(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("notifier closed")
    }

    #[tokio::test]
    async fn test_logout_and_login_reopens_channel_with_fresh_ledger() {
        let session = SessionStore::new().shared();
        let (coordinator, _cache, mut rx) = coordinator();
        let mut state = coordinator.subscribe_state();
        let connector = FakeConnector::default();

        let task = tokio::spawn({
            let session = session.clone();
            let connector = connector.clone();
            async move { coordinator.run(session, &connector).await }
        });

        session.set_auth(user(), "tok-1".to_string()).unwrap();
        let (token, mut first) = connector.next_channel().await;
        assert_eq!(token, "tok-1");
        wait_for_state(&mut state, ChannelState::Connecting).await;

        first.event_tx.send(ChannelEvent::Connected).await.unwrap();
        wait_for_state(&mut state, ChannelState::Connected).await;

        let message = ChannelEvent::Message {
            name: ORDER_CREATED.to_string(),
            payload: order_payload(),
        };
        first.event_tx.send(message.clone()).await.unwrap();
        assert!(next_notification(&mut rx).await.title.contains("Alice"));

        session.logout().unwrap();
        wait_for_state(&mut state, ChannelState::Disconnected).await;
        assert!(matches!(
            first.commands.try_recv(),
            Ok(ChannelCommand::Shutdown)
        ));

        // Same fingerprint, well within the old window
        session.set_auth(user(), "tok-2".to_string()).unwrap();
        let (token, second) = connector.next_channel().await;
        assert_eq!(token, "tok-2");
        second.event_tx.send(ChannelEvent::Connected).await.unwrap();
        second.event_tx.send(message).await.unwrap();
        assert!(next_notification(&mut rx).await.title.contains("Alice"));

        task.abort();
    }

    #[tokio::test]
    async fn test_message_queued_at_logout_is_not_handled() {
        let session = SessionStore::new().shared();
        let (coordinator, cache, mut rx) = coordinator();
        let mut state = coordinator.subscribe_state();
        let connector = FakeConnector::default();
        let orders = QueryKey::new(DomainTag::Orders);
        seed(&cache, &orders).await;

        let task = tokio::spawn({
            let session = session.clone();
            let connector = connector.clone();
            async move { coordinator.run(session, &connector).await }
        });

        for round in 0..20 {
            session.set_auth(user(), format!("tok-{}", round)).unwrap();
            let (_, channel) = connector.next_channel().await;
            channel.event_tx.send(ChannelEvent::Connected).await.unwrap();
            wait_for_state(&mut state, ChannelState::Connected).await;

            // Buffered before the logout, read only after it
            channel
                .event_tx
                .try_send(ChannelEvent::Message {
                    name: ORDER_CREATED.to_string(),
                    payload: order_payload(),
                })
                .unwrap();
            session.logout().unwrap();
            wait_for_state(&mut state, ChannelState::Disconnected).await;
        }

        assert!(rx.try_recv().is_err());
        assert!(!cache.is_stale(&orders));

        task.abort();
    }

    #[tokio::test]
    async fn test_no_channel_without_session() {
        let session = SessionStore::new().shared();
        let (coordinator, _cache, _rx) = coordinator();
        let connector = FakeConnector::default();

        let task = tokio::spawn({
            let session = session.clone();
            let connector = connector.clone();
            async move { coordinator.run(session, &connector).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(connector.opened.lock().unwrap().is_empty());

        // Logging out while logged out opens nothing either
        session.logout().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(connector.opened.lock().unwrap().is_empty());

        task.abort();
    }

    #[tokio::test]
    async fn test_channel_transport_drop_keeps_session_state() {
        let session = SessionStore::new().shared();
        let (coordinator, cache, _rx) = coordinator();
        let mut state = coordinator.subscribe_state();
        let connector = FakeConnector::default();
        let key = QueryKey::new(DomainTag::Orders);
        seed(&cache, &key).await;

        let task = tokio::spawn({
            let session = session.clone();
            let connector = connector.clone();
            async move { coordinator.run(session, &connector).await }
        });

        session.set_auth(user(), "tok".to_string()).unwrap();
        let (_, channel) = connector.next_channel().await;
        channel.event_tx.send(ChannelEvent::Connected).await.unwrap();
        wait_for_state(&mut state, ChannelState::Connected).await;

        channel.event_tx.send(ChannelEvent::Disconnected).await.unwrap();
        channel.event_tx.send(ChannelEvent::Connected).await.unwrap();
        channel
            .event_tx
            .send(ChannelEvent::Message {
                name: ORDER_CREATED.to_string(),
                payload: order_payload(),
            })
            .await
            .unwrap();

        timeout(Duration::from_secs(5), async {
            while !cache.is_stale(&key) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*state.borrow(), ChannelState::Connected);

        task.abort();
    }
}
