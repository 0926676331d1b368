//! Notification de-duplication ledger

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

/// How long a fingerprint suppresses repeat notifications
pub const DEDUP_WINDOW: Duration = Duration::from_millis(2000);

struct Entry {
    deadline: Instant,
    generation: u64,
    timer: Option<AbortHandle>,
}

type Entries = Arc<Mutex<HashMap<String, Entry>>>;

/// Recently notified fingerprints
///
/// Each fingerprint is held for a fixed window from first sight, without
/// renewal. Expiry timers are owned by the ledger and aborted on `clear` or
/// drop, so a ledger never leaks timers into the next session.
///
/// Presence is decided by the recorded deadline alone. The timer only
/// reclaims memory, and a ledger used outside a runtime still expires
/// fingerprints on time.
pub struct DedupLedger {
    window: Duration,
    entries: Entries,
    generation: u64,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::with_window(DEDUP_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            entries: Arc::new(Mutex::new(HashMap::new())),
            generation: 0,
        }
    }

    /// Record a fingerprint; false when it was already seen within the window
    pub fn should_notify(&mut self, fingerprint: &str) -> bool {
        let now = Instant::now();
        let mut entries = lock(&self.entries);

        if let Some(entry) = entries.get(fingerprint) {
            if now < entry.deadline {
                debug!("Suppressing duplicate notification '{}'", fingerprint);
                return false;
            }
        }

        self.generation += 1;
        let deadline = now + self.window;
        let entry = Entry {
            deadline,
            generation: self.generation,
            timer: self.schedule_expiry(fingerprint, deadline, self.generation),
        };
        if let Some(old) = entries.insert(fingerprint.to_string(), entry) {
            if let Some(timer) = old.timer {
                timer.abort();
            }
        }
        true
    }

    /// Forget every fingerprint and cancel pending expiry timers
    pub fn clear(&mut self) {
        for (_, entry) in lock(&self.entries).drain() {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
    }

    /// Number of fingerprints currently held (expired ones may linger until
    /// their timer runs)
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn schedule_expiry(
        &self,
        fingerprint: &str,
        deadline: Instant,
        generation: u64,
    ) -> Option<AbortHandle> {
        let handle = Handle::try_current().ok()?;
        let entries = Arc::clone(&self.entries);
        let fingerprint = fingerprint.to_string();

        let task = handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let mut entries = lock(&entries);
            if entries
                .get(&fingerprint)
                .is_some_and(|entry| entry.generation == generation)
            {
                entries.remove(&fingerprint);
            }
        });
        Some(task.abort_handle())
    }
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DedupLedger {
    fn drop(&mut self) {
        self.clear();
    }
}

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<String, Entry>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}
