//! Session store
//!
//! Holds the authenticated user and bearer token, persists them across
//! restarts, and announces session changes.
//!
//! Other components never poll ambient state: they either subscribe to the
//! session state (`subscribe`) or register an explicit `on_session_end` hook.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::models::User;

/// Persisted credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// Observable session state
///
/// `epoch` increases on every login and every session end, so a logout
/// immediately followed by a login is still seen as a new session even by a
/// subscriber that only observes the latest value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub epoch: u64,
    pub authenticated: bool,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The user logged out
    LoggedOut,
    /// The server rejected the token
    Expired,
}

type EndHook = Box<dyn Fn(SessionEndReason) + Send + Sync>;

/// Shared session state
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct SessionStore {
    /// Where the session is persisted (None = in-memory only)
    path: Option<PathBuf>,
    current: Mutex<Option<AuthSession>>,
    state: watch::Sender<SessionState>,
    end_hooks: Mutex<Vec<EndHook>>,
}

impl SessionStore {
    /// Create an in-memory session store
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            path: None,
            current: Mutex::new(None),
            state,
            end_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Create a session store persisted at `path`
    ///
    /// Nothing is read until `hydrate` is called.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            ..Self::new()
        }
    }

    /// Shorthand for an `Arc`-wrapped store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Restore a persisted session
    ///
    /// A missing file leaves the store logged out. A corrupt file is logged
    /// and ignored. Returns whether a session was restored.
    pub fn hydrate(&self) -> bool {
        let Some(ref path) = self.path else {
            return false;
        };

        match load_session(path) {
            Ok(Some(session)) => {
                debug!("Restored session for {}", session.user.email);
                self.replace(Some(session));
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to hydrate session: {}", e);
                false
            }
        }
    }

    /// Store credentials after a successful login or registration
    pub fn set_auth(&self, user: User, token: String) -> Result<(), SessionError> {
        let session = AuthSession { user, token };
        if let Some(ref path) = self.path {
            save_session(path, &session)?;
        }
        info!("Signed in as {}", session.user.email);
        self.replace(Some(session));
        Ok(())
    }

    /// End the session at the user's request
    pub fn logout(&self) -> Result<(), SessionError> {
        self.end(SessionEndReason::LoggedOut)
    }

    /// End the session because the server rejected the token
    pub fn expire(&self) -> Result<(), SessionError> {
        warn!("Session expired, signing out");
        self.end(SessionEndReason::Expired)
    }

    fn end(&self, reason: SessionEndReason) -> Result<(), SessionError> {
        let was_authenticated = self.is_authenticated();

        // Clear memory first so a failed delete still signs the user out
        self.replace(None);
        let removed = match self.path {
            Some(ref path) => remove_session(path),
            None => Ok(()),
        };

        if was_authenticated {
            let hooks = self.end_hooks.lock().unwrap_or_else(|e| e.into_inner());
            for hook in hooks.iter() {
                hook(reason);
            }
        }

        removed
    }

    /// Register a hook that runs whenever an active session ends
    pub fn on_session_end<F>(&self, hook: F)
    where
        F: Fn(SessionEndReason) + Send + Sync + 'static,
    {
        self.end_hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(hook));
    }

    /// Subscribe to session changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().authenticated
    }

    /// Current bearer token
    pub fn token(&self) -> Option<String> {
        self.lock_current().as_ref().map(|s| s.token.clone())
    }

    /// Current user
    pub fn user(&self) -> Option<User> {
        self.lock_current().as_ref().map(|s| s.user.clone())
    }

    fn replace(&self, session: Option<AuthSession>) {
        let authenticated = session.is_some();
        let was_authenticated = std::mem::replace(&mut *self.lock_current(), session).is_some();
        if !authenticated && !was_authenticated {
            return;
        }
        self.state.send_modify(|state| {
            state.epoch += 1;
            state.authenticated = authenticated;
        });
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<AuthSession>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn load_session(path: &Path) -> Result<Option<AuthSession>, SessionError> {
    if !path.exists() {
        return Ok(None);
    }

    let json = fs::read_to_string(path).map_err(|source| SessionError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let session = serde_json::from_str(&json).map_err(|e| SessionError::InvalidFormat {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;
    Ok(Some(session))
}

fn save_session(path: &Path, session: &AuthSession) -> Result<(), SessionError> {
    let write_err = |source| SessionError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let json = serde_json::to_string_pretty(session).map_err(|e| SessionError::InvalidFormat {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;

    // Write then rename so a crash never leaves half a session on disk
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, json).map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(write_err)?;
    Ok(())
}

fn remove_session(path: &Path) -> Result<(), SessionError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SessionError::Write {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn user() -> User {
        User {
            id: "u1".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            role: Role::Admin,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_set_auth_and_logout() {
        let store = SessionStore::new();
        assert!(!store.is_authenticated());
        assert!(store.token().is_none());

        store.set_auth(user(), "tok".to_string()).unwrap();
        assert!(store.is_authenticated());
        assert_eq!(store.token().as_deref(), Some("tok"));
        assert_eq!(store.user().unwrap().name, "Alice");

        store.logout().unwrap();
        assert!(!store.is_authenticated());
        assert!(store.user().is_none());
    }

    #[test]
    fn test_persistence_and_hydrate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auth-storage.json");

        {
            let store = SessionStore::with_path(path.clone());
            store.set_auth(user(), "persisted".to_string()).unwrap();
        }
        assert!(path.exists());

        let store = SessionStore::with_path(path.clone());
        assert!(!store.is_authenticated());
        assert!(store.hydrate());
        assert_eq!(store.token().as_deref(), Some("persisted"));

        store.logout().unwrap();
        assert!(!path.exists());
        assert!(!SessionStore::with_path(path).hydrate());
    }

    #[test]
    fn test_hydrate_ignores_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auth-storage.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SessionStore::with_path(path);
        assert!(!store.hydrate());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_end_hooks_fire_once_per_session() {
        let store = SessionStore::new();
        let expired = Arc::new(AtomicUsize::new(0));
        let logged_out = Arc::new(AtomicUsize::new(0));

        let (e, l) = (expired.clone(), logged_out.clone());
        store.on_session_end(move |reason| match reason {
            SessionEndReason::Expired => {
                e.fetch_add(1, Ordering::SeqCst);
            }
            SessionEndReason::LoggedOut => {
                l.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Logging out while logged out is a no-op for hooks
        store.logout().unwrap();
        assert_eq!(logged_out.load(Ordering::SeqCst), 0);

        store.set_auth(user(), "tok".to_string()).unwrap();
        store.expire().unwrap();
        store.expire().unwrap();
        assert_eq!(expired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_sees_changes() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();
        assert!(!rx.borrow_and_update().authenticated);

        store.set_auth(user(), "tok".to_string()).unwrap();
        assert!(rx.has_changed().unwrap());
        let first = *rx.borrow_and_update();
        assert!(first.authenticated);

        // Logout + login before the subscriber looks is still a new session
        store.logout().unwrap();
        store.set_auth(user(), "tok2".to_string()).unwrap();
        let second = *rx.borrow_and_update();
        assert!(second.authenticated);
        assert!(second.epoch > first.epoch + 1);

        store.logout().unwrap();
        assert!(!rx.borrow_and_update().authenticated);
    }

    #[test]
    fn test_logout_when_logged_out_keeps_epoch() {
        let store = SessionStore::new();
        let before = store.state();
        store.logout().unwrap();
        assert_eq!(store.state(), before);
    }
}
