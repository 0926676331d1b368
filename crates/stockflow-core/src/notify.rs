//! User-facing notifications
//!
//! Toast-style messages emitted by the sync coordinator and mutation flows.
//! Rendering is left to the front end behind the `Notifier` trait.

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Notification {
    pub fn success(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: title.into(),
            description,
        }
    }

    pub fn info(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            title: title.into(),
            description,
        }
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.into(),
            description: None,
        }
    }

    /// Title and description on one line
    pub fn text(&self) -> String {
        match self.description {
            Some(ref description) => format!("{} ({})", self.title, description),
            None => self.title.clone(),
        }
    }
}

/// Sink for notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forward notifications to a channel; a closed receiver drops them
impl Notifier for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        let _ = self.send(notification);
    }
}
