//! Command handlers

use anyhow::{bail, Result};
use tracing::debug;

use stockflow_core::{ApiError, Notification, Notifier, StockFlow};

use crate::output::{AlreadyReported, Output};

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod inventory;
pub mod orders;
pub mod products;
pub mod watch;

/// Prints notifications as soon as they are raised
pub struct ConsoleNotifier {
    output: Output,
}

impl ConsoleNotifier {
    pub fn new(output: Output) -> Self {
        Self { output }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        self.output.notification(&notification);
    }
}

/// Fail unless a session is stored
pub fn require_login(client: &StockFlow) -> Result<()> {
    if !client.session().is_authenticated() {
        bail!("Not logged in. Run `stockflow login` first.");
    }
    Ok(())
}

/// Map a read error to a CLI error
pub fn read_error(err: ApiError, fallback: &str) -> anyhow::Error {
    if err.is_auth_failure() {
        return anyhow::anyhow!("Session expired. Run `stockflow login` again.");
    }
    debug!("{}: {}", fallback, err);
    anyhow::anyhow!(err.user_message(fallback))
}

/// A mutation error that has already been shown as a notification
pub fn reported(err: ApiError) -> anyhow::Error {
    debug!("Mutation failed: {}", err);
    AlreadyReported.into()
}
