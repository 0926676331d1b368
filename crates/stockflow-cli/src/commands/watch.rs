//! Watch command handler
//!
//! Keeps the realtime channel open for the stored session. Events from other
//! users are shown as notifications and the dashboard is re-printed every
//! time its data is re-fetched.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use stockflow_core::models::DashboardData;
use stockflow_core::{ChannelState, Queries, QueryKey, StockFlow};

use super::{read_error, require_login};
use crate::output::Output;

/// Follow realtime changes until Ctrl-C or the session ends
pub async fn run(client: &StockFlow, output: &Output) -> Result<()> {
    require_login(client)?;

    let queries = client.queries();
    let dashboard = queries
        .dashboard()
        .await
        .map_err(|e| read_error(e, "Failed to load dashboard"))?;
    output.print_dashboard(&dashboard);

    let dashboard_key = Queries::dashboard_key();
    let observer = client.cache().observe(&dashboard_key);
    let mut updates = client.cache().subscribe();

    let (notify_tx, mut notifications) = mpsc::unbounded_channel();
    let coordinator = client.coordinator(Arc::new(notify_tx));
    let mut state_rx = coordinator.subscribe_state();

    let connector = client.connector();
    let session = client.session().clone();
    debug!("Watching via {}", connector.url());

    let sync = coordinator.run(session.clone(), &connector);
    tokio::pin!(sync);

    output.message("Watching for changes (Ctrl-C to stop)...");

    loop {
        tokio::select! {
            _ = &mut sync => {
                warn!("Sync coordinator stopped");
                break;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            Some(notification) = notifications.recv() => {
                output.notification(&notification);
            }
            Ok(()) = state_rx.changed() => {
                let state = *state_rx.borrow_and_update();
                output.message(&format!("Realtime: {}", state_label(state)));
                if state == ChannelState::Disconnected && !session.is_authenticated() {
                    bail!("Session ended. Run `stockflow login` again.");
                }
            }
            update = updates.recv() => {
                if refresh_needed(update, &dashboard_key) {
                    if let Some(data) = observer.data() {
                        print_refreshed(output, data);
                    }
                }
            }
        }
    }

    output.message("Stopped watching.");
    Ok(())
}

fn state_label(state: ChannelState) -> &'static str {
    match state {
        ChannelState::Disconnected => "disconnected",
        ChannelState::Connecting => "connecting",
        ChannelState::Connected => "connected",
    }
}

/// Whether a cache update concerns `key`
///
/// A lagged receiver may have missed it, so that counts as a refresh too.
fn refresh_needed(update: Result<QueryKey, broadcast::error::RecvError>, key: &QueryKey) -> bool {
    match update {
        Ok(updated) => &updated == key,
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            debug!("Missed {} cache updates", skipped);
            true
        }
        Err(broadcast::error::RecvError::Closed) => false,
    }
}

fn print_refreshed(output: &Output, data: serde_json::Value) {
    match serde_json::from_value::<DashboardData>(data) {
        Ok(dashboard) => {
            output.message(&format!("\n── Updated {} ──", Local::now().format("%H:%M:%S")));
            output.print_dashboard(&dashboard);
        }
        Err(e) => warn!("Cached dashboard has unexpected shape: {}", e),
    }
}
