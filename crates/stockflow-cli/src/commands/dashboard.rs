//! Dashboard command handler

use anyhow::Result;

use stockflow_core::StockFlow;

use super::{read_error, require_login};
use crate::output::Output;

/// Show dashboard statistics
pub async fn show(client: &StockFlow, output: &Output) -> Result<()> {
    require_login(client)?;

    let data = client
        .queries()
        .dashboard()
        .await
        .map_err(|e| read_error(e, "Failed to load dashboard"))?;
    output.print_dashboard(&data);
    Ok(())
}
