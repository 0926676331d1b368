//! Session command handlers

use anyhow::{bail, Context, Result};

use stockflow_core::models::{LoginCredentials, RegisterCredentials, Role};
use stockflow_core::StockFlow;

use crate::output::Output;
use crate::prompt;

/// Log in and persist the session
pub async fn login(
    client: &StockFlow,
    email: String,
    password: Option<String>,
    output: &Output,
) -> Result<()> {
    let credentials = LoginCredentials {
        email,
        password: prompt::password(password)?,
    };

    let user = client
        .api()
        .login(&credentials)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message("Login failed")))?;

    if output.is_json() {
        output.print_user(&user);
    } else {
        output.success(&format!("Logged in as {}", user.name));
    }
    Ok(())
}

/// Register an account; the new session is persisted like a login
pub async fn register(
    client: &StockFlow,
    email: String,
    name: String,
    password: Option<String>,
    role: Option<Role>,
    output: &Output,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Name is required");
    }

    let credentials = RegisterCredentials {
        email,
        name,
        password: prompt::password(password)?,
        role,
    };

    let user = client
        .api()
        .register(&credentials)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message("Registration failed")))?;

    if output.is_json() {
        output.print_user(&user);
    } else {
        output.success(&format!("Account created for {}", user.email));
    }
    Ok(())
}

/// Forget the stored session
pub fn logout(client: &StockFlow, output: &Output) -> Result<()> {
    if !client.session().is_authenticated() {
        output.message("Not logged in.");
        return Ok(());
    }

    client
        .session()
        .logout()
        .context("Failed to remove stored session")?;
    output.success("Logged out");
    Ok(())
}

/// Show the user of the stored session
pub fn whoami(client: &StockFlow, output: &Output) -> Result<()> {
    let Some(user) = client.session().user() else {
        bail!("Not logged in. Run `stockflow login` first.");
    };
    output.print_user(&user);
    Ok(())
}
