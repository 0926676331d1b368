//! Interactive prompts
//!
//! Confirmation and password input on the terminal.

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{bail, Context, Result};

/// Environment variable consulted before prompting for a password
pub const PASSWORD_ENV: &str = "STOCKFLOW_PASSWORD";

/// Prompt for confirmation
///
/// Returns true if user confirms, false otherwise.
/// In non-interactive mode (no TTY), returns false.
pub fn confirm(prompt: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(is_yes(&input))
}

/// Resolve a password from the flag, the environment, or stdin
pub fn password(given: Option<String>) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    if let Ok(password) = env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            return Ok(password);
        }
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        print!("Password: ");
        io::stdout().flush()?;
    }

    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    let password = line.trim_end_matches(&['\r', '\n'][..]).to_string();
    if password.is_empty() {
        bail!("Password is required (use --password or {})", PASSWORD_ENV);
    }
    Ok(password)
}

fn is_yes(input: &str) -> bool {
    let input = input.trim().to_lowercase();
    input == "y" || input == "yes"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("nope"));
    }

    #[test]
    fn test_password_flag_wins() {
        assert_eq!(password(Some("hunter2".to_string())).unwrap(), "hunter2");
    }
}
