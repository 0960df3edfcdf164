//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("API error: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::Api { code, .. } if code == "plan_not_found" => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `keelctl plans list` to see the available plans.".yellow()
                );
            }
            CliError::Api { status: 400, .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Parameter names must be valid environment variable names.".yellow()
                );
            }
            CliError::Network(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check that the scheduler is running and KEEL_URL points at it."
                        .yellow()
                );
            }
            _ => {}
        }
    }
}
