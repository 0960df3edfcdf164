//! Output formatting for CLI commands.

use colored::{ColoredString, Colorize};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print rows in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => print_json(&data),
    }
}

pub fn print_json<T: Serialize + ?Sized>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("{} {}", "Error:".red().bold(), e),
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Colors an element status for terminal output.
pub fn colorize_status(status: &str) -> ColoredString {
    match status {
        "COMPLETE" => status.green(),
        "IN_PROGRESS" | "STARTING" | "PREPARED" => status.cyan(),
        "WAITING" => status.yellow(),
        "ERROR" => status.red().bold(),
        _ => status.normal(),
    }
}
