//! CLI command handlers and shared presentation helpers.

pub mod computer;
pub mod output;
pub mod table_format;

use std::env;

/// Name of the acting user, from the environment.
pub fn get_env_user_name() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Uniform error reporting for command handlers.
pub fn print_error(action: &str, error: &dyn std::fmt::Display) {
    eprintln!("Error {action}: {error}");
}
