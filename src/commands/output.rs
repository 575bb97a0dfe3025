//! JSON output helpers for the `--format json` mode.

use log::error;
use serde::Serialize;

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("failed to serialize output: {e}"),
    }
}

/// Print as JSON when the json format is selected. Returns true when JSON
/// was printed so the caller can skip its table output.
pub fn print_if_json<T: Serialize>(format: &str, value: &T) -> bool {
    if format == "json" {
        print_json(value);
        true
    } else {
        false
    }
}

/// Print a list wrapped under a named key, e.g. `{"computers": [...]}`.
pub fn print_json_wrapped<T: Serialize>(key: &str, value: &T) {
    let wrapped = serde_json::json!({ key: value });
    println!(
        "{}",
        serde_json::to_string_pretty(&wrapped).unwrap_or_else(|_| "{}".to_string())
    );
}
