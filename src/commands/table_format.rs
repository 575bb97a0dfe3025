//! Table rendering for list commands.

use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Render rows as a table followed by a count line.
pub fn display_table_with_count<T: Tabled>(rows: Vec<T>, label: &str) {
    let count = rows.len();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{table}");
    println!("\nTotal {label}: {count}");
}
