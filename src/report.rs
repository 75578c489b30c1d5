//! Operator-facing progress lines.
//!
//! Everything printed here is also written to the log at `info`, so a log file
//! carries the same record as the terminal.

use log::info;

pub fn line(msg: &str) {
    info!("{}", msg);
    println!("{}", msg);
}

pub fn banner(title: &str) {
    println!("{}", title);
    println!("{}", "=".repeat(title.chars().count()));
    info!("{}", title);
}

pub fn columns<S: AsRef<str>>(label: &str, columns: &[S]) {
    line(&format!("{}: {}", label, format_columns(columns)));
}

pub fn format_columns<S: AsRef<str>>(columns: &[S]) -> String {
    let names: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    format!("[{}]", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_columns() {
        assert_eq!(format_columns(&["id", "timestamp"]), "[id, timestamp]");
        let empty: [String; 0] = [];
        assert_eq!(format_columns(&empty), "[]");
    }
}
