//! Terminal output formatting and utilities.
//!
//! Human-readable messages go to stdout, or to stderr when `--json` keeps
//! stdout for machine-readable records.

pub mod colors;
pub mod errors;
pub mod progress;

use std::io::Write;

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colors: colors::ColorSupport,
    json: bool,
}

impl OutputHandler {
    pub fn new(json: bool) -> Self {
        let colors = if json {
            colors::ColorSupport::disabled()
        } else {
            colors::ColorSupport::detect()
        };
        Self { colors, json }
    }

    pub fn colors(&self) -> colors::ColorSupport {
        self.colors
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    fn message(&self, text: String) {
        if self.json {
            eprintln!("{}", text);
        } else {
            println!("{}", text);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        self.message(self.colors.dim(message));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        self.message(format!("{} {}", self.colors.green("✓"), message));
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        self.message(format!("{} {}", self.colors.yellow("⚠"), message));
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.colors.red("✗"), message);
    }

    /// Print a result value on stdout, whatever the mode
    pub fn value(&self, text: &str) {
        println!("{}", text);
    }

    /// Print one JSON record on stdout
    pub fn json_line(&self, value: &serde_json::Value) {
        let mut stdout = std::io::stdout().lock();
        // A closed pipe is not worth failing the command over
        let _ = writeln!(stdout, "{}", value);
    }
}

/// Human-readable byte count, e.g. `1.5 MiB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GiB");
    }

    #[test]
    fn test_json_mode_disables_colors() {
        let output = OutputHandler::new(true);
        assert!(output.is_json());
        assert!(!output.colors().is_enabled());
    }
}
