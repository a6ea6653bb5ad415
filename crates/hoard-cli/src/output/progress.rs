//! Live transfer progress for `hoard fetch`.

use hoard_fetch::{FileEvent, ProgressEvent};
use std::io::{self, IsTerminal, Write};
use std::time::{Duration, Instant};

use super::colors::ColorSupport;
use super::format_bytes;

/// Minimum time between redraws
const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

/// Single status line on stderr, redrawn in place
pub struct TransferProgress {
    colors: ColorSupport,
    interactive: bool,
    last_draw: Option<Instant>,
    drawn: bool,
    completed: usize,
    total: usize,
}

impl TransferProgress {
    pub fn new(total: usize, colors: ColorSupport) -> Self {
        Self {
            colors,
            interactive: io::stderr().is_terminal(),
            last_draw: None,
            drawn: false,
            completed: 0,
            total,
        }
    }

    /// Redraw for a progress event, throttled
    pub fn update(&mut self, event: &ProgressEvent) {
        if !self.interactive {
            return;
        }
        let now = Instant::now();
        if self
            .last_draw
            .is_some_and(|last| now.duration_since(last) < REDRAW_INTERVAL)
        {
            return;
        }
        self.last_draw = Some(now);

        let line = self.progress_line(event);
        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K{}", line);
        let _ = stderr.flush();
        self.drawn = true;
    }

    /// Print the final line of one asset above the status line
    pub fn file_done(&mut self, event: &FileEvent) {
        self.completed += 1;
        self.clear();
        let line = self.file_line(event);
        eprintln!("{}", line);
    }

    /// Remove the status line
    pub fn finish(&mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        if self.drawn {
            let mut stderr = io::stderr().lock();
            let _ = write!(stderr, "\r\x1b[2K");
            let _ = stderr.flush();
            self.drawn = false;
        }
    }

    fn progress_line(&self, event: &ProgressEvent) -> String {
        let amount = match (event.current_file_total, event.percent()) {
            (Some(total), Some(percent)) => format!(
                "{} / {} ({:.0}%)",
                format_bytes(event.current_file_transferred),
                format_bytes(total),
                percent
            ),
            _ => format_bytes(event.current_file_transferred),
        };
        format!(
            "[{}/{}] {} {}",
            self.completed,
            self.total,
            event.file_name,
            self.colors.dim(&amount)
        )
    }

    fn file_line(&self, event: &FileEvent) -> String {
        let counter = format!("[{}/{}]", self.completed, self.total);
        match &event.error {
            None if event.response_code == hoard_fetch::ResponseCode::Skipped => format!(
                "{} {} {}",
                counter,
                self.colors.dim("="),
                event.file_name
            ),
            None => format!("{} {} {}", counter, self.colors.green("✓"), event.file_name),
            Some(failure) => format!(
                "{} {} {}: {}",
                counter,
                self.colors.red("✗"),
                event.file_name,
                failure.message
            ),
        }
    }
}
