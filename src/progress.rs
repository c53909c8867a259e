/// Progress reporting UI for bulk room operations.
///
/// In a TTY an overall bar tracks settled rooms and outcome lines are printed
/// above it. Otherwise outcomes go to stderr as plain lines.
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;

/// Maximum width for room names in outcome lines.
const ROOM_NAME_WIDTH: usize = 38;

/// Pads or middle-truncates a name to `max_width` characters.
fn truncate_middle(s: &str, max_width: usize) -> String {
    // Width is counted in chars, not bytes. Room names are often Cyrillic or emoji.
    let char_count = s.chars().count();
    if char_count <= max_width {
        // Pad so the outcome lines stay aligned
        return format!("{:<width$}", s, width = max_width);
    }
    let ellipsis = '…';
    if max_width <= 1 {
        // No room for the ellipsis, keep the head only
        return s.chars().take(max_width).collect();
    }
    // One slot goes to the ellipsis; an odd remainder goes to the head.
    let available = max_width - 1;
    let start_len = available.div_ceil(2);
    let end_len = available / 2;
    // take/skip on chars never splits a multi-byte character
    let start: String = s.chars().take(start_len).collect();
    let end: String = s.chars().skip(char_count - end_len).collect();
    format!("{}{}{}", start, ellipsis, end)
}

/// Formats the outcome of one room on a single line.
pub fn format_outcome(room_name: &str, error: Option<&str>) -> String {
    let name = truncate_middle(room_name, ROOM_NAME_WIDTH);
    match error {
        None => format!("  ✓ {}", name),
        Some(e) => format!("  \x1b[31m✗\x1b[0m {} ({})", name.trim_end(), e),
    }
}

/// Progress of one bulk operation across all its batches.
#[derive(Clone)]
pub struct BatchProgress {
    overall: Option<ProgressBar>,
    verbose: bool,
}

impl BatchProgress {
    /// Creates a progress display for `total_rooms` rooms.
    ///
    /// `verb` labels the bar (e.g. "leaving").
    pub fn new(total_rooms: usize, verb: &str) -> Self {
        if !std::io::stderr().is_terminal() {
            return Self {
                overall: None,
                verbose: true,
            };
        }

        let style = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} rooms ({percent}%)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        let bar = ProgressBar::new(total_rooms as u64);
        bar.set_style(style);
        bar.set_message(verb.to_owned());
        Self {
            overall: Some(bar),
            verbose: true,
        }
    }

    /// A progress display that prints nothing.
    pub fn hidden() -> Self {
        Self {
            overall: None,
            verbose: false,
        }
    }

    /// Updates the counters shown next to the bar between batches.
    pub fn set_counts(&self, verb: &str, done: usize, failed: usize, left: usize) {
        if let Some(ref bar) = self.overall {
            bar.set_message(format!(
                "{} (done: {}, failed: {}, left: {})",
                verb, done, failed, left
            ));
        }
    }

    pub fn record(&self, room_name: &str, error: Option<&str>) {
        self.println(&format_outcome(room_name, error));
        if let Some(ref bar) = self.overall {
            bar.inc(1);
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.overall {
            bar.finish_and_clear();
        }
    }

    fn println(&self, msg: &str) {
        if !self.verbose {
            return;
        }
        match self.overall {
            Some(ref bar) => bar.println(msg),
            None => eprintln!("{}", msg),
        }
    }
}
