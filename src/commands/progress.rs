//! Progress bars for long device operations.
//!
//! Bridges the core [`Progress`] callback onto indicatif. Byte-counted
//! operations get a transfer bar, erases get a sector bar and the
//! ready poll gets a spinner. A new bar starts whenever the reported
//! kind changes mid-operation.

use indicatif::{ProgressBar, ProgressStyle};
use rkflasher_core::flash::{CallStep, Progress, ProgressEvent, ProgressKind};
use std::time::Duration;

/// Create the transfer bar style for byte-counted phases
fn byte_style(phase: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
            phase
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Create the bar style for phases counted in sectors or blocks
fn count_style(phase: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}}) {}",
            phase
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Progress reporter drawing indicatif bars on the console
pub struct ConsoleProgress {
    bar: Option<ProgressBar>,
    kind: Option<ProgressKind>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            bar: None,
            kind: None,
        }
    }

    fn start(&mut self, kind: ProgressKind, total: u64) {
        self.finish();
        let bar = match kind {
            ProgressKind::DownloadImage => {
                let bar = ProgressBar::new(total);
                bar.set_style(byte_style("Writing"));
                bar
            }
            ProgressKind::CheckImage => {
                let bar = ProgressBar::new(total);
                bar.set_style(byte_style("Reading"));
                bar
            }
            ProgressKind::EraseFlash => {
                let bar = ProgressBar::new(total);
                bar.set_style(count_style("Erasing"));
                bar
            }
            ProgressKind::TestDevice => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(spinner_style());
                bar.set_message("Waiting for device...");
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };
        self.bar = Some(bar);
        self.kind = Some(kind);
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        self.kind = None;
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for ConsoleProgress {
    fn update(&mut self, event: ProgressEvent) {
        if self.kind != Some(event.kind) {
            self.start(event.kind, event.total);
        }
        if let Some(bar) = &self.bar {
            bar.set_position(event.current);
        }
        if event.step == CallStep::Last {
            self.finish();
        }
    }
}
