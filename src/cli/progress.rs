//! Progress bar and summary reporting for the `mirror` binary.

use std::sync::Mutex;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::format::{format_bytes, format_duration, format_speed};
use crate::{DownloadProgress, FileStats, SyncStats};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a progress bar for a single file download.
fn make_progress_bar(size: u64, name: &str) -> ProgressBar {
    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar.set_message(name.to_string());
    bar
}

/// Creates the bar counting files handled out of the total found.
fn make_total_progress_bar(count: usize) -> ProgressBar {
    let bar = ProgressBar::new(count as u64);
    bar.set_style(
        ProgressStyle::with_template("Files [{bar:40.green/white}] {pos}/{len} {msg}")
            .expect("template valid")
            .progress_chars("━━╌"),
    );
    bar
}

/// [`DownloadProgress`] rendered with `indicatif`: one bar for the file in
/// flight and one for the run.
pub struct CliProgress {
    multi: MultiProgress,
    total: Mutex<Option<ProgressBar>>,
    current: Mutex<Option<ProgressBar>>,
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl CliProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            total: Mutex::new(None),
            current: Mutex::new(None),
        }
    }

    fn advance_total(&self) {
        if let Some(total) = self.total.lock().ok().and_then(|t| t.clone()) {
            total.inc(1);
        }
    }

    fn take_current(&self) -> Option<ProgressBar> {
        self.current.lock().ok().and_then(|mut c| c.take())
    }

    /// Removes every bar from the terminal.
    pub fn finish(&self) {
        if let Some(bar) = self.take_current() {
            bar.finish_and_clear();
        }
        if let Some(total) = self.total.lock().ok().and_then(|mut t| t.take()) {
            total.finish_and_clear();
        }
        self.multi.clear().ok();
    }
}

impl DownloadProgress for CliProgress {
    fn on_files_found(&self, count: usize, total_bytes: u64) {
        let bar = self.multi.add(make_total_progress_bar(count));
        bar.set_message(format_bytes(total_bytes));
        if let Ok(mut total) = self.total.lock() {
            *total = Some(bar);
        }
    }

    fn on_file_start(&self, name: &str, size: u64) {
        let bar = make_progress_bar(size, name);
        let bar = match self.total.lock().ok().and_then(|t| t.clone()) {
            Some(total) => self.multi.insert_before(&total, bar),
            None => self.multi.add(bar),
        };
        bar.enable_steady_tick(std::time::Duration::from_millis(250));
        if let Ok(mut current) = self.current.lock() {
            *current = Some(bar);
        }
    }

    fn on_progress(&self, _name: &str, bytes_delta: u64) {
        if let Some(bar) = self.current.lock().ok().and_then(|c| c.clone()) {
            bar.inc(bytes_delta);
        }
    }

    fn on_file_complete(&self, name: &str, stats: &FileStats) {
        if let Some(bar) = self.take_current() {
            bar.finish_and_clear();
        }
        let _ = self.multi.println(format!(
            "  {} {name} - {} in {} ({})",
            style("✓").green(),
            format_bytes(stats.size),
            format_duration(stats.elapsed),
            format_speed(stats.average_speed),
        ));
        self.advance_total();
    }

    fn on_error(&self, name: &str, error: &str) {
        if let Some(bar) = self.take_current() {
            bar.abandon();
        }
        let _ = self
            .multi
            .println(format!("  {} {name}: {error}", style("✗").red()));
        self.advance_total();
    }

    fn on_skipped(&self, _name: &str) {
        self.advance_total();
    }
}

/// Prints the outcome counts of a sync run.
pub fn print_summary(stats: &SyncStats) {
    println!("\n{SEPARATOR}");
    println!("{}", style("Sync Summary").bold());
    println!("{SEPARATOR}");

    if stats.total == 0 {
        println!("  No remote files found.");
    }
    println!("  Succeeded:         {}", style(stats.succeeded).green());
    println!("  Skipped:           {}", stats.skipped);
    if stats.failed > 0 {
        println!("  Failed:            {}", style(stats.failed).red());
    }
    println!("  Total:             {}", stats.total);

    if stats.bytes_downloaded > 0 {
        println!("  Downloaded:        {}", format_bytes(stats.bytes_downloaded));
        println!("  Average speed:     {}", format_speed(stats.average_speed()));
    }
    println!("  Total time:        {}", format_duration(stats.elapsed));
    println!("{SEPARATOR}");
}
