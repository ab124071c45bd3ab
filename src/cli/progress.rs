//! Progress bars and summary reporting for CLI batches.

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::{
    BatchEvent, BatchItem, BatchReport, BatchSummary, EventKind, ItemStatus, ProgressEvent,
    format_bytes, format_duration,
};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a percent-based progress bar for a single item.
pub fn make_item_bar(name: &str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% - {msg}")
            .expect("progress template is valid")
            .progress_chars("━━╌"),
    );
    bar.set_message(name.to_string());
    bar
}

/// Creates a progress bar counting finished videos.
pub fn make_total_bar(videos: u64) -> ProgressBar {
    let bar = ProgressBar::new(videos);
    bar.set_style(
        ProgressStyle::with_template("Total [{bar:40.green/white}] {pos}/{len} video(s)")
            .expect("template valid")
            .progress_chars("━━╌"),
    );
    bar
}

/// Creates a ticking spinner shown while URLs are analyzed.
pub fn make_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
            .expect("spinner template is valid"),
    );
    bar.set_message(message);
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}

fn styled(event: &ProgressEvent) -> String {
    match event.kind {
        EventKind::Success => format!("{} {}", style("✓").green(), event.message),
        EventKind::Warning => format!("{} {}", style("!").yellow(), event.message),
        EventKind::Error => format!("{} {}", style("✗").red(), event.message),
        EventKind::Info | EventKind::Progress => format!("  {}", event.message),
    }
}

/// Renders batch events as indicatif bars.
pub struct BatchView {
    multi: MultiProgress,
    total: Option<ProgressBar>,
    current: Option<ProgressBar>,
    logged: usize,
}

impl Default for BatchView {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchView {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            total: None,
            current: None,
            logged: 0,
        }
    }

    /// Number of log lines printed above the bars.
    pub const fn logged(&self) -> usize {
        self.logged
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn handle(&mut self, event: &BatchEvent) {
        match event {
            BatchEvent::Log(entry) if entry.kind == EventKind::Progress => {
                if let Some(bar) = &self.current {
                    if let Some(percent) = entry.percent {
                        bar.set_position(percent as u64);
                    }
                    bar.set_message(entry.message.clone());
                }
            }
            BatchEvent::Log(entry) => {
                let _ = self.multi.println(styled(entry));
                self.logged += 1;
            }
            BatchEvent::ItemStatusChanged {
                status: ItemStatus::Downloading,
                ..
            } => {
                let bar = match &self.total {
                    Some(total) => self.multi.insert_before(total, make_item_bar("")),
                    None => self.multi.add(make_item_bar("")),
                };
                bar.enable_steady_tick(std::time::Duration::from_millis(250));
                self.current = Some(bar);
            }
            BatchEvent::ItemStatusChanged {
                status: ItemStatus::Completed | ItemStatus::Failed,
                ..
            } => {
                if let Some(bar) = self.current.take() {
                    bar.finish_and_clear();
                }
            }
            BatchEvent::Progress(progress) => {
                let done = progress.completed_count + progress.failed_count;
                let total = self
                    .total
                    .get_or_insert_with(|| self.multi.add(make_total_bar(0)));
                total.set_length((done + progress.remaining) as u64);
                total.set_position(done as u64);
                if let (Some(bar), Some(name)) = (&self.current, &progress.current) {
                    bar.set_message(name.clone());
                }
            }
            BatchEvent::Finished(_) => {
                if let Some(total) = self.total.take() {
                    total.finish_and_clear();
                }
                let _ = self.multi.clear();
            }
            BatchEvent::ItemStatusChanged { .. } | BatchEvent::Summary(_) => {}
        }
    }
}

/// Prints the analyzed items and their status.
pub fn print_item_list(items: &[BatchItem]) {
    if items.is_empty() {
        println!("No URLs found.");
        return;
    }

    println!("\n{SEPARATOR}");
    println!("Analyzed items:");
    println!("{SEPARATOR}");

    for item in items {
        let label = match item.status {
            ItemStatus::Ready => style("ready").green().to_string(),
            ItemStatus::Warning => style("warning").yellow().to_string(),
            ItemStatus::Error => style("error").red().to_string(),
            other => style(other).dim().to_string(),
        };
        println!("  [{label}] {}", item.display_name());
        if let Some(message) = item.error.as_ref().or(item.warning.as_ref()) {
            println!("          {message}");
        }
    }
}

/// Prints the analysis summary.
pub fn print_summary(summary: &BatchSummary) {
    println!("{SEPARATOR}");
    println!(
        "  {} video(s): {} playlist(s), {} single video(s)",
        summary.total_videos, summary.total_playlists, summary.total_single_videos
    );
    if summary.errors > 0 {
        println!("  {} item(s) could not be analyzed", summary.errors);
    }
    if summary.warnings > 0 {
        println!("  {} item(s) with warnings", summary.warnings);
    }
    println!("{SEPARATOR}\n");
}

/// Prints the outcome of a download call.
pub fn print_report(report: &BatchReport) {
    let stats = &report.stats;

    println!("\n{SEPARATOR}");
    println!("Download Summary");
    println!("{SEPARATOR}");

    println!("  Items completed:   {}", stats.items_completed);
    if stats.items_completed > 0 {
        println!("  Total size:        {}", format_bytes(stats.total_bytes));
        println!("  Total time:        {}", format_duration(stats.elapsed));
        println!(
            "  Average speed:     {}/s",
            format_bytes(stats.average_speed())
        );
        println!("  Peak speed:        {}/s", format_bytes(stats.peak_speed));
    }
    for item in &report.completed {
        if let Some(path) = &item.output {
            println!("    {}", path.display());
        }
    }

    if !report.failed.is_empty() {
        println!("  Items failed:      {}", style(report.failed.len()).red());
        for item in &report.failed {
            println!("    {} - {}", item.name, item.error);
        }
    }

    println!("{SEPARATOR}");
}
