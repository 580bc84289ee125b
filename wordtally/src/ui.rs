//! Terminal feedback for the wordtally CLI.
//!
//! Everything here writes to stderr so stdout carries only the JSON
//! report.

use console::{style, Term};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use wordtally_lib::Report;

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_INTERVAL: Duration = Duration::from_millis(80);

/// A stderr spinner showing how long the run has taken so far.
///
/// It stops on [`stop`](Self::stop) or as soon as the token it was started
/// under is cancelled, so an interrupt clears the line before shutdown logs.
pub struct Spinner {
    stop: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl Spinner {
    /// Start a spinner, or return `None` when stderr is not a terminal.
    pub fn start(message: &str, shutdown: &CancellationToken) -> Option<Self> {
        let term = Term::stderr();
        if !term.is_term() {
            return None;
        }

        let stop = shutdown.child_token();
        let message = message.to_string();
        let handle = tokio::spawn({
            let stop = stop.clone();
            async move {
                let started = Instant::now();
                let mut ticker = tokio::time::interval(FRAME_INTERVAL);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                let mut tick = 0usize;

                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = ticker.tick() => {
                            let line = format!(
                                "{} {}",
                                style(spinner_frame(tick)).for_stderr().cyan(),
                                spinner_text(&message, started.elapsed())
                            );
                            let _ = term.clear_line();
                            let _ = term.write_str(&line);
                            tick += 1;
                        }
                    }
                }
                let _ = term.clear_line();
            }
        });

        Some(Self { stop, handle })
    }

    /// Stop the spinner and wait for the line to be cleared.
    pub async fn stop(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}

fn spinner_frame(tick: usize) -> &'static str {
    SPINNER_FRAMES[tick % SPINNER_FRAMES.len()]
}

/// `message` followed by whole elapsed seconds, e.g. `Counting... 12s`.
fn spinner_text(message: &str, elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    if seconds < 60 {
        format!("{} {}s", message, seconds)
    } else {
        format!("{} {}m{:02}s", message, seconds / 60, seconds % 60)
    }
}

// ── Messages ─────────────────────────────────────────────────────────────────

pub fn print_error(message: &str) {
    eprintln!("{} {}", style("Error:").for_stderr().red().bold(), message);
}

/// Fetch errors are not fatal; report only how many there were.
pub fn print_error_count(errors: usize) {
    eprintln!("{}", style(error_count_line(errors)).for_stderr().yellow());
}

pub fn error_count_line(errors: usize) -> String {
    format!("Warning: {} errors occurred", errors)
}

/// One-line run summary for `--verbose`.
pub fn print_summary(report: &Report) {
    eprintln!("{}", summary_line(report));
}

pub fn summary_line(report: &Report) -> String {
    let mut line = format!(
        "Processed {} essay{}",
        report.total_documents,
        if report.total_documents == 1 { "" } else { "s" }
    );
    if let Some(top) = report.top_words.first() {
        line.push_str(&format!(", most frequent word '{}' ({})", top.word, top.count));
    }
    if report.cancelled {
        line.push_str(" (stopped early)");
    }
    line
}
