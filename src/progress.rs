//! Progress reporting: a spinner for the download task poll loop and a count
//! bar for per-table stages. Both are no-ops when progress is disabled.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Optional global MultiProgress that allows multiple bars to render concurrently.
/// If unset, progress bars draw to the default terminal target.
static GLOBAL_MP: OnceLock<Arc<MultiProgress>> = OnceLock::new();

/// Install a global MultiProgress used by all subsequently created progress bars.
/// Safe to call once; additional calls are ignored.
pub fn set_global_multiprogress(mp: Arc<MultiProgress>) {
    let _ = GLOBAL_MP.set(mp);
}

fn new_bar(total: Option<u64>) -> ProgressBar {
    let pb = match total {
        Some(n) => ProgressBar::new(n),
        None => ProgressBar::new_spinner(),
    };
    match GLOBAL_MP.get() {
        Some(mp) => mp.add(pb),
        None => pb,
    }
}

fn style(template: &str, fallback: ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or(fallback)
}

/// Spinner shown while the remote task is being polled.
pub fn make_poll_spinner(label: &str) -> ProgressBar {
    let pb = new_bar(None);
    pb.set_style(style(
        "{spinner:.green} {msg}  checks: {pos}  elapsed: {elapsed_precise}",
        ProgressStyle::default_spinner(),
    ));
    pb.set_message(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Count-style progress bar (items processed out of total), with an optional label.
pub fn make_count_progress(total: u64, label: &str) -> ProgressBar {
    let pb = new_bar(Some(total));
    pb.set_style(
        style(
            "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  elapsed: {elapsed_precise}",
            ProgressStyle::default_bar(),
        )
        .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    if !label.is_empty() {
        pb.set_message(label.to_string());
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// A small wrapper that holds either a live bar or nothing, so callers do not
/// branch on the progress option at every step.
pub struct ProgressScope {
    pb: Option<ProgressBar>,
}

impl ProgressScope {
    pub fn disabled() -> Self {
        Self { pb: None }
    }

    pub fn spinner(enabled: bool, label: impl Into<String>) -> Self {
        Self { pb: enabled.then(|| make_poll_spinner(&label.into())) }
    }

    pub fn count(enabled: bool, label: impl Into<String>, total: u64) -> Self {
        Self { pb: enabled.then(|| make_count_progress(total, &label.into())) }
    }

    #[inline]
    pub fn inc(&self, delta: u64) {
        if let Some(pb) = &self.pb {
            pb.inc(delta);
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        if let Some(pb) = &self.pb {
            pb.set_message(msg.into());
        }
    }

    pub fn finish(&self, msg: impl Into<String>) {
        if let Some(pb) = &self.pb {
            pb.finish_with_message(msg.into());
        }
    }
}
