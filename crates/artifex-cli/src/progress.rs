use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use artifex_dl::progress::{ProgressCallback, ProgressUpdate};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nu_ansi_term::Color::Cyan;

use crate::utils::{progress_enabled, Colored};

/// Shared MultiProgress instance for suspend/stop from other modules.
static MULTI: LazyLock<Arc<MultiProgress>> = LazyLock::new(|| Arc::new(MultiProgress::new()));

/// Pause progress display, run the closure, then resume.
pub fn suspend<F: FnOnce()>(f: F) {
    MULTI.suspend(f);
}

/// Stop and clear all progress bars.
pub fn stop() {
    MULTI.clear().ok();
}

fn download_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix}  {wide_bar:.cyan/dim}  {bytes}/{total_bytes}  {bytes_per_sec}  {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━━─")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn batch_prefix(update: &ProgressUpdate) -> String {
    if update.file_count > 1 {
        format!(
            "[{}/{}] {}",
            update.file_index,
            update.file_count,
            Colored(Cyan, &update.name)
        )
    } else {
        Colored(Cyan, &update.name).to_string()
    }
}

/// Create a download progress bar with a progress bar, bytes, and ETA.
pub fn create_download_job(prefix: &str) -> ProgressBar {
    let pb = if progress_enabled() {
        MULTI.add(ProgressBar::new(0))
    } else {
        MULTI.add(ProgressBar::hidden())
    };
    pb.set_style(download_style());
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a spinner job.
pub fn create_spinner_job(message: &str) -> ProgressBar {
    let pb = if progress_enabled() {
        MULTI.add(ProgressBar::new_spinner())
    } else {
        MULTI.add(ProgressBar::hidden())
    };
    pb.set_style(spinner_style());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Mirror a progress update onto a bar.
///
/// Registry pulls report each layer as its own transfer, so the length and prefix follow
/// whichever file the update describes.
pub fn handle_download_progress(update: &ProgressUpdate, pb: &ProgressBar) {
    pb.set_prefix(batch_prefix(update));
    match update.total_bytes {
        Some(total) => pb.set_length(total),
        None => pb.unset_length(),
    }
    pb.set_position(update.downloaded_bytes);
}

/// A [`ProgressCallback`] that drives `pb`.
pub fn progress_callback(pb: &ProgressBar) -> ProgressCallback {
    let pb = pb.clone();
    Arc::new(move |update| handle_download_progress(update, &pb))
}
