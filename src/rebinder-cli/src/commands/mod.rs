//! Command handlers for the rebinder CLI
//!
//! Every handler processes a batch of paths. A failure is reported and the
//! batch continues; handlers return how many paths failed.

pub mod auto;
pub mod dcx;
pub mod repack;
pub mod roots;
pub mod unpack;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

/// Resolution of the per-container progress bar
const BAR_STEPS: u64 = 1000;

/// Progress bar fed by the engine's fractional reports
pub struct Bar(ProgressBar);

impl Bar {
    pub fn new(message: String) -> Self {
        let pb = ProgressBar::new(BAR_STEPS);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb.set_message(message);
        Self(pb)
    }

    pub fn finish(&self) {
        self.0.finish_and_clear();
    }
}

impl rebinder::Progress for Bar {
    fn report(&mut self, fraction: f32) {
        self.0.set_position((fraction.clamp(0.0, 1.0) * BAR_STEPS as f32) as u64);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Run `handler` for each path, isolating failures
pub fn run_batch<F>(paths: &[PathBuf], mut handler: F) -> usize
where
    F: FnMut(&Path) -> Result<()>,
{
    let mut failures = 0;
    for path in paths {
        if let Err(e) = handler(path) {
            eprintln!("Error: {e:#}");
            tracing::debug!(path = %path.display(), error = ?e, "Path failed");
            failures += 1;
        }
    }
    if failures > 0 && paths.len() > 1 {
        eprintln!("{failures} of {} path(s) failed", paths.len());
    } else {
        tracing::info!(paths = paths.len(), "Batch complete");
    }
    failures
}

/// Block until the user presses Enter
pub fn pause() {
    eprintln!("Press Enter to exit...");
    if let Err(e) = wait_for_line(&mut io::stdin().lock()) {
        tracing::warn!(error = %e, "Could not wait for Enter");
    }
}

fn wait_for_line(input: &mut impl BufRead) -> io::Result<()> {
    let mut line = String::new();
    input.read_line(&mut line).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_batch_isolates_failures() {
        let paths = vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")];
        let mut seen = Vec::new();
        let failures = run_batch(&paths, |path| {
            seen.push(path.to_path_buf());
            if path == Path::new("b") {
                anyhow::bail!("broken");
            }
            Ok(())
        });
        assert_eq!(failures, 1);
        assert_eq!(seen, paths);
    }

    #[test]
    fn test_wait_for_line_reports_errors() {
        assert!(wait_for_line(&mut io::Cursor::new(b"\n".to_vec())).is_ok());
        assert!(wait_for_line(&mut io::Cursor::new(Vec::new())).is_ok());
        // Not UTF-8
        let err = wait_for_line(&mut io::Cursor::new(vec![0xFF, b'\n'])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Path::new("/mods/a.bnd")), "a.bnd");
    }
}
