//! Unpack command handler

use anyhow::{Context, Result};
use rebinder::{archive, RootTable};
use std::path::{Path, PathBuf};

use super::{display_name, run_batch, Bar};
use crate::file_utils;

/// Unpack one archive next to itself
pub fn unpack_path(path: &Path, roots: &RootTable) -> Result<()> {
    let mut bar = Bar::new(display_name(path));
    let result = archive::unpack_file(path, roots, &mut bar);
    bar.finish();

    let unpacked = result.with_context(|| format!("Failed to unpack {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        format = unpacked.format,
        directory = %unpacked.directory.display(),
        "Unpacked"
    );
    Ok(())
}

/// Handle the unpack command
pub fn handle(paths: &[PathBuf], recursive: bool, roots: &RootTable) -> usize {
    let targets = file_utils::expand(paths, recursive);
    if targets.is_empty() {
        tracing::warn!("No archives found");
    }
    run_batch(&targets, |path| unpack_path(path, roots))
}
