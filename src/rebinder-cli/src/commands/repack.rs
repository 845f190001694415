//! Repack command handler

use anyhow::{Context, Result};
use rebinder::{archive, RootTable};
use std::path::{Path, PathBuf};

use super::{display_name, run_batch, Bar};

/// Rebuild the archive for one unpacked directory
pub fn repack_path(dir: &Path, roots: &RootTable) -> Result<()> {
    let mut bar = Bar::new(display_name(dir));
    let result = archive::repack_dir(dir, roots, &mut bar);
    bar.finish();

    let output = result.with_context(|| format!("Failed to repack {}", dir.display()))?;
    tracing::info!(dir = %dir.display(), output = %output.display(), "Repacked");
    Ok(())
}

/// Handle the repack command
pub fn handle(dirs: &[PathBuf], roots: &RootTable) -> usize {
    run_batch(dirs, |dir| repack_path(dir, roots))
}
