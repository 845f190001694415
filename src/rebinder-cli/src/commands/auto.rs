//! Automatic dispatch for bare path arguments
//!
//! Directories are repacked. Files are unpacked when they hold a known
//! container (DCX-wrapped or not); other DCX files are decompressed, and plain files
//! with a DCX sidecar are compressed.

use anyhow::{bail, Context, Result};
use rebinder::{dcx, formats, sidecar, RootTable};
use std::fs;
use std::path::{Path, PathBuf};

use super::{repack, run_batch, unpack};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Unpack,
    Repack,
    Decompress,
    Compress,
}

/// Decide what to do with `path`
pub fn classify(path: &Path) -> Result<Action> {
    if path.is_dir() {
        return Ok(Action::Repack);
    }

    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if dcx::is_dcx(&bytes) {
        let (payload, _) = dcx::decompress(&bytes)
            .with_context(|| format!("Failed to decompress {}", path.display()))?;
        if formats::sniff(&payload).is_some() {
            return Ok(Action::Unpack);
        }
        return Ok(Action::Decompress);
    }
    if formats::sniff(&bytes).is_some() {
        return Ok(Action::Unpack);
    }
    if sidecar::sidecar_path(path).is_file() {
        return Ok(Action::Compress);
    }
    bail!("{} is not a recognized archive", path.display())
}

pub fn process(path: &Path, roots: &RootTable) -> Result<()> {
    let action = classify(path)?;
    tracing::debug!(path = %path.display(), ?action, "Dispatching");
    match action {
        Action::Unpack => unpack::unpack_path(path, roots),
        Action::Repack => repack::repack_path(path, roots),
        Action::Decompress => super::dcx::decompress(path),
        Action::Compress => super::dcx::compress(path),
    }
}

/// Handle bare path arguments
pub fn handle(paths: &[PathBuf], roots: &RootTable) -> usize {
    run_batch(paths, |path| process(path, roots))
}
