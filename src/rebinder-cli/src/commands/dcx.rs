//! DCX command handler

use anyhow::{Context, Result};
use rebinder::{dcx, sidecar};
use std::fs;
use std::path::{Path, PathBuf};

use super::run_batch;

pub fn decompress(path: &Path) -> Result<()> {
    let output = sidecar::decompress_file(path)
        .with_context(|| format!("Failed to decompress {}", path.display()))?;
    tracing::info!(path = %path.display(), output = %output.display(), "Decompressed");
    Ok(())
}

pub fn compress(path: &Path) -> Result<()> {
    let output = sidecar::compress_file(path)
        .with_context(|| format!("Failed to compress {}", path.display()))?;
    tracing::info!(path = %path.display(), output = %output.display(), "Compressed");
    Ok(())
}

/// Decompress DCX files, compress anything else from its sidecar
pub fn process(path: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if dcx::is_dcx(&bytes) {
        decompress(path)
    } else {
        compress(path)
    }
}

/// Handle the dcx command
pub fn handle(paths: &[PathBuf]) -> usize {
    run_batch(paths, process)
}
