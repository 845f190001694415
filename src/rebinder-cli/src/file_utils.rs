//! File system helpers for expanding batch arguments

use rebinder::{dcx, formats, sidecar, MANIFEST_PREFIX};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Bytes needed to recognize any supported magic
const MAGIC_LEN: usize = 4;

/// Whether the file starts with a binder or DCX magic
pub fn looks_like_archive(path: &Path) -> bool {
    let mut magic = Vec::with_capacity(MAGIC_LEN);
    let read = File::open(path).and_then(|file| file.take(MAGIC_LEN as u64).read_to_end(&mut magic));
    read.is_ok() && (dcx::is_dcx(&magic) || formats::sniff(&magic).is_some())
}

fn is_generated(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    name.starts_with(MANIFEST_PREFIX) || name.ends_with(sidecar::SIDECAR_SUFFIX) || name.ends_with(".bak")
}

/// Walk files in a directory tree, keeping those that look like archives
///
/// Manifests, sidecars and backups written by this tool are skipped, as is
/// anything inside an unpacked directory.
pub fn collect_archives(path: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && formats::for_directory(e.path()).is_some()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| !is_generated(p) && looks_like_archive(p))
        .collect()
}

/// Expand arguments: directories become the archives beneath them when `recursive`
pub fn expand(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut expanded = Vec::new();
    for path in paths {
        if recursive && path.is_dir() {
            expanded.extend(collect_archives(path));
        } else {
            expanded.push(path.clone());
        }
    }
    expanded
}
