//! Standalone DCX files
//!
//! A DCX file that is not a binder decompresses to a plain file plus a small
//! sidecar manifest recording the compression parameters:
//!
//! ```text
//! c0000.hkx.dcx  ->  c0000.hkx  +  c0000.hkx-rebinder-dcx.xml
//! menu.gfx       ->  menu.gfx.undcx  +  menu.gfx.undcx-rebinder-dcx.xml
//! ```
//!
//! Compressing reverses the naming and reads the parameters back.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::backup;
use crate::compression::CompressionInfo;
use crate::dcx;
use crate::manifest::Node;
use crate::{Error, Result};

pub const SIDECAR_SUFFIX: &str = "-rebinder-dcx.xml";

const ROOT: &str = "dcx";
const COMPRESSION: &str = "compression";

fn appended(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Sidecar manifest that belongs to a decompressed file
pub fn sidecar_path(decompressed: &Path) -> PathBuf {
    appended(decompressed, SIDECAR_SUFFIX)
}

/// `X.dcx` becomes `X`; anything else gains `.undcx`
pub fn decompressed_path(path: &Path) -> PathBuf {
    if has_extension(path, "dcx") {
        path.with_extension("")
    } else {
        appended(path, ".undcx")
    }
}

/// `X.undcx` becomes `X`; anything else gains `.dcx`
pub fn compressed_path(path: &Path) -> PathBuf {
    if has_extension(path, "undcx") {
        path.with_extension("")
    } else {
        appended(path, ".dcx")
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        _ => e.into(),
    })
}

/// Decompress a DCX file and write its sidecar. Returns the decompressed path.
pub fn decompress_file(path: &Path) -> Result<PathBuf> {
    let bytes = read_file(path)?;
    if !dcx::is_dcx(&bytes) {
        return Err(Error::invalid(format!("{} is not a DCX file", path.display())));
    }
    let (data, info) = dcx::decompress(&bytes)?;

    let output = decompressed_path(path);
    backup::backup_before_write(&output)?;
    fs::write(&output, &data)?;

    let mut manifest = Node::new(ROOT);
    info.write(&mut manifest, COMPRESSION);
    manifest.save(&sidecar_path(&output))?;

    tracing::info!(
        source = %path.display(),
        output = %output.display(),
        compression = info.tag(),
        "Decompressed"
    );
    Ok(output)
}

/// Compress a file using the parameters in its sidecar. Returns the DCX path.
pub fn compress_file(path: &Path) -> Result<PathBuf> {
    let manifest = Node::load(&sidecar_path(path))?;
    if manifest.name != ROOT {
        return Err(Error::StructuralViolation(ROOT.to_string()));
    }
    let info = CompressionInfo::read_optional(&manifest, COMPRESSION)?
        .ok_or_else(|| Error::missing(COMPRESSION))?;

    let data = read_file(path)?;
    let bytes = dcx::compress(&data, &info)?;

    let output = compressed_path(path);
    backup::backup_before_write(&output)?;
    fs::write(&output, &bytes)?;

    tracing::info!(
        source = %path.display(),
        output = %output.display(),
        compression = info.tag(),
        "Compressed"
    );
    Ok(output)
}
