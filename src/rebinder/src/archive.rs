//! Whole-file unpack and repack
//!
//! Ties the DCX wrapper, format detection and the engine together. An archive
//! `c0000.anibnd.dcx` unpacks into the sibling directory `c0000-anibnd-dcx`,
//! and repacking that directory writes the file named by its manifest back
//! next to it, moving any existing file to a `.bak` first.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::backup;
use crate::compression::CompressionInfo;
use crate::container::Container;
use crate::dcx;
use crate::engine::{Engine, Progress};
use crate::formats::{self, Format};
use crate::roots::RootTable;
use crate::{Error, Result};

/// Suffix added to the unpack directory when a file already has its name
const COLLISION_SUFFIX: &str = "-rebinder";

/// Result of unpacking one archive
#[derive(Debug, Clone)]
pub struct Unpacked {
    pub format: &'static str,
    pub directory: PathBuf,
    pub manifest: PathBuf,
}

/// Detect and decode an archive, unwrapping DCX first
pub fn decode(bytes: &[u8]) -> Result<(&'static dyn Format, Container)> {
    let (payload, compression) = if dcx::is_dcx(bytes) {
        dcx::decompress(bytes)?
    } else {
        (bytes.to_vec(), CompressionInfo::None)
    };

    let format = formats::sniff(&payload).ok_or_else(|| {
        let magic = String::from_utf8_lossy(&payload[..payload.len().min(4)]).into_owned();
        Error::UnknownFormat(magic)
    })?;
    let mut container = format.read(&payload)?;
    container.compression = compression;
    Ok((format, container))
}

/// Encode a container and apply its outer compression
pub fn encode(format: &dyn Format, container: &Container) -> Result<Vec<u8>> {
    let bytes = format.write(container)?;
    match container.compression {
        CompressionInfo::None | CompressionInfo::Unknown => Ok(bytes),
        ref info => dcx::compress(&bytes, info),
    }
}

/// Read and decode an archive from disk
pub fn open(path: &Path) -> Result<(&'static dyn Format, Container)> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let (format, mut container) = decode(&bytes)?;
    container.source_name = file_name(path)?;
    Ok((format, container))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::invalid(format!("{} has no file name", path.display())))
}

/// Directory an archive unpacks into: its name with dots replaced by dashes
pub fn unpack_dir_name(path: &Path) -> Result<PathBuf> {
    let name = file_name(path)?.replace('.', "-");
    let dir = path.with_file_name(&name);
    if dir.is_file() {
        Ok(path.with_file_name(format!("{name}{COLLISION_SUFFIX}")))
    } else {
        Ok(dir)
    }
}

/// Unpack an archive into its sibling directory
pub fn unpack_file(path: &Path, roots: &RootTable, progress: &mut dyn Progress) -> Result<Unpacked> {
    let (format, container) = open(path)?;
    let directory = unpack_dir_name(path)?;
    tracing::info!(
        source = %path.display(),
        format = format.name(),
        compression = container.compression.tag(),
        files = container.entries.len(),
        "Unpacking"
    );

    let manifest = Engine::new(format.schema(), roots).unpack(&container, &directory, progress)?;
    Ok(Unpacked {
        format: format.name(),
        directory,
        manifest,
    })
}

/// Where a repacked archive is written: `source_name` beside `dir`
pub fn output_path(dir: &Path, source_name: &str) -> Result<PathBuf> {
    let mut components = Path::new(source_name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !plain || source_name.contains(['/', '\\']) {
        return Err(Error::PathEscape(source_name.to_string()));
    }
    let parent = dir.parent().unwrap_or_else(|| Path::new("."));
    Ok(parent.join(source_name))
}

/// Rebuild the archive described by an unpacked directory.
///
/// Returns the path written.
pub fn repack_dir(dir: &Path, roots: &RootTable, progress: &mut dyn Progress) -> Result<PathBuf> {
    let format = formats::for_directory(dir)
        .ok_or_else(|| Error::UnknownFormat(format!("no manifest in {}", dir.display())))?;

    let container = Engine::new(format.schema(), roots).repack(dir, progress)?;
    let output = output_path(dir, &container.source_name)?;
    let bytes = encode(format, &container)?;

    backup::backup_before_write(&output)?;
    fs::write(&output, &bytes)?;
    tracing::info!(
        output = %output.display(),
        format = format.name(),
        bytes = bytes.len(),
        "Repacked"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Entry, Fields};
    use crate::engine::NoProgress;
    use crate::formats::bnd2::{self, Bnd2};
    use crate::formats::bnd3::Bnd3;
    use crate::path::PathMode;

    fn bnd3_container() -> Container {
        let mut header = Fields::new();
        header.set("version", "07D7R6");
        header.set("format", 0x2Eu8);
        header.set("bigendian", false);
        header.set("bitbigendian", false);
        header.set("unk18", 0i32);
        header.set("writefileheadersend", true);
        Container {
            path_mode: PathMode::FullPath,
            header,
            entries: vec![
                Entry::new(0, Some(r"N:\FRPG\data\INTERROOT_win32\param\a.param"), vec![1; 20]).with_flags(0x02),
                Entry::new(1, Some(r"N:\FRPG\data\INTERROOT_win32\param\a.param"), vec![2; 20]).with_flags(0x02),
            ],
            ..Default::default()
        }
    }

    fn bnd2_container() -> Container {
        let mut header = Fields::new();
        header.set("header_info_flags", 0u8);
        header.set("file_info_flags", bnd2::FILE_INFO_SIZE | bnd2::FILE_INFO_ID);
        header.set("unk06", 0u8);
        header.set("unk07", 0u8);
        header.set("file_version", 1i32);
        header.set("alignment_size", 0x10u16);
        header.set("unk1B", 0u8);
        Container {
            compression: CompressionInfo::DcxZstd,
            path_mode: PathMode::ByOrdinalOrId,
            header,
            entries: vec![Entry::new(7, None, b"seven".to_vec()), Entry::new(9, None, b"nine".to_vec())],
            ..Default::default()
        }
    }

    #[test]
    fn test_unpack_and_repack_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive = temp_dir.path().join("a.parambnd");
        let original = Bnd3.write(&bnd3_container()).unwrap();
        fs::write(&archive, &original).unwrap();

        let roots = RootTable::default();
        let unpacked = unpack_file(&archive, &roots, &mut NoProgress).unwrap();
        assert_eq!(unpacked.format, "BND3");
        assert_eq!(unpacked.directory, temp_dir.path().join("a-parambnd"));
        assert!(unpacked.directory.join("param/a.param").is_file());
        assert!(unpacked.directory.join("param/a (2).param").is_file());

        let output = repack_dir(&unpacked.directory, &roots, &mut NoProgress).unwrap();
        assert_eq!(output, archive);
        assert_eq!(fs::read(&output).unwrap(), original);
        assert_eq!(fs::read(backup::backup_path(&archive)).unwrap(), original);
    }

    #[test]
    fn test_dcx_wrapped_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let container = bnd2_container();
        let original = encode(&Bnd2, &container).unwrap();
        assert!(dcx::is_dcx(&original));

        let archive = temp_dir.path().join("menu.bnd.dcx");
        fs::write(&archive, &original).unwrap();

        let (format, read) = open(&archive).unwrap();
        assert_eq!(format.name(), "BND2");
        assert_eq!(read.compression, CompressionInfo::DcxZstd);
        assert_eq!(read.source_name, "menu.bnd.dcx");

        let roots = RootTable::default();
        let unpacked = unpack_file(&archive, &roots, &mut NoProgress).unwrap();
        assert!(unpacked.directory.join("7").is_file());
        let output = repack_dir(&unpacked.directory, &roots, &mut NoProgress).unwrap();
        assert_eq!(fs::read(output).unwrap(), original);
    }

    #[test]
    fn test_rooted_bnd2_name_survives() -> anyhow::Result<()> {
        use anyhow::Context;

        let name = r"N:\FRPG\data\menu\title.tpf";
        let mut container = bnd2_container();
        container.compression = CompressionInfo::None;
        container.path_mode = PathMode::FullPath;
        container.header.set(
            "file_info_flags",
            bnd2::FILE_INFO_SIZE | bnd2::FILE_INFO_ID | bnd2::FILE_INFO_NAME_OFFSET,
        );
        container.entries = vec![Entry::new(0, Some(name), b"tpf".to_vec())];

        let temp_dir = tempfile::tempdir()?;
        let archive = temp_dir.path().join("menu.bnd");
        let original = Bnd2.write(&container)?;
        fs::write(&archive, &original)?;

        let roots = RootTable::default();
        let unpacked = unpack_file(&archive, &roots, &mut NoProgress)?;
        assert!(unpacked.directory.join("menu/title.tpf").is_file());

        let output = repack_dir(&unpacked.directory, &roots, &mut NoProgress)?;
        let (_, rebuilt) = open(&output).context("repacked archive should open")?;
        assert_eq!(rebuilt.entries[0].name.as_deref(), Some(name));
        assert_eq!(fs::read(&output)?, original);
        Ok(())
    }

    #[test]
    fn test_unpack_dir_name_collision() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive = temp_dir.path().join("a.bnd");
        assert_eq!(unpack_dir_name(&archive).unwrap(), temp_dir.path().join("a-bnd"));

        fs::write(temp_dir.path().join("a-bnd"), b"occupied").unwrap();
        assert_eq!(
            unpack_dir_name(&archive).unwrap(),
            temp_dir.path().join("a-bnd-rebinder")
        );
    }

    #[test]
    fn test_unknown_format() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notes.txt");
        fs::write(&path, b"hello world").unwrap();
        assert!(matches!(open(&path), Err(Error::UnknownFormat(_))));
        assert!(matches!(
            open(&temp_dir.path().join("missing.bnd")),
            Err(Error::FileNotFound(_))
        ));
        assert!(matches!(
            repack_dir(temp_dir.path(), &RootTable::default(), &mut NoProgress),
            Err(Error::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_output_path_must_be_plain() {
        let dir = Path::new("/mods/a-bnd");
        assert_eq!(output_path(dir, "a.bnd").unwrap(), PathBuf::from("/mods/a.bnd"));
        for bad in ["../a.bnd", "sub/a.bnd", r"sub\a.bnd", "/etc/passwd", "..", ""] {
            assert!(matches!(output_path(dir, bad), Err(Error::PathEscape(_))), "{bad}");
        }
    }
}
