//! Container format handlers
//!
//! Each handler pairs a manifest [`Schema`] with a binary codec. Detection
//! tries handlers in [`FORMATS`] order and takes the first whose magic
//! matches; for unpacked directories the first manifest file found wins.
//!
//! Several binder families share the `BND\0` magic. Their sniffers check
//! header structure instead, and plain BND2 goes last as the fallback.

pub mod ac3sl;
pub mod ace3;
pub mod binder;
pub mod bnd2;
pub mod bnd3;
pub mod bnd4;
pub mod kuon;
pub mod tpf;

use std::path::Path;

use crate::container::Container;
use crate::schema::Schema;
use crate::Result;

/// A container format: manifest layout plus binary codec
pub trait Format: Sync {
    fn schema(&self) -> &'static Schema;

    /// Whether `bytes` (already DCX-decompressed) look like this format
    fn sniff(&self, bytes: &[u8]) -> bool;

    /// Decode a container. Name and outer compression are filled in by the caller.
    fn read(&self, bytes: &[u8]) -> Result<Container>;

    /// Encode a container, without outer compression
    fn write(&self, container: &Container) -> Result<Vec<u8>>;

    fn name(&self) -> &'static str {
        self.schema().format
    }
}

/// Registered formats in detection order
pub static FORMATS: &[&dyn Format] = &[
    &bnd4::Bnd4,
    &bnd3::Bnd3,
    &tpf::Tpf,
    &ac3sl::Ac3sl,
    &ace3::Ace3,
    &kuon::Kuon,
    &bnd2::Bnd2,
];

/// First format whose magic matches `bytes`
pub fn sniff(bytes: &[u8]) -> Option<&'static dyn Format> {
    FORMATS.iter().copied().find(|format| format.sniff(bytes))
}

/// Format of an unpacked directory, found by its manifest file
pub fn for_directory(dir: &Path) -> Option<&'static dyn Format> {
    FORMATS
        .iter()
        .copied()
        .find(|format| dir.join(format.schema().manifest_name()).is_file())
}

/// Look up a format by display name, case-insensitively
pub fn by_name(name: &str) -> Option<&'static dyn Format> {
    FORMATS
        .iter()
        .copied()
        .find(|format| format.name().eq_ignore_ascii_case(name))
}

/// Unpack `container` through the engine and repack it from disk
#[cfg(test)]
pub(crate) fn manifest_round_trip(format: &dyn Format, container: &Container) -> (tempfile::TempDir, Container) {
    use crate::engine::{Engine, NoProgress};
    use crate::roots::RootTable;

    let dir = tempfile::tempdir().unwrap();
    let roots = RootTable::default();
    let engine = Engine::new(format.schema(), &roots);
    engine.unpack(container, dir.path(), &mut NoProgress).unwrap();
    let rebuilt = engine.repack(dir.path(), &mut NoProgress).unwrap();
    (dir, rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Entry, Fields};

    fn detected(bytes: &[u8]) -> Option<&'static str> {
        sniff(bytes).map(|f| f.name())
    }

    #[test]
    fn test_sniff() {
        assert_eq!(detected(b"BND4\0\0\0\0"), Some("BND4"));
        assert_eq!(detected(b"BND307D7R6\0\0"), Some("BND3"));
        assert_eq!(detected(b"BND\0\x01\x02"), Some("BND2"));
        assert_eq!(detected(b"TPF\0"), Some("TPF"));
        assert_eq!(detected(b"BND\0LTL\0"), Some("AC3SL"));
        assert!(detected(b"DCX\0").is_none());
        assert!(detected(b"").is_none());
    }

    #[test]
    fn test_sniff_shared_magic() {
        let mut header = Fields::new();
        header.set("lite", false);
        header.set("flag1", 0u8);
        header.set("flag2", 0u8);
        let container = Container {
            header,
            entries: vec![Entry::new(3, None, b"ace".to_vec())],
            ..Default::default()
        };
        assert_eq!(detected(&ace3::Ace3.write(&container).unwrap()), Some("ACE3"));

        let mut header = Fields::new();
        header.set("file_version", 1i32);
        header.set("has_entry_size_field", true);
        let container = Container {
            header,
            entries: vec![Entry::new(0, Some("a.bin"), b"kuon".to_vec())],
            ..Default::default()
        };
        assert_eq!(detected(&kuon::Kuon.write(&container).unwrap()), Some("KUON"));

        let mut header = Fields::new();
        header.set("header_info_flags", 0u8);
        header.set("file_info_flags", bnd2::FILE_INFO_SIZE | bnd2::FILE_INFO_ID);
        header.set("unk06", 0u8);
        header.set("unk07", 0u8);
        header.set("file_version", 1i32);
        header.set("alignment_size", 0x10u16);
        header.set("unk1B", 0u8);
        let container = Container {
            header,
            entries: vec![Entry::new(0, None, b"bnd2".to_vec())],
            ..Default::default()
        };
        assert_eq!(detected(&bnd2::Bnd2.write(&container).unwrap()), Some("BND2"));
    }

    #[test]
    fn test_id_only_binders_through_manifest() {
        let mut header = Fields::new();
        header.set("file_version", "LTL");
        header.set("alignment_size", 0x10i16);
        header.set("unk1E", 0i16);
        let container = Container {
            source_name: "sl.bnd".to_string(),
            header,
            entries: vec![Entry::new(4, None, b"four".to_vec()), Entry::new(2, None, b"two".to_vec())],
            ..Default::default()
        };
        let (dir, rebuilt) = manifest_round_trip(&ac3sl::Ac3sl, &container);
        assert_eq!(std::fs::read(dir.path().join("4")).unwrap(), b"four");
        assert_eq!(rebuilt, container);

        let mut header = Fields::new();
        header.set("lite", true);
        header.set("flag1", 0u8);
        header.set("flag2", 0u8);
        let container = Container {
            source_name: "ace.bnd".to_string(),
            header,
            entries: vec![Entry::new(1000, None, b"mission".to_vec())],
            ..Default::default()
        };
        let (dir, rebuilt) = manifest_round_trip(&ace3::Ace3, &container);
        assert!(dir.path().join("1000").is_file());
        assert_eq!(rebuilt, container);
    }

    #[test]
    fn test_kuon_keeps_full_names() {
        let name = r"C:\kuon\data\map\m01.bin";
        let mut header = Fields::new();
        header.set("file_version", 1i32);
        header.set("has_entry_size_field", false);
        let container = Container {
            source_name: "map.bnd".to_string(),
            path_mode: crate::path::PathMode::FullPath,
            header,
            entries: vec![Entry::new(0, Some(name), b"map".to_vec())],
            ..Default::default()
        };
        let (dir, rebuilt) = manifest_round_trip(&kuon::Kuon, &container);
        assert!(dir.path().join("kuon/data/map/m01.bin").is_file());
        assert_eq!(rebuilt.entries[0].name.as_deref(), Some(name));
        assert_eq!(rebuilt, container);
    }

    #[test]
    fn test_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(for_directory(dir.path()).is_none());
        std::fs::write(dir.path().join("_rebinder-bnd3.xml"), "<bnd3/>").unwrap();
        assert_eq!(for_directory(dir.path()).map(|f| f.name()), Some("BND3"));
    }

    #[test]
    fn test_manifest_names_are_distinct() {
        let names: std::collections::HashSet<_> =
            FORMATS.iter().map(|f| f.schema().manifest_name()).collect();
        assert_eq!(names.len(), FORMATS.len());
        assert_eq!(by_name("bnd2").map(|f| f.schema().root), Some("bnd2"));
        assert_eq!(by_name("kuon").map(|f| f.schema().root), Some("bnd_kuon"));
    }
}
