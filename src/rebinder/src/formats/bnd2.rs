//! BND2 binders (PlayStation 2/3 era)
//!
//! ```text
//! 0x00  "BND\0"  header_info_flags u8  file_info_flags u8  unk06 u8  unk07 u8
//! 0x08  file_version i32  file_size u32  file_count i32  entries_offset u32
//! 0x18  alignment_size u16  path_mode u8  unk1B u8  base_directory_offset u32
//! 0x20  entries: offset u32 [size u32] [id i32] [name_offset u32]
//! ```
//!
//! Strings are NUL-terminated Shift-JIS. Without the size flag an entry runs
//! to the next entry's offset, or the end of the file.

use crate::binary::{to_usize, Reader, Writer};
use crate::compression::CompressionInfo;
use crate::container::{Container, Entry, Fields};
use crate::formats::Format;
use crate::path::PathMode;
use crate::schema::{EntrySlot, FieldKind, FieldSpec, HeaderSlot, Presence, Schema};
use crate::{Error, Result};

pub const HEADER_BIG_ENDIAN: u8 = 0x01;

pub const FILE_INFO_SIZE: u8 = 0x01;
pub const FILE_INFO_ID: u8 = 0x02;
pub const FILE_INFO_NAME_OFFSET: u8 = 0x04;

const ENTRIES_OFFSET: u32 = 0x20;

pub static SCHEMA: Schema = Schema {
    format: "BND2",
    root: "bnd2",
    header: &[
        HeaderSlot::SourceName("binder_name"),
        HeaderSlot::Compression("compression"),
        HeaderSlot::Field(FieldSpec::element("header_info_flags", FieldKind::U8, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element("file_info_flags", FieldKind::U8, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element("unk06", FieldKind::U8, Presence::Elided("0"))),
        HeaderSlot::Field(FieldSpec::element("unk07", FieldKind::U8, Presence::Elided("0"))),
        HeaderSlot::Field(FieldSpec::element("file_version", FieldKind::I32, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element("alignment_size", FieldKind::U16, Presence::Required)),
        HeaderSlot::PathMode("file_path_mode"),
        HeaderSlot::Field(FieldSpec::element("unk1B", FieldKind::U8, Presence::Elided("0"))),
        HeaderSlot::BaseDirectory("base_directory"),
    ],
    collection: "files",
    item: "file",
    entry: &[
        EntrySlot::Id(FieldSpec::attribute("id", FieldKind::I32, Presence::Required)),
        EntrySlot::Name("name"),
        EntrySlot::Suffix("suffix"),
    ],
    derive_path_mode: None,
    nameless_fallback: true,
};

pub struct Bnd2;

struct Header {
    header_info_flags: u8,
    file_info_flags: u8,
    unk06: u8,
    unk07: u8,
    file_version: i32,
    alignment_size: u16,
    unk1b: u8,
}

impl Header {
    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            header_info_flags: fields.get_int("header_info_flags")?,
            file_info_flags: fields.get_int("file_info_flags")?,
            unk06: fields.get_int("unk06")?,
            unk07: fields.get_int("unk07")?,
            file_version: fields.get_int("file_version")?,
            alignment_size: fields.get_int("alignment_size")?,
            unk1b: fields.get_int("unk1B")?,
        })
    }

    fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.set("header_info_flags", self.header_info_flags);
        fields.set("file_info_flags", self.file_info_flags);
        fields.set("unk06", self.unk06);
        fields.set("unk07", self.unk07);
        fields.set("file_version", self.file_version);
        fields.set("alignment_size", self.alignment_size);
        fields.set("unk1B", self.unk1b);
        fields
    }

    fn has(&self, flag: u8) -> bool {
        self.file_info_flags & flag != 0
    }
}

struct Pending {
    offset: usize,
    size: Option<usize>,
    name_offset: Option<usize>,
}

impl Format for Bnd2 {
    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"BND\0")
    }

    fn read(&self, bytes: &[u8]) -> Result<Container> {
        let mut r = Reader::new(bytes);
        r.expect_magic(b"BND\0")?;
        let header_info_flags = r.u8()?;
        r.set_big_endian(header_info_flags & HEADER_BIG_ENDIAN != 0);
        let file_info_flags = r.u8()?;
        let unk06 = r.u8()?;
        let unk07 = r.u8()?;
        let file_version = r.i32()?;
        let file_size = to_usize(r.u32()?, "file size")?.min(bytes.len());
        let file_count = to_usize(r.i32()?, "file count")?;
        let entries_offset = to_usize(r.u32()?, "entries offset")?;
        let alignment_size = r.u16()?;
        let code = r.u8()?;
        let path_mode = PathMode::from_code(code)
            .ok_or_else(|| Error::invalid(format!("unknown BND2 path mode {code}")))?;
        let unk1b = r.u8()?;
        let base_directory_offset = to_usize(r.u32()?, "base directory offset")?;

        let header = Header {
            header_info_flags,
            file_info_flags,
            unk06,
            unk07,
            file_version,
            alignment_size,
            unk1b,
        };

        let base_directory = if path_mode == PathMode::BaseDirectoryRelative {
            Some(r.shift_jis_at(base_directory_offset)?)
        } else {
            None
        };

        let mut rows = Vec::with_capacity(file_count.min(bytes.len()));
        let mut e = Reader::new(bytes);
        e.set_big_endian(header_info_flags & HEADER_BIG_ENDIAN != 0);
        e.skip(entries_offset)?;
        for _ in 0..file_count {
            let offset = to_usize(e.u32()?, "data offset")?;
            let size = if header.has(FILE_INFO_SIZE) {
                Some(to_usize(e.u32()?, "data size")?)
            } else {
                None
            };
            let id = if header.has(FILE_INFO_ID) { e.i32()? } else { -1 };
            let name = if header.has(FILE_INFO_NAME_OFFSET) {
                let name_offset = to_usize(e.u32()?, "name offset")?;
                let name = e.shift_jis_at(name_offset)?;
                (!name.is_empty()).then_some(name)
            } else {
                None
            };
            rows.push((offset, size, id, name));
        }

        let mut entries = Vec::with_capacity(rows.len());
        for (index, (offset, size, id, name)) in rows.iter().enumerate() {
            let size = match size {
                Some(size) => *size,
                None => {
                    let end = rows
                        .get(index + 1)
                        .map_or(file_size, |next| next.0)
                        .max(*offset);
                    end - offset
                }
            };
            entries.push(Entry::new(*id, name.as_deref(), r.slice_at(*offset, size)?.to_vec()));
        }

        tracing::debug!(files = entries.len(), ?path_mode, "Read BND2");
        Ok(Container {
            source_name: String::new(),
            compression: CompressionInfo::None,
            path_mode,
            base_directory,
            header: header.into_fields(),
            entries,
        })
    }

    fn write(&self, container: &Container) -> Result<Vec<u8>> {
        let h = Header::from_fields(&container.header)?;
        let mut w = Writer::new(h.header_info_flags & HEADER_BIG_ENDIAN != 0);

        w.bytes(b"BND\0");
        w.u8(h.header_info_flags);
        w.u8(h.file_info_flags);
        w.u8(h.unk06);
        w.u8(h.unk07);
        w.i32(h.file_version);
        let file_size = w.reserve_u32();
        w.i32(i32::try_from(container.entries.len()).map_err(|_| Error::invalid("too many entries"))?);
        w.u32(ENTRIES_OFFSET);
        w.u16(h.alignment_size);
        w.u8(container.path_mode.code());
        w.u8(h.unk1b);
        let base_directory_offset = w.reserve_u32();

        let mut pending = Vec::with_capacity(container.entries.len());
        for entry in &container.entries {
            let offset = w.reserve_u32();
            let size = h.has(FILE_INFO_SIZE).then(|| w.reserve_u32());
            if h.has(FILE_INFO_ID) {
                w.i32(entry.id);
            }
            let name_offset = h.has(FILE_INFO_NAME_OFFSET).then(|| w.reserve_u32());
            pending.push(Pending {
                offset,
                size,
                name_offset,
            });
        }

        if container.path_mode == PathMode::BaseDirectoryRelative {
            let offset = w.offset_u32()?;
            w.fill_u32(base_directory_offset, offset);
            w.shift_jis_z(container.base_directory.as_deref().unwrap_or_default())?;
        }
        for (entry, slots) in container.entries.iter().zip(&pending) {
            if let Some(at) = slots.name_offset {
                let offset = w.offset_u32()?;
                w.fill_u32(at, offset);
                w.shift_jis_z(entry.name.as_deref().unwrap_or_default())?;
            }
        }

        let align = usize::from(h.alignment_size);
        for (entry, slots) in container.entries.iter().zip(&pending) {
            w.pad(align);
            let offset = w.offset_u32()?;
            w.fill_u32(slots.offset, offset);
            w.bytes(&entry.bytes);
            if let Some(at) = slots.size {
                let size = u32::try_from(entry.bytes.len()).map_err(|_| Error::invalid("entry exceeds 4 GiB"))?;
                w.fill_u32(at, size);
            }
        }

        let total = w.offset_u32()?;
        w.fill_u32(file_size, total);
        Ok(w.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(file_info_flags: u8, path_mode: PathMode, alignment_size: u16) -> Container {
        Container {
            path_mode,
            header: Header {
                header_info_flags: 0,
                file_info_flags,
                unk06: 0,
                unk07: 1,
                file_version: 0x0102,
                alignment_size,
                unk1b: 0,
            }
            .into_fields(),
            entries: vec![
                Entry::new(100, Some("menu/title.tpf"), vec![1; 33]),
                Entry::new(101, Some("menu/font.fnt"), vec![2; 7]),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_round_trip() {
        let all = FILE_INFO_SIZE | FILE_INFO_ID | FILE_INFO_NAME_OFFSET;
        for (flags, mode) in [
            (all, PathMode::NameRelative),
            (all, PathMode::FullPath),
            (all, PathMode::ByOrdinalOrId),
        ] {
            let container = sample(flags, mode, 0x10);
            let bytes = Bnd2.write(&container).unwrap();
            assert!(Bnd2.sniff(&bytes));
            let read = Bnd2.read(&bytes).unwrap();
            assert_eq!(read, container, "{mode:?}");
            assert_eq!(Bnd2.write(&read).unwrap(), bytes);
        }
    }

    #[test]
    fn test_base_directory() {
        let mut container = sample(
            FILE_INFO_SIZE | FILE_INFO_ID | FILE_INFO_NAME_OFFSET,
            PathMode::BaseDirectoryRelative,
            4,
        );
        container.base_directory = Some(r"D:\game\data\".to_string());
        let read = Bnd2.read(&Bnd2.write(&container).unwrap()).unwrap();
        assert_eq!(read, container);
    }

    #[test]
    fn test_without_sizes_or_names() {
        // Unaligned data with no size field runs to the next offset
        let mut container = sample(FILE_INFO_ID, PathMode::ByOrdinalOrId, 1);
        for entry in &mut container.entries {
            entry.name = None;
        }
        let read = Bnd2.read(&Bnd2.write(&container).unwrap()).unwrap();
        assert_eq!(read, container);
    }

    #[test]
    fn test_aligned_without_sizes() {
        // Alignment padding becomes part of the preceding entry
        let mut container = sample(FILE_INFO_ID, PathMode::ByOrdinalOrId, 0x10);
        for entry in &mut container.entries {
            entry.name = None;
        }
        let bytes = Bnd2.write(&container).unwrap();
        let read = Bnd2.read(&bytes).unwrap();

        assert_eq!(read.entries[0].bytes.len(), 48);
        assert_eq!(&read.entries[0].bytes[..33], &[1; 33]);
        assert!(read.entries[0].bytes[33..].iter().all(|&b| b == 0));
        assert_eq!(read.entries[1].bytes, vec![2; 7]);
        assert_eq!(Bnd2.write(&read).unwrap(), bytes);
    }

    #[test]
    fn test_big_endian_header() {
        let mut container = sample(FILE_INFO_SIZE | FILE_INFO_ID, PathMode::ByOrdinalOrId, 0x10);
        container.header.set("header_info_flags", HEADER_BIG_ENDIAN);
        for entry in &mut container.entries {
            entry.name = None;
        }
        let bytes = Bnd2.write(&container).unwrap();
        assert_eq!(&bytes[0x08..0x0C], &0x0102i32.to_be_bytes());
        assert_eq!(Bnd2.read(&bytes).unwrap(), container);
    }

    #[test]
    fn test_unknown_path_mode() {
        let mut bytes = Bnd2
            .write(&sample(FILE_INFO_SIZE, PathMode::ByOrdinalOrId, 0))
            .unwrap();
        bytes[0x1A] = 9;
        assert!(matches!(Bnd2.read(&bytes), Err(Error::InvalidData(_))));
    }
}
