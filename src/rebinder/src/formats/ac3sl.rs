//! Armored Core 3: Silent Line binders
//!
//! ```text
//! 0x00  "BND\0"  file_version [u8; 4]  file_size u32  file_count i32
//! 0x10  entries_offset u32  0 u32  0 u32  alignment_size i16  unk1E i16
//! 0x20  entries: id i32  data_offset u32  size u32  0 u32
//! ```
//!
//! Little-endian, id-only. The version tag takes the place of BND2's flag
//! bytes and is always upper-case ASCII (usually `LTL`).

use crate::binary::{to_usize, Reader, Writer};
use crate::compression::CompressionInfo;
use crate::container::{Container, Entry, Fields};
use crate::formats::Format;
use crate::path::PathMode;
use crate::schema::{EntrySlot, FieldKind, FieldSpec, HeaderSlot, Presence, Schema};
use crate::{Error, Result};

const ENTRIES_OFFSET: u32 = 0x20;

pub static SCHEMA: Schema = Schema {
    format: "AC3SL",
    root: "bnd_ac3sl",
    header: &[
        HeaderSlot::SourceName("binder_name"),
        HeaderSlot::Compression("compression"),
        HeaderSlot::Field(FieldSpec::element("file_version", FieldKind::Text, Presence::Implied("LTL"))),
        HeaderSlot::Field(FieldSpec::element("alignment_size", FieldKind::I16, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element("unk1E", FieldKind::I16, Presence::Required)),
    ],
    collection: "files",
    item: "file",
    entry: &[EntrySlot::Id(FieldSpec::attribute("id", FieldKind::I32, Presence::Required))],
    derive_path_mode: None,
    nameless_fallback: true,
};

pub struct Ac3sl;

struct Header {
    file_version: String,
    alignment_size: i16,
    unk1e: i16,
}

impl Header {
    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            file_version: fields.get_text("file_version")?.to_string(),
            alignment_size: fields.get_int("alignment_size")?,
            unk1e: fields.get_int("unk1E")?,
        })
    }

    fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.set("file_version", self.file_version);
        fields.set("alignment_size", self.alignment_size);
        fields.set("unk1E", self.unk1e);
        fields
    }
}

impl Format for Ac3sl {
    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"BND\0") && bytes.get(4).is_some_and(u8::is_ascii_uppercase)
    }

    fn read(&self, bytes: &[u8]) -> Result<Container> {
        let mut r = Reader::new(bytes);
        r.expect_magic(b"BND\0")?;
        let file_version = r.fixed_str(4)?;
        let _file_size = r.u32()?;
        let file_count = to_usize(r.i32()?, "file count")?;
        let entries_offset = to_usize(r.u32()?, "entries offset")?;
        r.expect_i32(0, "AC3SL reserved field")?;
        r.expect_i32(0, "AC3SL reserved field")?;
        let header = Header {
            file_version,
            alignment_size: r.i16()?,
            unk1e: r.i16()?,
        };

        let mut e = Reader::new(bytes);
        e.skip(entries_offset)?;
        let mut entries = Vec::with_capacity(file_count.min(bytes.len()));
        for _ in 0..file_count {
            let id = e.i32()?;
            let offset = to_usize(e.u32()?, "data offset")?;
            let size = to_usize(e.u32()?, "data size")?;
            e.expect_i32(0, "AC3SL entry padding")?;
            entries.push(Entry::new(id, None, r.slice_at(offset, size)?.to_vec()));
        }

        tracing::debug!(files = entries.len(), "Read AC3SL");
        Ok(Container {
            source_name: String::new(),
            compression: CompressionInfo::None,
            path_mode: PathMode::ByOrdinalOrId,
            base_directory: None,
            header: header.into_fields(),
            entries,
        })
    }

    fn write(&self, container: &Container) -> Result<Vec<u8>> {
        let h = Header::from_fields(&container.header)?;
        let mut w = Writer::new(false);

        w.bytes(b"BND\0");
        w.fixed_str(&h.file_version, 4)?;
        let file_size = w.reserve_u32();
        w.i32(i32::try_from(container.entries.len()).map_err(|_| Error::invalid("too many entries"))?);
        w.u32(ENTRIES_OFFSET);
        w.zeros(8);
        w.i16(h.alignment_size);
        w.i16(h.unk1e);

        let mut pending = Vec::with_capacity(container.entries.len());
        for entry in &container.entries {
            w.i32(entry.id);
            pending.push((w.reserve_u32(), w.reserve_u32()));
            w.u32(0);
        }

        let align = usize::try_from(h.alignment_size).unwrap_or(0);
        for (entry, (offset_at, size_at)) in container.entries.iter().zip(pending) {
            w.pad(align);
            let offset = w.offset_u32()?;
            w.fill_u32(offset_at, offset);
            w.bytes(&entry.bytes);
            let size = u32::try_from(entry.bytes.len()).map_err(|_| Error::invalid("entry exceeds 4 GiB"))?;
            w.fill_u32(size_at, size);
        }

        let total = w.offset_u32()?;
        w.fill_u32(file_size, total);
        Ok(w.into_inner())
    }
}
