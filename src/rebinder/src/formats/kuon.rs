//! Kuon binders, plain and DVD
//!
//! ```text
//! 0x00  "BND\0"  file_version i32  file_size u32  file_count i32
//! 0x10  entries: id i32  name_offset u32  data_offset u32  [size u32]
//! ```
//!
//! Little-endian. Only the DVD variant stores sizes; plain entries run to
//! the next entry's data, or the end of the file. Names directly follow the
//! entry table, so the first name offset tells the two variants apart.

use byteorder::{ByteOrder, LE};

use crate::binary::{to_usize, Reader, Writer};
use crate::compression::CompressionInfo;
use crate::container::{Container, Entry, Fields};
use crate::formats::Format;
use crate::path::PathMode;
use crate::schema::{EntrySlot, FieldKind, FieldSpec, HeaderSlot, Presence, Schema};
use crate::{Error, Result};

const ENTRIES_OFFSET: usize = 0x10;
const PLAIN_ENTRY_SIZE: usize = 12;
const DVD_ENTRY_SIZE: usize = 16;
const DVD_DATA_ALIGNMENT: usize = 0x10;

pub static SCHEMA: Schema = Schema {
    format: "KUON",
    root: "bnd_kuon",
    header: &[
        HeaderSlot::SourceName("binder_name"),
        HeaderSlot::Compression("compression"),
        HeaderSlot::Field(FieldSpec::element("file_version", FieldKind::I32, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element(
            "has_entry_size_field",
            FieldKind::Bool,
            Presence::Implied("false"),
        )),
    ],
    collection: "files",
    item: "file",
    entry: &[
        EntrySlot::Name("name"),
        EntrySlot::Suffix("suffix"),
        EntrySlot::Id(FieldSpec::element("id", FieldKind::I32, Presence::Required)),
    ],
    derive_path_mode: Some(full_path),
    nameless_fallback: true,
};

/// Names are absolute development paths
fn full_path(_header: &Fields) -> Result<PathMode> {
    Ok(PathMode::FullPath)
}

pub struct Kuon;

fn le_u32_at(bytes: &[u8], offset: usize) -> Option<usize> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| usize::try_from(LE::read_u32(b)).ok())
}

/// Entry stride from the first name offset, `None` when neither variant fits
fn entry_size(bytes: &[u8]) -> Option<usize> {
    let count = le_u32_at(bytes, 0x0C)?;
    if count == 0 {
        return Some(PLAIN_ENTRY_SIZE);
    }
    let first_name = le_u32_at(bytes, ENTRIES_OFFSET + 4)?;
    [PLAIN_ENTRY_SIZE, DVD_ENTRY_SIZE]
        .into_iter()
        .find(|stride| count.checked_mul(*stride).map(|table| ENTRIES_OFFSET + table) == Some(first_name))
}

impl Format for Kuon {
    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"BND\0") && le_u32_at(bytes, 8) == Some(bytes.len()) && entry_size(bytes).is_some()
    }

    fn read(&self, bytes: &[u8]) -> Result<Container> {
        let stride = entry_size(bytes).ok_or_else(|| Error::invalid("unrecognized Kuon entry table"))?;
        let has_sizes = stride == DVD_ENTRY_SIZE;

        let mut r = Reader::new(bytes);
        r.expect_magic(b"BND\0")?;
        let file_version = r.i32()?;
        let file_size = to_usize(r.u32()?, "file size")?.min(bytes.len());
        let file_count = to_usize(r.i32()?, "file count")?;

        let mut rows = Vec::with_capacity(file_count.min(bytes.len()));
        for _ in 0..file_count {
            let id = r.i32()?;
            let name_offset = to_usize(r.u32()?, "name offset")?;
            let offset = to_usize(r.u32()?, "data offset")?;
            let size = if has_sizes {
                Some(to_usize(r.u32()?, "data size")?)
            } else {
                None
            };
            let name = r.shift_jis_at(name_offset)?;
            rows.push((id, (!name.is_empty()).then_some(name), offset, size));
        }

        let mut entries = Vec::with_capacity(rows.len());
        for (index, (id, name, offset, size)) in rows.iter().enumerate() {
            let size = match size {
                Some(size) => *size,
                None => {
                    let end = rows.get(index + 1).map_or(file_size, |next| next.2).max(*offset);
                    end - offset
                }
            };
            entries.push(Entry::new(*id, name.as_deref(), r.slice_at(*offset, size)?.to_vec()));
        }

        let mut header = Fields::new();
        header.set("file_version", file_version);
        header.set("has_entry_size_field", has_sizes);

        tracing::debug!(files = entries.len(), dvd = has_sizes, "Read Kuon BND");
        Ok(Container {
            source_name: String::new(),
            compression: CompressionInfo::None,
            path_mode: PathMode::FullPath,
            base_directory: None,
            header,
            entries,
        })
    }

    fn write(&self, container: &Container) -> Result<Vec<u8>> {
        let file_version: i32 = container.header.get_int("file_version")?;
        let has_sizes = container.header.get_bool("has_entry_size_field")?;

        let mut w = Writer::new(false);
        w.bytes(b"BND\0");
        w.i32(file_version);
        let file_size = w.reserve_u32();
        w.i32(i32::try_from(container.entries.len()).map_err(|_| Error::invalid("too many entries"))?);

        let mut pending = Vec::with_capacity(container.entries.len());
        for entry in &container.entries {
            w.i32(entry.id);
            let name_at = w.reserve_u32();
            let offset_at = w.reserve_u32();
            let size_at = has_sizes.then(|| w.reserve_u32());
            pending.push((name_at, offset_at, size_at));
        }

        for (entry, (name_at, _, _)) in container.entries.iter().zip(&pending) {
            let offset = w.offset_u32()?;
            w.fill_u32(*name_at, offset);
            w.shift_jis_z(entry.name.as_deref().unwrap_or_default())?;
        }

        for (entry, (_, offset_at, size_at)) in container.entries.iter().zip(&pending) {
            if has_sizes {
                w.pad(DVD_DATA_ALIGNMENT);
            }
            let offset = w.offset_u32()?;
            w.fill_u32(*offset_at, offset);
            w.bytes(&entry.bytes);
            if let Some(at) = size_at {
                let size = u32::try_from(entry.bytes.len()).map_err(|_| Error::invalid("entry exceeds 4 GiB"))?;
                w.fill_u32(*at, size);
            }
        }

        let total = w.offset_u32()?;
        w.fill_u32(file_size, total);
        Ok(w.into_inner())
    }
}
