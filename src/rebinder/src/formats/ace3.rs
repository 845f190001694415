//! Another Century's Episode 3 binders
//!
//! Big-endian and id-only, in two header variants:
//!
//! ```text
//! full  0x00  "BND\0"  0xF7FF i32  0xD3 i32  file_size i32  file_count i32  0 i32
//!       0x18  flag1 u8  flag2 u8  3 u8  0 u8  0 i32  0 i32
//!       0x24  entries: id i32  data_offset u32  size u32  0 i32
//! lite  0x00  "BND\0"  file_size i32  file_count i32  0 i32
//!       0x10  entries: id i32  data_offset u32  size u32
//! ```

use byteorder::{ByteOrder, BE};

use crate::binary::{to_usize, Reader, Writer};
use crate::compression::CompressionInfo;
use crate::container::{Container, Entry, Fields};
use crate::formats::Format;
use crate::path::PathMode;
use crate::schema::{EntrySlot, FieldKind, FieldSpec, HeaderSlot, Presence, Schema};
use crate::{Error, Result};

const FULL_MARKER: u32 = 0xF7FF;
const FULL_VERSION: u32 = 0xD3;
const DATA_ALIGNMENT: usize = 0x10;

pub static SCHEMA: Schema = Schema {
    format: "ACE3",
    root: "bnd_ace3",
    header: &[
        HeaderSlot::SourceName("binder_name"),
        HeaderSlot::Compression("compression"),
        HeaderSlot::Field(FieldSpec::element("lite", FieldKind::Bool, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element("flag1", FieldKind::U8, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element("flag2", FieldKind::U8, Presence::Required)),
    ],
    collection: "files",
    item: "file",
    entry: &[EntrySlot::Id(FieldSpec::element("id", FieldKind::I32, Presence::Required))],
    derive_path_mode: None,
    nameless_fallback: true,
};

pub struct Ace3;

fn be_u32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    bytes.get(offset..offset + 4).map(BE::read_u32)
}

/// Lite headers start with the file size and have a zero where full headers keep the size
fn is_lite(bytes: &[u8]) -> bool {
    be_u32_at(bytes, 4).and_then(|size| usize::try_from(size).ok()) == Some(bytes.len())
        && be_u32_at(bytes, 0x0C) == Some(0)
}

fn is_full(bytes: &[u8]) -> bool {
    be_u32_at(bytes, 4) == Some(FULL_MARKER) && be_u32_at(bytes, 8) == Some(FULL_VERSION)
}

impl Format for Ace3 {
    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"BND\0") && (is_full(bytes) || is_lite(bytes))
    }

    fn read(&self, bytes: &[u8]) -> Result<Container> {
        let lite = !is_full(bytes);
        let mut r = Reader::new(bytes);
        r.set_big_endian(true);
        r.expect_magic(b"BND\0")?;

        let (mut flag1, mut flag2) = (0, 0);
        let file_count = if lite {
            let _file_size = r.u32()?;
            let count = to_usize(r.i32()?, "file count")?;
            r.expect_i32(0, "ACE3 reserved field")?;
            count
        } else {
            r.skip(8)?;
            let _file_size = r.u32()?;
            let count = to_usize(r.i32()?, "file count")?;
            r.expect_i32(0, "ACE3 reserved field")?;
            flag1 = r.u8()?;
            flag2 = r.u8()?;
            if r.u8()? != 3 || r.u8()? != 0 {
                return Err(Error::invalid("unexpected ACE3 header marker"));
            }
            r.expect_i64(0, "ACE3 reserved field")?;
            count
        };

        let mut entries = Vec::with_capacity(file_count.min(bytes.len()));
        for _ in 0..file_count {
            let id = r.i32()?;
            let offset = to_usize(r.u32()?, "data offset")?;
            let size = to_usize(r.u32()?, "data size")?;
            if !lite {
                r.expect_i32(0, "ACE3 entry padding")?;
            }
            entries.push(Entry::new(id, None, r.slice_at(offset, size)?.to_vec()));
        }

        let mut header = Fields::new();
        header.set("lite", lite);
        header.set("flag1", flag1);
        header.set("flag2", flag2);

        tracing::debug!(files = entries.len(), lite, "Read ACE3");
        Ok(Container {
            source_name: String::new(),
            compression: CompressionInfo::None,
            path_mode: PathMode::ByOrdinalOrId,
            base_directory: None,
            header,
            entries,
        })
    }

    fn write(&self, container: &Container) -> Result<Vec<u8>> {
        let lite = container.header.get_bool("lite")?;
        let flag1: u8 = container.header.get_int("flag1")?;
        let flag2: u8 = container.header.get_int("flag2")?;
        let count = i32::try_from(container.entries.len()).map_err(|_| Error::invalid("too many entries"))?;

        let mut w = Writer::new(true);
        w.bytes(b"BND\0");
        let file_size = if lite {
            let at = w.reserve_u32();
            w.i32(count);
            w.i32(0);
            at
        } else {
            w.u32(FULL_MARKER);
            w.u32(FULL_VERSION);
            let at = w.reserve_u32();
            w.i32(count);
            w.i32(0);
            w.u8(flag1);
            w.u8(flag2);
            w.u8(3);
            w.u8(0);
            w.i64(0);
            at
        };

        let mut pending = Vec::with_capacity(container.entries.len());
        for entry in &container.entries {
            w.i32(entry.id);
            pending.push((w.reserve_u32(), w.reserve_u32()));
            if !lite {
                w.i32(0);
            }
        }

        for (entry, (offset_at, size_at)) in container.entries.iter().zip(pending) {
            w.pad(DATA_ALIGNMENT);
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
