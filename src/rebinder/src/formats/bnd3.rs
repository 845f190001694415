//! BND3 binders (Demon's Souls to Dark Souls)
//!
//! ```text
//! 0x00  "BND3"  version [u8; 8]  format u8  big_endian u8  bit_big_endian u8  0
//! 0x10  file_count i32  file_headers_end i32 (or 0)  unk18 i32  0 i32
//! ```

use crate::binary::{to_usize, Reader, Writer};
use crate::compression::CompressionInfo;
use crate::container::{Container, Entry, Fields};
use crate::formats::binder::{self, FORMAT_BIG_ENDIAN};
use crate::formats::Format;
use crate::schema::{FieldKind, FieldSpec, HeaderSlot, Presence, Schema};
use crate::{Error, Result};

pub static SCHEMA: Schema = Schema {
    format: "BND3",
    root: "bnd3",
    header: &[
        HeaderSlot::SourceName("filename"),
        HeaderSlot::Compression("compression"),
        HeaderSlot::Field(FieldSpec::element("version", FieldKind::Text, Presence::Default("07D7R6"))),
        HeaderSlot::Field(FieldSpec::element(
            "format",
            FieldKind::Flags(binder::FORMAT_NAMES),
            Presence::Default("IDs, Names1, Names2, Compression"),
        )),
        HeaderSlot::Field(FieldSpec::element("bigendian", FieldKind::Bool, Presence::Default("false"))),
        HeaderSlot::Field(FieldSpec::element("bitbigendian", FieldKind::Bool, Presence::Default("false"))),
        HeaderSlot::Field(FieldSpec::element("unk18", FieldKind::I32, Presence::Default("0"))),
        HeaderSlot::Field(FieldSpec::element(
            "writefileheadersend",
            FieldKind::Bool,
            Presence::Default("true"),
        )),
    ],
    collection: "files",
    item: "file",
    entry: binder::ENTRY_SLOTS,
    derive_path_mode: Some(binder::derive_path_mode),
    nameless_fallback: false,
};

pub struct Bnd3;

struct Header {
    version: String,
    format: u8,
    big_endian: bool,
    bit_big_endian: bool,
    unk18: i32,
    write_file_headers_end: bool,
}

impl Header {
    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            version: fields.get_text("version")?.to_string(),
            format: fields.get_int("format")?,
            big_endian: fields.get_bool("bigendian")?,
            bit_big_endian: fields.get_bool("bitbigendian")?,
            unk18: fields.get_int("unk18")?,
            write_file_headers_end: fields.get_bool("writefileheadersend")?,
        })
    }

    fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.set("version", self.version);
        fields.set("format", self.format);
        fields.set("bigendian", self.big_endian);
        fields.set("bitbigendian", self.bit_big_endian);
        fields.set("unk18", self.unk18);
        fields.set("writefileheadersend", self.write_file_headers_end);
        fields
    }

    /// The format's own big-endian flag forces big-endian fields
    fn fields_big_endian(&self) -> bool {
        self.big_endian || self.format & FORMAT_BIG_ENDIAN != 0
    }
}

struct Pending {
    compressed_size: usize,
    data_offset: usize,
    name_offset: Option<usize>,
    uncompressed_size: Option<usize>,
}

fn size_i32(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::invalid("BND3 sizes are limited to 2 GiB"))
}

impl Format for Bnd3 {
    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"BND3")
    }

    fn read(&self, bytes: &[u8]) -> Result<Container> {
        let mut r = Reader::new(bytes);
        r.expect_magic(b"BND3")?;
        let version = r.fixed_str(8)?;
        let bit_big_endian = r.peek_u8_at(0x0E)? != 0;
        let format = binder::read_format(r.u8()?, bit_big_endian);
        let big_endian = r.bool()?;
        r.skip(2)?;

        let mut header = Header {
            version,
            format,
            big_endian,
            bit_big_endian,
            unk18: 0,
            write_file_headers_end: false,
        };
        r.set_big_endian(header.fields_big_endian());

        let file_count = to_usize(r.i32()?, "file count")?;
        header.write_file_headers_end = r.i32()? != 0;
        header.unk18 = r.i32()?;
        r.skip(4)?;

        let mut entries = Vec::with_capacity(file_count.min(bytes.len()));
        for _ in 0..file_count {
            let flags = binder::read_file_flags(r.u8()?, bit_big_endian);
            r.skip(3)?;
            let compressed_size = to_usize(r.i32()?, "compressed size")?;
            let data_offset = if binder::has_long_offsets(format) {
                to_usize(r.i64()?, "data offset")?
            } else {
                to_usize(r.u32()?, "data offset")?
            };
            let id = if binder::has_ids(format) { r.i32()? } else { -1 };
            let name = if binder::has_names(format) {
                let name_offset = to_usize(r.u32()?, "name offset")?;
                Some(r.shift_jis_at(name_offset)?)
            } else {
                None
            };
            if binder::has_compression(format) {
                let _uncompressed_size = r.i32()?;
            }

            let raw = r.slice_at(data_offset, compressed_size)?;
            let (data, compression) = binder::unpack_data(raw, flags)?;
            entries.push(Entry {
                id,
                name,
                flags,
                compression,
                extra: Fields::new(),
                bytes: data,
            });
        }

        tracing::debug!(files = entries.len(), format, "Read BND3");
        Ok(Container {
            source_name: String::new(),
            compression: CompressionInfo::None,
            path_mode: binder::path_mode(format),
            base_directory: None,
            header: header.into_fields(),
            entries,
        })
    }

    fn write(&self, container: &Container) -> Result<Vec<u8>> {
        let h = Header::from_fields(&container.header)?;
        let format = h.format;
        let mut w = Writer::new(h.fields_big_endian());

        w.bytes(b"BND3");
        w.fixed_str(&h.version, 8)?;
        w.u8(binder::write_format(format, h.bit_big_endian));
        w.bool(h.big_endian);
        w.bool(h.bit_big_endian);
        w.u8(0);
        w.i32(size_i32(container.entries.len())?);
        let headers_end = w.reserve_u32();
        w.i32(h.unk18);
        w.i32(0);

        let mut pending = Vec::with_capacity(container.entries.len());
        for entry in &container.entries {
            w.u8(binder::write_file_flags(entry.flags, h.bit_big_endian));
            w.zeros(3);
            let compressed_size = w.reserve_u32();
            let data_offset = if binder::has_long_offsets(format) {
                w.reserve_i64()
            } else {
                w.reserve_u32()
            };
            if binder::has_ids(format) {
                w.i32(entry.id);
            }
            let name_offset = binder::has_names(format).then(|| w.reserve_u32());
            let uncompressed_size = binder::has_compression(format).then(|| w.reserve_u32());
            pending.push(Pending {
                compressed_size,
                data_offset,
                name_offset,
                uncompressed_size,
            });
        }

        for (entry, slots) in container.entries.iter().zip(&pending) {
            if let Some(at) = slots.name_offset {
                let offset = w.offset_u32()?;
                w.fill_u32(at, offset);
                w.shift_jis_z(entry.name.as_deref().unwrap_or_default())?;
            }
        }

        if h.write_file_headers_end {
            let offset = w.offset_u32()?;
            w.fill_u32(headers_end, offset);
        }

        for (entry, slots) in container.entries.iter().zip(&pending) {
            let data = binder::pack_data(entry)?;
            w.pad(0x10);
            if binder::has_long_offsets(format) {
                let offset = w.offset_i64()?;
                w.fill_i64(slots.data_offset, offset);
            } else {
                let offset = w.offset_u32()?;
                w.fill_u32(slots.data_offset, offset);
            }
            w.bytes(&data);
            w.fill_i32(slots.compressed_size, size_i32(data.len())?);
            if let Some(at) = slots.uncompressed_size {
                w.fill_i32(at, size_i32(entry.bytes.len())?);
            }
        }

        Ok(w.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::binder::{FILE_COMPRESSED, FORMAT_COMPRESSION, FORMAT_IDS, FORMAT_NAMES1, FORMAT_NAMES2};

    const DEFAULT_FORMAT: u8 = FORMAT_IDS | FORMAT_NAMES1 | FORMAT_NAMES2 | FORMAT_COMPRESSION;

    fn sample(format: u8, big_endian: bool, bit_big_endian: bool) -> Container {
        Container {
            header: Header {
                version: "07D7R6".to_string(),
                format,
                big_endian,
                bit_big_endian,
                unk18: 0,
                write_file_headers_end: true,
            }
            .into_fields(),
            path_mode: binder::path_mode(format),
            entries: vec![
                Entry::new(0, Some(r"N:\FRPG\data\INTERROOT_win32\chr\c0000\c0000.flver"), vec![1; 40])
                    .with_flags(0x40),
                Entry::new(1, Some(r"N:\FRPG\data\INTERROOT_win32\chr\c0000\c0000.tpf"), vec![9; 500])
                    .with_flags(0x40 | FILE_COMPRESSED),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_round_trip() {
        for (format, big_endian, bit_big_endian) in [
            (DEFAULT_FORMAT, false, false),
            (DEFAULT_FORMAT, true, true),
            (DEFAULT_FORMAT | FORMAT_BIG_ENDIAN, false, false),
            (DEFAULT_FORMAT | binder::FORMAT_LONG_OFFSETS, false, false),
            (FORMAT_IDS | FORMAT_NAMES1, false, false),
        ] {
            let container = sample(format, big_endian, bit_big_endian);
            let bytes = Bnd3.write(&container).unwrap();
            assert!(Bnd3.sniff(&bytes));
            let read = Bnd3.read(&bytes).unwrap();
            assert_eq!(read, container, "format {format:#x}");
            assert_eq!(Bnd3.write(&read).unwrap(), bytes);
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = Bnd3.write(&sample(DEFAULT_FORMAT, false, false)).unwrap();
        assert_eq!(&bytes[0..4], b"BND3");
        assert_eq!(&bytes[4..10], b"07D7R6");
        assert_eq!(bytes[0x0C], 0x74);
        assert_eq!(&bytes[0x10..0x14], &2i32.to_le_bytes());
        assert_ne!(&bytes[0x14..0x18], &[0; 4]);
    }

    #[test]
    fn test_headers_end_can_be_zero() {
        let mut container = sample(DEFAULT_FORMAT, false, false);
        container.header.set("writefileheadersend", false);
        let bytes = Bnd3.write(&container).unwrap();
        assert_eq!(&bytes[0x14..0x18], &[0; 4]);
        assert_eq!(Bnd3.read(&bytes).unwrap(), container);
    }

    #[test]
    fn test_shift_jis_names() {
        let mut container = sample(DEFAULT_FORMAT, false, false);
        container.entries[0].name = Some(r"N:\FRPG\data\モデル\c0000.flver".to_string());
        let read = Bnd3.read(&Bnd3.write(&container).unwrap()).unwrap();
        assert_eq!(read.entries[0].name, container.entries[0].name);
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(Bnd3.read(b"BND4xxxxxxxxxxxxxxxx"), Err(Error::InvalidData(_))));
    }
}
