//! BND4 binders (Dark Souls 2 onward)
//!
//! Header layout:
//!
//! ```text
//! 0x00  "BND4"  unk04 u8  unk05 u8  0 0 0  big_endian u8  !bit_big_endian u8  0
//! 0x0C  file_count i32  0x40 i64  version [u8; 8]  file_header_size i64
//! 0x28  file_headers_end i64  unicode u8  format u8  extended u8  0  0 i32
//! 0x38  hash_table_offset i64
//! ```
//!
//! File headers, names, the optional hash table and then the data follow.

use crate::binary::{to_usize, Reader, Writer};
use crate::compression::CompressionInfo;
use crate::container::{Container, Entry, Fields};
use crate::formats::binder::{self, FORMAT_NAMES1};
use crate::formats::Format;
use crate::schema::{FieldKind, FieldSpec, HeaderSlot, Presence, Schema};
use crate::Result;

pub static SCHEMA: Schema = Schema {
    format: "BND4",
    root: "bnd4",
    header: &[
        HeaderSlot::SourceName("filename"),
        HeaderSlot::Compression("compression"),
        HeaderSlot::Field(FieldSpec::element("version", FieldKind::Text, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element(
            "format",
            FieldKind::Flags(binder::FORMAT_NAMES),
            Presence::Version,
        )),
        HeaderSlot::Field(FieldSpec::element("bigendian", FieldKind::Bool, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element("bitbigendian", FieldKind::Bool, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element("unicode", FieldKind::Bool, Presence::Default("true"))),
        HeaderSlot::Field(FieldSpec::element("extended", FieldKind::U8, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element("unk04", FieldKind::Bool, Presence::Default("false"))),
        HeaderSlot::Field(FieldSpec::element("unk05", FieldKind::Bool, Presence::Default("false"))),
    ],
    collection: "files",
    item: "file",
    entry: binder::ENTRY_SLOTS,
    derive_path_mode: Some(binder::derive_path_mode),
    nameless_fallback: false,
};

/// `extended` value that adds a name hash table
const EXTENDED_HASH_TABLE: u8 = 4;

pub struct Bnd4;

struct Header {
    version: String,
    format: u8,
    big_endian: bool,
    bit_big_endian: bool,
    unicode: bool,
    extended: u8,
    unk04: bool,
    unk05: bool,
}

impl Header {
    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            version: fields.get_text("version")?.to_string(),
            format: fields.get_int("format")?,
            big_endian: fields.get_bool("bigendian")?,
            bit_big_endian: fields.get_bool("bitbigendian")?,
            unicode: fields.get_bool("unicode")?,
            extended: fields.get_int("extended")?,
            unk04: fields.get_bool("unk04")?,
            unk05: fields.get_bool("unk05")?,
        })
    }

    fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.set("version", self.version);
        fields.set("format", self.format);
        fields.set("bigendian", self.big_endian);
        fields.set("bitbigendian", self.bit_big_endian);
        fields.set("unicode", self.unicode);
        fields.set("extended", self.extended);
        fields.set("unk04", self.unk04);
        fields.set("unk05", self.unk05);
        fields
    }

    fn file_header_size(&self) -> i64 {
        let format = self.format;
        let mut size = 0x10;
        if binder::has_compression(format) {
            size += 8;
        }
        size += if binder::has_long_offsets(format) { 8 } else { 4 };
        if binder::has_ids(format) {
            size += 4;
        }
        if binder::has_names(format) {
            size += 4;
        }
        if format == FORMAT_NAMES1 {
            size += 8;
        }
        size
    }
}

/// Slots in a file header that are filled once names and data are placed
struct Pending {
    compressed_size: usize,
    uncompressed_size: Option<usize>,
    data_offset: usize,
    name_offset: Option<usize>,
}

/// Name hash used by the extended hash table
pub fn path_hash(name: &str) -> u32 {
    let normalized = name.trim().replace('\\', "/").to_lowercase();
    let hashable = if normalized.starts_with('/') {
        normalized
    } else {
        format!("/{normalized}")
    };
    hashable
        .encode_utf16()
        .fold(0u32, |hash, unit| hash.wrapping_mul(37).wrapping_add(u32::from(unit)))
}

fn is_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    let n = u64::from(n);
    (2u64..).take_while(|i| i * i <= n).all(|i| n % i != 0)
}

fn write_hash_table(w: &mut Writer, entries: &[Entry]) -> Result<()> {
    let count = u32::try_from(entries.len()).map_err(|_| crate::Error::invalid("too many entries"))?;
    let mut group_count = (count / 7).max(1);
    while !is_prime(group_count) {
        group_count += 1;
    }

    let mut groups: Vec<Vec<(u32, i32)>> = vec![Vec::new(); group_count as usize];
    for (index, entry) in entries.iter().enumerate() {
        let hash = path_hash(entry.name.as_deref().unwrap_or_default());
        groups[(hash % group_count) as usize].push((hash, index as i32));
    }
    for group in &mut groups {
        group.sort_unstable();
    }

    let hashes_offset = w.reserve_i64();
    w.u32(group_count);
    w.bytes(&[0x10, 8, 8, 0]);

    let mut first = 0i32;
    for group in &groups {
        w.i32(group.len() as i32);
        w.i32(first);
        first += group.len() as i32;
    }

    let offset = w.offset_i64()?;
    w.fill_i64(hashes_offset, offset);
    for (hash, index) in groups.iter().flatten() {
        w.u32(*hash);
        w.i32(*index);
    }
    Ok(())
}

impl Format for Bnd4 {
    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"BND4")
    }

    fn read(&self, bytes: &[u8]) -> Result<Container> {
        let mut r = Reader::new(bytes);
        r.expect_magic(b"BND4")?;
        let unk04 = r.bool()?;
        let unk05 = r.bool()?;
        r.skip(3)?;
        let big_endian = r.bool()?;
        let bit_big_endian = !r.bool()?;
        r.skip(1)?;
        r.set_big_endian(big_endian);

        let file_count = to_usize(r.i32()?, "file count")?;
        r.expect_i64(0x40, "header size")?;
        let version = r.fixed_str(8)?;
        let _file_header_size = r.i64()?;
        let _file_headers_end = r.i64()?;
        let unicode = r.bool()?;
        let format = binder::read_format(r.u8()?, bit_big_endian);
        let extended = r.u8()?;
        r.skip(1 + 4)?;
        let _hash_table_offset = r.i64()?;

        let mut entries = Vec::with_capacity(file_count.min(bytes.len()));
        for _ in 0..file_count {
            let flags = binder::read_file_flags(r.u8()?, bit_big_endian);
            r.skip(3)?;
            r.expect_i32(-1, "file header marker")?;
            let compressed_size = to_usize(r.i64()?, "compressed size")?;
            if binder::has_compression(format) {
                let _uncompressed_size = r.i64()?;
            }
            let data_offset = if binder::has_long_offsets(format) {
                to_usize(r.i64()?, "data offset")?
            } else {
                to_usize(r.u32()?, "data offset")?
            };
            let mut id = if binder::has_ids(format) { r.i32()? } else { -1 };
            let name = if binder::has_names(format) {
                let offset = to_usize(r.u32()?, "name offset")?;
                Some(if unicode { r.utf16_at(offset)? } else { r.shift_jis_at(offset)? })
            } else {
                None
            };
            if format == FORMAT_NAMES1 {
                id = r.i32()?;
                r.skip(4)?;
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

        let header = Header {
            version,
            format,
            big_endian,
            bit_big_endian,
            unicode,
            extended,
            unk04,
            unk05,
        };
        tracing::debug!(files = entries.len(), format, extended, "Read BND4");
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
        let mut w = Writer::new(h.big_endian);

        w.bytes(b"BND4");
        w.bool(h.unk04);
        w.bool(h.unk05);
        w.zeros(3);
        w.bool(h.big_endian);
        w.bool(!h.bit_big_endian);
        w.u8(0);
        w.i32(i32::try_from(container.entries.len()).map_err(|_| crate::Error::invalid("too many entries"))?);
        w.i64(0x40);
        w.fixed_str(&h.version, 8)?;
        w.i64(h.file_header_size());
        let headers_end = w.reserve_i64();
        w.bool(h.unicode);
        w.u8(binder::write_format(format, h.bit_big_endian));
        w.u8(h.extended);
        w.u8(0);
        w.i32(0);
        let hash_table = w.reserve_i64();

        let mut pending = Vec::with_capacity(container.entries.len());
        for entry in &container.entries {
            w.u8(binder::write_file_flags(entry.flags, h.bit_big_endian));
            w.zeros(3);
            w.i32(-1);
            let compressed_size = w.reserve_i64();
            let uncompressed_size = binder::has_compression(format).then(|| w.reserve_i64());
            let data_offset = if binder::has_long_offsets(format) {
                w.reserve_i64()
            } else {
                w.reserve_u32()
            };
            if binder::has_ids(format) {
                w.i32(entry.id);
            }
            let name_offset = binder::has_names(format).then(|| w.reserve_u32());
            if format == FORMAT_NAMES1 {
                w.i32(entry.id);
                w.i32(0);
            }
            pending.push(Pending {
                compressed_size,
                uncompressed_size,
                data_offset,
                name_offset,
            });
        }

        for (entry, slots) in container.entries.iter().zip(&pending) {
            if let Some(at) = slots.name_offset {
                let offset = w.offset_u32()?;
                w.fill_u32(at, offset);
                let name = entry.name.as_deref().unwrap_or_default();
                if h.unicode {
                    w.utf16_z(name);
                } else {
                    w.shift_jis_z(name)?;
                }
            }
        }

        if h.extended == EXTENDED_HASH_TABLE {
            w.pad(8);
            let offset = w.offset_i64()?;
            w.fill_i64(hash_table, offset);
            write_hash_table(&mut w, &container.entries)?;
        }

        let offset = w.offset_i64()?;
        w.fill_i64(headers_end, offset);

        for (entry, slots) in container.entries.iter().zip(&pending) {
            let data = binder::pack_data(entry)?;
            if !entry.bytes.is_empty() {
                w.pad(0x10);
            }
            if binder::has_long_offsets(format) {
                let offset = w.offset_i64()?;
                w.fill_i64(slots.data_offset, offset);
            } else {
                let offset = w.offset_u32()?;
                w.fill_u32(slots.data_offset, offset);
            }
            w.bytes(&data);
            w.fill_i64(slots.compressed_size, data.len() as i64);
            if let Some(at) = slots.uncompressed_size {
                w.fill_i64(at, entry.bytes.len() as i64);
            }
        }

        Ok(w.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::binder::{FILE_COMPRESSED, FORMAT_COMPRESSION, FORMAT_IDS, FORMAT_NAMES2};
    use crate::path::PathMode;

    fn header(format: u8, extended: u8, unicode: bool, big_endian: bool) -> Fields {
        Header {
            version: "07D7R6".to_string(),
            format,
            big_endian,
            bit_big_endian: false,
            unicode,
            extended,
            unk04: false,
            unk05: true,
        }
        .into_fields()
    }

    fn sample(format: u8, extended: u8, unicode: bool, big_endian: bool) -> Container {
        Container {
            header: header(format, extended, unicode, big_endian),
            path_mode: binder::path_mode(format),
            entries: vec![
                Entry::new(10, Some(r"N:\FDP\data\INTERROOT_win64\chr\c0000.hkx"), b"havok".to_vec())
                    .with_flags(0x02),
                Entry::new(11, Some(r"N:\FDP\data\INTERROOT_win64\chr\c0000.tae"), vec![7; 300])
                    .with_flags(0x02 | FILE_COMPRESSED),
                Entry::new(12, Some("empty.bin"), Vec::new()).with_flags(0x02),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_round_trip_formats() {
        let named = FORMAT_IDS | FORMAT_NAMES1 | FORMAT_NAMES2 | FORMAT_COMPRESSION;
        for (format, extended, unicode, big_endian) in [
            (named, 4, true, false),
            (named, 0, false, false),
            (named | binder::FORMAT_LONG_OFFSETS, 4, true, true),
            (FORMAT_IDS | FORMAT_NAMES2, 0, true, false),
        ] {
            let container = sample(format, extended, unicode, big_endian);
            let bytes = Bnd4.write(&container).unwrap();
            assert!(Bnd4.sniff(&bytes));
            let read = Bnd4.read(&bytes).unwrap();
            assert_eq!(read, container, "format {format:#x}");
            assert_eq!(Bnd4.write(&read).unwrap(), bytes);
        }
    }

    #[test]
    fn test_names1_only_keeps_ids() {
        let container = sample(FORMAT_NAMES1, 0, true, false);
        let read = Bnd4.read(&Bnd4.write(&container).unwrap()).unwrap();
        assert_eq!(read.entries[1].id, 11);
    }

    #[test]
    fn test_id_only_container() {
        let mut container = sample(FORMAT_IDS, 0, true, false);
        for entry in &mut container.entries {
            entry.name = None;
        }
        container.path_mode = PathMode::ByOrdinalOrId;
        let read = Bnd4.read(&Bnd4.write(&container).unwrap()).unwrap();
        assert_eq!(read, container);
    }

    #[test]
    fn test_header_layout() {
        let container = sample(FORMAT_IDS | FORMAT_NAMES1 | FORMAT_NAMES2 | FORMAT_COMPRESSION, 4, true, false);
        let bytes = Bnd4.write(&container).unwrap();
        assert_eq!(&bytes[0..4], b"BND4");
        assert_eq!(bytes[5], 1);
        assert_eq!(&bytes[0x0C..0x10], &3i32.to_le_bytes());
        assert_eq!(&bytes[0x10..0x18], &0x40i64.to_le_bytes());
        assert_eq!(&bytes[0x18..0x1E], b"07D7R6");
        assert_eq!(&bytes[0x20..0x28], &0x24i64.to_le_bytes());
        assert_eq!(bytes[0x30], 1);
        assert_eq!(bytes[0x32], 4);
        assert_ne!(&bytes[0x38..0x40], &[0; 8]);
    }

    #[test]
    fn test_missing_header_field() {
        let mut container = sample(FORMAT_IDS, 0, true, false);
        container.header = Fields::new();
        assert!(matches!(
            Bnd4.write(&container),
            Err(crate::Error::FieldMissing { .. })
        ));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = Bnd4.write(&sample(FORMAT_IDS | FORMAT_NAMES2, 0, true, false)).unwrap();
        assert!(matches!(
            Bnd4.read(&bytes[..bytes.len() - 3]),
            Err(crate::Error::InvalidData(_))
        ));
        assert!(Bnd4.read(b"BND4").is_err());
    }

    #[test]
    fn test_path_hash() {
        assert_eq!(path_hash("a"), path_hash("/A"));
        assert_eq!(path_hash(r"chr\c0000.hkx"), path_hash("/chr/c0000.hkx"));
        // "/" then "a": 47 * 37 + 97
        assert_eq!(path_hash("a"), 47 * 37 + 97);
    }

    #[test]
    fn test_is_prime() {
        let primes: Vec<u32> = (0..20).filter(|n| is_prime(*n)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19]);
    }
}
