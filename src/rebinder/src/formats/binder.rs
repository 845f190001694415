//! Pieces shared by the BND3 and BND4 codecs

use crate::compression::CompressionInfo;
use crate::container::{Entry, Fields};
use crate::dcx;
use crate::path::PathMode;
use crate::schema::{EntrySlot, FieldKind, FieldSpec, Presence};
use crate::Result;

pub const FORMAT_BIG_ENDIAN: u8 = 0x01;
pub const FORMAT_IDS: u8 = 0x02;
pub const FORMAT_NAMES1: u8 = 0x04;
pub const FORMAT_NAMES2: u8 = 0x08;
pub const FORMAT_LONG_OFFSETS: u8 = 0x10;
pub const FORMAT_COMPRESSION: u8 = 0x20;
pub const FORMAT_FLAG7: u8 = 0x80;

pub const FORMAT_NAMES: &[(&str, u8)] = &[
    ("BigEndian", FORMAT_BIG_ENDIAN),
    ("IDs", FORMAT_IDS),
    ("Names1", FORMAT_NAMES1),
    ("Names2", FORMAT_NAMES2),
    ("LongOffsets", FORMAT_LONG_OFFSETS),
    ("Compression", FORMAT_COMPRESSION),
    ("Flag6", 0x40),
    ("Flag7", FORMAT_FLAG7),
];

pub const FILE_COMPRESSED: u8 = 0x01;

pub const FILE_FLAG_NAMES: &[(&str, u8)] = &[
    ("Compressed", FILE_COMPRESSED),
    ("Flag1", 0x02),
    ("Flag2", 0x04),
    ("Flag3", 0x08),
    ("Flag4", 0x10),
    ("Flag5", 0x20),
    ("Flag6", 0x40),
    ("Flag7", 0x80),
];

/// Entry layout shared by BND3 and BND4 manifests
pub const ENTRY_SLOTS: &[EntrySlot] = &[
    EntrySlot::Flags(FieldSpec::element(
        "flags",
        FieldKind::Flags(FILE_FLAG_NAMES),
        Presence::Implied("Flag1"),
    )),
    EntrySlot::Id(FieldSpec::element("id", FieldKind::I32, Presence::Elided("-1"))),
    EntrySlot::Root("root"),
    EntrySlot::Name("path"),
    EntrySlot::Suffix("suffix"),
    EntrySlot::Compression("compression_type"),
];

pub fn has_ids(format: u8) -> bool {
    format & FORMAT_IDS != 0
}

pub fn has_names(format: u8) -> bool {
    format & (FORMAT_NAMES1 | FORMAT_NAMES2) != 0
}

pub fn has_long_offsets(format: u8) -> bool {
    format & FORMAT_LONG_OFFSETS != 0
}

pub fn has_compression(format: u8) -> bool {
    format & FORMAT_COMPRESSION != 0
}

/// Named binders store full development paths, the rest are id-addressed
pub fn path_mode(format: u8) -> PathMode {
    if has_names(format) {
        PathMode::FullPath
    } else {
        PathMode::ByOrdinalOrId
    }
}

pub fn derive_path_mode(header: &Fields) -> Result<PathMode> {
    Ok(path_mode(header.get_int("format")?))
}

/// Format bytes are stored bit-reversed unless the header says otherwise,
/// or the raw byte only makes sense unreversed.
pub fn read_format(raw: u8, bit_big_endian: bool) -> u8 {
    let reverse = bit_big_endian || (raw & FORMAT_BIG_ENDIAN != 0 && raw & FORMAT_FLAG7 == 0);
    if reverse {
        raw
    } else {
        raw.reverse_bits()
    }
}

pub fn write_format(format: u8, bit_big_endian: bool) -> u8 {
    let reverse =
        bit_big_endian || (format & FORMAT_BIG_ENDIAN != 0 && format & FORMAT_FLAG7 == 0);
    if reverse {
        format
    } else {
        format.reverse_bits()
    }
}

pub fn read_file_flags(raw: u8, bit_big_endian: bool) -> u8 {
    if bit_big_endian {
        raw
    } else {
        raw.reverse_bits()
    }
}

pub fn write_file_flags(flags: u8, bit_big_endian: bool) -> u8 {
    read_file_flags(flags, bit_big_endian)
}

/// Decompress an entry payload if its flags say it is compressed.
///
/// Zlib is the default entry codec and is reported as `None`.
pub fn unpack_data(raw: &[u8], flags: u8) -> Result<(Vec<u8>, Option<CompressionInfo>)> {
    if flags & FILE_COMPRESSED == 0 {
        return Ok((raw.to_vec(), None));
    }
    let (bytes, info) = dcx::decompress(raw)?;
    Ok((bytes, (info != CompressionInfo::Zlib).then_some(info)))
}

pub fn pack_data(entry: &Entry) -> Result<Vec<u8>> {
    if entry.flags & FILE_COMPRESSED == 0 {
        return Ok(entry.bytes.clone());
    }
    dcx::compress(&entry.bytes, &entry.compression.unwrap_or(CompressionInfo::Zlib))
}
