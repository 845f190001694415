//! TPF texture packs
//!
//! ```text
//! 0x00  "TPF\0"  data_size u32  texture_count i32
//! 0x0C  platform u8  flag2 u8  encoding u8  0 u8
//! 0x10  textures: data_offset u32  size i32  format u8  type u8  mipmaps u8  flags1 u8
//!       [console: width i16  height i16  platform fields]
//!       name_offset u32  has_floats i32  [PS4/Xbone: dxgi_format i32]
//!       [floats: unk00 i32  byte_length i32  f32 values]
//! ```
//!
//! Xbox 360 and PS3 packs are big-endian. Names are UTF-16 when `encoding`
//! is 1 and Shift-JIS otherwise, and are stored without the `.dds`
//! extension the loose files carry. Texture data is kept as stored: console
//! data has no DDS header and `flags1` 2 or 3 marks DCX-compressed data.

use byteorder::{ByteOrder, LE};

use crate::binary::{to_usize, Reader, Writer};
use crate::compression::CompressionInfo;
use crate::container::{Container, Entry, Fields, Value};
use crate::field::FieldValue;
use crate::formats::Format;
use crate::named_enum;
use crate::path::PathMode;
use crate::schema::{EntrySlot, FieldKind, FieldSpec, HeaderSlot, Presence, Schema};
use crate::{Error, Result};

const DATA_ALIGNMENT: usize = 0x10;
const ENCODING_UTF16: u8 = 1;
const TEXTURE_EXTENSION: &str = ".dds";

const DDS_HEADER_SIZE: usize = 0x80;
const DDSCAPS2_CUBEMAP: u32 = 0x200;
const DDSCAPS2_VOLUME: u32 = 0x20_0000;

const TYPE_TEXTURE: u8 = 0;
const TYPE_CUBEMAP: u8 = 1;
const TYPE_VOLUME: u8 = 2;

pub static SCHEMA: Schema = Schema {
    format: "TPF",
    root: "tpf",
    header: &[
        HeaderSlot::SourceName("filename"),
        HeaderSlot::Compression("compression"),
        HeaderSlot::Field(FieldSpec::element("platform", FieldKind::Text, Presence::Version)),
        HeaderSlot::Field(FieldSpec::element("encoding", FieldKind::U8, Presence::Required)),
        HeaderSlot::Field(FieldSpec::element("flag2", FieldKind::U8, Presence::Required)),
    ],
    collection: "textures",
    item: "texture",
    entry: &[
        EntrySlot::Name("name"),
        EntrySlot::Suffix("suffix"),
        EntrySlot::Field(FieldSpec::element("format", FieldKind::U8, Presence::Required)),
        EntrySlot::Field(FieldSpec::element("flags1", FieldKind::U8, Presence::Required)),
        EntrySlot::Field(FieldSpec::element("texture_type", FieldKind::U8, Presence::Optional)),
        EntrySlot::Field(FieldSpec::element("mipmaps", FieldKind::U8, Presence::Optional)),
        EntrySlot::Field(FieldSpec::element("width", FieldKind::I16, Presence::Optional)),
        EntrySlot::Field(FieldSpec::element("height", FieldKind::I16, Presence::Optional)),
        EntrySlot::Field(FieldSpec::element("unk1", FieldKind::I32, Presence::Optional)),
        EntrySlot::Field(FieldSpec::element("unk2", FieldKind::I32, Presence::Optional)),
        EntrySlot::Field(FieldSpec::element("texture_count", FieldKind::I32, Presence::Optional)),
        EntrySlot::Field(FieldSpec::element("dxgi_format", FieldKind::I32, Presence::Optional)),
        EntrySlot::Field(FieldSpec::element("float_unk00", FieldKind::I32, Presence::Optional)),
        EntrySlot::Field(FieldSpec::element("float_values", FieldKind::Text, Presence::Optional)),
    ],
    derive_path_mode: Some(name_relative),
    nameless_fallback: false,
};

fn name_relative(_header: &Fields) -> Result<PathMode> {
    Ok(PathMode::NameRelative)
}

/// Console or PC target of a texture pack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Pc,
    Xbox360,
    Ps3,
    Ps4,
    Xbone,
}

named_enum!(Platform, "a TPF platform", {
    Platform::Pc => "PC",
    Platform::Xbox360 => "Xbox360",
    Platform::Ps3 => "PS3",
    Platform::Ps4 => "PS4",
    Platform::Xbone => "Xbone",
});

impl Platform {
    pub fn code(self) -> u8 {
        match self {
            Platform::Pc => 0,
            Platform::Xbox360 => 1,
            Platform::Ps3 => 2,
            Platform::Ps4 => 4,
            Platform::Xbone => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Platform::Pc),
            1 => Some(Platform::Xbox360),
            2 => Some(Platform::Ps3),
            4 => Some(Platform::Ps4),
            5 => Some(Platform::Xbone),
            _ => None,
        }
    }

    fn big_endian(self) -> bool {
        matches!(self, Platform::Xbox360 | Platform::Ps3)
    }

    fn is_current_gen(self) -> bool {
        matches!(self, Platform::Ps4 | Platform::Xbone)
    }
}

pub struct Tpf;

struct Header {
    platform: Platform,
    encoding: u8,
    flag2: u8,
}

impl Header {
    fn from_fields(fields: &Fields) -> Result<Self> {
        let text = fields.get_text("platform")?;
        let platform =
            Platform::parse_field(text).ok_or_else(|| Error::malformed("platform", Platform::EXPECTED, text))?;
        Ok(Self {
            platform,
            encoding: fields.get_int("encoding")?,
            flag2: fields.get_int("flag2")?,
        })
    }

    fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.set("platform", self.platform.format_field());
        fields.set("encoding", self.encoding);
        fields.set("flag2", self.flag2);
        fields
    }
}

fn optional_int<T: TryFrom<i128>>(fields: &Fields, key: &str) -> Result<Option<T>> {
    match fields.get(key) {
        Some(_) => fields.get_int(key).map(Some),
        None => Ok(None),
    }
}

/// Texture type and mipmap count from a DDS header
fn dds_layout(bytes: &[u8]) -> Option<(u8, u8)> {
    if !bytes.starts_with(b"DDS ") || bytes.len() < DDS_HEADER_SIZE {
        return None;
    }
    let mipmaps = u8::try_from(LE::read_u32(&bytes[0x1C..0x20])).ok()?;
    let caps2 = LE::read_u32(&bytes[0x70..0x74]);
    let kind = if caps2 & DDSCAPS2_CUBEMAP != 0 {
        TYPE_CUBEMAP
    } else if caps2 & DDSCAPS2_VOLUME != 0 {
        TYPE_VOLUME
    } else {
        TYPE_TEXTURE
    };
    Some((kind, mipmaps))
}

/// Stored type and mipmaps, falling back to the DDS header on PC
fn texture_layout(entry: &Entry, platform: Platform) -> Result<(u8, u8)> {
    let kind = optional_int(&entry.extra, "texture_type")?;
    let mipmaps = optional_int(&entry.extra, "mipmaps")?;
    if let (Some(kind), Some(mipmaps)) = (kind, mipmaps) {
        return Ok((kind, mipmaps));
    }
    let derived = if platform == Platform::Pc {
        dds_layout(&entry.bytes)
    } else {
        None
    };
    match derived {
        Some((derived_kind, derived_mipmaps)) => {
            Ok((kind.unwrap_or(derived_kind), mipmaps.unwrap_or(derived_mipmaps)))
        }
        None if kind.is_none() => Err(Error::missing("texture_type")),
        None => Err(Error::missing("mipmaps")),
    }
}

fn format_floats(values: &[f32]) -> String {
    values.iter().map(FieldValue::format_field).collect::<Vec<_>>().join(" ")
}

fn parse_floats(text: &str) -> Result<Vec<f32>> {
    text.split_whitespace()
        .map(|part| f32::parse_field(part).ok_or_else(|| Error::malformed("float_values", f32::EXPECTED, part)))
        .collect()
}

/// File name without the loose-file extension
fn stored_name(name: &str) -> &str {
    let cut = name.len().saturating_sub(TEXTURE_EXTENSION.len());
    match (name.get(..cut), name.get(cut..)) {
        (Some(stem), Some(ext)) if ext.eq_ignore_ascii_case(TEXTURE_EXTENSION) => stem,
        _ => name,
    }
}

fn size_i32(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::invalid("TPF sizes are limited to 2 GiB"))
}

impl Format for Tpf {
    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"TPF\0")
    }

    fn read(&self, bytes: &[u8]) -> Result<Container> {
        let mut r = Reader::new(bytes);
        r.expect_magic(b"TPF\0")?;
        let code = r.peek_u8_at(0x0C)?;
        let platform =
            Platform::from_code(code).ok_or_else(|| Error::invalid(format!("unknown TPF platform {code}")))?;
        r.set_big_endian(platform.big_endian());

        let _data_size = r.u32()?;
        let count = to_usize(r.i32()?, "texture count")?;
        r.skip(1)?;
        let flag2 = r.u8()?;
        let encoding = r.u8()?;
        if r.u8()? != 0 {
            return Err(Error::invalid("unexpected TPF header byte at 0x0F"));
        }

        let mut entries = Vec::with_capacity(count.min(bytes.len()));
        for _ in 0..count {
            let offset = to_usize(r.u32()?, "data offset")?;
            let size = to_usize(r.i32()?, "data size")?;
            let mut extra = Fields::new();
            extra.set("format", r.u8()?);
            extra.set("texture_type", r.u8()?);
            extra.set("mipmaps", r.u8()?);
            extra.set("flags1", r.u8()?);

            if platform != Platform::Pc {
                extra.set("width", r.i16()?);
                extra.set("height", r.i16()?);
                match platform {
                    Platform::Xbox360 => r.expect_i32(0, "Xbox 360 texture field")?,
                    Platform::Ps3 => {
                        extra.set("unk1", r.i32()?);
                        if flag2 != 0 {
                            extra.set("unk2", r.i32()?);
                        }
                    }
                    _ => {
                        extra.set("texture_count", r.i32()?);
                        extra.set("unk2", r.i32()?);
                    }
                }
            }

            let name_offset = to_usize(r.u32()?, "name offset")?;
            let has_floats = match r.i32()? {
                0 => false,
                1 => true,
                other => return Err(Error::invalid(format!("TPF float flag must be 0 or 1, found {other}"))),
            };
            if platform.is_current_gen() {
                extra.set("dxgi_format", r.i32()?);
            }
            if has_floats {
                extra.set("float_unk00", r.i32()?);
                let length = to_usize(r.i32()?, "float struct length")?;
                let values = (0..length / 4).map(|_| r.f32()).collect::<Result<Vec<_>>>()?;
                extra.set("float_values", format_floats(&values));
            }

            let name = if encoding == ENCODING_UTF16 {
                r.utf16_at(name_offset)?
            } else {
                r.shift_jis_at(name_offset)?
            };
            let name = format!("{name}{TEXTURE_EXTENSION}");
            let mut entry = Entry::new(-1, Some(&name), r.slice_at(offset, size)?.to_vec());
            entry.extra = extra;
            entries.push(entry);
        }

        tracing::debug!(textures = entries.len(), ?platform, "Read TPF");
        Ok(Container {
            source_name: String::new(),
            compression: CompressionInfo::None,
            path_mode: PathMode::NameRelative,
            base_directory: None,
            header: Header {
                platform,
                encoding,
                flag2,
            }
            .into_fields(),
            entries,
        })
    }

    fn write(&self, container: &Container) -> Result<Vec<u8>> {
        let h = Header::from_fields(&container.header)?;
        let mut w = Writer::new(h.platform.big_endian());

        w.bytes(b"TPF\0");
        let data_size = w.reserve_u32();
        w.i32(size_i32(container.entries.len())?);
        w.u8(h.platform.code());
        w.u8(h.flag2);
        w.u8(h.encoding);
        w.u8(0);

        let mut pending = Vec::with_capacity(container.entries.len());
        for entry in &container.entries {
            let extra = &entry.extra;
            let (kind, mipmaps) = texture_layout(entry, h.platform)?;
            let offset_at = w.reserve_u32();
            let size_at = w.reserve_u32();
            w.u8(extra.get_int("format")?);
            w.u8(kind);
            w.u8(mipmaps);
            w.u8(extra.get_int("flags1")?);

            if h.platform != Platform::Pc {
                w.i16(extra.get_int("width")?);
                w.i16(extra.get_int("height")?);
                match h.platform {
                    Platform::Xbox360 => w.i32(0),
                    Platform::Ps3 => {
                        w.i32(extra.get_int("unk1")?);
                        if h.flag2 != 0 {
                            w.i32(extra.get_int("unk2")?);
                        }
                    }
                    _ => {
                        w.i32(extra.get_int("texture_count")?);
                        w.i32(extra.get_int("unk2")?);
                    }
                }
            }

            let name_at = w.reserve_u32();
            let floats = match extra.get("float_unk00") {
                Some(_) => {
                    let values = match extra.get("float_values") {
                        Some(Value::Text(text)) => parse_floats(text)?,
                        Some(other) => return Err(Error::malformed("float_values", "text", &format!("{other:?}"))),
                        None => Vec::new(),
                    };
                    Some((extra.get_int::<i32>("float_unk00")?, values))
                }
                None => None,
            };
            w.i32(i32::from(floats.is_some()));
            if h.platform.is_current_gen() {
                w.i32(extra.get_int("dxgi_format")?);
            }
            if let Some((unk00, values)) = floats {
                w.i32(unk00);
                w.i32(size_i32(values.len() * 4)?);
                for value in values {
                    w.f32(value);
                }
            }
            pending.push((offset_at, size_at, name_at));
        }

        for (entry, (_, _, name_at)) in container.entries.iter().zip(&pending) {
            let offset = w.offset_u32()?;
            w.fill_u32(*name_at, offset);
            let name = stored_name(entry.name.as_deref().unwrap_or_default());
            if h.encoding == ENCODING_UTF16 {
                w.utf16_z(name);
            } else {
                w.shift_jis_z(name)?;
            }
        }

        let data_start = w.position();
        for (entry, (offset_at, size_at, _)) in container.entries.iter().zip(&pending) {
            if !entry.bytes.is_empty() {
                w.pad(DATA_ALIGNMENT);
            }
            let offset = w.offset_u32()?;
            w.fill_u32(*offset_at, offset);
            w.fill_i32(*size_at, size_i32(entry.bytes.len())?);
            w.bytes(&entry.bytes);
        }

        let length = u32::try_from(w.position() - data_start).map_err(|_| Error::invalid("output exceeds 4 GiB"))?;
        w.fill_u32(data_size, length);
        Ok(w.into_inner())
    }
}
