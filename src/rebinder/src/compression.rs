//! Compression metadata codec
//!
//! A compression descriptor is stored as one element whose text is the type
//! tag and whose attributes carry any tuning parameters:
//!
//! ```xml
//! <compression unk04="65536" unk10="36" unk14="44" unk30="9" unk38="0">DCX_DFLT</compression>
//! ```
//!
//! Well-known DFLT parameter sets also have preset tags
//! (`DCX_DFLT_10000_24_9`, ...) which expand to the full parameters on read.

use crate::field::{self, FieldValue};
use crate::manifest::{Node, Placement};
use crate::{Error, Result};

/// Header parameters of a DCX_DFLT container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DfltParams {
    pub unk04: i32,
    pub unk10: i32,
    pub unk14: i32,
    /// Also the zlib level used when compressing
    pub unk30: u8,
    pub unk38: u8,
}

impl DfltParams {
    pub const fn new(unk04: i32, unk10: i32, unk14: i32, unk30: u8, unk38: u8) -> Self {
        Self {
            unk04,
            unk10,
            unk14,
            unk30,
            unk38,
        }
    }
}

/// Named DFLT parameter sets seen in shipped files
pub const DFLT_PRESETS: &[(&str, DfltParams)] = &[
    ("DCX_DFLT_10000_24_9", DfltParams::new(0x10000, 0x24, 0x2C, 9, 0)),
    ("DCX_DFLT_10000_44_9", DfltParams::new(0x10000, 0x44, 0x4C, 9, 0)),
    ("DCX_DFLT_11000_44_8", DfltParams::new(0x11000, 0x44, 0x4C, 8, 0)),
    ("DCX_DFLT_11000_44_9", DfltParams::new(0x11000, 0x44, 0x4C, 9, 0)),
    ("DCX_DFLT_11000_44_9_15", DfltParams::new(0x11000, 0x44, 0x4C, 9, 15)),
];

/// How a container or entry payload is compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionInfo {
    #[default]
    None,
    /// Recognized as compressed but of unknown type; kept for round trip only
    Unknown,
    /// Bare zlib stream
    Zlib,
    DcpEdge,
    DcpDflt,
    DcxEdge,
    DcxDflt(DfltParams),
    DcxKrak { level: u8 },
    DcxZstd,
}

const TAGS: &[&str] = &[
    "None", "Unknown", "Zlib", "DCP_EDGE", "DCP_DFLT", "DCX_EDGE", "DCX_DFLT", "DCX_KRAK", "DCX_ZSTD",
];

impl CompressionInfo {
    pub fn tag(&self) -> &'static str {
        match self {
            CompressionInfo::None => "None",
            CompressionInfo::Unknown => "Unknown",
            CompressionInfo::Zlib => "Zlib",
            CompressionInfo::DcpEdge => "DCP_EDGE",
            CompressionInfo::DcpDflt => "DCP_DFLT",
            CompressionInfo::DcxEdge => "DCX_EDGE",
            CompressionInfo::DcxDflt(_) => "DCX_DFLT",
            CompressionInfo::DcxKrak { .. } => "DCX_KRAK",
            CompressionInfo::DcxZstd => "DCX_ZSTD",
        }
    }

    /// Whether this descriptor wraps data in a DCX or DCP container
    pub fn is_dcx(&self) -> bool {
        !matches!(
            self,
            CompressionInfo::None | CompressionInfo::Unknown | CompressionInfo::Zlib
        )
    }

    /// Read the descriptor stored under `key`; `default` when the element is absent
    pub fn read(node: &Node, key: &str, default: CompressionInfo) -> Result<Self> {
        match node.child(key) {
            Some(element) if !element.text.trim().is_empty() => Self::from_element(element),
            _ => Ok(default),
        }
    }

    /// Like [`CompressionInfo::read`] but absent stays absent
    pub fn read_optional(node: &Node, key: &str) -> Result<Option<Self>> {
        match node.child(key) {
            Some(element) if !element.text.trim().is_empty() => Self::from_element(element).map(Some),
            _ => Ok(None),
        }
    }

    fn from_element(element: &Node) -> Result<Self> {
        let tag = element.text.trim();
        if let Some((_, params)) = DFLT_PRESETS.iter().find(|(name, _)| *name == tag) {
            return Ok(CompressionInfo::DcxDflt(*params));
        }

        let param = |key: &str| field::read_or(element, key, Placement::Attribute, 0);
        let info = match tag {
            "None" => CompressionInfo::None,
            "Unknown" => CompressionInfo::Unknown,
            "Zlib" => CompressionInfo::Zlib,
            "DCP_EDGE" => CompressionInfo::DcpEdge,
            "DCP_DFLT" => CompressionInfo::DcpDflt,
            "DCX_EDGE" => CompressionInfo::DcxEdge,
            "DCX_DFLT" => CompressionInfo::DcxDflt(DfltParams {
                unk04: param("unk04")?,
                unk10: param("unk10")?,
                unk14: param("unk14")?,
                unk30: field::read_or(element, "unk30", Placement::Attribute, 0u8)?,
                unk38: field::read_or(element, "unk38", Placement::Attribute, 0u8)?,
            }),
            "DCX_KRAK" => CompressionInfo::DcxKrak {
                level: field::read_or(element, "level", Placement::Attribute, 0u8)?,
            },
            "DCX_ZSTD" => CompressionInfo::DcxZstd,
            other => return Err(Error::UnsupportedCompressionType(other.to_string())),
        };
        Ok(info)
    }

    /// Append the descriptor as a child element named `key`
    pub fn write(&self, node: &mut Node, key: &str) {
        let element = node.push(Node::with_text(key, self.tag()));
        match self {
            CompressionInfo::DcxDflt(params) => {
                field::write(element, "unk04", Placement::Attribute, &params.unk04);
                field::write(element, "unk10", Placement::Attribute, &params.unk10);
                field::write(element, "unk14", Placement::Attribute, &params.unk14);
                field::write(element, "unk30", Placement::Attribute, &params.unk30);
                field::write(element, "unk38", Placement::Attribute, &params.unk38);
            }
            CompressionInfo::DcxKrak { level } => {
                element.set_attribute("level", level.format_field());
            }
            _ => {}
        }
    }

    /// Every tag accepted by [`CompressionInfo::read`], presets included
    pub fn known_tags() -> impl Iterator<Item = &'static str> {
        TAGS.iter()
            .copied()
            .chain(DFLT_PRESETS.iter().map(|(name, _)| *name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(info: CompressionInfo) -> CompressionInfo {
        let mut node = Node::new("bnd4");
        info.write(&mut node, "compression");
        let xml = node.to_xml().unwrap();
        let parsed = Node::parse(&xml).unwrap();
        CompressionInfo::read(&parsed, "compression", CompressionInfo::None).unwrap()
    }

    #[test]
    fn test_round_trip_all_variants() {
        for info in [
            CompressionInfo::None,
            CompressionInfo::Unknown,
            CompressionInfo::Zlib,
            CompressionInfo::DcpEdge,
            CompressionInfo::DcpDflt,
            CompressionInfo::DcxEdge,
            CompressionInfo::DcxDflt(DfltParams::new(0x11000, 0x44, 0x4C, 9, 15)),
            CompressionInfo::DcxKrak { level: 6 },
            CompressionInfo::DcxZstd,
        ] {
            assert_eq!(round_trip(info), info);
        }
    }

    #[test]
    fn test_preset_expands() {
        let mut node = Node::new("bnd3");
        node.push_text("compression", "DCX_DFLT_10000_24_9");
        let info = CompressionInfo::read(&node, "compression", CompressionInfo::None).unwrap();
        assert_eq!(
            info,
            CompressionInfo::DcxDflt(DfltParams::new(0x10000, 0x24, 0x2C, 9, 0))
        );
    }

    #[test]
    fn test_missing_params_default_to_zero() {
        let node = Node::parse(r#"<r><compression unk30="8">DCX_DFLT</compression></r>"#).unwrap();
        let info = CompressionInfo::read(&node, "compression", CompressionInfo::None).unwrap();
        assert_eq!(info, CompressionInfo::DcxDflt(DfltParams::new(0, 0, 0, 8, 0)));
    }

    #[test]
    fn test_krak_level_defaults_to_zero() {
        let node = Node::parse("<r><compression>DCX_KRAK</compression></r>").unwrap();
        let info = CompressionInfo::read(&node, "compression", CompressionInfo::None).unwrap();
        assert_eq!(info, CompressionInfo::DcxKrak { level: 0 });

        let mut out = Node::new("r");
        info.write(&mut out, "compression");
        let element = out.child("compression").unwrap();
        assert_eq!(element.text, "DCX_KRAK");
        assert_eq!(element.attribute("level"), Some("0"));
    }

    #[test]
    fn test_unknown_tag() {
        let node = Node::parse("<r><compression>DCX_FOO</compression></r>").unwrap();
        match CompressionInfo::read(&node, "compression", CompressionInfo::None) {
            Err(Error::UnsupportedCompressionType(tag)) => assert_eq!(tag, "DCX_FOO"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_absent_uses_default() {
        let node = Node::new("file");
        assert_eq!(
            CompressionInfo::read(&node, "compression_type", CompressionInfo::Zlib).unwrap(),
            CompressionInfo::Zlib
        );
        assert_eq!(CompressionInfo::read_optional(&node, "compression_type").unwrap(), None);
    }

    #[test]
    fn test_malformed_param() {
        let node = Node::parse(r#"<r><compression level="high">DCX_KRAK</compression></r>"#).unwrap();
        assert!(matches!(
            CompressionInfo::read(&node, "compression", CompressionInfo::None),
            Err(Error::FieldMalformed { .. })
        ));
    }

    #[test]
    fn test_known_tags_parse() {
        for tag in CompressionInfo::known_tags() {
            let mut node = Node::new("r");
            node.push_text("c", tag);
            assert!(CompressionInfo::read(&node, "c", CompressionInfo::None).is_ok(), "{tag}");
        }
    }
}
