//! Declarative manifest schemas
//!
//! A [`Schema`] lists, in manifest order, which header and entry fields a
//! format stores and how each one behaves when absent. The engine walks the
//! schema in both directions, so a format handler never touches XML itself.

use crate::compression::CompressionInfo;
use crate::container::{Fields, Value};
use crate::field::{self, FieldValue, HexBytes};
use crate::manifest::{Node, Placement};
use crate::path::PathMode;
use crate::{Error, Result, MANIFEST_PREFIX};

/// Storage type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Text,
    Hex,
    /// Bit set written as comma-separated names
    Flags(&'static [(&'static str, u8)]),
}

impl FieldKind {
    pub fn expected(self) -> &'static str {
        match self {
            FieldKind::Bool => bool::EXPECTED,
            FieldKind::I8 => i8::EXPECTED,
            FieldKind::U8 => u8::EXPECTED,
            FieldKind::I16 => i16::EXPECTED,
            FieldKind::U16 => u16::EXPECTED,
            FieldKind::I32 => i32::EXPECTED,
            FieldKind::U32 => u32::EXPECTED,
            FieldKind::I64 => i64::EXPECTED,
            FieldKind::U64 => u64::EXPECTED,
            FieldKind::F32 => f32::EXPECTED,
            FieldKind::F64 => f64::EXPECTED,
            FieldKind::Text => String::EXPECTED,
            FieldKind::Hex => HexBytes::EXPECTED,
            FieldKind::Flags(_) => "flag names",
        }
    }

    pub fn parse(self, text: &str) -> Option<Value> {
        fn int<T: FieldValue + Into<i64>>(text: &str) -> Option<Value> {
            T::parse_field(text).map(|v| Value::Int(v.into()))
        }
        fn uint<T: FieldValue + Into<u64>>(text: &str) -> Option<Value> {
            T::parse_field(text).map(|v| Value::UInt(v.into()))
        }

        match self {
            FieldKind::Bool => bool::parse_field(text).map(Value::Bool),
            FieldKind::I8 => int::<i8>(text),
            FieldKind::U8 => uint::<u8>(text),
            FieldKind::I16 => int::<i16>(text),
            FieldKind::U16 => uint::<u16>(text),
            FieldKind::I32 => int::<i32>(text),
            FieldKind::U32 => uint::<u32>(text),
            FieldKind::I64 => int::<i64>(text),
            FieldKind::U64 => uint::<u64>(text),
            FieldKind::F32 => f32::parse_field(text).map(|v| Value::Float(v.into())),
            FieldKind::F64 => f64::parse_field(text).map(Value::Float),
            FieldKind::Text => Some(Value::Text(text.to_string())),
            FieldKind::Hex => HexBytes::parse_field(text).map(|h| Value::Bytes(h.0)),
            FieldKind::Flags(names) => field::parse_flags(text, names).map(|b| Value::UInt(b.into())),
        }
    }

    /// Canonical text for a value, or `None` if the value has the wrong type
    pub fn format(self, value: &Value) -> Option<String> {
        match (self, value) {
            (FieldKind::Bool, Value::Bool(v)) => Some(v.format_field()),
            // Narrowing back to f32 is exact because the value came from an f32
            (FieldKind::F32, Value::Float(v)) => Some((*v as f32).format_field()),
            (FieldKind::F64, Value::Float(v)) => Some(v.format_field()),
            (FieldKind::Text, Value::Text(v)) => Some(v.clone()),
            (FieldKind::Hex, Value::Bytes(v)) => Some(HexBytes(v.clone()).format_field()),
            (FieldKind::Flags(names), Value::UInt(v)) => {
                u8::try_from(*v).ok().map(|b| field::format_flags(b, names))
            }
            (kind, Value::Int(_) | Value::UInt(_)) if kind.is_integer() => {
                let text = match value {
                    Value::Int(v) => v.to_string(),
                    Value::UInt(v) => v.to_string(),
                    _ => return None,
                };
                // Reject values outside the declared width
                kind.parse(&text).map(|_| text)
            }
            _ => None,
        }
    }

    fn is_integer(self) -> bool {
        matches!(
            self,
            FieldKind::I8
                | FieldKind::U8
                | FieldKind::I16
                | FieldKind::U16
                | FieldKind::I32
                | FieldKind::U32
                | FieldKind::I64
                | FieldKind::U64
        )
    }
}

/// Behavior when a field is absent or blank in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Absence is [`Error::FieldMissing`]
    Required,
    /// A version or format discriminator; absence is [`Error::AmbiguousVersion`]
    Version,
    /// Absence logs a warning and uses the default; always written
    Default(&'static str),
    /// Absence silently uses the default; always written
    Implied(&'static str),
    /// Absence silently uses the default; omitted on write when equal to it
    Elided(&'static str),
    /// Absence leaves the field unset
    Optional,
}

/// One typed manifest field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: FieldKind,
    pub presence: Presence,
    pub placement: Placement,
}

impl FieldSpec {
    pub const fn element(key: &'static str, kind: FieldKind, presence: Presence) -> Self {
        Self {
            key,
            kind,
            presence,
            placement: Placement::Element,
        }
    }

    pub const fn attribute(key: &'static str, kind: FieldKind, presence: Presence) -> Self {
        Self {
            key,
            kind,
            presence,
            placement: Placement::Attribute,
        }
    }

    fn parse_default(&self, text: &str) -> Result<Value> {
        self.kind
            .parse(text)
            .ok_or_else(|| Error::malformed(self.key, self.kind.expected(), text))
    }

    /// Read the field from `node`, applying its presence policy
    pub fn read(&self, node: &Node) -> Result<Option<Value>> {
        if let Some(text) = field::text(node, self.key, self.placement) {
            return self
                .kind
                .parse(text)
                .map(Some)
                .ok_or_else(|| Error::malformed(self.key, self.kind.expected(), text));
        }

        match self.presence {
            Presence::Required => Err(Error::missing(self.key)),
            Presence::Version => Err(Error::AmbiguousVersion(self.key.to_string())),
            Presence::Default(default) => {
                tracing::warn!(field = self.key, default, "Field missing from manifest, using default");
                self.parse_default(default).map(Some)
            }
            Presence::Implied(default) | Presence::Elided(default) => {
                self.parse_default(default).map(Some)
            }
            Presence::Optional => Ok(None),
        }
    }

    /// Write the field to `node`; unset optional fields are skipped
    pub fn write(&self, node: &mut Node, value: Option<&Value>) -> Result<()> {
        let Some(value) = value else {
            return match self.presence {
                Presence::Required | Presence::Version => Err(Error::missing(self.key)),
                _ => Ok(()),
            };
        };

        let text = self.kind.format(value).ok_or_else(|| {
            Error::malformed(self.key, self.kind.expected(), &format!("{value:?}"))
        })?;

        if let Presence::Elided(default) = self.presence {
            if self.kind.parse(default).as_ref() == Some(value) {
                return Ok(());
            }
        }

        node.set_value(self.key, self.placement, text);
        Ok(())
    }
}

/// Container-level manifest slots
#[derive(Debug, Clone, Copy)]
pub enum HeaderSlot {
    /// File name of the rebuilt archive
    SourceName(&'static str),
    /// Outer DCX wrapping, `None` when absent
    Compression(&'static str),
    PathMode(&'static str),
    /// Only written and read in [`PathMode::BaseDirectoryRelative`]
    BaseDirectory(&'static str),
    Field(FieldSpec),
}

/// Per-entry manifest slots
#[derive(Debug, Clone, Copy)]
pub enum EntrySlot {
    /// Must be an integer field; unset reads as -1
    Id(FieldSpec),
    /// Must be an 8-bit field
    Flags(FieldSpec),
    /// Folded legacy root, written only in [`PathMode::FullPath`]
    Root(&'static str),
    Name(&'static str),
    /// Disambiguation suffix, written only when non-empty
    Suffix(&'static str),
    /// Per-entry codec, written only when it differs from the format default
    Compression(&'static str),
    Field(FieldSpec),
}

pub type PathModeFn = fn(&Fields) -> Result<PathMode>;

/// Manifest layout of one container format
#[derive(Debug)]
pub struct Schema {
    /// Display name, e.g. `BND4`
    pub format: &'static str,
    /// Root element name and manifest file tag, e.g. `bnd4`
    pub root: &'static str,
    pub header: &'static [HeaderSlot],
    pub collection: &'static str,
    pub item: &'static str,
    pub entry: &'static [EntrySlot],
    /// Derives the path mode from header fields when the manifest has no path mode slot
    pub derive_path_mode: Option<PathModeFn>,
    /// Use id naming for nameless entries in name-based modes
    pub nameless_fallback: bool,
}

impl Schema {
    /// Manifest file name inside an unpack directory
    pub fn manifest_name(&self) -> String {
        format!("{MANIFEST_PREFIX}{}.xml", self.root)
    }

    /// Whether entries keep their folded legacy root in a separate slot
    pub fn stores_root(&self) -> bool {
        self.entry.iter().any(|slot| matches!(slot, EntrySlot::Root(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAGS: &[(&str, u8)] = &[("Compressed", 0x01), ("Flag1", 0x02)];

    #[test]
    fn test_presence_policies() {
        let node = Node::new("file");
        let required = FieldSpec::element("id", FieldKind::I32, Presence::Required);
        let version = FieldSpec::element("format", FieldKind::U8, Presence::Version);
        let default = FieldSpec::element("flags", FieldKind::Flags(FLAGS), Presence::Default("Flag1"));
        let optional = FieldSpec::element("unk", FieldKind::U8, Presence::Optional);

        assert!(matches!(required.read(&node), Err(Error::FieldMissing { .. })));
        assert!(matches!(version.read(&node), Err(Error::AmbiguousVersion(k)) if k == "format"));
        assert_eq!(default.read(&node).unwrap(), Some(Value::UInt(0x02)));
        assert_eq!(optional.read(&node).unwrap(), None);
    }

    #[test]
    fn test_elided_default_omitted() {
        let spec = FieldSpec::element("id", FieldKind::I32, Presence::Elided("-1"));
        let mut node = Node::new("file");
        spec.write(&mut node, Some(&Value::Int(-1))).unwrap();
        assert!(node.children.is_empty());
        assert_eq!(spec.read(&node).unwrap(), Some(Value::Int(-1)));

        spec.write(&mut node, Some(&Value::Int(5))).unwrap();
        assert_eq!(node.value("id", Placement::Element), Some("5"));
        assert_eq!(spec.read(&node).unwrap(), Some(Value::Int(5)));
    }

    #[test]
    fn test_write_rejects_out_of_range() {
        let spec = FieldSpec::attribute("unk", FieldKind::U8, Presence::Required);
        let mut node = Node::new("bnd2");
        assert!(matches!(
            spec.write(&mut node, Some(&Value::Int(300))),
            Err(Error::FieldMalformed { .. })
        ));
        assert!(matches!(spec.write(&mut node, None), Err(Error::FieldMissing { .. })));
        assert!(matches!(
            spec.write(&mut node, Some(&Value::Text("x".into()))),
            Err(Error::FieldMalformed { .. })
        ));
    }

    #[test]
    fn test_kinds_round_trip() {
        let cases = [
            (FieldKind::Bool, Value::Bool(true)),
            (FieldKind::I8, Value::Int(-8)),
            (FieldKind::U16, Value::UInt(65535)),
            (FieldKind::I64, Value::Int(i64::MIN)),
            (FieldKind::U64, Value::UInt(u64::MAX)),
            (FieldKind::F32, Value::Float(f64::from(0.1f32))),
            (FieldKind::F64, Value::Float(0.1)),
            (FieldKind::Text, Value::Text(" padded ".into())),
            (FieldKind::Hex, Value::Bytes(vec![0xDE, 0xAD])),
            (FieldKind::Flags(FLAGS), Value::UInt(0x03)),
        ];
        for (kind, value) in cases {
            let text = kind.format(&value).unwrap();
            assert_eq!(kind.parse(&text), Some(value), "{kind:?} via {text:?}");
        }
    }

    #[test]
    fn test_malformed_reports_key() {
        let spec = FieldSpec::attribute("alignment_size", FieldKind::U16, Presence::Required);
        let mut node = Node::new("bnd2");
        node.set_attribute("alignment_size", "big");
        match spec.read(&node) {
            Err(Error::FieldMalformed { key, .. }) => assert_eq!(key, "alignment_size"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
