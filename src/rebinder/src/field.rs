//! Typed field codec
//!
//! Every manifest value is text. This module turns that text into typed
//! values and back, with one canonical textual form per value so that
//! re-serialization is stable.
//!
//! Integers accept an optional sign and a `0x`, `0b` or `0o` radix prefix.
//! Prefixed literals may also spell a negative signed value by its bit
//! pattern, so `0xFFFFFFFF` reads as `-1i32`. Output is always decimal.

use crate::manifest::{Node, Placement};
use crate::{Error, Result};

/// A value that can be stored as manifest text
pub trait FieldValue: Sized {
    /// Short description used in [`Error::FieldMalformed`]
    const EXPECTED: &'static str;

    fn parse_field(text: &str) -> Option<Self>;

    fn format_field(&self) -> String;
}

struct IntegerLiteral {
    value: i128,
    negative: bool,
    prefixed: bool,
}

fn split_radix(text: &str) -> (u32, &str) {
    let prefix = text.get(..2).map(str::to_ascii_lowercase);
    let rest = text.get(2..).unwrap_or("");
    match prefix.as_deref() {
        Some("0x") => (16, rest),
        Some("0b") => (2, rest),
        Some("0o") => (8, rest),
        _ => (10, text),
    }
}

fn parse_integer(text: &str) -> Option<IntegerLiteral> {
    let text = text.trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (radix, digits) = split_radix(unsigned);
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let magnitude = i128::from_str_radix(digits, radix).ok()?;
    Some(IntegerLiteral {
        value: if negative { -magnitude } else { magnitude },
        negative,
        prefixed: radix != 10,
    })
}

macro_rules! integer_field {
    ($($ty:ty => $bits:ty, $expected:literal;)*) => {$(
        impl FieldValue for $ty {
            const EXPECTED: &'static str = $expected;

            fn parse_field(text: &str) -> Option<Self> {
                let literal = parse_integer(text)?;
                if let Ok(value) = <$ty>::try_from(literal.value) {
                    return Some(value);
                }
                if literal.prefixed && !literal.negative {
                    return <$bits>::try_from(literal.value).ok().map(|bits| bits as $ty);
                }
                None
            }

            fn format_field(&self) -> String {
                self.to_string()
            }
        }
    )*};
}

integer_field! {
    i8 => u8, "a signed 8-bit integer";
    u8 => u8, "an unsigned 8-bit integer";
    i16 => u16, "a signed 16-bit integer";
    u16 => u16, "an unsigned 16-bit integer";
    i32 => u32, "a signed 32-bit integer";
    u32 => u32, "an unsigned 32-bit integer";
    i64 => u64, "a signed 64-bit integer";
    u64 => u64, "an unsigned 64-bit integer";
}

impl FieldValue for f32 {
    const EXPECTED: &'static str = "a 32-bit float";

    fn parse_field(text: &str) -> Option<Self> {
        text.trim().parse().ok()
    }

    // Rust prints the shortest text that parses back to the same bits
    fn format_field(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for f64 {
    const EXPECTED: &'static str = "a 64-bit float";

    fn parse_field(text: &str) -> Option<Self> {
        text.trim().parse().ok()
    }

    fn format_field(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for bool {
    const EXPECTED: &'static str = "a boolean";

    fn parse_field(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("true") {
            Some(true)
        } else if text.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    fn format_field(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for String {
    const EXPECTED: &'static str = "text";

    fn parse_field(text: &str) -> Option<Self> {
        Some(text.to_string())
    }

    fn format_field(&self) -> String {
        self.clone()
    }
}

/// Byte blob stored as contiguous hex digit pairs (`"0A1BFF"`).
///
/// Reading skips whitespace and the usual separators (`-`, `:`, `,`) so
/// hand-typed `"0A 1B-FF"` works; any other non-hex character is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HexBytes(pub Vec<u8>);

fn is_hex_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '-' | ':' | ',')
}

impl FieldValue for HexBytes {
    const EXPECTED: &'static str = "hex digit pairs";

    fn parse_field(text: &str) -> Option<Self> {
        let digits = text
            .chars()
            .filter(|&c| !is_hex_separator(c))
            .map(|c| c.to_digit(16))
            .collect::<Option<Vec<u32>>>()?;
        if digits.len() % 2 != 0 {
            return None;
        }
        digits
            .chunks_exact(2)
            .map(|pair| u8::try_from((pair[0] << 4) | pair[1]).ok())
            .collect::<Option<Vec<u8>>>()
            .map(HexBytes)
    }

    fn format_field(&self) -> String {
        self.0.iter().map(|b| format!("{b:02X}")).collect()
    }
}

/// Implement [`FieldValue`] for a unit-only enum using exact variant names.
///
/// ```ignore
/// named_enum!(PathMode, "a path mode", {
///     PathMode::FullPath => "FullPath",
/// });
/// ```
#[macro_export]
macro_rules! named_enum {
    ($ty:ty, $expected:literal, { $($variant:path => $name:literal),+ $(,)? }) => {
        impl $crate::field::FieldValue for $ty {
            const EXPECTED: &'static str = $expected;

            fn parse_field(text: &str) -> Option<Self> {
                match text.trim() {
                    $($name => Some($variant),)+
                    _ => None,
                }
            }

            fn format_field(&self) -> String {
                match self {
                    $($variant => $name,)+
                }
                .to_string()
            }
        }
    };
}

/// Parse a flag set written as comma-separated names (`"IDs, Names1"`).
///
/// `None` and the empty set are both zero. A plain integer literal is
/// accepted too so hand-edited manifests can use raw bits.
pub fn parse_flags(text: &str, names: &[(&str, u8)]) -> Option<u8> {
    let text = text.trim();
    if text == "None" {
        return Some(0);
    }
    if text.starts_with(|c: char| c.is_ascii_digit()) {
        return u8::parse_field(text);
    }
    text.split(',')
        .map(str::trim)
        .try_fold(0u8, |bits, name| {
            names
                .iter()
                .find(|(candidate, _)| *candidate == name)
                .map(|(_, bit)| bits | bit)
        })
}

/// Canonical text for a flag set; bits without a name are kept as a number.
pub fn format_flags(bits: u8, names: &[(&str, u8)]) -> String {
    if bits == 0 {
        return "None".to_string();
    }
    let mut parts = Vec::new();
    let mut remaining = bits;
    for (name, bit) in names {
        if bits & bit != 0 {
            parts.push((*name).to_string());
            remaining &= !bit;
        }
    }
    if remaining != 0 {
        parts.push(format!("0x{remaining:02X}"));
    }
    parts.join(", ")
}

/// Non-blank text stored under `key`, or `None` when absent or whitespace only
pub fn text<'a>(node: &'a Node, key: &str, placement: Placement) -> Option<&'a str> {
    node.value(key, placement).filter(|t| !t.trim().is_empty())
}

/// Read a required field
pub fn read<T: FieldValue>(node: &Node, key: &str, placement: Placement) -> Result<T> {
    read_optional(node, key, placement)?.ok_or_else(|| Error::missing(key))
}

/// Read a field that may be absent; a present but malformed value is still an error
pub fn read_optional<T: FieldValue>(node: &Node, key: &str, placement: Placement) -> Result<Option<T>> {
    match text(node, key, placement) {
        Some(text) => T::parse_field(text)
            .map(Some)
            .ok_or_else(|| Error::malformed(key, T::EXPECTED, text)),
        None => Ok(None),
    }
}

/// Read a field, substituting `default` when it is absent
pub fn read_or<T: FieldValue>(node: &Node, key: &str, placement: Placement, default: T) -> Result<T> {
    Ok(read_optional(node, key, placement)?.unwrap_or(default))
}

/// Store a value in its canonical textual form
pub fn write<T: FieldValue>(node: &mut Node, key: &str, placement: Placement, value: &T) {
    node.set_value(key, placement, value.format_field());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_radix_prefixes() {
        assert_eq!(i32::parse_field("42"), Some(42));
        assert_eq!(i32::parse_field("-42"), Some(-42));
        assert_eq!(i32::parse_field("0x2A"), Some(42));
        assert_eq!(i32::parse_field("0X2a"), Some(42));
        assert_eq!(u8::parse_field("0b101"), Some(5));
        assert_eq!(u16::parse_field("0o17"), Some(15));
        assert_eq!(i64::parse_field(" +7 "), Some(7));
    }

    #[test]
    fn test_integer_bit_pattern() {
        assert_eq!(i32::parse_field("0xFFFFFFFF"), Some(-1));
        assert_eq!(i8::parse_field("0x80"), Some(-128));
        // Decimal literals must fit the signed range
        assert_eq!(i32::parse_field("4294967295"), None);
    }

    #[test]
    fn test_integer_out_of_range() {
        assert_eq!(u8::parse_field("256"), None);
        assert_eq!(u8::parse_field("-1"), None);
        assert_eq!(i16::parse_field("0x1FFFF"), None);
        assert_eq!(i32::parse_field("0x"), None);
        assert_eq!(i32::parse_field("--1"), None);
        assert_eq!(i32::parse_field("12abc"), None);
    }

    #[test]
    fn test_integer_canonical_is_decimal() {
        let value = i32::parse_field("0x10").unwrap();
        assert_eq!(value.format_field(), "16");
        assert_eq!(i32::parse_field(&value.format_field()), Some(16));
    }

    #[test]
    fn test_float_round_trip_bits() {
        for value in [0.1f32, 1.0 / 3.0, f32::MIN_POSITIVE, -2.5e-7, 16_777_217.0] {
            let text = value.format_field();
            let back = f32::parse_field(&text).unwrap();
            assert_eq!(back.to_bits(), value.to_bits(), "{text}");
        }
        let value = 0.1f64 + 0.2;
        assert_eq!(f64::parse_field(&value.format_field()), Some(value));
    }

    #[test]
    fn test_bool() {
        assert_eq!(bool::parse_field("True"), Some(true));
        assert_eq!(bool::parse_field("false"), Some(false));
        assert_eq!(bool::parse_field("1"), None);
        assert_eq!(true.format_field(), "true");
    }

    #[test]
    fn test_hex_bytes() {
        let bytes = HexBytes::parse_field("0A1bFF").unwrap();
        assert_eq!(bytes.0, vec![0x0A, 0x1B, 0xFF]);
        assert_eq!(bytes.format_field(), "0A1BFF");
        assert_eq!(HexBytes::parse_field("ABC"), None);
        assert_eq!(HexBytes::parse_field("ZZ"), None);
        assert_eq!(HexBytes::parse_field("0A 1B-FF").unwrap().0, vec![0x0A, 0x1B, 0xFF]);
        assert_eq!(HexBytes::parse_field(" de:ad, be ef\n").unwrap().0, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(HexBytes::parse_field("0A 1"), None);
        assert_eq!(HexBytes::parse_field("0A_1B"), None);
        assert_eq!(HexBytes::parse_field(""), Some(HexBytes(Vec::new())));
    }

    const NAMES: &[(&str, u8)] = &[("IDs", 0x02), ("Names1", 0x04), ("Names2", 0x08)];

    #[test]
    fn test_flags() {
        assert_eq!(parse_flags("IDs, Names1", NAMES), Some(0x06));
        assert_eq!(parse_flags("None", NAMES), Some(0));
        assert_eq!(parse_flags("0x0E", NAMES), Some(0x0E));
        assert_eq!(parse_flags("IDs, Bogus", NAMES), None);
        assert_eq!(format_flags(0x0E, NAMES), "IDs, Names1, Names2");
        assert_eq!(format_flags(0, NAMES), "None");
        assert_eq!(format_flags(0x03, NAMES), "IDs, 0x01");
        assert_eq!(parse_flags(&format_flags(0x03, NAMES), NAMES), None);
    }

    #[test]
    fn test_read_blank_is_absent() {
        let mut node = Node::new("file");
        node.push_text("id", "   ");
        assert!(read_optional::<i32>(&node, "id", Placement::Element).unwrap().is_none());
        assert!(matches!(
            read::<i32>(&node, "id", Placement::Element),
            Err(Error::FieldMissing { .. })
        ));
        assert_eq!(read_or(&node, "id", Placement::Element, -1).unwrap(), -1);
    }

    #[test]
    fn test_read_malformed_names_key() {
        let mut node = Node::new("file");
        node.set_attribute("id", "abc");
        let err = read::<i32>(&node, "id", Placement::Attribute).unwrap_err();
        match err {
            Error::FieldMalformed { key, text, .. } => {
                assert_eq!(key, "id");
                assert_eq!(text, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_write_then_read() {
        let mut node = Node::new("bnd3");
        write(&mut node, "unk18", Placement::Element, &-5i32);
        write(&mut node, "version", Placement::Attribute, &"07D7R6".to_string());
        assert_eq!(read::<i32>(&node, "unk18", Placement::Element).unwrap(), -5);
        assert_eq!(
            read::<String>(&node, "version", Placement::Attribute).unwrap(),
            "07D7R6"
        );
    }
}
