//! In-memory container model shared by every format

use std::collections::BTreeMap;

use crate::compression::CompressionInfo;
use crate::path::PathMode;
use crate::{Error, Result};

/// A typed header or entry field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "a boolean",
            Value::Int(_) | Value::UInt(_) => "an integer",
            Value::Float(_) => "a float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
        }
    }

    /// Integer value converted to `T`, `None` for non-integers or out of range
    pub fn as_int<T: TryFrom<i128>>(&self) -> Option<T> {
        let wide = match self {
            Value::Int(v) => i128::from(*v),
            Value::UInt(v) => i128::from(*v),
            _ => return None,
        };
        T::try_from(wide).ok()
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::$variant(value.into())
            }
        }
    )*};
}

value_from! {
    bool => Bool,
    i8 => Int, i16 => Int, i32 => Int, i64 => Int,
    u8 => UInt, u16 => UInt, u32 => UInt, u64 => UInt,
    f32 => Float, f64 => Float,
    String => Text, &str => Text,
    Vec<u8> => Bytes,
}

/// Format-specific fields keyed by manifest name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn require(&self, key: &str) -> Result<&Value> {
        self.get(key).ok_or_else(|| Error::missing(key))
    }

    fn mismatch(key: &str, expected: &'static str, value: &Value) -> Error {
        Error::malformed(key, expected, &format!("{value:?}"))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.require(key)? {
            Value::Bool(v) => Ok(*v),
            other => Err(Self::mismatch(key, "a boolean", other)),
        }
    }

    /// Integer field converted to the requested width
    pub fn get_int<T: TryFrom<i128>>(&self, key: &str) -> Result<T> {
        let value = self.require(key)?;
        value
            .as_int()
            .ok_or_else(|| Self::mismatch(key, "an integer in range", value))
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        match self.require(key)? {
            Value::Float(v) => Ok(*v),
            other => Err(Self::mismatch(key, "a float", other)),
        }
    }

    pub fn get_text(&self, key: &str) -> Result<&str> {
        match self.require(key)? {
            Value::Text(v) => Ok(v),
            other => Err(Self::mismatch(key, "text", other)),
        }
    }

    pub fn get_bytes(&self, key: &str) -> Result<&[u8]> {
        match self.require(key)? {
            Value::Bytes(v) => Ok(v),
            other => Err(Self::mismatch(key, "bytes", other)),
        }
    }
}

/// One file inside a container
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Negative when the entry has no id
    pub id: i32,
    pub name: Option<String>,
    pub flags: u8,
    /// `None` means the format's default codec
    pub compression: Option<CompressionInfo>,
    pub extra: Fields,
    pub bytes: Vec<u8>,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            id: -1,
            name: None,
            flags: 0,
            compression: None,
            extra: Fields::new(),
            bytes: Vec::new(),
        }
    }
}

impl Entry {
    pub fn new(id: i32, name: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            id,
            name: name.map(str::to_string),
            bytes,
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }
}

/// A decoded archive ready to be unpacked, or rebuilt from a manifest
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Container {
    /// File name the rebuilt archive is written under
    pub source_name: String,
    /// Outer DCX/DCP wrapping, [`CompressionInfo::None`] when bare
    pub compression: CompressionInfo,
    pub path_mode: PathMode,
    pub base_directory: Option<String>,
    pub header: Fields,
    pub entries: Vec<Entry>,
}
