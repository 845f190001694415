//! # rebinder
//!
//! Lossless unpack/repack of FromSoftware containers (BND2, BND3, BND4, the
//! AC3SL, ACE3 and Kuon binders, TPF texture packs, all optionally DCX
//! wrapped) into an editable manifest plus a tree of loose files, and back
//! again.
//!
//! The round trip is driven by one generic engine ([`engine::Engine`]) over a
//! per-format [`schema::Schema`]. Format handlers in [`formats`] only describe
//! their manifest layout and provide a binary codec.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use rebinder::{archive, engine::NoProgress, roots::RootTable};
//!
//! # fn main() -> Result<(), rebinder::Error> {
//! let roots = RootTable::default();
//!
//! // Unpack `c0000.anibnd.dcx` into `c0000-anibnd-dcx/`
//! let unpacked = archive::unpack_file(Path::new("c0000.anibnd.dcx"), &roots, &mut NoProgress)?;
//!
//! // ... edit loose files and the manifest ...
//!
//! // Rebuild the archive next to the unpacked directory
//! let rebuilt = archive::repack_dir(&unpacked.directory, &roots, &mut NoProgress)?;
//! println!("wrote {}", rebuilt.display());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod backup;
mod binary;
pub mod compression;
pub mod container;
pub mod dcx;
pub mod engine;
pub mod field;
pub mod formats;
pub mod manifest;
pub mod path;
pub mod roots;
pub mod schema;
pub mod sidecar;

#[doc(inline)]
pub use compression::{CompressionInfo, DfltParams};
#[doc(inline)]
pub use container::{Container, Entry, Fields, Value};
#[doc(inline)]
pub use engine::{Engine, NoProgress, Progress};
#[doc(inline)]
pub use formats::Format;
#[doc(inline)]
pub use manifest::{Node, Placement};
#[doc(inline)]
pub use path::PathMode;
#[doc(inline)]
pub use roots::RootTable;

use std::path::PathBuf;

/// Prefix shared by every manifest and sidecar file this crate writes
pub const MANIFEST_PREFIX: &str = "_rebinder-";

/// Errors from unpacking and repacking containers
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{key} was missing or empty")]
    FieldMissing { key: String },

    #[error("{key} could not be parsed as {expected}: {text:?}")]
    FieldMalformed {
        key: String,
        expected: &'static str,
        text: String,
    },

    #[error("Unsupported compression type: {0}")]
    UnsupportedCompressionType(String),

    #[error("Entry path resolves outside the output directory: {0:?}")]
    PathEscape(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("{0} must be specified, there is no safe default")]
    AmbiguousVersion(String),

    #[error("Manifest is missing required element: {0}")]
    StructuralViolation(String),

    #[error("{0} is recognized but cannot be processed")]
    UnsupportedCodec(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Format not recognized: {0}")]
    UnknownFormat(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn missing(key: &str) -> Self {
        Error::FieldMissing {
            key: key.to_string(),
        }
    }

    pub(crate) fn malformed(key: &str, expected: &'static str, text: &str) -> Self {
        Error::FieldMalformed {
            key: key.to_string(),
            expected,
            text: text.to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidData(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
