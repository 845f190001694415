//! Entry path resolution and disambiguation
//!
//! Maps an entry's identity (name, id, ordinal) to a relative path inside the
//! unpack directory. Every derived path is normalized to `/` separators and
//! checked so it can never resolve outside that directory.

use std::collections::{HashMap, HashSet};

use crate::roots::RootTable;
use crate::{named_enum, Error, Result};

/// How entry identities map onto loose file paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMode {
    /// Files are named by id, or by ordinal when the id is negative
    #[default]
    ByOrdinalOrId,
    /// The entry name is already a relative path
    NameRelative,
    /// The entry name is absolute; its legacy root is folded away
    FullPath,
    /// The entry name is relative to a container-level base directory
    BaseDirectoryRelative,
}

named_enum!(PathMode, "a path mode", {
    PathMode::ByOrdinalOrId => "ByOrdinalOrId",
    PathMode::NameRelative => "NameRelative",
    PathMode::FullPath => "FullPath",
    PathMode::BaseDirectoryRelative => "BaseDirectoryRelative",
});

impl PathMode {
    /// Single-byte code used by BND2 headers
    pub fn code(self) -> u8 {
        match self {
            PathMode::ByOrdinalOrId => 0,
            PathMode::NameRelative => 1,
            PathMode::FullPath => 2,
            PathMode::BaseDirectoryRelative => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PathMode::ByOrdinalOrId),
            1 => Some(PathMode::NameRelative),
            2 => Some(PathMode::FullPath),
            3 => Some(PathMode::BaseDirectoryRelative),
            _ => None,
        }
    }
}

/// A resolved entry location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derived {
    /// Normalized relative path, `/` separated, before any suffix
    pub relative: String,
    /// Legacy root folded off the name; empty outside [`PathMode::FullPath`]
    pub root: String,
}

/// Inputs to [`derive`] for one entry
#[derive(Debug, Clone, Copy)]
pub struct Identity<'a> {
    pub name: Option<&'a str>,
    pub id: i32,
    pub ordinal: usize,
}

/// Resolution context shared by all entries of a container
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    pub mode: PathMode,
    pub base_directory: Option<&'a str>,
    pub roots: &'a RootTable,
    /// Fall back to id naming when a name-based mode meets a nameless entry
    pub nameless_fallback: bool,
}

impl Resolver<'_> {
    /// Resolve one entry to its relative path
    pub fn derive(&self, entry: Identity<'_>) -> Result<Derived> {
        let name = entry.name.filter(|n| !n.is_empty());
        let mode = match (self.mode, name) {
            (PathMode::ByOrdinalOrId, _) => PathMode::ByOrdinalOrId,
            (_, None) if self.nameless_fallback => PathMode::ByOrdinalOrId,
            (_, None) => return Err(Error::missing("name")),
            (mode, Some(_)) => mode,
        };
        let name = name.unwrap_or_default();

        let (candidate, root) = match mode {
            PathMode::ByOrdinalOrId => {
                let stem = if entry.id < 0 {
                    entry.ordinal.to_string()
                } else {
                    entry.id.to_string()
                };
                (stem, "")
            }
            PathMode::NameRelative => (name.to_string(), ""),
            PathMode::FullPath => {
                let (root, rest) = self.roots.fold(name);
                (strip_separators(rest).to_string(), root)
            }
            PathMode::BaseDirectoryRelative => {
                let (_, base) = self.roots.fold(self.base_directory.unwrap_or_default());
                let base = strip_separators(base);
                let name = strip_separators(name);
                if base.is_empty() {
                    (name.to_string(), "")
                } else {
                    (format!("{base}/{name}"), "")
                }
            }
        };

        Ok(Derived {
            relative: normalize(&candidate)?,
            root: root.to_string(),
        })
    }
}

fn strip_separators(path: &str) -> &str {
    path.trim_start_matches(['\\', '/'])
}

fn is_illegal_component(part: &str) -> bool {
    if part.contains('\0') {
        return true;
    }
    // Drive letters and alternate data streams
    cfg!(windows) && part.contains(':')
}

/// Normalize a candidate path to `/` separators with no `.` or `..` parts.
///
/// Absolute candidates, candidates that climb above the root, and candidates
/// that resolve to the root itself are rejected with [`Error::PathEscape`].
pub fn normalize(candidate: &str) -> Result<String> {
    let escape = || Error::PathEscape(candidate.to_string());
    let bytes = candidate.as_bytes();
    let absolute = candidate.starts_with(['\\', '/'])
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':');
    if absolute {
        return Err(escape());
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in candidate.split(['\\', '/']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop().ok_or_else(escape)?;
            }
            part if is_illegal_component(part) => return Err(escape()),
            part => parts.push(part),
        }
    }

    if parts.is_empty() {
        return Err(escape());
    }
    Ok(parts.join("/"))
}

/// Insert a disambiguation suffix before the file extension.
///
/// `a/x.dat` with `" (2)"` becomes `a/x (2).dat`. A dot that starts the
/// file name is not an extension, so `.cfg` becomes `.cfg (2)`.
pub fn apply_suffix(relative: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return relative.to_string();
    }
    let (dir, file) = match relative.rfind('/') {
        Some(i) => relative.split_at(i + 1),
        None => ("", relative),
    };
    let (stem, ext) = match file.rfind('.') {
        Some(i) if i > 0 => file.split_at(i),
        _ => (file, ""),
    };
    format!("{dir}{stem}{suffix}{ext}")
}

/// Suffix text for the nth occurrence of a path (1-based)
pub fn suffix_for(occurrence: u32) -> String {
    if occurrence <= 1 {
        String::new()
    } else {
        format!(" ({occurrence})")
    }
}

/// Assigns suffixes so every entry of a container gets a distinct file.
///
/// Paths are compared case-insensitively so the layout is also valid on
/// case-insensitive filesystems.
#[derive(Debug, Default)]
pub struct Disambiguator {
    occurrences: HashMap<String, u32>,
    taken: HashSet<String>,
}

impl Disambiguator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a path as unavailable, e.g. the manifest file itself
    pub fn reserve(&mut self, relative: &str) {
        self.taken.insert(relative.to_lowercase());
    }

    /// Claim `relative` for the next entry and return the suffix it needs.
    ///
    /// The first claimant gets an empty suffix, later ones get ` (2)`,
    /// ` (3)` and so on, skipping any suffixed form that is already taken.
    pub fn assign(&mut self, relative: &str) -> String {
        let count = self.occurrences.entry(relative.to_lowercase()).or_insert(0);
        let mut occurrence = *count + 1;
        loop {
            let suffix = suffix_for(occurrence);
            if self.taken.insert(apply_suffix(relative, &suffix).to_lowercase()) {
                *count = occurrence;
                return suffix;
            }
            occurrence += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldValue;

    fn resolver(mode: PathMode, roots: &RootTable) -> Resolver<'_> {
        Resolver {
            mode,
            base_directory: None,
            roots,
            nameless_fallback: false,
        }
    }

    fn named(name: &str) -> Identity<'_> {
        Identity {
            name: Some(name),
            id: -1,
            ordinal: 0,
        }
    }

    #[test]
    fn test_by_ordinal_or_id() {
        let roots = RootTable::default();
        let r = resolver(PathMode::ByOrdinalOrId, &roots);
        let by_id = r.derive(Identity { name: Some("ignored"), id: 12, ordinal: 3 }).unwrap();
        assert_eq!(by_id.relative, "12");
        let by_ordinal = r.derive(Identity { name: None, id: -1, ordinal: 3 }).unwrap();
        assert_eq!(by_ordinal.relative, "3");
    }

    #[test]
    fn test_name_relative_normalizes() {
        let roots = RootTable::default();
        let r = resolver(PathMode::NameRelative, &roots);
        assert_eq!(r.derive(named(r"a\b/./c.dat")).unwrap().relative, "a/b/c.dat");
        assert_eq!(r.derive(named("a/../b.dat")).unwrap().relative, "b.dat");
    }

    #[test]
    fn test_full_path_folds_root() {
        let roots = RootTable::default();
        let r = resolver(PathMode::FullPath, &roots);
        let derived = r
            .derive(named(r"N:\FDP\data\INTERROOT_win64\chr\c0000\c0000.hkx"))
            .unwrap();
        assert_eq!(derived.relative, "chr/c0000/c0000.hkx");
        assert_eq!(derived.root, r"N:\FDP\data\INTERROOT_win64\");

        let relative = r.derive(named(r"\\chr\a.hkx")).unwrap();
        assert_eq!(relative.relative, "chr/a.hkx");
        assert_eq!(relative.root, "");
    }

    #[test]
    fn test_base_directory_relative() {
        let roots = RootTable::default();
        let mut r = resolver(PathMode::BaseDirectoryRelative, &roots);
        r.base_directory = Some(r"D:\game\data\");
        assert_eq!(r.derive(named(r"\menu\x.tpf")).unwrap().relative, "game/data/menu/x.tpf");
        r.base_directory = None;
        assert_eq!(r.derive(named("x.tpf")).unwrap().relative, "x.tpf");
    }

    #[test]
    fn test_path_escape() {
        let roots = RootTable::default();
        let r = resolver(PathMode::NameRelative, &roots);
        for name in ["../../etc/passwd", r"a\..\..\b", "/etc/passwd", r"C:\x", "..", "./"] {
            assert!(
                matches!(r.derive(named(name)), Err(Error::PathEscape(_))),
                "{name} should escape"
            );
        }
    }

    #[test]
    fn test_nameless_entries() {
        let roots = RootTable::default();
        let mut r = resolver(PathMode::NameRelative, &roots);
        let nameless = Identity { name: None, id: 4, ordinal: 0 };
        assert!(matches!(r.derive(nameless), Err(Error::FieldMissing { .. })));
        r.nameless_fallback = true;
        assert_eq!(r.derive(nameless).unwrap().relative, "4");
    }

    #[test]
    fn test_apply_suffix() {
        assert_eq!(apply_suffix("a/x.dat", " (2)"), "a/x (2).dat");
        assert_eq!(apply_suffix("x", " (2)"), "x (2)");
        assert_eq!(apply_suffix("a.b/x.tar.gz", " (3)"), "a.b/x.tar (3).gz");
        assert_eq!(apply_suffix("a.b/noext", " (2)"), "a.b/noext (2)");
        assert_eq!(apply_suffix(".cfg", " (2)"), ".cfg (2)");
        assert_eq!(apply_suffix("a/x.dat", ""), "a/x.dat");
    }

    #[test]
    fn test_disambiguator_sequence() {
        let mut d = Disambiguator::new();
        assert_eq!(d.assign("a/x.dat"), "");
        assert_eq!(d.assign("a/x.dat"), " (2)");
        assert_eq!(d.assign("a/x.dat"), " (3)");
        assert_eq!(d.assign("a/y.dat"), "");
    }

    #[test]
    fn test_disambiguator_skips_real_collisions() {
        let mut d = Disambiguator::new();
        assert_eq!(d.assign("x (2).dat"), "");
        assert_eq!(d.assign("x.dat"), "");
        // "x (2).dat" already belongs to a real entry
        assert_eq!(d.assign("x.dat"), " (3)");
        assert_eq!(d.assign("x (2).dat"), " (2)");
    }

    #[test]
    fn test_disambiguator_case_insensitive_and_reserved() {
        let mut d = Disambiguator::new();
        d.reserve("_rebinder-bnd4.xml");
        assert_eq!(d.assign("_REBINDER-bnd4.xml"), " (2)");
        assert_eq!(d.assign("A.dat"), "");
        assert_eq!(d.assign("a.dat"), " (2)");
    }

    #[test]
    fn test_path_mode_text_and_codes() {
        for mode in [
            PathMode::ByOrdinalOrId,
            PathMode::NameRelative,
            PathMode::FullPath,
            PathMode::BaseDirectoryRelative,
        ] {
            assert_eq!(PathMode::parse_field(&mode.format_field()), Some(mode));
            assert_eq!(PathMode::from_code(mode.code()), Some(mode));
        }
        assert_eq!(PathMode::parse_field("fullpath"), None);
        assert_eq!(PathMode::from_code(9), None);
    }
}
