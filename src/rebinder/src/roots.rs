//! Legacy root folding
//!
//! Entry names in FromSoftware archives are often absolute development paths
//! such as `N:\FDP\data\INTERROOT_win64\chr\c0000\c0000.hkx`. Unpacking strips
//! the machine-specific prefix so the loose file lands at `chr/c0000/c0000.hkx`,
//! and the manifest keeps the prefix verbatim so repacking restores the
//! original name byte for byte.

/// Known development roots, most specific first within each family
pub const FROMSOFTWARE_ROOTS: &[&str] = &[
    // Demon's Souls
    r"N:\DemonsSoul\data\DVDROOT\",
    r"N:\DemonsSoul\data\",
    r"N:\DemonsSoul\",
    r"Z:\data\",
    // Ninja Blade
    r"I:\NinjaBlade\",
    // Dark Souls 1
    r"N:\FRPG\data\INTERROOT_win32\",
    r"N:\FRPG\data\INTERROOT_win64\",
    r"N:\FRPG\data\INTERROOT_x64\",
    r"N:\FRPG\data\INTERROOT\",
    r"N:\FRPG\data\",
    r"N:\FRPG\",
    // Dark Souls 2
    r"N:\FRPG2\data",
    r"N:\FRPG2\",
    r"N:\FRPG2_64\data\",
    r"N:\FRPG2_64\",
    // Dark Souls 3
    r"N:\FDP\data\INTERROOT_ps4\",
    r"N:\FDP\data\INTERROOT_win64\",
    r"N:\FDP\data\INTERROOT_xboxone\",
    r"N:\FDP\data\",
    r"N:\FDP\",
    // Bloodborne
    r"N:\SPRJ\data\DVDROOT_win64\",
    r"N:\SPRJ\data\INTERROOT_ps4\",
    r"N:\SPRJ\data\INTERROOT_ps4_havok\",
    r"N:\SPRJ\data\INTERROOT_win64\",
    r"N:\SPRJ\data\",
    r"N:\SPRJ\",
    // Sekiro
    r"N:\NTC\data\Target\INTERROOT_win64_havok\",
    r"N:\NTC\data\Target\INTERROOT_win64\",
    r"N:\NTC\data\Target\",
    r"N:\NTC\data\",
    r"N:\NTC\",
];

fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

/// Ordered table of root prefixes, matched case-insensitively
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootTable {
    prefixes: Vec<String>,
}

impl Default for RootTable {
    fn default() -> Self {
        Self::fromsoftware()
    }
}

impl RootTable {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fromsoftware() -> Self {
        Self::new(FROMSOFTWARE_ROOTS.iter().copied())
    }

    /// Extra prefixes are tried before the built-in ones
    pub fn with_extra<I, S>(self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut prefixes: Vec<String> = extra.into_iter().map(Into::into).collect();
        prefixes.extend(self.prefixes);
        Self { prefixes }
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }

    /// Split `path` into `(root, remainder)` with `root + remainder == path`.
    ///
    /// The root is the first table prefix that matches, extended over any
    /// separators that follow it. Failing that, a drive designator (`X:`)
    /// and its separators are the root. Otherwise the root is empty.
    pub fn fold<'a>(&self, path: &'a str) -> (&'a str, &'a str) {
        let matched = self.prefixes.iter().find_map(|prefix| {
            let head = path.as_bytes().get(..prefix.len())?;
            head.eq_ignore_ascii_case(prefix.as_bytes())
                .then_some(prefix.len())
        });

        let end = match matched.or_else(|| drive_len(path)) {
            Some(len) => skip_separators(path, len),
            None => 0,
        };
        path.split_at(end)
    }
}

/// Rebuild the original name from a folded pair
pub fn unfold(root: &str, remainder: &str) -> String {
    let mut name = String::with_capacity(root.len() + remainder.len());
    name.push_str(root);
    name.push_str(remainder);
    name
}

fn drive_len(path: &str) -> Option<usize> {
    let bytes = path.as_bytes();
    (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':').then_some(2)
}

fn skip_separators(path: &str, start: usize) -> usize {
    path[start..]
        .find(|c: char| !is_separator(c))
        .map_or(path.len(), |offset| start + offset)
}
