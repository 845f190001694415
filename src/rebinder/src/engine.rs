//! Schema-driven round-trip engine
//!
//! Unpacking resolves every entry path first, then writes the loose files,
//! then the manifest. A container with an invalid entry therefore fails
//! before anything is written. Repacking reads the manifest, then each loose
//! file, and rebuilds the container in memory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::compression::CompressionInfo;
use crate::container::{Container, Entry, Value};
use crate::field;
use crate::manifest::{Node, Placement};
use crate::path::{self, Disambiguator, Identity, PathMode, Resolver};
use crate::roots::{self, RootTable};
use crate::schema::{EntrySlot, FieldSpec, HeaderSlot, Schema};
use crate::{Error, Result};

/// Receives the completed fraction (0.0 to 1.0) after each entry
pub trait Progress {
    fn report(&mut self, fraction: f32);
}

impl<F: FnMut(f32)> Progress for F {
    fn report(&mut self, fraction: f32) {
        self(fraction);
    }
}

/// Progress sink that discards reports
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _fraction: f32) {}
}

/// Manifest plus loose file layout for a container, computed before any I/O
#[derive(Debug, Clone)]
pub struct Plan {
    pub manifest: Node,
    /// Relative path of each entry, in entry order
    pub files: Vec<String>,
}

/// Runs unpack and repack for one format schema
#[derive(Debug, Clone, Copy)]
pub struct Engine<'a> {
    schema: &'a Schema,
    roots: &'a RootTable,
}

fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        done as f32 / total as f32
    }
}

fn int_field<T: TryFrom<i128>>(spec: &FieldSpec, value: &Value) -> Result<T> {
    value
        .as_int()
        .ok_or_else(|| Error::malformed(spec.key, spec.kind.expected(), &format!("{value:?}")))
}

impl<'a> Engine<'a> {
    pub fn new(schema: &'a Schema, roots: &'a RootTable) -> Self {
        Self { schema, roots }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    fn resolver<'c>(&self, container: &'c Container) -> Resolver<'c>
    where
        'a: 'c,
    {
        Resolver {
            mode: container.path_mode,
            base_directory: container.base_directory.as_deref(),
            roots: self.roots,
            nameless_fallback: self.schema.nameless_fallback,
        }
    }

    /// Build the manifest and assign every entry a unique relative path
    pub fn plan(&self, container: &Container) -> Result<Plan> {
        let mut manifest = Node::new(self.schema.root);
        for slot in self.schema.header {
            write_header_slot(&mut manifest, slot, container)?;
        }

        let resolver = self.resolver(container);
        let stores_root = self.schema.stores_root();
        let mut names = Disambiguator::new();
        names.reserve(&self.schema.manifest_name());

        let mut collection = Node::new(self.schema.collection);
        let mut files = Vec::with_capacity(container.entries.len());
        for (ordinal, entry) in container.entries.iter().enumerate() {
            let derived = resolver.derive(Identity {
                name: entry.name.as_deref(),
                id: entry.id,
                ordinal,
            })?;
            let suffix = names.assign(&derived.relative);
            let relative = path::apply_suffix(&derived.relative, &suffix);
            tracing::trace!(ordinal, id = entry.id, path = %relative, "Planned entry");

            let mut item = Node::new(self.schema.item);
            for slot in self.schema.entry {
                let stored = StoredPath {
                    root: if stores_root { &derived.root } else { "" },
                    suffix: &suffix,
                    mode: container.path_mode,
                };
                write_entry_slot(&mut item, slot, entry, &stored)?;
            }
            collection.children.push(item);
            files.push(relative);
        }
        manifest.children.push(collection);

        Ok(Plan { manifest, files })
    }

    /// Write loose files and the manifest into `target`.
    ///
    /// Returns the manifest path.
    pub fn unpack(
        &self,
        container: &Container,
        target: &Path,
        progress: &mut dyn Progress,
    ) -> Result<PathBuf> {
        let plan = self.plan(container)?;
        fs::create_dir_all(target)?;

        let total = container.entries.len();
        for (done, (entry, relative)) in container.entries.iter().zip(&plan.files).enumerate() {
            let path = target.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &entry.bytes)?;
            progress.report(fraction(done + 1, total));
        }

        let manifest_path = target.join(self.schema.manifest_name());
        plan.manifest.save(&manifest_path)?;
        tracing::debug!(
            format = self.schema.format,
            entries = total,
            manifest = %manifest_path.display(),
            "Unpacked container"
        );
        Ok(manifest_path)
    }

    /// Rebuild a container from the manifest and loose files in `source`
    pub fn repack(&self, source: &Path, progress: &mut dyn Progress) -> Result<Container> {
        let manifest = Node::load(&source.join(self.schema.manifest_name()))?;
        if manifest.name != self.schema.root {
            return Err(Error::StructuralViolation(self.schema.root.to_string()));
        }

        let mut container = self.read_header(&manifest)?;
        let collection = manifest
            .child(self.schema.collection)
            .ok_or_else(|| Error::StructuralViolation(self.schema.collection.to_string()))?;
        let items: Vec<&Node> = collection.children_named(self.schema.item).collect();

        let mut entries = Vec::with_capacity(items.len());
        let resolver = self.resolver(&container);
        for (ordinal, item) in items.iter().enumerate() {
            let (mut entry, stored) = self.read_entry(item, container.path_mode)?;
            let relative = match stored.remainder {
                // Independent of the roots configured now
                Some(remainder) => path::normalize(remainder.trim_start_matches(['\\', '/']))?,
                None => {
                    resolver
                        .derive(Identity {
                            name: entry.name.as_deref(),
                            id: entry.id,
                            ordinal,
                        })?
                        .relative
                }
            };
            let relative = path::normalize(&path::apply_suffix(&relative, &stored.suffix))?;
            let file = source.join(&relative);
            entry.bytes = match fs::read(&file) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::FileNotFound(file)),
                Err(e) => return Err(e.into()),
            };
            entries.push(entry);
            progress.report(fraction(ordinal + 1, items.len()));
        }
        container.entries = entries;

        tracing::debug!(
            format = self.schema.format,
            entries = container.entries.len(),
            "Repacked container"
        );
        Ok(container)
    }

    fn read_header(&self, manifest: &Node) -> Result<Container> {
        let mut container = Container::default();
        let mut path_mode = None;

        for slot in self.schema.header {
            match *slot {
                HeaderSlot::SourceName(key) => {
                    container.source_name = field::read(manifest, key, Placement::Element)?;
                }
                HeaderSlot::Compression(key) => {
                    container.compression = CompressionInfo::read(manifest, key, CompressionInfo::None)?;
                }
                HeaderSlot::PathMode(key) => {
                    path_mode = Some(
                        field::read_optional::<PathMode>(manifest, key, Placement::Element)?
                            .ok_or_else(|| Error::AmbiguousVersion(key.to_string()))?,
                    );
                }
                HeaderSlot::BaseDirectory(key) => {
                    container.base_directory = field::read_optional(manifest, key, Placement::Element)?;
                }
                HeaderSlot::Field(spec) => {
                    if let Some(value) = spec.read(manifest)? {
                        container.header.insert(spec.key, value);
                    }
                }
            }
        }

        container.path_mode = match (path_mode, self.schema.derive_path_mode) {
            (Some(mode), _) => mode,
            (None, Some(derive)) => derive(&container.header)?,
            (None, None) => PathMode::default(),
        };
        if container.path_mode != PathMode::BaseDirectoryRelative {
            container.base_directory = None;
        }
        Ok(container)
    }

    /// Entry fields plus how its path was stored; bytes are filled in by the caller
    fn read_entry(&self, item: &Node, mode: PathMode) -> Result<(Entry, StoredEntry)> {
        let mut entry = Entry::default();
        let mut root = String::new();
        let mut name: Option<String> = None;
        let mut suffix = String::new();

        for slot in self.schema.entry {
            match *slot {
                EntrySlot::Id(spec) => {
                    if let Some(value) = spec.read(item)? {
                        entry.id = int_field(&spec, &value)?;
                    }
                }
                EntrySlot::Flags(spec) => {
                    if let Some(value) = spec.read(item)? {
                        entry.flags = int_field(&spec, &value)?;
                    }
                }
                EntrySlot::Root(key) => root = field::read_or(item, key, Placement::Element, String::new())?,
                EntrySlot::Name(key) => name = field::read_optional(item, key, Placement::Element)?,
                EntrySlot::Suffix(key) => suffix = field::read_or(item, key, Placement::Element, String::new())?,
                EntrySlot::Compression(key) => entry.compression = CompressionInfo::read_optional(item, key)?,
                EntrySlot::Field(spec) => {
                    if let Some(value) = spec.read(item)? {
                        entry.extra.insert(spec.key, value);
                    }
                }
            }
        }

        let remainder = match (&name, mode) {
            (Some(name), PathMode::FullPath) if !name.is_empty() && self.schema.stores_root() => {
                Some(name.clone())
            }
            _ => None,
        };
        entry.name = match (name, mode) {
            (Some(name), PathMode::FullPath) => Some(roots::unfold(&root, &name)),
            (name, _) => name,
        };
        Ok((entry, StoredEntry { remainder, suffix }))
    }
}

/// Path details read back from a manifest entry
struct StoredEntry {
    /// Name with its root folded off, when the schema keeps roots separately
    remainder: Option<String>,
    suffix: String,
}

/// How an entry's name was split for storage
struct StoredPath<'p> {
    root: &'p str,
    suffix: &'p str,
    mode: PathMode,
}

fn write_header_slot(manifest: &mut Node, slot: &HeaderSlot, container: &Container) -> Result<()> {
    match *slot {
        HeaderSlot::SourceName(key) => manifest.push_text(key, container.source_name.as_str()),
        HeaderSlot::Compression(key) => container.compression.write(manifest, key),
        HeaderSlot::PathMode(key) => field::write(manifest, key, Placement::Element, &container.path_mode),
        HeaderSlot::BaseDirectory(key) => {
            if container.path_mode == PathMode::BaseDirectoryRelative {
                if let Some(base) = &container.base_directory {
                    manifest.push_text(key, base.as_str());
                }
            }
        }
        HeaderSlot::Field(spec) => spec.write(manifest, container.header.get(spec.key))?,
    }
    Ok(())
}

fn write_entry_slot(item: &mut Node, slot: &EntrySlot, entry: &Entry, stored: &StoredPath) -> Result<()> {
    match *slot {
        EntrySlot::Id(spec) => spec.write(item, Some(&Value::from(entry.id)))?,
        EntrySlot::Flags(spec) => spec.write(item, Some(&Value::from(entry.flags)))?,
        EntrySlot::Root(key) => {
            if !stored.root.is_empty() {
                item.push_text(key, stored.root);
            }
        }
        EntrySlot::Name(key) => {
            if let Some(name) = entry.name.as_deref() {
                let name = match stored.mode {
                    PathMode::FullPath => name.strip_prefix(stored.root).unwrap_or(name),
                    _ => name,
                };
                item.push_text(key, name);
            }
        }
        EntrySlot::Suffix(key) => {
            if !stored.suffix.is_empty() {
                item.push_text(key, stored.suffix);
            }
        }
        EntrySlot::Compression(key) => {
            if let Some(info) = &entry.compression {
                info.write(item, key);
            }
        }
        EntrySlot::Field(spec) => spec.write(item, entry.extra.get(spec.key))?,
    }
    Ok(())
}
