//! On-disk workspace: one CSV file per table plus a JSON manifest that keeps
//! table order, names and hidden flags. Every mutation is written through,
//! except cell writes inside a batch: those tables are saved once when the
//! batch ends.

use crate::csv_codec;
use crate::error::SdfError;
use crate::store::{MemoryStore, TabularStore};
use crate::util::{read_text_with_backoff, remove_with_backoff, write_atomic_with_backoff};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST: &str = "workspace.json";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Manifest {
    next_id: u64,
    tables: Vec<ManifestEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ManifestEntry {
    name: String,
    file: String,
    #[serde(default)]
    hidden: bool,
}

pub struct DirStore {
    root: PathBuf,
    manifest: Manifest,
    inner: MemoryStore,
    batching: bool,
    /// Files of tables written during the current batch.
    dirty: AHashSet<String>,
}

fn store_err(e: anyhow::Error) -> SdfError {
    SdfError::Store(format!("{e:#}"))
}

impl DirStore {
    /// Open (or initialize) a workspace directory.
    pub fn open(root: impl AsRef<Path>, capacity: usize) -> Result<Self, SdfError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| SdfError::Store(format!("create {}: {e}", root.display())))?;

        let manifest_path = root.join(MANIFEST);
        let manifest: Manifest = if manifest_path.exists() {
            let text = read_text_with_backoff(&manifest_path).map_err(store_err)?;
            serde_json::from_str(&text).map_err(|e| SdfError::Store(format!("{}: {e}", manifest_path.display())))?
        } else {
            Manifest::default()
        };

        let mut inner = MemoryStore::new(capacity);
        for entry in &manifest.tables {
            inner.create_table(&entry.name)?;
            let path = root.join(&entry.file);
            if path.exists() {
                let text = read_text_with_backoff(&path).map_err(store_err)?;
                let rows = csv_codec::parse(&text)?;
                if !rows.is_empty() {
                    inner.write_range(&entry.name, 1, 1, &rows)?;
                }
            }
            if entry.hidden {
                inner.hide_table(&entry.name)?;
            }
        }
        tracing::debug!("opened workspace {} ({} tables)", root.display(), manifest.tables.len());
        Ok(Self { root, manifest, inner, batching: false, dirty: AHashSet::new() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, name: &str) -> Result<&ManifestEntry, SdfError> {
        self.manifest
            .tables
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| SdfError::Store(format!("no table named {name:?}")))
    }

    fn save_manifest(&self) -> Result<(), SdfError> {
        let bytes = serde_json::to_vec_pretty(&self.manifest).map_err(|e| SdfError::Store(e.to_string()))?;
        write_atomic_with_backoff(&self.root.join(MANIFEST), &bytes).map_err(store_err)
    }

    fn save_table(&self, name: &str) -> Result<(), SdfError> {
        let entry = self.entry(name)?;
        let text = csv_codec::serialize(&self.inner.read_table(name)?)?;
        write_atomic_with_backoff(&self.root.join(&entry.file), text.as_bytes()).map_err(store_err)
    }

    fn save_or_defer(&mut self, name: &str) -> Result<(), SdfError> {
        if !self.batching {
            return self.save_table(name);
        }
        let file = self.entry(name)?.file.clone();
        self.dirty.insert(file);
        Ok(())
    }
}

impl TabularStore for DirStore {
    fn table_names(&self) -> Vec<String> {
        self.inner.table_names()
    }

    fn has_table(&self, name: &str) -> bool {
        self.inner.has_table(name)
    }

    fn is_hidden(&self, name: &str) -> bool {
        self.inner.is_hidden(name)
    }

    fn create_table(&mut self, name: &str) -> Result<(), SdfError> {
        self.inner.create_table(name)?;
        let file = format!("t{:05}.csv", self.manifest.next_id);
        self.manifest.next_id += 1;
        self.manifest.tables.push(ManifestEntry { name: name.to_string(), file, hidden: false });
        self.save_table(name)?;
        self.save_manifest()
    }

    fn rename_table(&mut self, from: &str, to: &str) -> Result<(), SdfError> {
        self.inner.rename_table(from, to)?;
        if let Some(e) = self.manifest.tables.iter_mut().find(|e| e.name == from) {
            e.name = to.to_string();
        }
        self.save_manifest()
    }

    fn hide_table(&mut self, name: &str) -> Result<(), SdfError> {
        self.inner.hide_table(name)?;
        if let Some(e) = self.manifest.tables.iter_mut().find(|e| e.name == name) {
            e.hidden = true;
        }
        self.save_manifest()
    }

    fn delete_table(&mut self, name: &str) -> Result<(), SdfError> {
        let file = self.entry(name)?.file.clone();
        self.inner.delete_table(name)?;
        self.manifest.tables.retain(|e| e.name != name);
        self.save_manifest()?;
        remove_with_backoff(&self.root.join(file)).map_err(store_err)
    }

    fn clear_table(&mut self, name: &str) -> Result<(), SdfError> {
        self.inner.clear_table(name)?;
        self.save_or_defer(name)
    }

    fn read_table(&self, name: &str) -> Result<Vec<Vec<String>>, SdfError> {
        self.inner.read_table(name)
    }

    fn write_range(&mut self, name: &str, row: usize, col: usize, values: &[Vec<String>]) -> Result<(), SdfError> {
        self.inner.write_range(name, row, col, values)?;
        self.save_or_defer(name)
    }

    fn cell_capacity(&self) -> usize {
        self.inner.cell_capacity()
    }

    fn begin_batch(&mut self) {
        self.batching = true;
    }

    fn end_batch(&mut self) -> Result<(), SdfError> {
        self.batching = false;
        let dirty = std::mem::take(&mut self.dirty);
        // Entries are matched by file so renames during the batch are followed
        // and deleted tables drop out.
        let names: Vec<String> = self
            .manifest
            .tables
            .iter()
            .filter(|e| dirty.contains(&e.file))
            .map(|e| e.name.clone())
            .collect();
        for name in &names {
            self.save_table(name)?;
        }
        if !names.is_empty() {
            tracing::debug!("saved {} tables at end of batch", names.len());
        }
        Ok(())
    }
}
