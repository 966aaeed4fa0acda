//! Target Catalog
//!
//! The descriptor asset that enumerates recognizable image targets. Pure
//! data: the index of a target is its position in the descriptor and stays
//! stable for the catalog's lifetime.
//!
//! ## Descriptor Format
//!
//! ```toml
//! [[targets]]
//! name = "poster"
//! image = "targets/poster.png"
//! physical_width_m = 0.21
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CatalogError, CatalogResult};

/// One recognizable image target.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TargetEntry {
    /// Human-readable name, unique within the catalog.
    pub name: String,
    /// Reference image, opaque to this crate (the engine reads it).
    pub image: PathBuf,
    /// Printed width in meters.
    pub physical_width_m: f32,
}

#[derive(Deserialize)]
struct Descriptor {
    #[serde(default)]
    targets: Vec<TargetEntry>,
}

/// Loaded, validated set of targets.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetCatalog {
    entries: Vec<TargetEntry>,
}

impl TargetCatalog {
    /// Builds a catalog from entries, validating them.
    ///
    /// # Errors
    ///
    /// Rejects empty lists, duplicate names, non-positive widths and more
    /// entries than a `u16` index can address.
    pub fn from_entries(entries: Vec<TargetEntry>) -> CatalogResult<Self> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        if entries.len() > usize::from(u16::MAX) + 1 {
            return Err(CatalogError::TooManyTargets(entries.len()));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(CatalogError::DuplicateName(entry.name.clone()));
            }
            if !(entry.physical_width_m.is_finite() && entry.physical_width_m > 0.0) {
                return Err(CatalogError::InvalidWidth {
                    name: entry.name.clone(),
                    width_m: entry.physical_width_m,
                });
            }
        }

        Ok(Self { entries })
    }

    /// Parses a descriptor from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] for malformed TOML, otherwise the
    /// validation errors of [`TargetCatalog::from_entries`].
    pub fn from_toml_str(text: &str) -> CatalogResult<Self> {
        let descriptor: Descriptor = toml::from_str(text)?;
        Self::from_entries(descriptor.targets)
    }

    /// Loads a descriptor file.
    ///
    /// Relative image paths are resolved against the descriptor's directory.
    ///
    /// # Errors
    ///
    /// I/O failures plus everything [`TargetCatalog::from_toml_str`] rejects.
    pub fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut catalog = Self::from_toml_str(&text)?;

        if let Some(base) = path.parent() {
            for entry in &mut catalog.entries {
                if entry.image.is_relative() {
                    entry.image = base.join(&entry.image);
                }
            }
        }

        tracing::info!(
            "Loaded target catalog {} ({} targets)",
            path.display(),
            catalog.len()
        );
        Ok(catalog)
    }

    /// Target at `index`.
    #[must_use]
    pub fn get(&self, index: u16) -> Option<&TargetEntry> {
        self.entries.get(usize::from(index))
    }

    /// Index of the target named `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<u16> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .and_then(|i| u16::try_from(i).ok())
    }

    /// True if `index` addresses a target.
    #[must_use]
    pub fn contains(&self, index: u16) -> bool {
        usize::from(index) < self.entries.len()
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a validated catalog.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Targets in index order.
    pub fn iter(&self) -> impl Iterator<Item = &TargetEntry> {
        self.entries.iter()
    }
}
