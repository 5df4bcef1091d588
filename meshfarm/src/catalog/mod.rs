//! Catalog of buildable entries, quality tiers and visualization modes.
//!
//! The [`CatalogRegistry`] is loaded once at startup, either from the
//! built-in table ([`CatalogRegistry::builtin`]) or from a JSON file, and is
//! shared read-only across the scheduler, workers and server.
//!
//! # JSON catalog format
//!
//! ```json
//! {
//!   "tiers": [
//!     {"name": "low", "target_triangles": 600, "texture_size": 256, "compression": "high"}
//!   ],
//!   "entries": [
//!     {"id": "fox", "display_name": "Fox", "tiers": ["low"], "modes": ["normal"]}
//!   ]
//! }
//! ```

mod builtin;
mod types;

pub use types::{
    AnatomyMarker, BodyProportions, CatalogEntry, Compression, QualityTier, Quantization,
    Template, VisualizationMode,
};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Catalog lookup and validation errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No entry with this id.
    #[error("Unknown catalog entry '{0}'")]
    UnknownEntry(String),

    /// No tier with this name.
    #[error("Unknown quality tier '{0}'")]
    UnknownTier(String),

    /// Mode name not recognised.
    #[error("Unknown visualization mode '{0}'")]
    UnknownMode(String),

    /// Entry exists but is not built in this tier.
    #[error("Entry '{entry}' does not support tier '{tier}'")]
    TierNotSupported { entry: String, tier: String },

    /// Entry exists but does not offer this mode.
    #[error("Entry '{entry}' does not support mode '{mode}'")]
    ModeNotSupported {
        entry: String,
        mode: VisualizationMode,
    },

    /// The catalog definition is inconsistent.
    #[error("Invalid catalog: {0}")]
    Invalid(String),

    /// Failed to read a catalog file.
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a catalog file.
    #[error("Failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct CatalogFile {
    tiers: Vec<QualityTier>,
    entries: Vec<CatalogEntry>,
}

/// Static table of entries × tiers × modes.
#[derive(Debug, Clone)]
pub struct CatalogRegistry {
    tiers: BTreeMap<String, QualityTier>,
    entries: BTreeMap<String, CatalogEntry>,
}

impl CatalogRegistry {
    /// Builds a registry, validating cross references.
    ///
    /// Ids and tier names must be non-empty and limited to
    /// `[a-z0-9_-]` since they become path components. Every tier an entry
    /// references must be defined, and every entry needs at least one tier
    /// and one mode.
    pub fn new(tiers: Vec<QualityTier>, entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        let mut tier_map = BTreeMap::new();
        for tier in tiers {
            validate_name("tier", &tier.name)?;
            if tier.target_triangles == 0 {
                return Err(CatalogError::Invalid(format!(
                    "tier '{}' has a zero triangle target",
                    tier.name
                )));
            }
            if tier_map.insert(tier.name.clone(), tier).is_some() {
                return Err(CatalogError::Invalid("duplicate tier name".to_string()));
            }
        }

        let mut entry_map = BTreeMap::new();
        for entry in entries {
            validate_name("entry", &entry.id)?;
            if entry.tiers.is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "entry '{}' declares no tiers",
                    entry.id
                )));
            }
            if entry.modes.is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "entry '{}' declares no modes",
                    entry.id
                )));
            }
            if let Some(missing) = entry.tiers.iter().find(|t| !tier_map.contains_key(*t)) {
                return Err(CatalogError::Invalid(format!(
                    "entry '{}' references undefined tier '{}'",
                    entry.id, missing
                )));
            }
            let id = entry.id.clone();
            if entry_map.insert(id.clone(), entry).is_some() {
                return Err(CatalogError::Invalid(format!("duplicate entry id '{}'", id)));
            }
        }

        Ok(Self {
            tiers: tier_map,
            entries: entry_map,
        })
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        Self {
            tiers: builtin::tiers()
                .into_iter()
                .map(|t| (t.name.clone(), t))
                .collect(),
            entries: builtin::entries()
                .into_iter()
                .map(|e| (e.id.clone(), e))
                .collect(),
        }
    }

    /// Loads and validates a JSON catalog file.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parses and validates a JSON catalog.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.tiers, file.entries)
    }

    /// Looks up an entry.
    pub fn entry(&self, id: &str) -> Result<&CatalogEntry, CatalogError> {
        self.entries
            .get(id)
            .ok_or_else(|| CatalogError::UnknownEntry(id.to_string()))
    }

    /// Looks up a tier.
    pub fn tier(&self, name: &str) -> Result<&QualityTier, CatalogError> {
        self.tiers
            .get(name)
            .ok_or_else(|| CatalogError::UnknownTier(name.to_string()))
    }

    /// Resolves a build triple, checking the entry supports the tier and mode.
    pub fn resolve(
        &self,
        entry_id: &str,
        tier: &str,
        mode: VisualizationMode,
    ) -> Result<(&CatalogEntry, &QualityTier), CatalogError> {
        let entry = self.entry(entry_id)?;
        let quality = self.tier(tier)?;
        if !entry.supports_tier(tier) {
            return Err(CatalogError::TierNotSupported {
                entry: entry_id.to_string(),
                tier: tier.to_string(),
            });
        }
        if !entry.supports_mode(mode) {
            return Err(CatalogError::ModeNotSupported {
                entry: entry_id.to_string(),
                mode,
            });
        }
        Ok((entry, quality))
    }

    /// Tiers an entry is built in, in declaration order.
    pub fn tiers_for(&self, entry_id: &str) -> Result<Vec<&QualityTier>, CatalogError> {
        let entry = self.entry(entry_id)?;
        entry.tiers.iter().map(|name| self.tier(name)).collect()
    }

    /// All entries, ordered by id.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// All tiers, ordered by name.
    pub fn tiers(&self) -> impl Iterator<Item = &QualityTier> {
        self.tiers.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_name(kind: &str, name: &str) -> Result<(), CatalogError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CatalogError::Invalid(format!(
            "{} name '{}' must be non-empty and use only [a-z0-9_-]",
            kind, name
        )))
    }
}
