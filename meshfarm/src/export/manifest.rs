//! Per-entry manifest.

use crate::catalog::{CatalogEntry, VisualizationMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Value of the manifest `generator` field.
pub const GENERATOR: &str = concat!("meshfarm ", env!("CARGO_PKG_VERSION"));

/// Metadata describing which tiers of an entry exist and where.
///
/// ```json
/// {
///   "entry_id": "fox",
///   "display_name": "Fox",
///   "tiers": {"low": "fox_low.glb"},
///   "markers": {"heart": [0.3, 0.0, 0.6]},
///   "modes": ["normal", "xray"],
///   "generated_at": "2026-10-18T09:12:44Z",
///   "generator": "meshfarm 0.3.0"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub entry_id: String,
    pub display_name: String,
    /// Tier name → file name, relative to the manifest.
    pub tiers: BTreeMap<String, String>,
    /// Marker name → offset.
    pub markers: BTreeMap<String, [f32; 3]>,
    pub modes: Vec<VisualizationMode>,
    pub generated_at: DateTime<Utc>,
    pub generator: String,
}

impl Manifest {
    /// Empty tier map for `entry`, stamped now.
    pub fn for_entry(entry: &CatalogEntry) -> Self {
        Self {
            entry_id: entry.id.clone(),
            display_name: entry.display_name.clone(),
            tiers: BTreeMap::new(),
            markers: entry
                .markers
                .iter()
                .map(|m| (m.name.clone(), m.offset))
                .collect(),
            modes: entry.modes.clone(),
            generated_at: Utc::now(),
            generator: GENERATOR.to_string(),
        }
    }

    pub(crate) fn insert_tier(&mut self, tier: &str, file: String) {
        self.tiers.insert(tier.to_string(), file);
    }

    /// Names of the tiers listed.
    pub fn tier_names(&self) -> BTreeSet<String> {
        self.tiers.keys().cloned().collect()
    }
}
