//! Catalog data types.
//!
//! Everything here is immutable once the registry is loaded. The engine sees
//! these values opaquely: geometry and material construction live on the
//! engine side of the bridge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::CatalogError;

/// Alternate material/appearance variant of the same geometry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationMode {
    /// Natural appearance.
    #[default]
    Normal,
    /// Translucent blue-tinted shell.
    Xray,
    /// Monochrome sonography look.
    Ultrasound,
    /// Cross-section greyscale look.
    Mri,
    /// Heat-map emission.
    Thermal,
}

impl VisualizationMode {
    /// Every mode, in presentation order.
    pub const ALL: [VisualizationMode; 5] = [
        Self::Normal,
        Self::Xray,
        Self::Ultrasound,
        Self::Mri,
        Self::Thermal,
    ];

    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Xray => "xray",
            Self::Ultrasound => "ultrasound",
            Self::Mri => "mri",
            Self::Thermal => "thermal",
        }
    }
}

impl fmt::Display for VisualizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisualizationMode {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CatalogError::UnknownMode(s.to_string()))
    }
}

/// How aggressively the exporter compresses geometry.
///
/// Maps onto Draco-style quantization bit depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Strongest compression, for mobile targets.
    High,
    /// Balanced compression.
    Medium,
    /// Light compression.
    Low,
    /// No mesh compression.
    None,
}

/// Quantization bit depths handed to the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantization {
    /// Bits used for vertex positions.
    pub position_bits: u8,
    /// Bits used for texture coordinates.
    pub texcoord_bits: u8,
}

impl Compression {
    /// Quantization settings, or `None` when compression is disabled.
    pub fn quantization(&self) -> Option<Quantization> {
        let (position_bits, texcoord_bits) = match self {
            Self::High => (14, 12),
            Self::Medium => (12, 10),
            Self::Low => (10, 8),
            Self::None => return None,
        };
        Some(Quantization {
            position_bits,
            texcoord_bits,
        })
    }

    /// Returns true when the exporter should compress meshes at all.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// A named complexity/size budget for exporting an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTier {
    /// Tier name, used in file names (`<entry>_<tier>.glb`).
    pub name: String,
    /// Triangle count the optimizer aims for.
    pub target_triangles: u64,
    /// Target texture edge length in pixels.
    pub texture_size: u32,
    /// Compression aggressiveness.
    pub compression: Compression,
}

impl QualityTier {
    /// Creates a tier.
    pub fn new(
        name: impl Into<String>,
        target_triangles: u64,
        texture_size: u32,
        compression: Compression,
    ) -> Self {
        Self {
            name: name.into(),
            target_triangles,
            texture_size,
            compression,
        }
    }
}

/// Named, non-rendered 3D point attached to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnatomyMarker {
    /// Marker name (e.g. `heart`).
    pub name: String,
    /// Offset from the model origin.
    pub offset: [f32; 3],
}

impl AnatomyMarker {
    /// Creates a marker.
    pub fn new(name: impl Into<String>, offset: [f32; 3]) -> Self {
        Self {
            name: name.into(),
            offset,
        }
    }
}

/// Procedural template family the engine builds an entry from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    QuadrupedSmall,
    #[default]
    QuadrupedMedium,
    QuadrupedLarge,
    BirdSmall,
    BirdMedium,
    ReptileSnake,
    ReptileLizard,
    ReptileTurtle,
    Fish,
}

impl Template {
    /// Wire name of the template.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuadrupedSmall => "quadruped_small",
            Self::QuadrupedMedium => "quadruped_medium",
            Self::QuadrupedLarge => "quadruped_large",
            Self::BirdSmall => "bird_small",
            Self::BirdMedium => "bird_medium",
            Self::ReptileSnake => "reptile_snake",
            Self::ReptileLizard => "reptile_lizard",
            Self::ReptileTurtle => "reptile_turtle",
            Self::Fish => "fish",
        }
    }
}

/// Relative body dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyProportions {
    pub length: f32,
    pub height: f32,
    pub width: f32,
}

impl Default for BodyProportions {
    fn default() -> Self {
        Self {
            length: 1.0,
            height: 1.0,
            width: 1.0,
        }
    }
}

fn default_scale() -> f32 {
    1.0
}

/// One buildable content item with a stable id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Stable id, used in directory and file names.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Template family.
    #[serde(default)]
    pub template: Template,
    /// Uniform scale factor.
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Body proportions.
    #[serde(default)]
    pub proportions: BodyProportions,
    /// Colour palette, primary first.
    #[serde(default)]
    pub colors: Vec<String>,
    /// Species feature tags interpreted by the engine.
    #[serde(default)]
    pub features: Vec<String>,
    /// Names of the quality tiers this entry is built in.
    pub tiers: Vec<String>,
    /// Visualization modes this entry supports.
    pub modes: Vec<VisualizationMode>,
    /// Anatomy markers.
    #[serde(default)]
    pub markers: Vec<AnatomyMarker>,
}

impl CatalogEntry {
    /// Creates an entry with default template, scale and proportions.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        tiers: Vec<String>,
        modes: Vec<VisualizationMode>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            template: Template::default(),
            scale: default_scale(),
            proportions: BodyProportions::default(),
            colors: Vec::new(),
            features: Vec::new(),
            tiers,
            modes,
            markers: Vec::new(),
        }
    }

    /// Replaces the markers.
    pub fn with_markers(mut self, markers: Vec<AnatomyMarker>) -> Self {
        self.markers = markers;
        self
    }

    /// Returns true if the entry is built in the named tier.
    pub fn supports_tier(&self, tier: &str) -> bool {
        self.tiers.iter().any(|t| t == tier)
    }

    /// Returns true if the entry supports the mode.
    pub fn supports_mode(&self, mode: VisualizationMode) -> bool {
        self.modes.contains(&mode)
    }
}
