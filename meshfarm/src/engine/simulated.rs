//! Deterministic in-process authoring engine.
//!
//! Used for dry runs (`engine.mode = simulated`) and throughout the tests.
//! Triangle density is derived from the entry's template and scale,
//! `simplify` scales the count, `subdivide` doubles it, and `export` writes a
//! JSON-only GLB describing the document.
//!
//! Faults are injected per (entry, tier) through a [`SimulationPlan`] and
//! fire during `export`, the first point where both are known.

use super::{glb, AuthoringEngine, EngineError, EngineFactory, ExportSettings, KillSwitch};
use crate::catalog::{AnatomyMarker, CatalogEntry, Template, VisualizationMode};
use crate::optimizer::MeshDensity;
use serde_json::json;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const STALL_POLL: Duration = Duration::from_millis(10);

/// A fault to inject for one (entry, tier) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// `export` fails with this message.
    Fail(String),
    /// `export` reports success without writing a file.
    NoOutput,
    /// `export` blocks for this long (or until killed) before succeeding.
    Stall(Duration),
}

/// Deterministic behaviour overrides for simulated engines.
#[derive(Debug, Clone, Default)]
pub struct SimulationPlan {
    faults: HashMap<(String, String), Fault>,
    densities: HashMap<String, u64>,
}

impl SimulationPlan {
    /// Plan with no faults and template-derived densities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects `fault` for (entry, tier).
    pub fn with_fault(
        mut self,
        entry: impl Into<String>,
        tier: impl Into<String>,
        fault: Fault,
    ) -> Self {
        self.faults.insert((entry.into(), tier.into()), fault);
        self
    }

    /// Overrides the base triangle count constructed for an entry.
    pub fn with_density(mut self, entry: impl Into<String>, triangles: u64) -> Self {
        self.densities.insert(entry.into(), triangles);
        self
    }

    fn fault(&self, entry: &str, tier: &str) -> Option<&Fault> {
        self.faults.get(&(entry.to_string(), tier.to_string()))
    }
}

/// Base triangle density of a freshly constructed template.
fn template_density(template: Template) -> u64 {
    match template {
        Template::QuadrupedSmall => 8_000,
        Template::QuadrupedMedium => 12_000,
        Template::QuadrupedLarge => 18_000,
        Template::BirdSmall => 4_000,
        Template::BirdMedium => 6_000,
        Template::ReptileSnake => 5_000,
        Template::ReptileLizard => 7_000,
        Template::ReptileTurtle => 9_000,
        Template::Fish => 3_000,
    }
}

#[derive(Debug)]
struct Document {
    entry_id: String,
    display_name: String,
    construct_mode: VisualizationMode,
    triangles: u64,
    markers: Vec<AnatomyMarker>,
    material: Option<VisualizationMode>,
}

/// In-process engine with a single simulated document.
pub struct SimulatedEngine {
    plan: Arc<SimulationPlan>,
    document: Option<Document>,
    killed: Arc<AtomicBool>,
}

impl SimulatedEngine {
    /// Creates an engine following `plan`.
    pub fn new(plan: Arc<SimulationPlan>) -> Self {
        Self {
            plan,
            document: None,
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn check_alive(&self) -> Result<(), EngineError> {
        if self.killed.load(Ordering::SeqCst) {
            return Err(EngineError::Terminated);
        }
        Ok(())
    }

    fn document_mut(&mut self) -> Result<&mut Document, EngineError> {
        self.check_alive()?;
        self.document
            .as_mut()
            .ok_or_else(|| EngineError::Command("no document constructed".into()))
    }

    fn stall(&self, duration: Duration) -> Result<(), EngineError> {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.check_alive()?;
            thread::sleep(STALL_POLL);
        }
        self.check_alive()
    }
}

impl MeshDensity for SimulatedEngine {
    fn triangle_count(&mut self) -> Result<u64, EngineError> {
        Ok(self.document_mut()?.triangles)
    }

    fn simplify(&mut self, ratio: f64) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(EngineError::Command(format!(
                "decimate ratio {ratio} out of range"
            )));
        }
        let doc = self.document_mut()?;
        doc.triangles = (doc.triangles as f64 * ratio).round() as u64;
        Ok(())
    }

    fn subdivide(&mut self) -> Result<(), EngineError> {
        let doc = self.document_mut()?;
        doc.triangles = doc.triangles.saturating_mul(2);
        Ok(())
    }
}

impl AuthoringEngine for SimulatedEngine {
    fn reset(&mut self) -> Result<(), EngineError> {
        self.check_alive()?;
        self.document = None;
        Ok(())
    }

    fn construct(
        &mut self,
        entry: &CatalogEntry,
        mode: VisualizationMode,
    ) -> Result<(), EngineError> {
        self.check_alive()?;
        let triangles = match self.plan.densities.get(&entry.id) {
            Some(&count) => count,
            None => {
                let scale = f64::from(entry.scale).clamp(0.5, 2.0);
                (template_density(entry.template) as f64 * scale).round() as u64
            }
        };
        self.document = Some(Document {
            entry_id: entry.id.clone(),
            display_name: entry.display_name.clone(),
            construct_mode: mode,
            triangles,
            markers: Vec::new(),
            material: None,
        });
        Ok(())
    }

    fn attach_markers(&mut self, markers: &[AnatomyMarker]) -> Result<(), EngineError> {
        self.document_mut()?.markers.extend_from_slice(markers);
        Ok(())
    }

    fn apply_material(
        &mut self,
        _entry: &CatalogEntry,
        mode: VisualizationMode,
    ) -> Result<(), EngineError> {
        self.document_mut()?.material = Some(mode);
        Ok(())
    }

    fn export(&mut self, path: &Path, settings: &ExportSettings) -> Result<(), EngineError> {
        let plan = Arc::clone(&self.plan);
        let entry_id = self.document_mut()?.entry_id.clone();

        match plan.fault(&entry_id, &settings.tier) {
            Some(Fault::Fail(message)) => return Err(EngineError::Command(message.clone())),
            Some(Fault::NoOutput) => return Ok(()),
            Some(Fault::Stall(duration)) => self.stall(*duration)?,
            None => {}
        }

        let doc = self.document_mut()?;
        let markers: Vec<_> = if settings.export_markers {
            doc.markers
                .iter()
                .map(|m| json!({"name": m.name, "translation": m.offset, "extras": {"marker": true}}))
                .collect()
        } else {
            Vec::new()
        };

        let document = json!({
            "asset": {"version": "2.0", "generator": "meshfarm-simulated"},
            "scene": 0,
            "scenes": [{"name": doc.display_name}],
            "nodes": markers,
            "extras": {
                "entry": doc.entry_id,
                "construct_mode": doc.construct_mode,
                "material": doc.material,
                "triangles": doc.triangles,
                "tier": settings.tier,
                "texture_size": settings.texture_size,
                "quantization": settings.quantization,
            }
        });

        let mut writer = BufWriter::new(File::create(path)?);
        glb::write(&mut writer, &document)?;
        writer.flush()?;
        Ok(())
    }

    fn kill_switch(&self) -> Option<KillSwitch> {
        Some(KillSwitch::Flag(Arc::clone(&self.killed)))
    }

    fn is_alive(&mut self) -> bool {
        !self.killed.load(Ordering::SeqCst)
    }
}

/// Factory for [`SimulatedEngine`]s sharing one plan.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEngineFactory {
    plan: Arc<SimulationPlan>,
}

impl SimulatedEngineFactory {
    /// Creates a factory following `plan`.
    pub fn new(plan: SimulationPlan) -> Self {
        Self {
            plan: Arc::new(plan),
        }
    }
}

impl EngineFactory for SimulatedEngineFactory {
    fn launch(&self) -> Result<Box<dyn AuthoringEngine>, EngineError> {
        Ok(Box::new(SimulatedEngine::new(Arc::clone(&self.plan))))
    }

    fn describe(&self) -> String {
        "simulated".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Compression, QualityTier};
    use tempfile::TempDir;

    fn fox() -> CatalogEntry {
        CatalogEntry::new(
            "fox",
            "Fox",
            vec!["low".into()],
            vec![VisualizationMode::Normal],
        )
        .with_markers(vec![AnatomyMarker::new("heart", [0.1, 0.0, 0.2])])
    }

    fn low_settings() -> ExportSettings {
        ExportSettings::for_tier(&QualityTier::new("low", 600, 256, Compression::High))
    }

    #[test]
    fn test_density_follows_template_and_scale() {
        let mut engine = SimulatedEngine::new(Arc::default());
        let mut entry = fox();
        entry.scale = 2.0;
        engine.construct(&entry, VisualizationMode::Normal).unwrap();
        assert_eq!(engine.triangle_count().unwrap(), 24_000);
    }

    #[test]
    fn test_density_override() {
        let plan = SimulationPlan::new().with_density("fox", 20_000);
        let mut engine = SimulatedEngine::new(Arc::new(plan));
        engine.construct(&fox(), VisualizationMode::Normal).unwrap();
        engine.simplify(0.3).unwrap();
        assert_eq!(engine.triangle_count().unwrap(), 6000);
        engine.subdivide().unwrap();
        assert_eq!(engine.triangle_count().unwrap(), 12_000);
    }

    #[test]
    fn test_operations_need_a_document() {
        let mut engine = SimulatedEngine::new(Arc::default());
        assert!(matches!(
            engine.triangle_count(),
            Err(EngineError::Command(_))
        ));
    }

    #[test]
    fn test_export_writes_glb_with_markers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fox_low.glb");
        let mut engine = SimulatedEngine::new(Arc::default());
        let entry = fox();
        engine.construct(&entry, VisualizationMode::Xray).unwrap();
        engine.attach_markers(&entry.markers).unwrap();
        engine
            .apply_material(&entry, VisualizationMode::Xray)
            .unwrap();
        engine.export(&path, &low_settings()).unwrap();

        let doc = glb::decode_json(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc["extras"]["material"], "xray");
        assert_eq!(doc["extras"]["tier"], "low");
        assert_eq!(doc["nodes"][0]["name"], "heart");
    }

    #[test]
    fn test_injected_failure_and_missing_output() {
        let dir = TempDir::new().unwrap();
        let plan = SimulationPlan::new()
            .with_fault("fox", "low", Fault::Fail("boom".into()))
            .with_fault("fox", "high", Fault::NoOutput);
        let mut engine = SimulatedEngine::new(Arc::new(plan));
        engine.construct(&fox(), VisualizationMode::Normal).unwrap();

        let err = engine
            .export(&dir.path().join("a.glb"), &low_settings())
            .unwrap_err();
        assert!(matches!(err, EngineError::Command(ref m) if m == "boom"));

        let mut high = low_settings();
        high.tier = "high".into();
        let path = dir.path().join("b.glb");
        engine.export(&path, &high).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_kill_switch_interrupts_stall() {
        let dir = TempDir::new().unwrap();
        let plan =
            SimulationPlan::new().with_fault("fox", "low", Fault::Stall(Duration::from_secs(30)));
        let mut engine = SimulatedEngine::new(Arc::new(plan));
        engine.construct(&fox(), VisualizationMode::Normal).unwrap();
        let switch = engine.kill_switch().unwrap();

        let killer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            switch.trigger();
        });
        let started = Instant::now();
        let err = engine
            .export(&dir.path().join("c.glb"), &low_settings())
            .unwrap_err();
        killer.join().unwrap();

        assert!(matches!(err, EngineError::Terminated));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!engine.is_alive());
    }
}
