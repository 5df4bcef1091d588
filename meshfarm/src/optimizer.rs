//! Triangle budget enforcement.
//!
//! [`QualityOptimizer`] pushes a freshly constructed mesh toward a tier's
//! triangle target with exactly one corrective pass:
//!
//! ```text
//!   current > upper  ──►  simplify(clamp(target / current, 0.1, 1.0))
//!   current < lower  ──►  subdivide(), re-measure once
//!   otherwise        ──►  leave untouched
//! ```
//!
//! The result is accepted whatever the final count. A count still outside
//! the band is reported as a budget-unreachable warning, never an error.

use crate::engine::EngineError;
use tracing::{debug, warn};

/// Default acceptance band half-width, as a fraction of the target.
pub const DEFAULT_TOLERANCE: f64 = 0.15;

/// Smallest reduction ratio a single simplification pass may apply.
pub const MIN_SIMPLIFY_RATIO: f64 = 0.1;

/// Largest reduction ratio (no reduction).
pub const MAX_SIMPLIFY_RATIO: f64 = 1.0;

/// Mesh-density surface the optimizer drives.
///
/// Implemented by every authoring engine; measurements go through `&mut self`
/// because querying a remote engine is itself a round trip on its channel.
pub trait MeshDensity {
    /// Current triangle count of the document's mesh.
    fn triangle_count(&mut self) -> Result<u64, EngineError>;

    /// Reduces the mesh to roughly `ratio` of its current triangles.
    fn simplify(&mut self, ratio: f64) -> Result<(), EngineError>;

    /// Applies one subdivision level (roughly doubling triangles).
    fn subdivide(&mut self) -> Result<(), EngineError>;
}

/// Inclusive triangle-count band around a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetBand {
    pub target: u64,
    pub lower: u64,
    pub upper: u64,
}

impl BudgetBand {
    /// Builds the band `target × (1 ± tolerance)`.
    pub fn new(target: u64, tolerance: f64) -> Self {
        let tolerance = tolerance.clamp(0.0, 0.99);
        let t = target as f64;
        Self {
            target,
            lower: (t * (1.0 - tolerance)).floor() as u64,
            upper: (t * (1.0 + tolerance)).ceil() as u64,
        }
    }

    /// Returns true if `count` lies inside the band.
    pub fn contains(&self, count: u64) -> bool {
        (self.lower..=self.upper).contains(&count)
    }
}

/// The corrective pass the optimizer applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizePass {
    /// Already in band.
    Untouched,
    /// One simplification pass at this ratio.
    Simplified { ratio: f64 },
    /// One subdivision pass.
    Subdivided,
}

/// Outcome of one optimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizeReport {
    /// Triangle count before the pass.
    pub initial: u64,
    /// Triangle count after the pass.
    pub realized: u64,
    /// What was done.
    pub pass: OptimizePass,
    /// The band aimed for.
    pub band: BudgetBand,
}

impl OptimizeReport {
    /// Returns true if the realized count landed in band.
    pub fn within_budget(&self) -> bool {
        self.band.contains(self.realized)
    }
}

/// Single-pass triangle budget optimizer.
#[derive(Debug, Clone, Copy)]
pub struct QualityOptimizer {
    tolerance: f64,
}

impl Default for QualityOptimizer {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl QualityOptimizer {
    /// Creates an optimizer with the given band tolerance.
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Returns the configured tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Band for a target.
    pub fn band(&self, target: u64) -> BudgetBand {
        BudgetBand::new(target, self.tolerance)
    }

    /// Applies at most one corrective pass to `mesh`.
    ///
    /// Only engine failures are errors. An unreachable target is accepted
    /// and reported through [`OptimizeReport::within_budget`].
    pub fn optimize<M>(&self, mesh: &mut M, target: u64) -> Result<OptimizeReport, EngineError>
    where
        M: MeshDensity + ?Sized,
    {
        let band = self.band(target);
        let initial = mesh.triangle_count()?;

        let pass = if initial == 0 {
            OptimizePass::Untouched
        } else if initial > band.upper {
            let ratio = (target as f64 / initial as f64).clamp(MIN_SIMPLIFY_RATIO, MAX_SIMPLIFY_RATIO);
            mesh.simplify(ratio)?;
            OptimizePass::Simplified { ratio }
        } else if initial < band.lower {
            mesh.subdivide()?;
            OptimizePass::Subdivided
        } else {
            OptimizePass::Untouched
        };

        let realized = match pass {
            OptimizePass::Untouched => initial,
            _ => mesh.triangle_count()?,
        };

        let report = OptimizeReport {
            initial,
            realized,
            pass,
            band,
        };

        if report.within_budget() {
            debug!(initial, realized, target, pass = ?pass, "Mesh within triangle budget");
        } else {
            warn!(
                initial,
                realized,
                target,
                lower = band.lower,
                upper = band.upper,
                pass = ?pass,
                "Triangle budget unreachable in one pass, accepting result"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mesh stand-in that records every operation.
    struct FakeMesh {
        triangles: u64,
        simplify_calls: Vec<f64>,
        subdivide_calls: usize,
        fail_simplify: bool,
    }

    impl FakeMesh {
        fn new(triangles: u64) -> Self {
            Self {
                triangles,
                simplify_calls: Vec::new(),
                subdivide_calls: 0,
                fail_simplify: false,
            }
        }
    }

    impl MeshDensity for FakeMesh {
        fn triangle_count(&mut self) -> Result<u64, EngineError> {
            Ok(self.triangles)
        }

        fn simplify(&mut self, ratio: f64) -> Result<(), EngineError> {
            if self.fail_simplify {
                return Err(EngineError::Command("decimate failed".into()));
            }
            self.simplify_calls.push(ratio);
            self.triangles = (self.triangles as f64 * ratio).round() as u64;
            Ok(())
        }

        fn subdivide(&mut self) -> Result<(), EngineError> {
            self.subdivide_calls += 1;
            self.triangles *= 2;
            Ok(())
        }
    }

    #[test]
    fn test_band_bounds() {
        let band = BudgetBand::new(6000, 0.15);
        assert_eq!(band.lower, 5100);
        assert_eq!(band.upper, 6900);
        assert!(band.contains(5100));
        assert!(band.contains(6900));
        assert!(!band.contains(6901));
    }

    #[test]
    fn test_over_budget_simplifies_once_at_target_ratio() {
        let mut mesh = FakeMesh::new(20_000);
        let report = QualityOptimizer::default().optimize(&mut mesh, 6000).unwrap();

        assert_eq!(mesh.simplify_calls.len(), 1);
        assert!((mesh.simplify_calls[0] - 0.3).abs() < 1e-9);
        assert_eq!(mesh.subdivide_calls, 0);
        assert_eq!(report.initial, 20_000);
        assert_eq!(report.realized, 6000);
        assert!(report.within_budget());
    }

    #[test]
    fn test_under_budget_subdivides_once_and_accepts() {
        let mut mesh = FakeMesh::new(2000);
        let report = QualityOptimizer::default().optimize(&mut mesh, 6000).unwrap();

        assert_eq!(mesh.subdivide_calls, 1);
        assert!(mesh.simplify_calls.is_empty());
        assert_eq!(report.pass, OptimizePass::Subdivided);
        assert_eq!(report.realized, 4000);
        // Accepted even though it missed the band.
        assert!(!report.within_budget());
    }

    #[test]
    fn test_in_band_is_untouched() {
        let mut mesh = FakeMesh::new(6200);
        let report = QualityOptimizer::default().optimize(&mut mesh, 6000).unwrap();

        assert_eq!(report.pass, OptimizePass::Untouched);
        assert!(mesh.simplify_calls.is_empty());
        assert_eq!(mesh.subdivide_calls, 0);
        assert_eq!(report.realized, 6200);
    }

    #[test]
    fn test_ratio_is_clamped_for_tiny_targets() {
        let mut mesh = FakeMesh::new(1_000_000);
        let report = QualityOptimizer::default().optimize(&mut mesh, 10).unwrap();

        assert_eq!(
            report.pass,
            OptimizePass::Simplified {
                ratio: MIN_SIMPLIFY_RATIO
            }
        );
        assert_eq!(report.realized, 100_000);
        assert!(!report.within_budget());
    }

    #[test]
    fn test_empty_mesh_is_accepted() {
        let mut mesh = FakeMesh::new(0);
        let report = QualityOptimizer::default().optimize(&mut mesh, 600).unwrap();
        assert_eq!(report.pass, OptimizePass::Untouched);
        assert_eq!(mesh.subdivide_calls, 0);
    }

    #[test]
    fn test_engine_failure_propagates() {
        let mut mesh = FakeMesh::new(20_000);
        mesh.fail_simplify = true;
        let result = QualityOptimizer::default().optimize(&mut mesh, 6000);
        assert!(matches!(result, Err(EngineError::Command(_))));
    }
}
