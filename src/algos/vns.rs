//! VNS shake: perturb the incumbent by a growing-radius random direction
//! and seed a sub-MADS at the shaken point; on return, its barrier is
//! folded back into the parent's.

use std::sync::Arc;

use crate::barrier::ProgressiveBarrier;
use crate::bbout::ComputeType;
use crate::blackbox::Evaluator;
use crate::cache::Cache;
use crate::eval::{EvalPoint, GeneratedBy};
use crate::mesh::GranularMesh;
use crate::numeric::Scalar;
use crate::params::RunConfig;
use crate::point::{Direction, Point};
use crate::queue::EvaluatorControl;
use crate::rng::RngContext;
use crate::step::{CallbackRegistry, StopCode, StopReason};

use super::mads::megaiteration::MegaIteration;

/// Neighborhood parameter: grows on a failed shake (nothing found), resets
/// to its base radius on success, matching the classical VNS escalation
/// rule.
pub struct VnsNeighborhood {
    base_radius: f64,
    radius: f64,
    growth: f64,
}

impl VnsNeighborhood {
    pub fn new(base_radius: f64) -> Self {
        Self {
            base_radius,
            radius: base_radius,
            growth: 1.5,
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn on_failure(&mut self) {
        self.radius *= self.growth;
    }

    pub fn on_success(&mut self) {
        self.radius = self.base_radius;
    }
}

/// Draw a random unit-norm displacement scaled by `radius` and apply it to
/// `incumbent`, snapping to bounds.
pub fn shake(incumbent: &Point, radius: f64, lb: &Point, ub: &Point, rng: &mut RngContext) -> Point {
    let n = incumbent.dim();
    let mut coords = Vec::with_capacity(n);
    for _ in 0..n {
        coords.push(Scalar::new(rng.uniform(-1.0, 1.0)));
    }
    let dir = Direction::new(coords);
    let norm = dir.norm2();
    let dir = if norm.is_defined() && norm.value() > 0.0 {
        dir.scale(radius / norm.value())
    } else {
        dir
    };
    let mut shaken = incumbent.add_direction(&dir);
    shaken.snap_to_bounds(lb, ub);
    shaken
}

pub struct VnsOutcome {
    pub imported: Vec<EvalPoint>,
    pub improved: bool,
}

/// Shake `incumbent`, then run a full sub-MADS at the shaken point under
/// the same STANDARD compute-type as the parent; any point it finds is
/// handed back for the caller to fold into its own barrier via
/// [`ProgressiveBarrier::update_with_points`].
pub fn run_vns_shake<E>(
    evaluator: E,
    cache: Arc<Cache>,
    incumbent: &Point,
    radius: f64,
    cfg: &RunConfig,
) -> VnsOutcome
where
    E: Evaluator + Clone,
{
    let lb = Point::from_f64(&cfg.lower_bound);
    let ub = Point::from_f64(&cfg.upper_bound);
    let mut rng = RngContext::from_seed(cfg.seed);
    let shaken = shake(incumbent, radius, &lb, &ub, &mut rng);

    let sub_stop = StopReason::new();
    let ct = ComputeType::standard(cfg.h_norm);
    let control = Arc::new(EvaluatorControl::new(evaluator, cache, sub_stop.clone(), ct, 1));
    let thread_idx = control.register_thread(cfg.max_bb_eval, cfg.opportunistic_eval);

    control.submit(thread_idx, vec![shaken]);
    control.drain(Scalar::new(f64::INFINITY));
    let evaluated = control.take_evaluated(thread_idx);

    let mut barrier = ProgressiveBarrier::new(ct, Scalar::new(f64::INFINITY));
    let initial_success = barrier.update_with_points(evaluated, true, true);

    if barrier.x_feas().is_empty() && barrier.x_inf().is_empty() {
        return VnsOutcome {
            imported: Vec::new(),
            improved: false,
        };
    }

    let mesh = GranularMesh::new(&cfg.initial_frame_size, &cfg.granularity);
    let mut mega = MegaIteration::new(
        mesh,
        barrier,
        rng,
        control,
        thread_idx,
        cfg.clone(),
        sub_stop,
        CallbackRegistry::new(),
    );
    let stop = mega.run_to_completion();
    let improved = initial_success != crate::barrier::SuccessType::Unsuccessful
        || matches!(stop, StopCode::MeshPrecReached | StopCode::GranularMeshPrecReached);

    let mut imported: Vec<EvalPoint> = mega.barrier.x_feas().to_vec();
    imported.extend(mega.barrier.x_inf().to_vec());
    let imported = imported
        .into_iter()
        .map(|p| {
            let x = p.x().clone();
            p.with_provenance(GeneratedBy::VnsShake, x)
        })
        .collect();

    VnsOutcome { imported, improved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbout::{BBOutputType, OutputTypeList};
    use crate::blackbox::ClosureEvaluator;
    use crate::point::HNormType;

    fn test_config(dim: usize) -> RunConfig {
        RunConfig {
            dimension: dim,
            lower_bound: vec![-10.0; dim],
            upper_bound: vec![10.0; dim],
            granularity: vec![0.0; dim],
            initial_frame_size: vec![1.0; dim],
            h_norm: HNormType::L2,
            h_max_init: f64::INFINITY,
            max_bb_eval: Some(50),
            max_eval: None,
            max_time_secs: None,
            opportunistic_eval: false,
            nb_threads: 1,
            seed: 11,
            stop_if_feasible: false,
            direction_type: "ORTHO_2N".to_string(),
            anisotropic_mesh: true,
        }
    }

    #[test]
    fn neighborhood_grows_then_resets() {
        let mut vns = VnsNeighborhood::new(1.0);
        vns.on_failure();
        assert!(vns.radius() > 1.0);
        vns.on_success();
        assert_eq!(vns.radius(), 1.0);
    }

    #[test]
    fn shake_respects_bounds() {
        let mut rng = RngContext::from_seed(3);
        let incumbent = Point::from_f64(&[0.0, 0.0]);
        let lb = Point::from_f64(&[-1.0, -1.0]);
        let ub = Point::from_f64(&[1.0, 1.0]);
        let shaken = shake(&incumbent, 5.0, &lb, &ub, &mut rng);
        for c in shaken.coords() {
            assert!(c.value() >= -1.0 - 1e-9 && c.value() <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn vns_shake_finds_points() {
        let cfg = test_config(2);
        let cache = Arc::new(Cache::new());
        let ev = ClosureEvaluator::new(OutputTypeList::new(vec![BBOutputType::Obj]), |x| {
            vec![x.coord(0).value().powi(2) + x.coord(1).value().powi(2)]
        });
        let outcome = run_vns_shake(ev, cache, &Point::from_f64(&[5.0, 5.0]), 1.0, &cfg);
        assert!(!outcome.imported.is_empty());
    }
}
