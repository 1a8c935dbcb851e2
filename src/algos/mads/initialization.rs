//! X0 handling: evaluate the starting point(s), build the initial mesh and
//! barrier, and classify whether the run can proceed (`X0_FAIL` otherwise).

use std::sync::Arc;

use crate::barrier::ProgressiveBarrier;
use crate::bbout::ComputeType;
use crate::blackbox::Evaluator;
use crate::cache::Cache;
use crate::eval::EvalType;
use crate::mesh::GranularMesh;
use crate::numeric::Scalar;
use crate::params::RunConfig;
use crate::point::Point;
use crate::queue::EvaluatorControl;
use crate::step::{StopCode, StopReason};

/// Result of evaluating every X0 candidate: the barrier seeded with
/// whichever ones produced a usable `(f, h)`.
pub struct InitResult {
    pub mesh: GranularMesh,
    pub barrier: ProgressiveBarrier,
}

/// Evaluate `x0_candidates` (one run may supply several starting points)
/// and seed the barrier with every one that evaluated successfully. Raises
/// `X0_FAIL` if none did.
pub fn initialize<E: Evaluator>(
    x0_candidates: &[Point],
    cfg: &RunConfig,
    control: &EvaluatorControl<E>,
    thread_idx: usize,
    stop: &StopReason,
) -> InitResult {
    let ct = ComputeType::standard(cfg.h_norm);
    let mesh = GranularMesh::new(&cfg.initial_frame_size, &cfg.granularity)
        .with_anisotropy(cfg.anisotropic_mesh, 0.1);
    let mut barrier = ProgressiveBarrier::new(ct, Scalar::new(cfg.h_max_init));

    control.submit(thread_idx, x0_candidates.to_vec());
    control.drain(barrier.h_max());
    let evaluated = control.take_evaluated(thread_idx);

    let any_usable = evaluated.iter().any(|e| e.eval_status(EvalType::Bb).is_usable());
    if !any_usable {
        stop.set(StopCode::X0Fail);
    } else {
        barrier.update_with_points(evaluated, true, true);
    }

    InitResult { mesh, barrier }
}

/// Thin wrapper used when a caller already has a cache handle and wants
/// to check whether a point is a duplicate of an already-seeded X0.
pub fn dedupe_against_cache(cache: &Arc<Cache>, p: &Point) -> bool {
    cache.find(p, EvalType::Bb, false).is_some()
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
            max_bb_eval: Some(1000),
            max_eval: None,
            max_time_secs: None,
            opportunistic_eval: true,
            nb_threads: 1,
            seed: 0,
            stop_if_feasible: false,
            direction_type: "ORTHO_2N".to_string(),
            anisotropic_mesh: true,
        }
    }

    #[test]
    fn successful_x0_seeds_barrier() {
        let cfg = test_config(2);
        let cache = Arc::new(Cache::new());
        let stop = StopReason::new();
        let ev = ClosureEvaluator::new(OutputTypeList::new(vec![BBOutputType::Obj]), |x| {
            vec![x.coord(0).value().powi(2) + x.coord(1).value().powi(2)]
        });
        let ct = ComputeType::standard(cfg.h_norm);
        let control = EvaluatorControl::new(ev, cache, stop.clone(), ct, 1);
        let idx = control.register_thread(cfg.max_bb_eval, cfg.opportunistic_eval);
        let result = initialize(&[Point::from_f64(&[1.0, 1.0])], &cfg, &control, idx, &stop);
        assert!(!stop.is_set());
        assert_eq!(result.barrier.x_feas().len(), 1);
    }

    struct AlwaysFailsEvaluator;
    impl Evaluator for AlwaysFailsEvaluator {
        fn output_types(&self) -> OutputTypeList {
            OutputTypeList::new(vec![BBOutputType::Obj])
        }
        fn eval(&self, _x: &Point, _h_max: Scalar) -> Result<crate::bbout::BBOutput, crate::blackbox::EvaluatorError> {
            Ok(crate::bbout::BBOutput::failed())
        }
    }

    #[test]
    fn failing_x0_raises_stop() {
        let cfg = test_config(1);
        let cache = Arc::new(Cache::new());
        let stop = StopReason::new();
        let ct = ComputeType::standard(cfg.h_norm);
        let control = EvaluatorControl::new(AlwaysFailsEvaluator, cache, stop.clone(), ct, 1);
        let idx = control.register_thread(cfg.max_bb_eval, cfg.opportunistic_eval);
        initialize(&[Point::from_f64(&[1.0])], &cfg, &control, idx, &stop);
        assert_eq!(stop.get(), Some(StopCode::X0Fail));
    }
}
