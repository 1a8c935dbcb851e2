//! Top-level algorithm dispatch. The entry point a caller drives: a plain
//! MADS run when X0 is already EB-feasible, or a phase-one detour first
//! when it isn't, sharing one evaluator control (and its cache and
//! budget) across both.

use std::sync::Arc;

use enum_dispatch::enum_dispatch;

use crate::barrier::ProgressiveBarrier;
use crate::bbout::{ComputeType, EvalType};
use crate::blackbox::DynEvaluator;
use crate::cache::Cache;
use crate::eval::EvalPoint;
use crate::mesh::GranularMesh;
use crate::numeric::{Scalar, DEFAULT_EPSILON};
use crate::params::RunConfig;
use crate::point::Point;
use crate::queue::EvaluatorControl;
use crate::rng::RngContext;
use crate::step::{CallbackRegistry, StopCode, StopReason};

use super::mads::megaiteration::MegaIteration;

#[enum_dispatch]
pub trait AlgorithmRun {
    /// Run to completion, returning the reason the run stopped.
    fn run(&mut self) -> StopCode;
    /// The incumbent barrier after `run()` (or the seed barrier before it).
    fn barrier(&self) -> &ProgressiveBarrier;
}

/// X0 was already EB-feasible (or there are no EB constraints): a single
/// MADS mega-iteration loop from the seeded barrier.
pub struct MadsRun {
    mega: MegaIteration<DynEvaluator>,
}

impl AlgorithmRun for MadsRun {
    fn run(&mut self) -> StopCode {
        self.mega.run_to_completion()
    }

    fn barrier(&self) -> &ProgressiveBarrier {
        &self.mega.barrier
    }
}

/// X0 was EB-infeasible: a phase-one MADS (minimizing EB-violation) runs
/// first, sharing the same [`EvaluatorControl`]/budget/cache as the main
/// run it feeds into once feasibility is reached.
pub struct PhaseOneThenMadsRun {
    control: Arc<EvaluatorControl<DynEvaluator>>,
    thread_idx: usize,
    cfg: RunConfig,
    stop_reason: StopReason,
    phase_barrier: ProgressiveBarrier,
    mesh: GranularMesh,
    standard_ct: ComputeType,
    main_barrier: Option<ProgressiveBarrier>,
}

fn is_phase_one_winner(p: &EvalPoint, ct: ComputeType) -> bool {
    let mut p = p.clone();
    let (f, _) = p.fh(ct);
    f.is_defined() && f.value() <= DEFAULT_EPSILON
}

impl AlgorithmRun for PhaseOneThenMadsRun {
    fn run(&mut self) -> StopCode {
        let phase_ct = self.phase_barrier.compute_type();
        let rng = RngContext::from_seed(self.cfg.seed);
        let placeholder = ProgressiveBarrier::new(self.standard_ct, Scalar::new(f64::INFINITY));
        let phase_barrier = std::mem::replace(&mut self.phase_barrier, placeholder);
        let mut phase_mega = MegaIteration::new(
            self.mesh.clone(),
            phase_barrier,
            rng,
            Arc::clone(&self.control),
            self.thread_idx,
            self.cfg.clone(),
            self.stop_reason.clone(),
            CallbackRegistry::new(),
        );

        let mut winner = None;
        loop {
            if phase_mega.barrier.x_feas().iter().any(|p| is_phase_one_winner(p, phase_ct)) {
                winner = phase_mega
                    .barrier
                    .x_feas()
                    .iter()
                    .cloned()
                    .find(|p| is_phase_one_winner(p, phase_ct));
                break;
            }
            if !phase_mega.step() {
                break;
            }
        }

        let seed_points: Vec<EvalPoint> = match winner {
            Some(w) => vec![w],
            None => phase_mega.barrier.x_feas().to_vec(),
        };

        let mut main_barrier = ProgressiveBarrier::new(self.standard_ct, Scalar::new(self.cfg.h_max_init));
        main_barrier.update_with_points(seed_points, true, true);
        if main_barrier.x_feas().is_empty() && main_barrier.x_inf().is_empty() {
            self.stop_reason.set(StopCode::PoneSearchFailed);
            self.main_barrier = Some(main_barrier);
            return self.stop_reason.get().unwrap_or(StopCode::PoneSearchFailed);
        }

        let rng2 = RngContext::from_seed(self.cfg.seed.wrapping_add(1));
        let mut mega = MegaIteration::new(
            self.mesh.clone(),
            main_barrier,
            rng2,
            Arc::clone(&self.control),
            self.thread_idx,
            self.cfg.clone(),
            self.stop_reason.clone(),
            CallbackRegistry::new(),
        )
        .with_vns_shake(true);
        let code = mega.run_to_completion();
        self.main_barrier = Some(mega.barrier);
        code
    }

    fn barrier(&self) -> &ProgressiveBarrier {
        self.main_barrier.as_ref().unwrap_or(&self.phase_barrier)
    }
}

#[enum_dispatch(AlgorithmRun)]
pub enum Algorithm {
    Mads(MadsRun),
    PhaseOneThenMads(PhaseOneThenMadsRun),
}

impl Algorithm {
    /// Evaluate `x0_candidates` once and pick the right variant: a plain
    /// MADS run if any candidate already satisfies the EB constraints, a
    /// phase-one-first run otherwise. The X0 evaluation is never repeated:
    /// whichever [`ComputeType`] a later step needs re-derives `(f, h)`
    /// from the same cached blackbox output.
    pub fn new_auto(evaluator: DynEvaluator, x0_candidates: Vec<Point>, cfg: RunConfig) -> Self {
        let cache = Arc::new(Cache::new());
        let stop_reason = StopReason::new();
        let standard_ct = ComputeType::standard(cfg.h_norm);
        let control = Arc::new(EvaluatorControl::new(
            evaluator,
            cache,
            stop_reason.clone(),
            standard_ct,
            cfg.nb_threads,
        ));
        let thread_idx = control.register_thread(cfg.max_bb_eval, cfg.opportunistic_eval);

        control.submit(thread_idx, x0_candidates);
        control.drain(Scalar::new(f64::INFINITY));
        let x0_evaluated = control.take_evaluated(thread_idx);

        let any_eb_feasible = x0_evaluated.iter().cloned().any(|mut p| {
            let (_, h) = p.fh(standard_ct);
            h.is_defined() && h.is_finite()
        });

        let mesh = GranularMesh::new(&cfg.initial_frame_size, &cfg.granularity)
            .with_anisotropy(cfg.anisotropic_mesh, 0.1);

        tracing::info!(
            nb_x0 = x0_evaluated.len(),
            any_eb_feasible,
            "picking algorithm variant after x0 probe",
        );
        if any_eb_feasible || x0_evaluated.is_empty() {
            let mut barrier = ProgressiveBarrier::new(standard_ct, Scalar::new(cfg.h_max_init));
            if x0_evaluated.iter().any(|e| e.eval_status(EvalType::Bb).is_usable()) {
                barrier.update_with_points(x0_evaluated, true, true);
            } else {
                stop_reason.set(StopCode::X0Fail);
            }
            let rng = RngContext::from_seed(cfg.seed);
            let mega = MegaIteration::new(
                mesh,
                barrier,
                rng,
                control,
                thread_idx,
                cfg,
                stop_reason,
                CallbackRegistry::new(),
            )
            .with_vns_shake(true);
            Algorithm::Mads(MadsRun { mega })
        } else {
            let phase_ct = ComputeType::phase_one(cfg.h_norm);
            let mut phase_barrier = ProgressiveBarrier::new(phase_ct, Scalar::new(f64::INFINITY));
            phase_barrier.update_with_points(x0_evaluated, true, true);
            Algorithm::PhaseOneThenMads(PhaseOneThenMadsRun {
                control,
                thread_idx,
                cfg,
                stop_reason,
                phase_barrier,
                mesh,
                standard_ct,
                main_barrier: None,
            })
        }
    }
}
