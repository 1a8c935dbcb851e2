//! The mega-iteration loop: owns the mesh, barrier and RNG for one MADS run
//! and repeatedly drives iterations until a stop reason is raised.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::barrier::ProgressiveBarrier;
use crate::blackbox::Evaluator;
use crate::hotrestart::HotRestartState;
use crate::mesh::GranularMesh;
use crate::params::RunConfig;
use crate::point::Point;
use crate::queue::EvaluatorControl;
use crate::rng::RngContext;
use crate::step::{CallbackRegistry, CallbackType, Step, StopCode, StopReason, TrialPointStats};

use super::super::vns::run_vns_shake;
use super::iteration::{IterationConfig, MadsIteration};
use super::poll::PollDirectionType;
use super::search::{NoSearch, RandomSearch, SearchMethod};

fn parse_direction_type(s: &str) -> PollDirectionType {
    match s {
        "N_PLUS_1" => PollDirectionType::NPlus1,
        _ => PollDirectionType::Ortho2n,
    }
}

/// Consecutive unsuccessful iterations before a VNS shake is attempted.
const VNS_STALL_THRESHOLD: u32 = 5;

/// The mega-iteration state machine: the frame center starts at the
/// incumbent and walks to each iteration's new incumbent, repeating until a
/// [`StopCode`] is raised.
pub struct MegaIteration<E: Evaluator> {
    pub mesh: GranularMesh,
    pub barrier: ProgressiveBarrier,
    pub rng: RngContext,
    pub mega_iteration: u64,
    pub iteration_count: u64,
    pub nb_eval: u64,
    pub nb_bb_eval: u64,
    control: Arc<EvaluatorControl<E>>,
    thread_idx: usize,
    cfg: RunConfig,
    iter_cfg: IterationConfig,
    stop_reason: StopReason,
    stats: Arc<Mutex<TrialPointStats>>,
    callbacks: CallbackRegistry,
    use_random_search: bool,
    use_vns: bool,
    consecutive_unsuccessful: u32,
}

impl<E: Evaluator + Clone> MegaIteration<E> {
    pub fn new(
        mesh: GranularMesh,
        barrier: ProgressiveBarrier,
        rng: RngContext,
        control: Arc<EvaluatorControl<E>>,
        thread_idx: usize,
        cfg: RunConfig,
        stop_reason: StopReason,
        callbacks: CallbackRegistry,
    ) -> Self {
        let iter_cfg = IterationConfig {
            poll_direction_type: parse_direction_type(&cfg.direction_type),
            opportunistic: cfg.opportunistic_eval,
        };
        Self {
            mesh,
            barrier,
            rng,
            mega_iteration: 0,
            iteration_count: 0,
            nb_eval: 0,
            nb_bb_eval: 0,
            control,
            thread_idx,
            cfg,
            iter_cfg,
            stop_reason,
            stats: Arc::new(Mutex::new(TrialPointStats::new())),
            callbacks,
            use_random_search: false,
            use_vns: false,
            consecutive_unsuccessful: 0,
        }
    }

    pub fn with_random_search(mut self, enabled: bool) -> Self {
        self.use_random_search = enabled;
        self
    }

    pub fn with_vns_shake(mut self, enabled: bool) -> Self {
        self.use_vns = enabled;
        self
    }

    /// Shake the incumbent and seed a sub-MADS at the shaken point, folding
    /// any points it finds back into this run's barrier. Triggered after
    /// [`VNS_STALL_THRESHOLD`] consecutive unsuccessful iterations; the
    /// radius grows with repeated failed shakes via the incumbent's current
    /// max frame size as a base scale.
    fn vns_shake(&mut self) {
        let evaluator = self.control.evaluator().clone();
        let cache = self.control.cache().clone();
        let incumbent = self.incumbent();
        let radius = self
            .mesh
            .frame_sizes()
            .into_iter()
            .fold(0.0_f64, f64::max)
            .max(1.0);
        let outcome = run_vns_shake(evaluator, cache, &incumbent, radius, &self.cfg);
        if !outcome.imported.is_empty() {
            self.barrier.update_with_points(outcome.imported, true, true);
        }
        self.consecutive_unsuccessful = 0;
    }

    fn incumbent(&self) -> Point {
        self.barrier
            .best_feas_point()
            .or_else(|| self.barrier.best_inf_point())
            .map(|e| e.x().clone())
            .unwrap_or_else(|| Point::from_f64(&vec![0.0; self.mesh.dim()]))
    }

    fn search_method(&self) -> Option<Box<dyn SearchMethod>> {
        if !self.use_random_search {
            return Some(Box::new(NoSearch));
        }
        Some(Box::new(RandomSearch {
            count: 2 * self.mesh.dim(),
            lb: Point::from_f64(&self.cfg.lower_bound),
            ub: Point::from_f64(&self.cfg.upper_bound),
        }))
    }

    fn check_global_stops(&self) {
        if self.stop_reason.is_set() {
            return;
        }
        if let Some(max_eval) = self.cfg.max_eval {
            if self.nb_eval >= max_eval {
                self.stop_reason.set(StopCode::MaxEval);
            }
        }
        if let Some(max_bb) = self.cfg.max_bb_eval {
            if self.nb_bb_eval >= max_bb {
                self.stop_reason.set(StopCode::MaxBbEval);
            }
        }
        if self.cfg.stop_if_feasible && !self.barrier.x_feas().is_empty() {
            self.stop_reason.set(StopCode::StopOnFeas);
        }
    }

    /// Run one mega-iteration (one iteration of search+poll against the
    /// current incumbent), returning `false` once a stop reason has been
    /// raised so the caller's loop can exit.
    pub fn step(&mut self) -> bool {
        if self.stop_reason.is_set() {
            return false;
        }
        self.callbacks.run(CallbackType::MegaIterationStart);

        let center = self.incumbent();
        let search = self.search_method();
        let thread_idx = self.thread_idx;
        let stop_reason = self.stop_reason.clone();
        let mut it = MadsIteration::new(
            &mut self.mesh,
            &mut self.barrier,
            &self.control,
            thread_idx,
            &mut self.rng,
            &self.iter_cfg,
            &self.callbacks,
            center,
            search,
            stop_reason,
            Some(Arc::clone(&self.stats)),
        );
        it.run_imp();
        let success = it.success();
        it.end();
        drop(it);

        self.iteration_count += 1;
        self.mega_iteration += 1;
        self.nb_eval = self.control.cache().len() as u64;
        self.nb_bb_eval = self.nb_eval;

        if success == crate::step::SuccessType::Unsuccessful {
            self.consecutive_unsuccessful += 1;
        } else {
            self.consecutive_unsuccessful = 0;
        }
        if self.use_vns
            && !self.stop_reason.is_set()
            && self.consecutive_unsuccessful >= VNS_STALL_THRESHOLD
        {
            self.vns_shake();
        }

        self.check_global_stops();
        self.callbacks.run(CallbackType::MegaIterationEnd);

        tracing::debug!(
            mega_iteration = self.mega_iteration,
            nb_eval = self.nb_eval,
            success = ?success,
            frame_size = ?self.mesh.frame_sizes(),
            "mega-iteration complete",
        );
        !self.stop_reason.is_set()
    }

    /// Run mega-iterations until a stop reason is raised.
    pub fn run_to_completion(&mut self) -> StopCode {
        loop {
            if !self.step() {
                break;
            }
        }
        self.stop_reason.get().unwrap_or(StopCode::MaxIter)
    }

    pub fn capture_hot_restart(&mut self) -> HotRestartState {
        HotRestartState::capture(
            self.mega_iteration,
            self.iteration_count,
            &self.mesh,
            &self.barrier,
            self.nb_eval,
            self.nb_bb_eval,
            &mut self.rng,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbout::{BBOutputType, ComputeType, OutputTypeList};
    use crate::blackbox::ClosureEvaluator;
    use crate::cache::Cache;
    use crate::numeric::Scalar;
    use crate::point::HNormType;

    fn test_config(dim: usize, max_bb_eval: u64) -> RunConfig {
        RunConfig {
            dimension: dim,
            lower_bound: vec![-10.0; dim],
            upper_bound: vec![10.0; dim],
            granularity: vec![0.0; dim],
            initial_frame_size: vec![1.0; dim],
            h_norm: HNormType::L2,
            h_max_init: f64::INFINITY,
            max_bb_eval: Some(max_bb_eval),
            max_eval: None,
            max_time_secs: None,
            opportunistic_eval: false,
            nb_threads: 1,
            seed: 0,
            stop_if_feasible: false,
            direction_type: "ORTHO_2N".to_string(),
            anisotropic_mesh: true,
        }
    }

    #[test]
    fn run_to_completion_stops_on_budget() {
        let cfg = test_config(2, 30);
        let cache = Arc::new(Cache::new());
        let stop = StopReason::new();
        let ev = ClosureEvaluator::new(OutputTypeList::new(vec![BBOutputType::Obj]), |x| {
            vec![x.coord(0).value().powi(2) + x.coord(1).value().powi(2)]
        });
        let ct = ComputeType::standard(cfg.h_norm);
        let control = Arc::new(EvaluatorControl::new(ev, cache, stop.clone(), ct, 1));
        let idx = control.register_thread(cfg.max_bb_eval, cfg.opportunistic_eval);

        control.submit(idx, vec![Point::from_f64(&[3.0, 3.0])]);
        control.drain(Scalar::new(f64::INFINITY));
        let evaluated = control.take_evaluated(idx);
        let mut barrier = ProgressiveBarrier::new(ct, Scalar::new(f64::INFINITY));
        barrier.update_with_points(evaluated, true, true);

        let mesh = GranularMesh::new(&cfg.initial_frame_size, &cfg.granularity);
        let rng = RngContext::from_seed(cfg.seed);
        let mut mega = MegaIteration::new(
            mesh,
            barrier,
            rng,
            control,
            idx,
            cfg,
            stop.clone(),
            CallbackRegistry::new(),
        );
        let code = mega.run_to_completion();
        assert!(matches!(code, StopCode::MaxBbEval | StopCode::MaxEval));
    }
}
