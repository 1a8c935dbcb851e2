//! One MADS iteration: search (optional), then poll unless search already
//! succeeded opportunistically, then the mesh and barrier update.

use std::sync::Arc;

use crate::barrier::ProgressiveBarrier;
use crate::blackbox::Evaluator;
use crate::mesh::GranularMesh;
use crate::point::Point;
use crate::queue::EvaluatorControl;
use crate::rng::RngContext;
use crate::step::{CallbackRegistry, CallbackType, StepImpl, TrialPointStats};

use super::poll::{PollDirectionType, generate_directions, poll_points};
use super::search::SearchMethod;
use super::update::update_mesh;

pub struct IterationConfig {
    pub poll_direction_type: PollDirectionType,
    pub opportunistic: bool,
}

pub struct MadsIteration<'a, E: Evaluator> {
    pub mesh: &'a mut GranularMesh,
    pub barrier: &'a mut ProgressiveBarrier,
    pub control: &'a EvaluatorControl<E>,
    pub thread_idx: usize,
    pub rng: &'a mut RngContext,
    pub cfg: &'a IterationConfig,
    pub callbacks: &'a CallbackRegistry,
    pub stats: Arc<parking_lot::Mutex<TrialPointStats>>,
    pub parent_stats: Option<Arc<parking_lot::Mutex<TrialPointStats>>>,
    pub stop_reason: crate::step::StopReason,
    success: crate::step::SuccessType,
    frame_center: Point,
    search: Option<Box<dyn SearchMethod>>,
}

impl<'a, E: Evaluator> MadsIteration<'a, E> {
    pub fn new(
        mesh: &'a mut GranularMesh,
        barrier: &'a mut ProgressiveBarrier,
        control: &'a EvaluatorControl<E>,
        thread_idx: usize,
        rng: &'a mut RngContext,
        cfg: &'a IterationConfig,
        callbacks: &'a CallbackRegistry,
        frame_center: Point,
        search: Option<Box<dyn SearchMethod>>,
        stop_reason: crate::step::StopReason,
        parent_stats: Option<Arc<parking_lot::Mutex<TrialPointStats>>>,
    ) -> Self {
        Self {
            mesh,
            barrier,
            control,
            thread_idx,
            rng,
            cfg,
            callbacks,
            stats: Arc::new(parking_lot::Mutex::new(TrialPointStats::new())),
            parent_stats,
            stop_reason,
            success: crate::step::SuccessType::Undefined,
            frame_center,
            search,
        }
    }

    fn run_search(&mut self) -> Vec<Point> {
        match &self.search {
            Some(s) => s.generate(&self.frame_center, self.mesh, self.rng),
            None => Vec::new(),
        }
    }

    fn run_poll(&mut self) -> Vec<Point> {
        let dirs = generate_directions(
            self.frame_center.dim(),
            self.cfg.poll_direction_type,
            self.rng,
        );
        poll_points(&self.frame_center, self.mesh, &dirs)
    }

    /// The fine-grained (three-way) success outcome of the last `run()`.
    /// `Step::run`'s blanket bookkeeping only tracks improved/not-improved,
    /// so mega-iteration logic that needs to distinguish a held mesh from a
    /// refined one should read this instead of the boolean `run()` result.
    pub fn success(&self) -> crate::step::SuccessType {
        self.success
    }
}

impl<'a, E: Evaluator> StepImpl for MadsIteration<'a, E> {
    fn run_imp(&mut self) -> bool {
        let search_points = self.run_search();
        self.stats.lock().record_generated(crate::bbout::EvalType::Bb, search_points.len() as u64);
        if !search_points.is_empty() {
            self.control.submit(self.thread_idx, search_points);
            self.control.drain(self.barrier.h_max());
        }

        let mut evaluated = self.control.take_evaluated(self.thread_idx);
        self.stats.lock().record_eval(crate::bbout::EvalType::Bb, evaluated.len() as u64);

        let search_success = if evaluated.is_empty() {
            crate::barrier::SuccessType::Unsuccessful
        } else {
            self.barrier.update_with_points(evaluated.clone(), true, true)
        };

        let opportunistic_stop = self.cfg.opportunistic
            && search_success == crate::barrier::SuccessType::FullSuccess;

        if !opportunistic_stop {
            let poll_points = self.run_poll();
            self.stats.lock().record_generated(crate::bbout::EvalType::Bb, poll_points.len() as u64);
            self.control.submit(self.thread_idx, poll_points);
            self.control.drain(self.barrier.h_max());
            let poll_evaluated = self.control.take_evaluated(self.thread_idx);
            self.stats.lock().record_eval(crate::bbout::EvalType::Bb, poll_evaluated.len() as u64);
            evaluated.extend(poll_evaluated.clone());
            let poll_success = self.barrier.update_with_points(poll_evaluated, true, true);
            if poll_success > search_success {
                self.success = match poll_success {
                    crate::barrier::SuccessType::FullSuccess => crate::step::SuccessType::FullSuccess,
                    crate::barrier::SuccessType::PartialSuccess => crate::step::SuccessType::PartialSuccess,
                    crate::barrier::SuccessType::Unsuccessful => crate::step::SuccessType::Unsuccessful,
                };
            } else {
                self.success = match search_success {
                    crate::barrier::SuccessType::FullSuccess => crate::step::SuccessType::FullSuccess,
                    crate::barrier::SuccessType::PartialSuccess => crate::step::SuccessType::PartialSuccess,
                    crate::barrier::SuccessType::Unsuccessful => crate::step::SuccessType::Unsuccessful,
                };
            }
        } else {
            self.success = match search_success {
                crate::barrier::SuccessType::FullSuccess => crate::step::SuccessType::FullSuccess,
                crate::barrier::SuccessType::PartialSuccess => crate::step::SuccessType::PartialSuccess,
                crate::barrier::SuccessType::Unsuccessful => crate::step::SuccessType::Unsuccessful,
            };
        }

        let direction = evaluated
            .iter()
            .filter(|e| e.eval_status(crate::bbout::EvalType::Bb).is_usable())
            .find_map(|e| e.direction_from_parent());
        update_mesh(self.mesh, self.success, direction.as_ref());
        self.mesh.check_mesh_for_stopping(&self.stop_reason);

        self.callbacks.run(CallbackType::PostEvalUpdate);
        self.success != crate::step::SuccessType::Unsuccessful
    }

    fn stop_reason(&self) -> &crate::step::StopReason {
        &self.stop_reason
    }

    fn stats(&self) -> &Arc<parking_lot::Mutex<TrialPointStats>> {
        &self.stats
    }

    fn parent_stats(&self) -> Option<&Arc<parking_lot::Mutex<TrialPointStats>>> {
        self.parent_stats.as_ref()
    }

    fn callbacks(&self) -> &CallbackRegistry {
        self.callbacks
    }

    fn set_success(&mut self, success: crate::step::SuccessType) {
        self.success = success;
    }
}
