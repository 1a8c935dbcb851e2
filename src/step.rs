//! The step spine: the `start -> run -> end` lifecycle shared by every node
//! in the algorithm call tree (algorithms, mega-iterations, iterations,
//! search/poll methods), plus the strongly-typed stop-reason union and the
//! callback hook points steps expose.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bbout::EvalType;

/// The four stop-reason categories from the data model. A code's category
/// determines which granularity of step is allowed to raise it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCategory {
    Global,
    MainThread,
    Iteration,
    AlgorithmSpecific,
}

/// Every stop reason the spine can raise, tagged by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCode {
    // Global
    CtrlC,
    MaxTime,
    HotRestart,
    UserGlobalStop,
    // Per main thread
    MaxBbEval,
    MaxEval,
    MaxBlockEval,
    MaxModelEval,
    SubproblemMax,
    LapMax,
    OpportunisticSuccess,
    AllPointsEvaluated,
    // Iteration
    MaxIter,
    StopOnFeas,
    UserIterStop,
    PhaseOneCompleted,
    // Algorithm-specific: MADS
    MeshPrecReached,
    GranularMeshPrecReached,
    X0Fail,
    PoneSearchFailed,
    // Algorithm-specific: Nelder-Mead
    InitialFailed,
    // Algorithm-specific: model search
    NotEnoughPoints,
    ModelOptimizationFail,
}

impl StopCode {
    pub fn category(&self) -> StopCategory {
        use StopCode::*;
        match self {
            CtrlC | MaxTime | HotRestart | UserGlobalStop => StopCategory::Global,
            MaxBbEval | MaxEval | MaxBlockEval | MaxModelEval | SubproblemMax | LapMax
            | OpportunisticSuccess | AllPointsEvaluated => StopCategory::MainThread,
            MaxIter | StopOnFeas | UserIterStop | PhaseOneCompleted => StopCategory::Iteration,
            MeshPrecReached | GranularMeshPrecReached | X0Fail | PoneSearchFailed
            | InitialFailed | NotEnoughPoints | ModelOptimizationFail => {
                StopCategory::AlgorithmSpecific
            }
        }
    }

    /// Whether this stop reason still allows a graceful, zero exit code
    /// (§6: "0 on normal termination ... including budget caps").
    pub fn is_graceful(&self) -> bool {
        !matches!(self, StopCode::CtrlC)
    }
}

/// A shared-lifetime stop-reason slot. Every step carries a clone of its
/// algorithm's `StopReason`; any descendant can raise a stop and every
/// ancestor observes it immediately. First reason raised wins — later
/// raises are recorded as "also triggered" but do not overwrite the
/// original, so diagnostics point at the true root cause.
#[derive(Debug, Clone, Default)]
pub struct StopReason {
    inner: Arc<Mutex<Option<StopCode>>>,
}

impl StopReason {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the "running" state. Called at the start of an algorithm's
    /// top-level run.
    pub fn reset(&self) {
        *self.inner.lock() = None;
    }

    /// Raise a stop reason. A no-op if one is already set.
    pub fn set(&self, code: StopCode) {
        let mut guard = self.inner.lock();
        if guard.is_none() {
            *guard = Some(code);
        }
    }

    pub fn get(&self) -> Option<StopCode> {
        *self.inner.lock()
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn is_set_in(&self, category: StopCategory) -> bool {
        self.inner
            .lock()
            .map(|c| c.category() == category)
            .unwrap_or(false)
    }
}

/// Per-evalType trial-point counters. "Current" resets each iteration;
/// "total" accumulates for the whole run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub total_generated: u64,
    pub current_generated: u64,
    pub total_evals: u64,
    pub current_evals: u64,
}

impl Counters {
    fn reset_current(&mut self) {
        self.current_generated = 0;
        self.current_evals = 0;
    }
}

/// Trial-point statistics, keyed by [`EvalType`]. Shared via `Arc<Mutex<_>>`
/// so that parallel sub-algorithms can merge into a common parent under a
/// critical section without corrupting each other's counters.
#[derive(Debug, Clone, Default)]
pub struct TrialPointStats {
    by_type: HashMap<EvalType, Counters>,
}

impl TrialPointStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_generated(&mut self, ty: EvalType, n: u64) {
        let c = self.by_type.entry(ty).or_default();
        c.total_generated += n;
        c.current_generated += n;
    }

    pub fn record_eval(&mut self, ty: EvalType, n: u64) {
        let c = self.by_type.entry(ty).or_default();
        c.total_evals += n;
        c.current_evals += n;
    }

    pub fn get(&self, ty: EvalType) -> Counters {
        self.by_type.get(&ty).copied().unwrap_or_default()
    }

    pub fn reset_current(&mut self) {
        for c in self.by_type.values_mut() {
            c.reset_current();
        }
    }

    /// Merge `self`'s current counters into `parent`'s total and current
    /// counters, then reset `self`'s current counters, all under the
    /// parent's lock.
    pub fn merge_into(&mut self, parent: &Arc<Mutex<TrialPointStats>>) {
        let mut parent = parent.lock();
        for (ty, c) in self.by_type.iter() {
            let p = parent.by_type.entry(*ty).or_default();
            p.total_generated += c.current_generated;
            p.current_generated += c.current_generated;
            p.total_evals += c.current_evals;
            p.current_evals += c.current_evals;
        }
        self.reset_current();
    }
}

/// Whether a step's `run()` produced an improving outcome, used for success
/// propagation to the parent step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SuccessType {
    #[default]
    Undefined,
    Unsuccessful,
    PartialSuccess,
    FullSuccess,
}

/// Every hook point a step can invoke. Unregistered callbacks are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackType {
    IterationEnd,
    MegaIterationStart,
    MegaIterationEnd,
    EvalOpportunisticCheck,
    EvalFailCheck,
    EvalStopCheck,
    PreEvalUpdate,
    PostEvalUpdate,
    PostprocessingCheck,
    HotRestart,
    UserMethodSearch,
    UserMethodPoll,
}

/// A registered callback may request a stop by returning `Some(code)`. The
/// framework is responsible for mapping that into the right category
/// (`UserGlobalStop` at the algorithm level, `UserIterStop` at iteration
/// granularity) — callbacks themselves just say "stop".
pub type CallbackFn = dyn Fn() -> bool + Send + Sync;

/// Registry of optional callbacks, keyed by hook point. Mirrors the
/// reference implementation's `runCallback(CallbackType, ...)`.
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    hooks: HashMap<CallbackType, Arc<CallbackFn>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: CallbackType, f: Arc<CallbackFn>) {
        self.hooks.insert(ty, f);
    }

    /// Run the hook at `ty` if registered. Returns `true` if the callback
    /// requested a stop.
    pub fn run(&self, ty: CallbackType) -> bool {
        self.hooks.get(&ty).map(|f| f()).unwrap_or(false)
    }
}

/// Implemented by every concrete step. `Step`'s blanket impl wraps these in
/// the default bookkeeping described in the data model: reset success,
/// reset current stats, mark the stop reason as started, propagate success
/// and merge stats on the way out.
pub trait StepImpl {
    fn start_imp(&mut self) {}
    fn run_imp(&mut self) -> bool;
    fn end_imp(&mut self) {}

    fn stop_reason(&self) -> &StopReason;
    fn stats(&self) -> &Arc<Mutex<TrialPointStats>>;
    fn parent_stats(&self) -> Option<&Arc<Mutex<TrialPointStats>>> {
        None
    }
    fn callbacks(&self) -> &CallbackRegistry;
    fn set_success(&mut self, success: SuccessType);
}

/// The `start -> run -> end` template method. Blanket-implemented for
/// anything implementing [`StepImpl`] so concrete algorithms only ever
/// write the `_imp` hooks.
pub trait Step: StepImpl {
    fn start(&mut self) {
        self.set_success(SuccessType::Undefined);
        self.stats().lock().reset_current();
        self.start_imp();
    }

    fn run(&mut self) -> bool {
        let improved = self.run_imp();
        self.set_success(if improved {
            SuccessType::FullSuccess
        } else {
            SuccessType::Unsuccessful
        });
        improved
    }

    fn end(&mut self) {
        self.end_imp();
        self.callbacks().run(CallbackType::IterationEnd);
        if let Some(parent) = self.parent_stats() {
            self.stats().lock().merge_into(parent);
        }
    }
}

impl<T: StepImpl> Step for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_first_wins() {
        let sr = StopReason::new();
        sr.set(StopCode::MaxBbEval);
        sr.set(StopCode::MaxTime);
        assert_eq!(sr.get(), Some(StopCode::MaxBbEval));
    }

    #[test]
    fn stats_merge_under_lock() {
        let parent = Arc::new(Mutex::new(TrialPointStats::new()));
        let mut child = TrialPointStats::new();
        child.record_generated(EvalType::Bb, 3);
        child.record_eval(EvalType::Bb, 2);
        child.merge_into(&parent);
        let p = parent.lock();
        let c = p.get(EvalType::Bb);
        assert_eq!(c.total_generated, 3);
        assert_eq!(c.total_evals, 2);
        assert_eq!(child.get(EvalType::Bb).current_generated, 0);
    }

    #[test]
    fn callback_stop_request() {
        let mut reg = CallbackRegistry::new();
        reg.register(CallbackType::EvalStopCheck, Arc::new(|| true));
        assert!(reg.run(CallbackType::EvalStopCheck));
        assert!(!reg.run(CallbackType::PostEvalUpdate));
    }
}
