//! The evaluator control: the priority queue of points awaiting
//! evaluation, the worker pool that drains it, and the per-main-thread
//! budget/opportunism bookkeeping. Grounded in the critical-section +
//! condvar pattern used for fringe/starvation management in parallel
//! branch-and-bound solvers.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::bbout::{ComputeType, EvalType};
use crate::blackbox::Evaluator;
use crate::cache::{Cache, SmartInsertOutcome};
use crate::eval::{EvalPoint, PointTag};
use crate::numeric::Scalar;
use crate::point::{Direction, Point};
use crate::step::{StopCode, StopReason};

/// How the queue orders points awaiting evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalSortType {
    /// Prioritize points whose generating direction is closest to the
    /// direction of the last success (cosine similarity), falling back to
    /// insertion order among ties or when there is no last-success
    /// direction yet.
    #[default]
    DirLastSuccess,
    Lexicographical,
    Random,
    Quality,
}

/// A point awaiting evaluation, with enough metadata to sort and route it
/// without consulting the cache again.
#[derive(Debug, Clone)]
pub struct EvalQueuePoint {
    pub point: EvalPoint,
    pub tag: PointTag,
    pub priority: f64,
    pub origin_thread: usize,
}

impl PartialEq for EvalQueuePoint {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
    }
}
impl Eq for EvalQueuePoint {}

impl PartialOrd for EvalQueuePoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EvalQueuePoint {
    /// Higher priority pops first; ties break by earlier tag (insertion
    /// order), so `DIR_LAST_SUCCESS` with no last-success direction yet
    /// degenerates to FIFO rather than an arbitrary order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.tag.cmp(&self.tag))
    }
}

fn priority_of(ep: &EvalPoint, sort: EvalSortType, last_success_dir: Option<&Direction>) -> f64 {
    match sort {
        EvalSortType::Lexicographical => 0.0,
        EvalSortType::Random => 0.0,
        EvalSortType::Quality => 0.0,
        EvalSortType::DirLastSuccess => match (ep.direction_from_parent(), last_success_dir) {
            (Some(d), Some(last)) => {
                let dot = d.dot(last);
                let n1 = d.norm2();
                let n2 = last.norm2();
                if dot.is_defined() && n1.value() > 0.0 && n2.value() > 0.0 {
                    dot.value() / (n1.value() * n2.value())
                } else {
                    0.0
                }
            }
            _ => 0.0,
        },
    }
}

/// Budget and opportunism state for one main thread (one concurrently
/// running sub-algorithm instance sharing this evaluator control).
#[derive(Debug, Default)]
pub struct MainThreadInfo {
    pub max_bb_eval: Option<u64>,
    pub nb_bb_eval: u64,
    pub max_eval: Option<u64>,
    pub nb_eval: u64,
    pub opportunistic: bool,
    pub success_seen: bool,
    /// No more `submit()` calls will come for this thread.
    pub closed: bool,
    /// Evaluation for this thread has ceased (budget exhausted or an
    /// opportunistic success was found); any of its items still sitting in
    /// the queue are abandoned, not evaluated.
    pub stopped: bool,
    pub pending: u64,
    pub evaluated: Vec<EvalPoint>,
}

impl MainThreadInfo {
    fn budget_exhausted(&self) -> Option<StopCode> {
        if let Some(max) = self.max_bb_eval {
            if self.nb_bb_eval >= max {
                return Some(StopCode::MaxBbEval);
            }
        }
        if let Some(max) = self.max_eval {
            if self.nb_eval >= max {
                return Some(StopCode::MaxEval);
            }
        }
        None
    }

    fn should_skip(&self) -> bool {
        self.stopped
    }

    fn is_complete(&self) -> bool {
        self.stopped || (self.closed && self.pending == 0)
    }
}

struct Critical {
    queue: Vec<EvalQueuePoint>,
    threads: Vec<MainThreadInfo>,
    last_success_dir: Option<Direction>,
    sort: EvalSortType,
}

impl Critical {
    /// Pop the highest-priority item whose origin thread is still active
    /// and not opportunistically satisfied.
    fn pop_best(&mut self) -> Option<EvalQueuePoint> {
        let mut best_idx = None;
        for (i, q) in self.queue.iter().enumerate() {
            if self.threads[q.origin_thread].should_skip() {
                continue;
            }
            let better = match best_idx {
                None => true,
                Some(j) => *q > self.queue[j],
            };
            if better {
                best_idx = Some(i);
            }
        }
        best_idx.map(|i| self.queue.remove(i))
    }

    fn any_pending(&self) -> bool {
        !self.queue.is_empty() || self.threads.iter().any(|t| t.pending > 0 && !t.is_complete())
    }

    fn all_done(&self) -> bool {
        self.threads.iter().all(|t| t.is_complete())
    }
}

enum WorkLoad {
    Complete,
    Starvation,
    WorkItem(EvalQueuePoint),
}

/// Drives the worker pool that drains the evaluation queue against a
/// shared [`Evaluator`] and [`Cache`], respecting per-thread budgets and
/// global stop reasons.
pub struct EvaluatorControl<E: Evaluator> {
    evaluator: E,
    cache: Arc<Cache>,
    stop_reason: StopReason,
    compute_type: ComputeType,
    critical: Mutex<Critical>,
    monitor: Condvar,
    nb_threads: usize,
}

impl<E: Evaluator> EvaluatorControl<E> {
    pub fn new(
        evaluator: E,
        cache: Arc<Cache>,
        stop_reason: StopReason,
        compute_type: ComputeType,
        nb_threads: usize,
    ) -> Self {
        Self {
            evaluator,
            cache,
            stop_reason,
            compute_type,
            critical: Mutex::new(Critical {
                queue: Vec::new(),
                threads: Vec::new(),
                last_success_dir: None,
                sort: EvalSortType::default(),
            }),
            monitor: Condvar::new(),
            nb_threads: nb_threads.max(1),
        }
    }

    pub fn with_sort(self, sort: EvalSortType) -> Self {
        self.critical.lock().sort = sort;
        self
    }

    /// Register a new main thread, returning its index for later use in
    /// [`EvaluatorControl::submit`] / [`EvaluatorControl::take_evaluated`].
    pub fn register_thread(&self, max_bb_eval: Option<u64>, opportunistic: bool) -> usize {
        let mut critical = self.critical.lock();
        critical.threads.push(MainThreadInfo {
            max_bb_eval,
            opportunistic,
            ..Default::default()
        });
        critical.threads.len() - 1
    }

    /// Enqueue a batch of candidate points generated by `thread_idx`. Each
    /// point is deduplicated through the cache; points already evaluated
    /// or in flight are skipped.
    pub fn submit(&self, thread_idx: usize, points: Vec<Point>) {
        let mut critical = self.critical.lock();
        let sort = critical.sort;
        let last_dir = critical.last_success_dir.clone();
        for p in points {
            let (tag, outcome) = self.cache.smart_insert(&p, 1, EvalType::Bb, false);
            if outcome != SmartInsertOutcome::ShouldEvaluate {
                continue;
            }
            let ep = EvalPoint::new(p);
            let priority = priority_of(&ep, sort, last_dir.as_ref());
            critical.queue.push(EvalQueuePoint {
                point: ep,
                tag,
                priority,
                origin_thread: thread_idx,
            });
            critical.threads[thread_idx].pending += 1;
        }
        drop(critical);
        self.monitor.notify_all();
    }

    fn take_work(&self) -> WorkLoad {
        let mut critical = self.critical.lock();
        loop {
            if self.stop_reason.is_set() || critical.all_done() {
                return WorkLoad::Complete;
            }
            if let Some(item) = critical.pop_best() {
                return WorkLoad::WorkItem(item);
            }
            if !critical.any_pending() {
                return WorkLoad::Starvation;
            }
            self.monitor.wait_for(&mut critical, Duration::from_millis(20));
        }
    }

    /// Run the worker pool until every currently-submitted point has been
    /// evaluated, a stop reason is raised, or the queue starves with
    /// nothing pending. One call drains exactly what was `submit()`-ted
    /// before it, so a caller may `submit`/`drain` repeatedly across many
    /// iterations on the same registered thread; `close_thread` is only
    /// needed once the thread will never submit again.
    pub fn drain(&self, h_max: Scalar) {
        std::thread::scope(|scope| {
            for _ in 0..self.nb_threads {
                scope.spawn(|| loop {
                    match self.take_work() {
                        WorkLoad::Complete | WorkLoad::Starvation => break,
                        WorkLoad::WorkItem(item) => self.evaluate_one(item, h_max),
                    }
                });
            }
        });
    }

    fn evaluate_one(&self, item: EvalQueuePoint, h_max: Scalar) {
        let x = item.point.x().clone();
        let result = self.evaluator.eval(&x, h_max);
        let counts = self.evaluator.counts_as_eval(&x);
        let types = self.evaluator.output_types();

        let output = match result {
            Ok(out) => out,
            Err(_) => crate::bbout::BBOutput::failed(),
        };
        self.cache
            .update(&x, EvalType::Bb, output.clone(), types.clone());

        let mut ep = item.point.clone();
        let mut record = crate::eval::EvalRecord::new(types);
        record.set_output(output);
        ep.set_record(EvalType::Bb, record);
        let (f, h) = ep.fh(self.compute_type);
        let feasible = h.is_defined() && h.value() == 0.0;
        tracing::trace!(?x, f = ?f.is_defined().then(|| f.value()), h = ?h.is_defined().then(|| h.value()), feasible, "blackbox evaluation complete");

        let mut critical = self.critical.lock();
        critical.threads[item.origin_thread].pending =
            critical.threads[item.origin_thread].pending.saturating_sub(1);
        if counts {
            critical.threads[item.origin_thread].nb_bb_eval += 1;
            critical.threads[item.origin_thread].nb_eval += 1;
        }
        if feasible && f.is_defined() {
            critical.threads[item.origin_thread].success_seen = true;
            if let Some(dir) = ep.direction_from_parent() {
                critical.last_success_dir = Some(dir);
            }
            if critical.threads[item.origin_thread].opportunistic {
                critical.threads[item.origin_thread].stopped = true;
            }
        }
        critical.threads[item.origin_thread].evaluated.push(ep);
        if let Some(code) = critical.threads[item.origin_thread].budget_exhausted() {
            self.stop_reason.set(code);
            critical.threads[item.origin_thread].stopped = true;
        }
        drop(critical);
        self.monitor.notify_all();
    }

    /// Mark a thread as having no more work to submit; once its pending
    /// count reaches zero it is considered complete.
    pub fn close_thread(&self, thread_idx: usize) {
        self.critical.lock().threads[thread_idx].closed = true;
        self.monitor.notify_all();
    }

    /// Drain and return the points evaluated so far for `thread_idx`.
    pub fn take_evaluated(&self, thread_idx: usize) -> Vec<EvalPoint> {
        std::mem::take(&mut self.critical.lock().threads[thread_idx].evaluated)
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbout::{BBOutputType, OutputTypeList};
    use crate::blackbox::ClosureEvaluator;
    use crate::point::HNormType;

    #[test]
    fn drain_evaluates_submitted_points() {
        let cache = Arc::new(Cache::new());
        let stop = StopReason::new();
        let ct = ComputeType::standard(HNormType::L2);
        let ev = ClosureEvaluator::new(OutputTypeList::new(vec![BBOutputType::Obj]), |x| {
            vec![x.coord(0).value() * x.coord(0).value()]
        });
        let control = EvaluatorControl::new(ev, cache, stop, ct, 2);
        let idx = control.register_thread(None, false);
        control.submit(idx, vec![Point::from_f64(&[1.0]), Point::from_f64(&[2.0])]);
        control.close_thread(idx);
        control.drain(Scalar::undefined());
        let evaluated = control.take_evaluated(idx);
        assert_eq!(evaluated.len(), 2);
    }

    #[test]
    fn budget_stops_thread() {
        let cache = Arc::new(Cache::new());
        let stop = StopReason::new();
        let ct = ComputeType::standard(HNormType::L2);
        let ev = ClosureEvaluator::new(OutputTypeList::new(vec![BBOutputType::Obj]), |x| {
            vec![x.coord(0).value()]
        });
        let control = EvaluatorControl::new(ev, cache, stop.clone(), ct, 1);
        let idx = control.register_thread(Some(1), false);
        control.submit(idx, vec![Point::from_f64(&[1.0]), Point::from_f64(&[2.0])]);
        control.close_thread(idx);
        control.drain(Scalar::undefined());
        assert!(stop.is_set());
    }

    #[test]
    fn priority_orders_fifo_with_no_direction() {
        let a = EvalQueuePoint {
            point: EvalPoint::new(Point::from_f64(&[1.0])),
            tag: PointTag::next(),
            priority: 0.0,
            origin_thread: 0,
        };
        let b = EvalQueuePoint {
            point: EvalPoint::new(Point::from_f64(&[2.0])),
            tag: PointTag::next(),
            priority: 0.0,
            origin_thread: 0,
        };
        assert!(a > b);
    }
}
