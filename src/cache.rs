//! The process-wide evaluation cache: a deduplication store keyed by point
//! coordinates under epsilon-equality, guaranteeing at-most-one
//! evaluation-in-flight per point per [`EvalType`].

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::bbout::{BBOutput, BBOutputType, EvalType, OutputTypeList};
use crate::eval::{EvalPoint, EvalRecord, EvalStatus, PointTag};
use crate::numeric::{DEFAULT_EPSILON, Scalar};
use crate::point::Point;

/// Quantization bucket key so coordinate lookup is an O(1) hash instead of
/// a linear epsilon-equality scan; buckets collide exactly when two points
/// might be epsilon-close, and within a bucket we fall back to the real
/// `eq_eps` check.
fn bucket_key(p: &Point, eps: f64) -> Vec<i64> {
    p.coords()
        .iter()
        .map(|c| {
            if c.is_defined() {
                (c.value() / eps).round() as i64
            } else {
                i64::MIN
            }
        })
        .collect()
}

/// All bucket keys within one bucket-step of `key` in every coordinate
/// (the 3^n neighborhood), so a query near a rounding boundary still finds
/// entries that rounded to the adjacent bucket.
fn neighbor_keys(key: &[i64]) -> Vec<Vec<i64>> {
    let mut out = vec![Vec::with_capacity(key.len())];
    for &k in key {
        let mut next = Vec::with_capacity(out.len() * 3);
        for prefix in &out {
            for d in [-1i64, 0, 1] {
                let mut v = prefix.clone();
                v.push(k.saturating_add(d));
                next.push(v);
            }
        }
        out = next;
    }
    out
}

struct CacheInner {
    entries: Vec<EvalPoint>,
    index: HashMap<Vec<i64>, Vec<usize>>,
}

impl CacheInner {
    fn find_index(&self, p: &Point, eps: f64) -> Option<usize> {
        let key = bucket_key(p, eps);
        for nk in neighbor_keys(&key) {
            if let Some(bucket) = self.index.get(&nk) {
                if let Some(&i) = bucket.iter().find(|&&i| self.entries[i].x().eq_eps(p, eps)) {
                    return Some(i);
                }
            }
        }
        None
    }
}

/// Outcome of [`Cache::smart_insert`]: whether the caller is the one
/// responsible for actually invoking the blackbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmartInsertOutcome {
    ShouldEvaluate,
    AlreadyInFlight,
    AlreadyEvaluated,
}

/// Process-wide, thread-safe point cache.
pub struct Cache {
    inner: Mutex<CacheInner>,
    cv: Condvar,
    stop_waiting: AtomicBool,
    size_max: Option<usize>,
    eps: f64,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: Vec::new(),
                index: HashMap::new(),
            }),
            cv: Condvar::new(),
            stop_waiting: AtomicBool::new(false),
            size_max: None,
            eps: DEFAULT_EPSILON,
        }
    }

    pub fn with_size_max(mut self, size_max: usize) -> Self {
        self.size_max = Some(size_max);
        self
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tell any thread parked in [`Cache::find`] to stop waiting and return
    /// failure. Used by an algorithm that is shutting down.
    pub fn stop_waiting(&self) {
        self.stop_waiting.store(true, Ordering::SeqCst);
        self.cv.notify_all();
    }

    pub fn reset_stop_waiting(&self) {
        self.stop_waiting.store(false, Ordering::SeqCst);
    }

    /// Register intent to evaluate `point` for `eval_type`. Returns the
    /// point's tag and whether the caller should actually invoke the
    /// blackbox, per the cache-cooperation protocol in the design.
    ///
    /// `max_evals` caps how many times an already-`Ok` point may still be
    /// re-submitted (for a stochastic blackbox the caller wants resampled);
    /// a point evaluated fewer than `max_evals` times yields
    /// `ShouldEvaluate` again instead of the usual `AlreadyEvaluated`.
    pub fn smart_insert(
        &self,
        point: &Point,
        max_evals: u32,
        eval_type: EvalType,
        retry_on_failure: bool,
    ) -> (PointTag, SmartInsertOutcome) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.find_index(point, self.eps) {
            let tag = inner.entries[idx].assign_tag();
            let status = inner.entries[idx].eval_status(eval_type);
            let eval_count = inner.entries[idx].eval_count(eval_type);
            let outcome = match status {
                EvalStatus::InProgress => SmartInsertOutcome::AlreadyInFlight,
                EvalStatus::Ok if eval_count < max_evals => {
                    inner.entries[idx]
                        .record_mut(eval_type)
                        .expect("Ok status implies a record exists")
                        .status = EvalStatus::InProgress;
                    SmartInsertOutcome::ShouldEvaluate
                }
                EvalStatus::Ok => SmartInsertOutcome::AlreadyEvaluated,
                EvalStatus::Failed | EvalStatus::Error if retry_on_failure => {
                    let placeholder = EvalRecord::new(OutputTypeList::new(vec![]));
                    let mut placeholder = placeholder;
                    placeholder.status = EvalStatus::InProgress;
                    inner.entries[idx].set_record(eval_type, placeholder);
                    SmartInsertOutcome::ShouldEvaluate
                }
                EvalStatus::Failed | EvalStatus::Error => SmartInsertOutcome::AlreadyEvaluated,
                EvalStatus::NotStarted | EvalStatus::UserRejected => {
                    let mut placeholder = EvalRecord::new(OutputTypeList::new(vec![]));
                    placeholder.status = EvalStatus::InProgress;
                    inner.entries[idx].set_record(eval_type, placeholder);
                    SmartInsertOutcome::ShouldEvaluate
                }
            };
            (tag, outcome)
        } else {
            let mut ep = EvalPoint::new(point.clone());
            let tag = ep.assign_tag();
            let mut placeholder = EvalRecord::new(OutputTypeList::new(vec![]));
            placeholder.status = EvalStatus::InProgress;
            ep.set_record(eval_type, placeholder);
            let key = bucket_key(point, self.eps);
            let idx = inner.entries.len();
            inner.entries.push(ep);
            inner.index.entry(key).or_default().push(idx);
            (tag, SmartInsertOutcome::ShouldEvaluate)
        }
    }

    /// Look up `point`. When `wait` is true and the entry exists but is
    /// still `IN_PROGRESS`, park until the status changes or
    /// `stop_waiting` is set, then return `None` if the wait was
    /// abandoned.
    pub fn find(&self, point: &Point, eval_type: EvalType, wait: bool) -> Option<EvalPoint> {
        let mut inner = self.inner.lock();
        loop {
            let idx = inner.find_index(point, self.eps)?;
            let status = inner.entries[idx].eval_status(eval_type);
            if status != EvalStatus::InProgress || !wait {
                return Some(inner.entries[idx].clone());
            }
            if self.stop_waiting.load(Ordering::SeqCst) {
                return None;
            }
            self.cv.wait_for(&mut inner, Duration::from_millis(20));
        }
    }

    /// Replace the eval record for `eval_type` on the point matching
    /// `updated`'s coordinates. Asserts the coordinates already exist (the
    /// caller must have gone through [`Cache::smart_insert`] first).
    pub fn update(&self, point: &Point, eval_type: EvalType, output: BBOutput, types: OutputTypeList) {
        let mut inner = self.inner.lock();
        let idx = inner
            .find_index(point, self.eps)
            .expect("update() called on a point not present in the cache");
        let mut record = EvalRecord::new(types);
        record.set_output(output);
        inner.entries[idx].set_record(eval_type, record);
        drop(inner);
        self.cv.notify_all();
    }

    pub fn find_best_feas<F: Fn(&EvalPoint) -> bool>(&self, pred: F) -> Vec<EvalPoint> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| pred(e))
            .cloned()
            .collect()
    }

    pub fn find_filter<F: Fn(&EvalPoint) -> bool>(&self, pred: F) -> Vec<EvalPoint> {
        self.find_best_feas(pred)
    }

    /// Evict the worst-`f` entries once the cache exceeds `size_max`.
    pub fn purge(&self, ct: crate::bbout::ComputeType) {
        let Some(max) = self.size_max else { return };
        let mut inner = self.inner.lock();
        if inner.entries.len() <= max {
            return;
        }
        let mut scored: Vec<(usize, f64)> = inner
            .entries
            .iter_mut()
            .enumerate()
            .map(|(i, e)| {
                let (f, _) = e.fh(ct);
                (i, if f.is_defined() { f.value() } else { f64::INFINITY })
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        let keep: std::collections::HashSet<usize> =
            scored.into_iter().take(max).map(|(i, _)| i).collect();
        let kept_entries: Vec<EvalPoint> = inner
            .entries
            .iter()
            .enumerate()
            .filter(|(i, _)| keep.contains(i))
            .map(|(_, e)| e.clone())
            .collect();
        inner.entries = kept_entries;
        inner.index.clear();
        for (i, e) in inner.entries.iter().enumerate() {
            let key = bucket_key(e.x(), self.eps);
            inner.index.entry(key).or_default().push(i);
        }
    }

    /// Write all entries, one per line, in the cache file text format.
    /// MODEL evaluations are never persisted.
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let inner = self.inner.lock();
        for e in inner.entries.iter() {
            writeln!(w, "{}", format_cache_line(e))?;
        }
        Ok(())
    }

    /// Load entries from a cache file, merging with whatever is already
    /// present.
    pub fn read<R: BufRead>(&self, r: R) -> io::Result<usize> {
        let mut n = 0;
        for line in r.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(ep) = parse_cache_line(&line) {
                let mut inner = self.inner.lock();
                let key = bucket_key(ep.x(), self.eps);
                if inner.find_index(ep.x(), self.eps).is_none() {
                    let idx = inner.entries.len();
                    inner.entries.push(ep);
                    inner.index.entry(key).or_default().push(idx);
                    n += 1;
                }
            }
        }
        Ok(n)
    }
}

fn status_name(s: EvalStatus) -> &'static str {
    match s {
        EvalStatus::NotStarted => "EVAL_NOT_STARTED",
        EvalStatus::InProgress => "EVAL_IN_PROGRESS",
        EvalStatus::Ok => "EVAL_OK",
        EvalStatus::Failed => "EVAL_FAILED",
        EvalStatus::UserRejected => "EVAL_USER_REJECTED",
        EvalStatus::Error => "EVAL_ERROR",
    }
}

fn status_from_name(s: &str) -> EvalStatus {
    match s {
        "EVAL_IN_PROGRESS" => EvalStatus::InProgress,
        "EVAL_OK" => EvalStatus::Ok,
        "EVAL_FAILED" => EvalStatus::Failed,
        "EVAL_USER_REJECTED" => EvalStatus::UserRejected,
        "EVAL_ERROR" => EvalStatus::Error,
        _ => EvalStatus::NotStarted,
    }
}

fn format_group(values: &[Scalar]) -> String {
    let inner = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!("( {} )", inner)
}

fn format_cache_line(e: &EvalPoint) -> String {
    let x = format_group(e.x().coords());
    let mut parts = vec![x];
    for (label, ty) in [("BB", EvalType::Bb), ("SURROGATE", EvalType::Surrogate)] {
        match e.record(ty) {
            Some(rec) => {
                parts.push(format!("{}_{}", label, status_name(rec.status)));
                parts.push(format_group(rec.output.values()));
            }
            None => {
                parts.push(format!("{}_{}", label, status_name(EvalStatus::NotStarted)));
                parts.push("( )".to_string());
            }
        }
    }
    parts.join(" ")
}

fn parse_group<'a, I: Iterator<Item = &'a str>>(tokens: &mut I) -> Option<Vec<Scalar>> {
    if tokens.next()? != "(" {
        return None;
    }
    let mut out = Vec::new();
    loop {
        let t = tokens.next()?;
        if t == ")" {
            break;
        }
        out.push(Scalar::new(t.parse().ok()?));
    }
    Some(out)
}

fn parse_cache_line(line: &str) -> Option<EvalPoint> {
    let mut tokens = line.split_whitespace();
    let x = parse_group(&mut tokens)?;
    let mut ep = EvalPoint::new(Point::new(x));
    for (label, ty) in [("BB", EvalType::Bb), ("SURROGATE", EvalType::Surrogate)] {
        let status_tok = tokens.next()?;
        let prefix = format!("{}_", label);
        let status_name = status_tok.strip_prefix(&prefix)?;
        let status = status_from_name(status_name);
        let values = parse_group(&mut tokens)?;
        if status != EvalStatus::NotStarted || !values.is_empty() {
            let types = OutputTypeList::new(vec![BBOutputType::Obj; values.len()]);
            let mut record = EvalRecord::new(types);
            record.status = status;
            record.output = BBOutput::new(values, status == EvalStatus::Ok);
            ep.set_record(ty, record);
        }
    }
    Some(ep)
}

/// Shared-ownership handle to the process-wide cache, passed to every main
/// thread and to the evaluator control.
pub type SharedCache = Arc<Cache>;
