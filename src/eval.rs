//! Evaluation records and eval points: the result of one blackbox call, and
//! the point-plus-bookkeeping object that flows through cache, barrier, and
//! queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::bbout::{BBOutput, ComputeType, EvalType, OutputTypeList};
use crate::numeric::Scalar;
use crate::point::Point;

/// Status of one evaluation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalStatus {
    #[default]
    NotStarted,
    InProgress,
    Ok,
    Failed,
    UserRejected,
    Error,
}

impl EvalStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, EvalStatus::Ok)
    }
}

/// One evaluation's result for a single [`EvalType`].
#[derive(Debug, Clone)]
pub struct EvalRecord {
    pub output: BBOutput,
    pub status: EvalStatus,
    pub pre_eval_status: EvalStatus,
    pub types: OutputTypeList,
    /// Number of times the blackbox has actually been invoked for this
    /// record, used to cap re-evaluation at `smart_insert`'s `max_evals`.
    pub eval_count: u32,
    fh_cache: HashMap<ComputeType, (Scalar, Scalar)>,
}

impl EvalRecord {
    pub fn new(types: OutputTypeList) -> Self {
        Self {
            output: BBOutput::failed(),
            status: EvalStatus::NotStarted,
            pre_eval_status: EvalStatus::NotStarted,
            types,
            eval_count: 0,
            fh_cache: HashMap::new(),
        }
    }

    pub fn set_output(&mut self, output: BBOutput) {
        self.status = if output.eval_ok() {
            EvalStatus::Ok
        } else {
            EvalStatus::Failed
        };
        self.output = output;
        self.eval_count += 1;
        self.fh_cache.clear();
    }

    /// Memoized `(f, h)` for a given compute-type; computed once per type.
    pub fn fh(&mut self, ct: ComputeType) -> (Scalar, Scalar) {
        if let Some(cached) = self.fh_cache.get(&ct) {
            return *cached;
        }
        let fh = if self.status.is_usable() {
            (ct.f(&self.output, &self.types), ct.h(&self.output, &self.types))
        } else {
            (Scalar::undefined(), Scalar::undefined())
        };
        self.fh_cache.insert(ct, fh);
        fh
    }
}

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

/// Monotonically increasing tag assigned the first time a point is
/// inserted into any shared store (cache, queue). Ties in dominance are
/// broken by tag (insertion order), per the reference implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointTag(pub u64);

impl PointTag {
    pub fn next() -> Self {
        PointTag(NEXT_TAG.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which step-kind produced a trial point, used for display/debugging and
/// by search methods that need to recognize their own points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedBy {
    X0,
    Poll,
    Search(&'static str),
    ExtendedPoll,
    VnsShake,
    PhaseOne,
    Unknown,
}

/// A point plus up to one eval record per [`EvalType`], and the metadata
/// the step spine needs to recover provenance.
///
/// Invariants: the tag is assigned once and never changes; coordinates are
/// immutable once constructed (only the eval records mutate); `point_from`
/// is always stored in full-dimensional space even for a subproblem point.
#[derive(Debug, Clone)]
pub struct EvalPoint {
    x: Point,
    tag: Option<PointTag>,
    records: HashMap<EvalType, EvalRecord>,
    generated_by: GeneratedBy,
    /// Full-dimensional point this one was generated from (frame center),
    /// used to recover the producing direction.
    point_from: Option<Point>,
    /// Mesh size snapshot in effect when this point was generated.
    mesh_size: Option<Vec<f64>>,
    revealing: bool,
}

impl EvalPoint {
    pub fn new(x: Point) -> Self {
        Self {
            x,
            tag: None,
            records: HashMap::new(),
            generated_by: GeneratedBy::Unknown,
            point_from: None,
            mesh_size: None,
            revealing: false,
        }
    }

    pub fn with_provenance(mut self, generated_by: GeneratedBy, point_from: Point) -> Self {
        self.generated_by = generated_by;
        self.point_from = Some(point_from);
        self
    }

    pub fn x(&self) -> &Point {
        &self.x
    }

    pub fn tag(&self) -> Option<PointTag> {
        self.tag
    }

    /// Assign a tag if one has not yet been assigned. Idempotent.
    pub fn assign_tag(&mut self) -> PointTag {
        if self.tag.is_none() {
            self.tag = Some(PointTag::next());
        }
        self.tag.unwrap()
    }

    pub fn generated_by(&self) -> GeneratedBy {
        self.generated_by
    }

    pub fn point_from(&self) -> Option<&Point> {
        self.point_from.as_ref()
    }

    /// Recover the displacement that produced this point, in full space.
    pub fn direction_from_parent(&self) -> Option<crate::point::Direction> {
        self.point_from.as_ref().map(|from| self.x.sub(from))
    }

    pub fn is_revealing(&self) -> bool {
        self.revealing
    }

    pub fn set_revealing(&mut self, revealing: bool) {
        self.revealing = revealing;
    }

    pub fn record(&self, ty: EvalType) -> Option<&EvalRecord> {
        self.records.get(&ty)
    }

    pub fn record_mut(&mut self, ty: EvalType) -> Option<&mut EvalRecord> {
        self.records.get_mut(&ty)
    }

    pub fn set_record(&mut self, ty: EvalType, record: EvalRecord) {
        self.records.insert(ty, record);
    }

    pub fn eval_status(&self, ty: EvalType) -> EvalStatus {
        self.records
            .get(&ty)
            .map(|r| r.status)
            .unwrap_or(EvalStatus::NotStarted)
    }

    /// How many times the blackbox has actually run for `ty`.
    pub fn eval_count(&self, ty: EvalType) -> u32 {
        self.records.get(&ty).map(|r| r.eval_count).unwrap_or(0)
    }

    /// `(f, h)` under a compute-type, for the compute-type's own eval-type
    /// record. Returns undefined values if no usable record exists.
    pub fn fh(&mut self, ct: ComputeType) -> (Scalar, Scalar) {
        match self.records.get_mut(&ct.eval_type) {
            Some(rec) => rec.fh(ct),
            None => (Scalar::undefined(), Scalar::undefined()),
        }
    }

    pub fn is_feasible(&mut self, ct: ComputeType) -> bool {
        let (_, h) = self.fh(ct);
        h.is_defined() && h.value() == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbout::{BBOutputType, ComputeType};
    use crate::point::HNormType;

    #[test]
    fn tag_assigned_once() {
        let mut p = EvalPoint::new(Point::from_f64(&[1.0, 2.0]));
        let t1 = p.assign_tag();
        let t2 = p.assign_tag();
        assert_eq!(t1, t2);
    }

    #[test]
    fn fh_memoizes() {
        let types = OutputTypeList::new(vec![BBOutputType::Obj, BBOutputType::Pb]);
        let mut rec = EvalRecord::new(types.clone());
        rec.set_output(BBOutput::from_f64(&[4.0, -1.0]));
        let mut p = EvalPoint::new(Point::from_f64(&[0.0]));
        p.set_record(EvalType::Bb, rec);
        let ct = ComputeType::standard(HNormType::L2);
        let (f, h) = p.fh(ct);
        assert_eq!(f, Scalar::new(4.0));
        assert_eq!(h, Scalar::new(0.0));
        assert!(p.is_feasible(ct));
    }
}
