//! The progressive barrier: feasible/infeasible incumbent tracking and the
//! success classification rule that drives mesh enlargement/refinement.

use crate::bbout::ComputeType;
use crate::eval::{EvalPoint, PointTag};
use crate::numeric::{DEFAULT_EPSILON, Scalar};

/// Outcome of comparing a trial point `p` against a barrier reference `r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SuccessType {
    Unsuccessful,
    PartialSuccess,
    FullSuccess,
}

/// Classify `p` relative to reference `r`, per the barrier's success rule:
///
/// - mandatory first check: if `p` has no eval, or `h(p)` is undefined, or
///   `h(p)` is infinite, or `h(p) > hMax` → unsuccessful, regardless of `f`.
/// - both feasible: full success iff `f(p) < f(r)`.
/// - `p` feasible, `r` infeasible (or absent): always full success — any
///   feasible point beats any infeasible reference.
/// - `p` infeasible, `r` feasible (or absent): unsuccessful — an infeasible
///   point never beats a feasible reference.
/// - both infeasible: full success if `p` Pareto-dominates `r` in `(f, h)`
///   (weakly better in both, strictly better in one); partial success if
///   `p` improves `h` but not `f`, or vice versa, without dominating;
///   unsuccessful otherwise.
pub fn classify(
    p_f: Scalar,
    p_h: Scalar,
    r_f: Option<Scalar>,
    r_h: Option<Scalar>,
    h_max: Scalar,
) -> SuccessType {
    if !p_h.is_defined() || !p_h.is_finite() || !p_h.le_eps(&h_max, DEFAULT_EPSILON) {
        return SuccessType::Unsuccessful;
    }

    let p_feasible = p_h.is_defined() && p_h.value() == 0.0;
    let r_feasible = match r_h {
        Some(h) => h.is_defined() && h.value() == 0.0,
        None => false,
    };

    match (p_feasible, r_feasible) {
        (true, true) => {
            let rf = r_f.unwrap();
            if p_f.is_defined() && rf.is_defined() && p_f.lt_eps(&rf, DEFAULT_EPSILON) {
                SuccessType::FullSuccess
            } else {
                SuccessType::Unsuccessful
            }
        }
        (true, false) => SuccessType::FullSuccess,
        (false, true) => SuccessType::Unsuccessful,
        (false, false) => {
            if r_f.is_none() || r_h.is_none() {
                return SuccessType::FullSuccess;
            }
            let rf = r_f.unwrap();
            let rh = r_h.unwrap();
            if !p_f.is_defined() || !p_h.is_defined() || !rf.is_defined() || !rh.is_defined() {
                return SuccessType::Unsuccessful;
            }
            let f_better = p_f.lt_eps(&rf, DEFAULT_EPSILON);
            let h_better = p_h.lt_eps(&rh, DEFAULT_EPSILON);
            let f_worse = rf.lt_eps(&p_f, DEFAULT_EPSILON);
            let h_worse = rh.lt_eps(&p_h, DEFAULT_EPSILON);
            if (f_better || h_better) && !f_worse && !h_worse {
                SuccessType::FullSuccess
            } else if f_better || h_better {
                SuccessType::PartialSuccess
            } else {
                SuccessType::Unsuccessful
            }
        }
    }
}

/// Feasible/infeasible incumbent sets plus the `hMax` ceiling used to bound
/// which infeasible points are even tracked.
#[derive(Debug, Clone)]
pub struct ProgressiveBarrier {
    compute_type: ComputeType,
    h_max: Scalar,
    x_feas: Vec<EvalPoint>,
    x_inf: Vec<EvalPoint>,
    ref_best_feas: Option<PointTag>,
    ref_best_inf: Option<PointTag>,
}

impl ProgressiveBarrier {
    pub fn new(compute_type: ComputeType, h_max_init: Scalar) -> Self {
        Self {
            compute_type,
            h_max: h_max_init,
            x_feas: Vec::new(),
            x_inf: Vec::new(),
            ref_best_feas: None,
            ref_best_inf: None,
        }
    }

    pub fn h_max(&self) -> Scalar {
        self.h_max
    }

    pub fn compute_type(&self) -> ComputeType {
        self.compute_type
    }

    pub fn x_feas(&self) -> &[EvalPoint] {
        &self.x_feas
    }

    pub fn x_inf(&self) -> &[EvalPoint] {
        &self.x_inf
    }

    fn best_feas(&mut self) -> Option<(Scalar, Scalar)> {
        let ct = self.compute_type;
        self.x_feas
            .iter_mut()
            .map(|e| e.fh(ct))
            .min_by(|a, b| {
                a.0.value()
                    .partial_cmp(&b.0.value())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    fn best_inf(&mut self) -> Option<(Scalar, Scalar)> {
        let ct = self.compute_type;
        self.x_inf
            .iter_mut()
            .filter(|e| {
                let h = e.clone().fh(ct).1;
                h.is_defined() && h.le_eps(&self.h_max, DEFAULT_EPSILON)
            })
            .map(|e| e.fh(ct))
            .min_by(|a, b| {
                a.0.value()
                    .partial_cmp(&b.0.value())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// The feasible incumbent: the minimum-`f` entry of `x_feas`, used as the
    /// frame center once the first feasible point is found. Unlike
    /// `best_feas`, this returns the point itself (not just its `(f, h)`
    /// pair) so callers can read its coordinates.
    pub fn best_feas_point(&self) -> Option<EvalPoint> {
        let ct = self.compute_type;
        self.x_feas.iter().cloned().min_by(|a, b| {
            let mut a = a.clone();
            let mut b = b.clone();
            a.fh(ct)
                .0
                .value()
                .partial_cmp(&b.fh(ct).0.value())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// The infeasible incumbent within `hMax`: the minimum-`f` entry of
    /// `x_inf` among those still below the current ceiling.
    pub fn best_inf_point(&self) -> Option<EvalPoint> {
        let ct = self.compute_type;
        let h_max = self.h_max;
        self.x_inf
            .iter()
            .cloned()
            .filter(|e| {
                let mut e = e.clone();
                let h = e.fh(ct).1;
                h.is_defined() && h.le_eps(&h_max, DEFAULT_EPSILON)
            })
            .min_by(|a, b| {
                let mut a = a.clone();
                let mut b = b.clone();
                a.fh(ct)
                    .0
                    .value()
                    .partial_cmp(&b.fh(ct).0.value())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Step 1-5 of the barrier update protocol: classify every candidate
    /// point against the current references, insert the successful ones,
    /// optionally discard the unsuccessful ones (`keep_all` retains them for
    /// later cache use), and tighten `hMax` to the best infeasible `h` seen
    /// when `update_inc_and_hmax` requests it.
    pub fn update_with_points(
        &mut self,
        mut candidates: Vec<EvalPoint>,
        keep_all: bool,
        update_inc_and_hmax: bool,
    ) -> SuccessType {
        let ct = self.compute_type;
        let h_max = self.h_max;
        let (ref_f, ref_h) = {
            let rf = self.best_feas().map(|(f, _)| f);
            let (ri_f, ri_h) = match self.best_inf() {
                Some((f, h)) => (Some(f), Some(h)),
                None => (None, None),
            };
            if rf.is_some() {
                (rf, Some(Scalar::new(0.0)))
            } else {
                (ri_f, ri_h)
            }
        };

        let mut overall = SuccessType::Unsuccessful;
        let mut accepted = Vec::new();

        for mut ep in candidates.drain(..) {
            let (f, h) = ep.fh(ct);
            if !f.is_defined() && !h.is_defined() {
                continue;
            }
            let verdict = classify(f, h, ref_f, ref_h, h_max);
            if verdict > overall {
                overall = verdict;
            }
            let feasible = h.is_defined() && h.value() == 0.0;
            let infeasible_in_bounds =
                !feasible && h.is_defined() && h.le_eps(&self.h_max, DEFAULT_EPSILON);
            if feasible || infeasible_in_bounds || keep_all {
                accepted.push(ep);
            }
        }

        // Insert into X_feas/X_inf only if not dominated by an existing
        // entry in that set; any existing entry the new point dominates is
        // dropped in turn, keeping each set a non-dominated front.
        for mut ep in accepted {
            let (ep_f, ep_h) = ep.fh(ct);
            let feasible = ep_h.is_defined() && ep_h.value() == 0.0;
            let target = if feasible {
                &mut self.x_feas
            } else {
                &mut self.x_inf
            };

            let dominated = target.iter_mut().any(|e| {
                let (e_f, e_h) = e.fh(ct);
                classify(e_f, e_h, Some(ep_f), Some(ep_h), h_max) == SuccessType::FullSuccess
            });
            if dominated {
                continue;
            }
            target.retain_mut(|e| {
                let (e_f, e_h) = e.fh(ct);
                classify(ep_f, ep_h, Some(e_f), Some(e_h), h_max) != SuccessType::FullSuccess
            });
            target.push(ep);
        }

        if update_inc_and_hmax {
            if let Some((_, h)) = self.best_inf() {
                if h.is_defined() && h.lt_eps(&self.h_max, DEFAULT_EPSILON) {
                    self.h_max = h;
                }
            }
            self.prune_above_hmax();
        }

        self.ref_best_feas = self.best_feas_point().and_then(|e| e.tag());
        self.ref_best_inf = self.best_inf_point().and_then(|e| e.tag());

        overall
    }

    /// Drop infeasible points whose `h` now exceeds the (possibly just
    /// tightened) `hMax`; `hMax` is monotone non-increasing so once a point
    /// is pruned it can never come back without a fresh evaluation.
    fn prune_above_hmax(&mut self) {
        let ct = self.compute_type;
        let h_max = self.h_max;
        self.x_inf.retain_mut(|e| {
            let (_, h) = e.fh(ct);
            h.is_defined() && h.le_eps(&h_max, DEFAULT_EPSILON)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbout::{BBOutput, BBOutputType, EvalType, OutputTypeList};
    use crate::eval::EvalRecord;
    use crate::point::{HNormType, Point};

    fn make_point(obj: f64, eb: Option<f64>) -> EvalPoint {
        let types = if eb.is_some() {
            OutputTypeList::new(vec![BBOutputType::Obj, BBOutputType::Eb])
        } else {
            OutputTypeList::new(vec![BBOutputType::Obj])
        };
        let values = match eb {
            Some(v) => vec![obj, v],
            None => vec![obj],
        };
        let mut rec = EvalRecord::new(types);
        rec.set_output(BBOutput::from_f64(&values));
        let mut ep = EvalPoint::new(Point::from_f64(&[obj]));
        ep.assign_tag();
        ep.set_record(EvalType::Bb, rec);
        ep
    }

    /// A point with a finite PB violation, so `h` aggregates to `pb`
    /// rather than jumping to infinity the way an EB violation does.
    fn make_pb_point(obj: f64, pb: f64) -> EvalPoint {
        let types = OutputTypeList::new(vec![BBOutputType::Obj, BBOutputType::Pb]);
        let mut rec = EvalRecord::new(types);
        rec.set_output(BBOutput::from_f64(&[obj, pb]));
        let mut ep = EvalPoint::new(Point::from_f64(&[obj]));
        ep.assign_tag();
        ep.set_record(EvalType::Bb, rec);
        ep
    }

    #[test]
    fn feasible_beats_infeasible() {
        let v = classify(
            Scalar::new(10.0),
            Scalar::new(0.0),
            Some(Scalar::new(1.0)),
            Some(Scalar::new(5.0)),
            Scalar::new(f64::INFINITY),
        );
        assert_eq!(v, SuccessType::FullSuccess);
    }

    #[test]
    fn infeasible_never_beats_feasible_ref() {
        let v = classify(
            Scalar::new(1.0),
            Scalar::new(0.5),
            Some(Scalar::new(10.0)),
            Some(Scalar::new(0.0)),
            Scalar::new(f64::INFINITY),
        );
        assert_eq!(v, SuccessType::Unsuccessful);
    }

    #[test]
    fn inf_vs_inf_pareto_dominance() {
        let v = classify(
            Scalar::new(1.0),
            Scalar::new(1.0),
            Some(Scalar::new(2.0)),
            Some(Scalar::new(2.0)),
            Scalar::new(f64::INFINITY),
        );
        assert_eq!(v, SuccessType::FullSuccess);
    }

    #[test]
    fn undefined_h_is_unsuccessful_regardless_of_f() {
        let v = classify(
            Scalar::new(1.0),
            Scalar::undefined(),
            Some(Scalar::new(2.0)),
            Some(Scalar::new(2.0)),
            Scalar::new(f64::INFINITY),
        );
        assert_eq!(v, SuccessType::Unsuccessful);
    }

    #[test]
    fn infinite_h_is_unsuccessful_even_with_better_f() {
        // p_f=1.0 < r_f=2.0, but p_h=+inf (an EB violation sentinel) must
        // not be treated as a Pareto improvement.
        let v = classify(
            Scalar::new(1.0),
            Scalar::new(f64::INFINITY),
            Some(Scalar::new(2.0)),
            Some(Scalar::new(2.0)),
            Scalar::new(f64::INFINITY),
        );
        assert_eq!(v, SuccessType::Unsuccessful);
    }

    #[test]
    fn h_above_h_max_is_unsuccessful() {
        let v = classify(
            Scalar::new(1.0),
            Scalar::new(6.0),
            Some(Scalar::new(2.0)),
            Some(Scalar::new(2.0)),
            Scalar::new(5.0),
        );
        assert_eq!(v, SuccessType::Unsuccessful);
    }

    #[test]
    fn first_feasible_insert_is_full_success() {
        let ct = ComputeType::standard(HNormType::L2);
        let mut barrier = ProgressiveBarrier::new(ct, Scalar::new(1.0));
        let p = make_point(5.0, None);
        let result = barrier.update_with_points(vec![p], false, true);
        assert_eq!(result, SuccessType::FullSuccess);
        assert_eq!(barrier.x_feas().len(), 1);
    }

    #[test]
    fn hmax_is_monotone_non_increasing() {
        let ct = ComputeType::standard(HNormType::L2);
        let mut barrier = ProgressiveBarrier::new(ct, Scalar::new(10.0));
        let p1 = make_point(1.0, Some(3.0));
        barrier.update_with_points(vec![p1], true, true);
        let h1 = barrier.h_max();
        let p2 = make_point(2.0, Some(8.0));
        barrier.update_with_points(vec![p2], true, true);
        assert!(barrier.h_max().value() <= h1.value());
    }

    #[test]
    fn dominated_feasible_candidate_is_not_inserted() {
        let ct = ComputeType::standard(HNormType::L2);
        let mut barrier = ProgressiveBarrier::new(ct, Scalar::new(f64::INFINITY));
        barrier.update_with_points(vec![make_point(1.0, None)], false, true);
        // f=5.0 is worse than the incumbent's f=1.0: dominated, must not grow the set.
        barrier.update_with_points(vec![make_point(5.0, None)], false, true);
        assert_eq!(barrier.x_feas().len(), 1);
        assert_eq!(barrier.x_feas()[0].x().coord(0).value(), 1.0);
    }

    #[test]
    fn dominating_candidate_evicts_existing_infeasible_entry() {
        let ct = ComputeType::standard(HNormType::L2);
        let mut barrier = ProgressiveBarrier::new(ct, Scalar::new(f64::INFINITY));
        // (f=5, h=5) is Pareto-dominated in both coordinates by (f=1, h=1).
        barrier.update_with_points(vec![make_pb_point(5.0, 5.0)], true, false);
        assert_eq!(barrier.x_inf().len(), 1);
        barrier.update_with_points(vec![make_pb_point(1.0, 1.0)], true, false);
        assert_eq!(barrier.x_inf().len(), 1);
        assert_eq!(barrier.x_inf()[0].x().coord(0).value(), 1.0);
    }
}
