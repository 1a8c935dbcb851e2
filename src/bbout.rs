//! Blackbox output typing: the raw tuple an evaluator returns, what each
//! position in that tuple means, and the pure rules used to derive `f` and
//! `h` from it for a given [`ComputeType`].

use crate::numeric::Scalar;
use crate::point::HNormType;

/// What a single position in a blackbox output tuple represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BBOutputType {
    /// The objective.
    Obj,
    /// A progressive-barrier constraint: contributes to `h` but does not
    /// make the point infeasible outright.
    Pb,
    /// An extreme-barrier constraint: any violation makes the point
    /// infeasible regardless of `h`.
    Eb,
    /// A revealed PB constraint, used by DiscoMADS-style hidden-constraint
    /// discovery.
    Rpb,
    /// Informational statistic, not used in `f`/`h`.
    Stat,
    /// Placeholder for counted-but-unused output slots.
    Count,
}

/// Associates a [`BBOutputType`] with each position of an evaluator's
/// output tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTypeList {
    types: Vec<BBOutputType>,
}

impl OutputTypeList {
    pub fn new(types: Vec<BBOutputType>) -> Self {
        Self { types }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, i: usize) -> BBOutputType {
        self.types[i]
    }

    pub fn indices_of(&self, kind: BBOutputType) -> Vec<usize> {
        self.types
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == kind)
            .map(|(i, _)| i)
            .collect()
    }
}

/// The raw tuple of scalars one evaluation produced, plus whether the
/// evaluation itself succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct BBOutput {
    values: Vec<Scalar>,
    eval_ok: bool,
}

impl BBOutput {
    pub fn new(values: Vec<Scalar>, eval_ok: bool) -> Self {
        Self { values, eval_ok }
    }

    pub fn from_f64(values: &[f64]) -> Self {
        Self::new(values.iter().map(|&v| Scalar::new(v)).collect(), true)
    }

    pub fn failed() -> Self {
        Self {
            values: Vec::new(),
            eval_ok: false,
        }
    }

    pub fn eval_ok(&self) -> bool {
        self.eval_ok
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    /// Values at the positions of a given type, in order.
    pub fn slice_by_type(&self, types: &OutputTypeList, kind: BBOutputType) -> Vec<Scalar> {
        types
            .indices_of(kind)
            .into_iter()
            .filter_map(|i| self.values.get(i).copied())
            .collect()
    }

    pub fn objectives(&self, types: &OutputTypeList) -> Vec<Scalar> {
        self.slice_by_type(types, BBOutputType::Obj)
    }

    pub fn pb_constraints(&self, types: &OutputTypeList) -> Vec<Scalar> {
        self.slice_by_type(types, BBOutputType::Pb)
    }

    pub fn eb_constraints(&self, types: &OutputTypeList) -> Vec<Scalar> {
        self.slice_by_type(types, BBOutputType::Eb)
    }
}

/// Which blackbox (or surrogate/model) an evaluation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvalType {
    #[default]
    Bb,
    Model,
    Surrogate,
    Undefined,
}

/// Which rule is used to compute `f`/`h` from an evaluation's raw output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComputeKind {
    #[default]
    Standard,
    PhaseOne,
    DMultiCombineF,
    User,
}

/// A compute-type descriptor: which evaluator, which (f, h) rule, and which
/// norm aggregates constraint violation into `h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComputeType {
    pub eval_type: EvalType,
    pub compute_kind: ComputeKind,
    pub h_norm: HNormType,
}

impl ComputeType {
    pub fn standard(h_norm: HNormType) -> Self {
        Self {
            eval_type: EvalType::Bb,
            compute_kind: ComputeKind::Standard,
            h_norm,
        }
    }

    pub fn phase_one(h_norm: HNormType) -> Self {
        Self {
            eval_type: EvalType::Bb,
            compute_kind: ComputeKind::PhaseOne,
            h_norm,
        }
    }

    fn aggregate(values: &[Scalar], h_norm: HNormType) -> Scalar {
        if values.is_empty() {
            return Scalar::new(0.0);
        }
        if values.iter().any(|v| !v.is_defined()) {
            return Scalar::undefined();
        }
        let clipped: Vec<Scalar> = values.iter().map(|v| v.max(Scalar::new(0.0))).collect();
        match h_norm {
            HNormType::L1 => clipped
                .iter()
                .fold(Scalar::new(0.0), |acc, v| acc + *v),
            HNormType::L2 => {
                let sum_sq: f64 = clipped.iter().map(|v| v.value() * v.value()).sum();
                Scalar::new(sum_sq.sqrt())
            }
            HNormType::LInf => clipped
                .iter()
                .fold(Scalar::new(0.0), |acc, v| acc.max(*v)),
        }
    }

    /// Compute the objective `f` from a raw output given this compute-type.
    pub fn f(&self, output: &BBOutput, types: &OutputTypeList) -> Scalar {
        if !output.eval_ok() {
            return Scalar::undefined();
        }
        match self.compute_kind {
            ComputeKind::Standard | ComputeKind::DMultiCombineF | ComputeKind::User => {
                let objs = output.objectives(types);
                objs.first().copied().unwrap_or_else(Scalar::undefined)
            }
            ComputeKind::PhaseOne => {
                let eb = output.eb_constraints(types);
                Self::aggregate(&eb, self.h_norm)
            }
        }
    }

    /// Compute the aggregate constraint violation `h` from a raw output.
    /// Under `PhaseOne`, `h` is not meaningful — feasibility there is
    /// `f == 0`, so we report `0` to keep barrier plumbing well-defined.
    pub fn h(&self, output: &BBOutput, types: &OutputTypeList) -> Scalar {
        if !output.eval_ok() {
            return Scalar::undefined();
        }
        match self.compute_kind {
            ComputeKind::PhaseOne => Scalar::new(0.0),
            _ => {
                let eb = output.eb_constraints(types);
                if eb.iter().any(|v| v.is_defined() && v.value() > 0.0) {
                    return Scalar::POS_INF;
                }
                let pb = output.pb_constraints(types);
                Self::aggregate(&pb, self.h_norm)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_f_and_h() {
        let types = OutputTypeList::new(vec![BBOutputType::Obj, BBOutputType::Pb]);
        let out = BBOutput::from_f64(&[2.5, 1.0]);
        let ct = ComputeType::standard(HNormType::L2);
        assert_eq!(ct.f(&out, &types), Scalar::new(2.5));
        assert_eq!(ct.h(&out, &types), Scalar::new(1.0));
    }

    #[test]
    fn eb_violation_sets_h_infinite() {
        let types = OutputTypeList::new(vec![BBOutputType::Obj, BBOutputType::Eb]);
        let out = BBOutput::from_f64(&[1.0, 0.1]);
        let ct = ComputeType::standard(HNormType::L2);
        assert!(ct.h(&out, &types).is_inf());
    }

    #[test]
    fn phase_one_f_is_eb_violation() {
        let types = OutputTypeList::new(vec![BBOutputType::Obj, BBOutputType::Eb]);
        let out = BBOutput::from_f64(&[10.0, 0.3]);
        let ct = ComputeType::phase_one(HNormType::L2);
        assert_eq!(ct.f(&out, &types), Scalar::new(0.3));
    }

    #[test]
    fn failed_eval_is_undefined() {
        let types = OutputTypeList::new(vec![BBOutputType::Obj]);
        let out = BBOutput::failed();
        let ct = ComputeType::standard(HNormType::L2);
        assert!(!ct.f(&out, &types).is_defined());
        assert!(!ct.h(&out, &types).is_defined());
    }
}
