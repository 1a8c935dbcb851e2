//! Algorithms: MADS itself, plus the sub-algorithms a run may dip into
//! (phase one, VNS shake) and the top-level dispatcher that wires them
//! into one evaluator control.
//!
//! Phase one has no separate module: it is the same mega-iteration loop as
//! the main run, just seeded under `ComputeType::phase_one` and sharing the
//! parent's `EvaluatorControl`/budget/cache — see
//! [`algorithm::PhaseOneThenMadsRun`].

pub mod algorithm;
pub mod mads;
pub mod vns;

pub use algorithm::{Algorithm, AlgorithmRun, MadsRun, PhaseOneThenMadsRun};
pub use vns::{run_vns_shake, shake, VnsNeighborhood, VnsOutcome};
