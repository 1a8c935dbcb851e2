//! A derivative-free, mesh-based, constrained blackbox optimizer core.
//!
//! Evaluates user-supplied blackbox functions through an [`Evaluator`],
//! drives them with a Mesh Adaptive Direct Search loop
//! ([`algos::mads`]) backed by a progressive barrier for general
//! constraints, and exposes the whole run through [`algos::Algorithm`].

pub mod algos;
pub mod barrier;
pub mod bbout;
pub mod blackbox;
pub mod cache;
pub mod eval;
pub mod hotrestart;
pub mod mesh;
pub mod numeric;
pub mod params;
pub mod point;
pub mod queue;
pub mod rng;
pub mod step;
pub mod terminators;

pub use algos::{Algorithm, AlgorithmRun};
pub use bbout::{BBOutput, ComputeType};
pub use blackbox::{DynEvaluator, Evaluator};
pub use params::{ConfigError, Parameters, RunConfig};
pub use point::Point;
pub use step::StopCode;
