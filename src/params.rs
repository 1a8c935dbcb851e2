//! The parameter surface: a validated, dynamically-typed registry of run
//! options. Deliberately hand-rolled (no attribute-macro code generation)
//! as a `dyn Any` + `DynClone` map keyed by parameter name, in the spirit
//! of the teacher's options registry but without its proc-macro layer.

use std::any::Any;
use std::collections::HashMap;

use derive_more::{Display, Error};
use dyn_clone::DynClone;

use crate::point::HNormType;

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("unknown parameter {_0:?}")]
    Unknown(String),
    #[display("parameter {_0:?} has type {_1}, not the requested type")]
    TypeMismatch(String, &'static str),
    #[display("parameter {_0:?} failed validation: {_1}")]
    Invalid(String, String),
}

trait ParamValue: Any + DynClone + std::fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}
dyn_clone::clone_trait_object!(ParamValue);

impl<T: Any + Clone + std::fmt::Debug + Send + Sync> ParamValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Category a parameter belongs to, mirroring the data model's grouping
/// of the parameter surface (problem definition, run control, cache and
/// display).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamCategory {
    Problem,
    Run,
    CacheDisplay,
}

struct Entry {
    value: Box<dyn ParamValue>,
    category: ParamCategory,
}

/// The dynamically-typed, validated parameter registry.
#[derive(Default)]
pub struct Parameters {
    entries: HashMap<String, Entry>,
}

impl Clone for Parameters {
    fn clone(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    Entry {
                        value: dyn_clone::clone_box(&*v.value),
                        category: v.category,
                    },
                )
            })
            .collect();
        Self { entries }
    }
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any + Clone + std::fmt::Debug + Send + Sync>(
        &mut self,
        name: &str,
        category: ParamCategory,
        value: T,
    ) {
        self.entries.insert(
            name.to_string(),
            Entry {
                value: Box::new(value),
                category,
            },
        );
    }

    pub fn get<T: Any + Clone>(&self, name: &str) -> Result<T, ConfigError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ConfigError::Unknown(name.to_string()))?;
        entry
            .value
            .as_any()
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ConfigError::TypeMismatch(name.to_string(), std::any::type_name::<T>()))
    }

    pub fn get_or<T: Any + Clone>(&self, name: &str, default: T) -> T {
        self.get(name).unwrap_or(default)
    }

    pub fn category_of(&self, name: &str) -> Option<ParamCategory> {
        self.entries.get(name).map(|e| e.category)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// Eagerly-validated run configuration built from a [`Parameters`]
/// registry, covering the subset of the parameter surface the core solver
/// consults directly (dimension, bounds, budgets, mesh/barrier knobs).
/// Anything outside this subset stays in the dynamic registry and is
/// looked up by name as needed (e.g. by a display/logging layer).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunConfig {
    pub dimension: usize,
    pub lower_bound: Vec<f64>,
    pub upper_bound: Vec<f64>,
    pub granularity: Vec<f64>,
    pub initial_frame_size: Vec<f64>,
    pub h_norm: HNormType,
    pub h_max_init: f64,
    pub max_bb_eval: Option<u64>,
    pub max_eval: Option<u64>,
    pub max_time_secs: Option<u64>,
    pub opportunistic_eval: bool,
    pub nb_threads: usize,
    pub seed: u64,
    pub stop_if_feasible: bool,
    pub direction_type: String,
    pub anisotropic_mesh: bool,
}

impl RunConfig {
    /// Build and validate a [`RunConfig`] from the dynamic registry,
    /// applying defaults for anything unset. Mirrors the "parameters are
    /// validated once, eagerly, before the run starts" rule.
    pub fn from_parameters(x0: &[f64], lb: &[f64], ub: &[f64], p: &Parameters) -> Result<Self, ConfigError> {
        let dimension = x0.len();
        if lb.len() != dimension || ub.len() != dimension {
            return Err(ConfigError::Invalid(
                "BB_INPUT_TYPE".to_string(),
                "X0/LOWER_BOUND/UPPER_BOUND must share the same dimension".to_string(),
            ));
        }
        for i in 0..dimension {
            if lb[i] > ub[i] {
                return Err(ConfigError::Invalid(
                    "LOWER_BOUND".to_string(),
                    format!("coordinate {i}: lower bound exceeds upper bound"),
                ));
            }
        }
        let granularity = p.get_or("GRANULARITY", vec![0.0; dimension]);
        if granularity.len() != dimension {
            return Err(ConfigError::Invalid(
                "GRANULARITY".to_string(),
                "must have one entry per dimension".to_string(),
            ));
        }
        let initial_frame_size = p.get_or(
            "INITIAL_FRAME_SIZE",
            (0..dimension)
                .map(|i| {
                    let span = ub[i] - lb[i];
                    if span.is_finite() && span > 0.0 {
                        span / 10.0
                    } else {
                        1.0
                    }
                })
                .collect::<Vec<_>>(),
        );
        let max_bb_eval = p.get_or::<Option<u64>>("MAX_BB_EVAL", None);
        let max_eval = p.get_or::<Option<u64>>("MAX_EVAL", None);
        let max_time_secs = p.get_or::<Option<u64>>("MAX_TIME", None);
        if max_bb_eval.is_none() && max_eval.is_none() && max_time_secs.is_none() {
            return Err(ConfigError::Invalid(
                "MAX_BB_EVAL".to_string(),
                "at least one stopping budget (MAX_BB_EVAL, MAX_EVAL, or MAX_TIME) must be set"
                    .to_string(),
            ));
        }
        Ok(Self {
            dimension,
            lower_bound: lb.to_vec(),
            upper_bound: ub.to_vec(),
            granularity,
            initial_frame_size,
            h_norm: p.get_or("H_NORM", HNormType::L2),
            h_max_init: p.get_or("H_MAX_0", f64::INFINITY),
            max_bb_eval,
            max_eval,
            max_time_secs,
            opportunistic_eval: p.get_or("OPPORTUNISTIC_EVAL", true),
            nb_threads: p.get_or("NB_THREADS", 1usize),
            seed: p.get_or("SEED", 0u64),
            stop_if_feasible: p.get_or("STOP_IF_FEASIBLE", false),
            direction_type: p.get_or("DIRECTION_TYPE", "ORTHO_2N".to_string()),
            anisotropic_mesh: p.get_or("ANISOTROPIC_MESH", true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_round_trips() {
        let mut p = Parameters::new();
        p.set("SEED", ParamCategory::Run, 42u64);
        assert_eq!(p.get::<u64>("SEED").unwrap(), 42);
    }

    #[test]
    fn unknown_parameter_errors() {
        let p = Parameters::new();
        assert!(matches!(p.get::<u64>("NOPE"), Err(ConfigError::Unknown(_))));
    }

    #[test]
    fn type_mismatch_errors() {
        let mut p = Parameters::new();
        p.set("SEED", ParamCategory::Run, 42u64);
        assert!(matches!(
            p.get::<String>("SEED"),
            Err(ConfigError::TypeMismatch(_, _))
        ));
    }

    #[test]
    fn run_config_rejects_missing_budget() {
        let p = Parameters::new();
        let err = RunConfig::from_parameters(&[0.0, 0.0], &[-1.0, -1.0], &[1.0, 1.0], &p);
        assert!(err.is_err());
    }

    #[test]
    fn run_config_builds_with_defaults() {
        let mut p = Parameters::new();
        p.set("MAX_BB_EVAL", ParamCategory::Run, Some(100u64));
        let cfg = RunConfig::from_parameters(&[0.0, 0.0], &[-1.0, -1.0], &[1.0, 1.0], &p).unwrap();
        assert_eq!(cfg.dimension, 2);
        assert_eq!(cfg.max_bb_eval, Some(100));
    }

    #[test]
    fn run_config_round_trips_through_json() {
        let mut p = Parameters::new();
        p.set("MAX_BB_EVAL", ParamCategory::Run, Some(250u64));
        let cfg = RunConfig::from_parameters(&[1.0, -1.0], &[-5.0, -5.0], &[5.0, 5.0], &p).unwrap();

        let json = serde_json::to_string(&cfg).unwrap();
        let restored: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.dimension, cfg.dimension);
        assert_eq!(restored.max_bb_eval, cfg.max_bb_eval);
        assert_eq!(restored.lower_bound, cfg.lower_bound);
    }
}
