//! The evaluator boundary: anything that turns a point into a [`BBOutput`],
//! plus the external-executable evaluator used when the blackbox is a
//! standalone program rather than an in-process closure.

use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

use derive_more::{Display, Error};

use crate::bbout::{BBOutput, OutputTypeList};
use crate::numeric::Scalar;
use crate::point::Point;

#[derive(Debug, Display, Error)]
pub enum EvaluatorError {
    #[display("blackbox process failed to start: {_0}")]
    Spawn(String),
    #[display("blackbox produced no output")]
    NoOutput,
    #[display("could not parse blackbox output token {_0:?}")]
    Parse(String),
}

/// Implemented by anything that can turn a point into blackbox output.
/// `h_max` is passed as a hint so evaluators that can cheaply bail out of
/// an obviously-infeasible evaluation (a simulation that diverges) may do
/// so without completing the full computation.
pub trait Evaluator: Send + Sync {
    fn output_types(&self) -> OutputTypeList;

    /// Evaluate one point. A return of `Ok(output)` with `eval_ok() ==
    /// false` is a *counted* failure (the blackbox ran but produced no
    /// usable output); an `Err` is an evaluator-level fault.
    fn eval(&self, x: &Point, h_max: Scalar) -> Result<BBOutput, EvaluatorError>;

    /// Whether a blackbox call at this point should count against the
    /// evaluation budget. Most evaluators count every call; a surrogate
    /// stand-in might not.
    fn counts_as_eval(&self, _x: &Point) -> bool {
        true
    }
}

/// Wraps any closure as an [`Evaluator`], for quick in-process blackboxes
/// and tests.
#[derive(Clone)]
pub struct ClosureEvaluator<F> {
    types: OutputTypeList,
    f: F,
}

impl<F> ClosureEvaluator<F>
where
    F: Fn(&Point) -> Vec<f64> + Send + Sync,
{
    pub fn new(types: OutputTypeList, f: F) -> Self {
        Self { types, f }
    }
}

impl<F> Evaluator for ClosureEvaluator<F>
where
    F: Fn(&Point) -> Vec<f64> + Send + Sync,
{
    fn output_types(&self) -> OutputTypeList {
        self.types.clone()
    }

    fn eval(&self, x: &Point, _h_max: Scalar) -> Result<BBOutput, EvaluatorError> {
        let values = (self.f)(x);
        Ok(BBOutput::from_f64(&values))
    }
}

/// Invokes an external executable, writing coordinates to its stdin
/// whitespace-separated and reading back a whitespace-separated vector of
/// numbers from its stdout. Mirrors the standard blackbox executable
/// convention (a program reads `X0 X1 ... Xn-1`, writes `F0 F1 ... Fk-1`).
pub struct ExecutableEvaluator {
    path: std::path::PathBuf,
    types: OutputTypeList,
}

impl ExecutableEvaluator {
    pub fn new(path: impl Into<std::path::PathBuf>, types: OutputTypeList) -> Self {
        Self {
            path: path.into(),
            types,
        }
    }
}

impl Evaluator for ExecutableEvaluator {
    fn output_types(&self) -> OutputTypeList {
        self.types.clone()
    }

    fn eval(&self, x: &Point, _h_max: Scalar) -> Result<BBOutput, EvaluatorError> {
        let mut child = Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EvaluatorError::Spawn(e.to_string()))?;

        {
            let stdin = child.stdin.as_mut().ok_or(EvaluatorError::NoOutput)?;
            let line = x
                .coords()
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(stdin, "{}", line).map_err(EvaluatorError::Spawn)?;
        }

        let stdout = child.stdout.take().ok_or(EvaluatorError::NoOutput)?;
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| EvaluatorError::Spawn(e.to_string()))?;
        let _ = child.wait();

        if line.trim().is_empty() {
            return Ok(BBOutput::failed());
        }
        let mut values = Vec::new();
        for tok in line.split_whitespace() {
            let v: f64 = tok
                .parse()
                .map_err(|_| EvaluatorError::Parse(tok.to_string()))?;
            values.push(Scalar::new(v));
        }
        Ok(BBOutput::new(values, true))
    }
}

/// Wraps an evaluator to serve a block of points in one call, used when
/// `BB_MAX_BLOCK_SIZE > 1` lets a simulator amortize startup cost across
/// several points. The default implementation just evaluates each point
/// independently; a real block blackbox would override `eval_block`.
pub trait BlockEvaluator: Evaluator {
    fn eval_block(&self, xs: &[Point], h_max: Scalar) -> Vec<Result<BBOutput, EvaluatorError>> {
        xs.iter().map(|x| self.eval(x, h_max)).collect()
    }
}

impl<T: Evaluator> BlockEvaluator for T {}

/// A type-erased, cheaply-cloneable evaluator handle, used by the
/// top-level algorithm dispatcher so a run's sub-algorithms (phase one,
/// VNS shake) can each hold their own [`crate::queue::EvaluatorControl`]
/// over the same blackbox without requiring every concrete `Evaluator` to
/// implement `Clone` itself.
pub type DynEvaluator = std::sync::Arc<dyn Evaluator>;

impl Evaluator for std::sync::Arc<dyn Evaluator> {
    fn output_types(&self) -> OutputTypeList {
        (**self).output_types()
    }

    fn eval(&self, x: &Point, h_max: Scalar) -> Result<BBOutput, EvaluatorError> {
        (**self).eval(x, h_max)
    }

    fn counts_as_eval(&self, x: &Point) -> bool {
        (**self).counts_as_eval(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbout::BBOutputType;

    #[test]
    fn closure_evaluator_runs() {
        let ev = ClosureEvaluator::new(OutputTypeList::new(vec![BBOutputType::Obj]), |x| {
            vec![x.coord(0).value() * x.coord(0).value()]
        });
        let out = ev.eval(&Point::from_f64(&[3.0]), Scalar::undefined()).unwrap();
        assert_eq!(out.values()[0], Scalar::new(9.0));
    }

    #[test]
    fn block_evaluator_default_maps() {
        let ev = ClosureEvaluator::new(OutputTypeList::new(vec![BBOutputType::Obj]), |x| {
            vec![x.coord(0).value()]
        });
        let xs = vec![Point::from_f64(&[1.0]), Point::from_f64(&[2.0])];
        let results = ev.eval_block(&xs, Scalar::undefined());
        assert_eq!(results.len(), 2);
    }
}
