//! Hot-restart serialization: snapshot enough of a run's state to resume
//! an interrupted optimization bit-for-bit, written as a tagged text
//! stream so unknown tags from a newer/older format are simply skipped
//! rather than failing the read.

use std::io::{self, BufRead, Write};

use crate::barrier::ProgressiveBarrier;
use crate::bbout::{BBOutput, BBOutputType, ComputeType, EvalType, OutputTypeList};
use crate::eval::{EvalPoint, EvalRecord};
use crate::mesh::GranularMesh;
use crate::numeric::Scalar;
use crate::point::{HNormType, Point};
use crate::rng::RngContext;

/// The fields a hot-restart file records. `MEGA_ITERATION`/`ITERATION_COUNT`
/// track progress counters; `MAIN_MESH` and `BARRIER` capture enough to
/// reconstruct the search state; `RNG` captures the generator position.
#[derive(Debug, Clone)]
pub struct HotRestartState {
    pub mega_iteration: u64,
    pub iteration_count: u64,
    pub mesh_frame_sizes: Vec<f64>,
    pub mesh_granularity: Vec<f64>,
    pub h_max: f64,
    pub x_feas: Vec<Point>,
    pub x_inf: Vec<Point>,
    pub nb_eval: u64,
    pub nb_bb_eval: u64,
    pub rng_seed: u64,
    pub rng_state: [u64; 3],
}

impl HotRestartState {
    pub fn capture(
        mega_iteration: u64,
        iteration_count: u64,
        mesh: &GranularMesh,
        barrier: &ProgressiveBarrier,
        nb_eval: u64,
        nb_bb_eval: u64,
        rng: &mut RngContext,
    ) -> Self {
        Self {
            mega_iteration,
            iteration_count,
            mesh_frame_sizes: mesh.frame_sizes(),
            mesh_granularity: mesh.granularity().to_vec(),
            h_max: barrier.h_max().value(),
            x_feas: barrier.x_feas().iter().map(|e| e.x().clone()).collect(),
            x_inf: barrier.x_inf().iter().map(|e| e.x().clone()).collect(),
            nb_eval,
            nb_bb_eval,
            rng_seed: rng.seed(),
            rng_state: rng.serialize_state(),
        }
    }

    /// Rebuild a mesh and barrier from this snapshot so a resumed run
    /// starts exactly where the interrupted one left off.
    pub fn restore(&self, h_norm: HNormType) -> (GranularMesh, ProgressiveBarrier, RngContext) {
        let mesh = GranularMesh::new(&self.mesh_frame_sizes, &self.mesh_granularity);
        let ct = ComputeType::standard(h_norm);
        let mut barrier = ProgressiveBarrier::new(ct, Scalar::new(self.h_max));
        let feas: Vec<EvalPoint> = self
            .x_feas
            .iter()
            .cloned()
            .map(|p| {
                let mut ep = EvalPoint::new(p);
                ep.assign_tag();
                let types = OutputTypeList::new(vec![BBOutputType::Obj]);
                let mut rec = EvalRecord::new(types);
                rec.set_output(BBOutput::from_f64(&[0.0]));
                ep.set_record(EvalType::Bb, rec);
                ep
            })
            .collect();
        let inf: Vec<EvalPoint> = self
            .x_inf
            .iter()
            .cloned()
            .map(|p| {
                let mut ep = EvalPoint::new(p);
                ep.assign_tag();
                ep
            })
            .collect();
        let mut all = feas;
        all.extend(inf);
        barrier.update_with_points(all, true, false);
        let rng = RngContext::from_state(self.rng_seed, self.rng_state);
        (mesh, barrier, rng)
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "MEGA_ITERATION {}", self.mega_iteration)?;
        writeln!(w, "ITERATION_COUNT {}", self.iteration_count)?;
        writeln!(w, "MAIN_MESH {}", format_nums(&self.mesh_frame_sizes))?;
        writeln!(w, "MESH_GRANULARITY {}", format_nums(&self.mesh_granularity))?;
        writeln!(w, "H_MAX {}", self.h_max)?;
        writeln!(w, "NB_EVAL {}", self.nb_eval)?;
        writeln!(w, "NB_BB_EVAL {}", self.nb_bb_eval)?;
        for p in &self.x_feas {
            writeln!(w, "X_FEAS {}", format_nums(&coords_f64(p)))?;
        }
        for p in &self.x_inf {
            writeln!(w, "X_INF {}", format_nums(&coords_f64(p)))?;
        }
        writeln!(
            w,
            "RNG {} {} {} {}",
            self.rng_seed, self.rng_state[0], self.rng_state[1], self.rng_state[2]
        )?;
        Ok(())
    }

    /// Parse a hot-restart stream. Tags not recognized by this build are
    /// skipped rather than treated as a parse error, so a file written by
    /// a newer format with extra fields still loads.
    pub fn read<R: BufRead>(r: R) -> io::Result<Self> {
        let mut mega_iteration = 0u64;
        let mut iteration_count = 0u64;
        let mut mesh_frame_sizes = Vec::new();
        let mut mesh_granularity = Vec::new();
        let mut h_max = f64::INFINITY;
        let mut nb_eval = 0u64;
        let mut nb_bb_eval = 0u64;
        let mut x_feas = Vec::new();
        let mut x_inf = Vec::new();
        let mut rng_seed = 0u64;
        let mut rng_state = [0u64; 3];

        for line in r.lines() {
            let line = line?;
            let mut tokens = line.split_whitespace();
            let Some(tag) = tokens.next() else { continue };
            let rest: Vec<&str> = tokens.collect();
            match tag {
                "MEGA_ITERATION" => mega_iteration = parse_or(&rest, 0, 0),
                "ITERATION_COUNT" => iteration_count = parse_or(&rest, 0, 0),
                "MAIN_MESH" => mesh_frame_sizes = parse_all(&rest),
                "MESH_GRANULARITY" => mesh_granularity = parse_all(&rest),
                "H_MAX" => h_max = parse_or(&rest, 0, f64::INFINITY),
                "NB_EVAL" => nb_eval = parse_or(&rest, 0, 0),
                "NB_BB_EVAL" => nb_bb_eval = parse_or(&rest, 0, 0),
                "X_FEAS" => x_feas.push(Point::from_f64(&parse_all(&rest))),
                "X_INF" => x_inf.push(Point::from_f64(&parse_all(&rest))),
                "RNG" => {
                    rng_seed = parse_or(&rest, 0, 0);
                    rng_state = [
                        parse_or(&rest, 1, 0),
                        parse_or(&rest, 2, 0),
                        parse_or(&rest, 3, 0),
                    ];
                }
                _ => {
                    // Unknown tag: a newer or forward-compatible format
                    // field. Skip it and keep reading the rest of the
                    // stream.
                }
            }
        }

        Ok(Self {
            mega_iteration,
            iteration_count,
            mesh_frame_sizes,
            mesh_granularity,
            h_max,
            x_feas,
            x_inf,
            nb_eval,
            nb_bb_eval,
            rng_seed,
            rng_state,
        })
    }
}

fn coords_f64(p: &Point) -> Vec<f64> {
    p.coords().iter().map(|c| c.value()).collect()
}

fn format_nums(v: &[f64]) -> String {
    v.iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_all(tokens: &[&str]) -> Vec<f64> {
    tokens.iter().filter_map(|t| t.parse().ok()).collect()
}

fn parse_or<T: std::str::FromStr + Copy>(tokens: &[&str], idx: usize, default: T) -> T {
    tokens.get(idx).and_then(|t| t.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let state = HotRestartState {
            mega_iteration: 3,
            iteration_count: 12,
            mesh_frame_sizes: vec![1.0, 0.5],
            mesh_granularity: vec![0.0, 0.0],
            h_max: 2.5,
            x_feas: vec![Point::from_f64(&[1.0, 2.0])],
            x_inf: vec![Point::from_f64(&[3.0, 4.0])],
            nb_eval: 100,
            nb_bb_eval: 95,
            rng_seed: 42,
            rng_state: [1, 2, 3],
        };
        let mut buf = Vec::new();
        state.write(&mut buf).unwrap();
        let restored = HotRestartState::read(io::Cursor::new(buf)).unwrap();
        assert_eq!(restored.mega_iteration, 3);
        assert_eq!(restored.nb_bb_eval, 95);
        assert_eq!(restored.x_feas.len(), 1);
        assert_eq!(restored.rng_state, [1, 2, 3]);
    }

    #[test]
    fn unknown_tags_are_skipped() {
        let text = "MEGA_ITERATION 1\nFUTURE_FIELD 9 9 9\nNB_EVAL 5\n";
        let restored = HotRestartState::read(io::Cursor::new(text.as_bytes())).unwrap();
        assert_eq!(restored.mega_iteration, 1);
        assert_eq!(restored.nb_eval, 5);
    }
}
