//! Search: cheap, non-exhaustive trial-point generators tried before poll.
//! The data model treats model/surrogate search as an opaque black box
//! (out of scope); what remains here is the always-available random
//! search step.

use crate::mesh::GranularMesh;
use crate::point::Point;
use crate::rng::RngContext;

/// A search method proposes points without any positive-spanning
/// guarantee; MADS convergence only relies on poll, so search may be a
/// no-op.
pub trait SearchMethod: Send + Sync {
    fn generate(&self, center: &Point, mesh: &GranularMesh, rng: &mut RngContext) -> Vec<Point>;
}

/// No search step: the classical poll-only MADS configuration.
pub struct NoSearch;

impl SearchMethod for NoSearch {
    fn generate(&self, _center: &Point, _mesh: &GranularMesh, _rng: &mut RngContext) -> Vec<Point> {
        Vec::new()
    }
}

/// Draws `count` points uniformly within a box of the current frame size
/// around `center`, clipped to `[lb, ub]`. The simplest search method that
/// still benefits from an enlarged frame.
pub struct RandomSearch {
    pub count: usize,
    pub lb: Point,
    pub ub: Point,
}

impl SearchMethod for RandomSearch {
    fn generate(&self, center: &Point, mesh: &GranularMesh, rng: &mut RngContext) -> Vec<Point> {
        let n = center.dim();
        (0..self.count)
            .map(|_| {
                let mut coords = Vec::with_capacity(n);
                for i in 0..n {
                    let delta = mesh.frame_size(i) * 2.0;
                    let c = center.coord(i).value();
                    coords.push(crate::numeric::Scalar::new(rng.uniform(c - delta, c + delta)));
                }
                let mut p = Point::new(coords);
                p.snap_to_bounds(&self.lb, &self.ub);
                mesh.project_on_mesh(&p, center)
            })
            .collect()
    }
}
