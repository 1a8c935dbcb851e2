//! Poll: the exhaustive, positive-spanning direction set evaluated around
//! the frame center when search does not find a success.

use crate::mesh::GranularMesh;
use crate::numeric::Scalar;
use crate::point::{Direction, Point};
use crate::rng::RngContext;

/// Which poll-direction family to generate. `Ortho2n` is the classical
/// `2n` coordinate directions; `NPlus1` uses a single random direction
/// reflected to complete a minimal positive basis (cheaper per iteration,
/// weaker theoretical guarantees).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDirectionType {
    Ortho2n,
    NPlus1,
}

/// Generate the raw (unscaled, `{-1,0,1}`-valued) direction set for `n`
/// variables.
pub fn generate_directions(n: usize, kind: PollDirectionType, rng: &mut RngContext) -> Vec<Direction> {
    match kind {
        PollDirectionType::Ortho2n => {
            let mut dirs = Vec::with_capacity(2 * n);
            for i in 0..n {
                dirs.push(Direction::unit(n, i, 1.0));
                dirs.push(Direction::unit(n, i, -1.0));
            }
            dirs
        }
        PollDirectionType::NPlus1 => {
            let mut b = vec![0.0_f64; n * n];
            for i in 0..n {
                b[i * n + i] = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            }
            let mut dirs: Vec<Direction> = (0..n)
                .map(|i| {
                    Direction::new((0..n).map(|j| Scalar::new(b[i * n + j])).collect())
                })
                .collect();
            let last: Vec<Scalar> = (0..n)
                .map(|j| -(0..n).fold(0.0, |acc, i| acc + b[i * n + j]))
                .map(Scalar::new)
                .collect();
            dirs.push(Direction::new(last));
            dirs
        }
    }
}

/// Scale the direction set by the mesh's frame size, project onto the mesh
/// lattice, and add to `center` to produce candidate poll points.
pub fn poll_points(center: &Point, mesh: &GranularMesh, dirs: &[Direction]) -> Vec<Point> {
    dirs.iter()
        .map(|d| {
            let scaled = mesh.scale_and_project_on_mesh(d);
            center.add_direction(&scaled)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ortho_2n_has_2n_directions_and_spans() {
        let mut rng = RngContext::from_seed(1);
        let dirs = generate_directions(3, PollDirectionType::Ortho2n, &mut rng);
        assert_eq!(dirs.len(), 6);
        assert!(Direction::positively_spans(&dirs, 3));
    }

    #[test]
    fn poll_points_lie_on_mesh() {
        let mesh = GranularMesh::new(&[1.0, 1.0], &[0.0, 0.0]);
        let center = Point::from_f64(&[0.0, 0.0]);
        let mut rng = RngContext::from_seed(2);
        let dirs = generate_directions(2, PollDirectionType::Ortho2n, &mut rng);
        let points = poll_points(&center, &mesh, &dirs);
        assert_eq!(points.len(), 4);
        for p in &points {
            for c in p.coords() {
                assert_eq!(c.value() % mesh.mesh_size(0), 0.0);
            }
        }
    }
}
