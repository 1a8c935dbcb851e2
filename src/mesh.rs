//! The granular mesh: a per-coordinate integer-lattice discretization of the
//! search space, with anisotropic refinement/enlargement and granularity
//! constraints.

use crate::point::{Direction, Point};
use crate::step::StopReason;

/// One step of the mantissa cycle `1 -> 2 -> 5 -> 1`, reporting whether the
/// step wrapped (in which case the caller bumps the exponent).
fn mantissa_forward(a: u8) -> (u8, bool) {
    match a {
        1 => (2, false),
        2 => (5, false),
        5 => (1, true),
        _ => unreachable!("mantissa out of {{1,2,5}}"),
    }
}

/// One step of the mantissa cycle backward: `5 -> 2 -> 1 -> 5`.
fn mantissa_backward(a: u8) -> (u8, bool) {
    match a {
        5 => (2, false),
        2 => (1, false),
        1 => (5, true),
        _ => unreachable!("mantissa out of {{1,2,5}}"),
    }
}

/// Precision below which the mesh is considered to have converged.
pub const MESH_PRECISION: f64 = 1e-13;

/// Anisotropic, granular mesh as described in the data model: every
/// coordinate carries an independent mantissa/exponent pair plus an
/// optional granularity.
#[derive(Debug, Clone)]
pub struct GranularMesh {
    n: usize,
    b0: Vec<i32>,
    a: Vec<u8>,
    b: Vec<i32>,
    g: Vec<f64>,
    anisotropic: bool,
    anisotropy_factor: f64,
    refine_freq: u32,
    refine_counter: u32,
}

impl GranularMesh {
    /// Build a mesh from an initial frame size per coordinate and an
    /// optional granularity per coordinate.
    pub fn new(initial_frame_size: &[f64], granularity: &[f64]) -> Self {
        let n = initial_frame_size.len();
        assert_eq!(granularity.len(), n);
        let mut a = vec![1u8; n];
        let mut b = vec![0i32; n];
        for i in 0..n {
            let (ai, bi) = decompose(initial_frame_size[i]);
            a[i] = ai;
            b[i] = bi;
        }
        Self {
            n,
            b0: b.clone(),
            a,
            b,
            g: granularity.to_vec(),
            anisotropic: true,
            anisotropy_factor: 0.1,
            refine_freq: 1,
            refine_counter: 0,
        }
    }

    pub fn with_anisotropy(mut self, anisotropic: bool, factor: f64) -> Self {
        self.anisotropic = anisotropic;
        self.anisotropy_factor = factor;
        self
    }

    pub fn with_refine_freq(mut self, freq: u32) -> Self {
        self.refine_freq = freq.max(1);
        self
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Frame size `Delta_i`.
    pub fn frame_size(&self, i: usize) -> f64 {
        let mantissa = (self.a[i] as f64) * 10f64.powi(self.b[i]);
        if self.g[i] > 0.0 {
            self.g[i] * mantissa
        } else {
            mantissa
        }
    }

    pub fn frame_sizes(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.frame_size(i)).collect()
    }

    /// Mesh size `delta_i`.
    pub fn mesh_size(&self, i: usize) -> f64 {
        let exp = self.b[i] - (self.b[i] - self.b0[i]).abs();
        if self.g[i] > 0.0 {
            self.g[i] * 10f64.powi(exp).max(1.0)
        } else {
            10f64.powi(exp)
        }
    }

    pub fn mesh_sizes(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.mesh_size(i)).collect()
    }

    /// Anisotropy ratio `rho_i = Delta_i / delta_i`.
    pub fn rho(&self, i: usize) -> f64 {
        self.frame_size(i) / self.mesh_size(i)
    }

    pub fn granularity(&self) -> &[f64] {
        &self.g
    }

    /// Enlarge the frame size along coordinates where `dir` is large
    /// relative to the current frame (or all coordinates, when the mesh is
    /// not anisotropic). Returns `true` if any coordinate was enlarged.
    pub fn enlarge_delta_frame_size(&mut self, dir: &Direction) -> bool {
        let mut enlarged = false;
        for i in 0..self.n {
            let should_enlarge = if self.anisotropic {
                let d = dir.coord(i);
                let delta = self.frame_size(i);
                d.is_defined() && delta > 0.0 && (d.value() / delta).abs() >= self.anisotropy_factor
            } else {
                true
            };
            if should_enlarge {
                let (next_a, wrapped) = mantissa_forward(self.a[i]);
                self.a[i] = next_a;
                if wrapped {
                    self.b[i] += 1;
                }
                enlarged = true;
            }
        }
        enlarged
    }

    /// Refine every coordinate's frame size one mantissa-step, throttled by
    /// `refine_freq` (only every K-th call actually refines). A coordinate
    /// whose granularity would be violated (already at `(a, b) = (1, 0)`)
    /// is left untouched.
    pub fn refine_delta_frame_size(&mut self) {
        self.refine_counter += 1;
        if self.refine_counter % self.refine_freq != 0 {
            return;
        }
        for i in 0..self.n {
            if self.g[i] > 0.0 && self.a[i] == 1 && self.b[i] == 0 {
                continue;
            }
            let (next_a, wrapped) = mantissa_backward(self.a[i]);
            self.a[i] = next_a;
            if wrapped {
                self.b[i] -= 1;
            }
        }
    }

    pub fn check_mesh_for_stopping(&self, stop: &StopReason) {
        let max_delta = self
            .frame_sizes()
            .into_iter()
            .fold(0.0_f64, |acc, d| acc.max(d));
        if max_delta < MESH_PRECISION {
            stop.set(crate::step::StopCode::MeshPrecReached);
            return;
        }
        let all_at_floor = (0..self.n).all(|i| self.g[i] <= 0.0 || (self.a[i] == 1 && self.b[i] == 0));
        if self.g.iter().any(|&g| g > 0.0) && all_at_floor {
            stop.set(crate::step::StopCode::GranularMeshPrecReached);
        }
    }

    /// Scale `dir` by the frame size and round to the mesh lattice (and to
    /// granularity).
    pub fn scale_and_project_on_mesh(&self, dir: &Direction) -> Direction {
        let delta = self.frame_sizes();
        let mesh = self.mesh_sizes();
        let coords = (0..self.n)
            .map(|i| {
                let d = dir.coord(i);
                if !d.is_defined() {
                    return d;
                }
                let scaled = d.value() * delta[i];
                let snapped = if mesh[i] > 0.0 {
                    (scaled / mesh[i]).round() * mesh[i]
                } else {
                    scaled
                };
                crate::numeric::Scalar::new(snapped)
            })
            .collect();
        Direction::new(coords)
    }

    /// Project `point` onto the mesh lattice centered at `center`.
    pub fn project_on_mesh(&self, point: &Point, center: &Point) -> Point {
        point.project_on_mesh(center, &self.mesh_sizes(), &self.g)
    }
}

/// Decompose a positive frame size into a mantissa `{1,2,5}` and an
/// exponent such that `mantissa * 10^exponent` is closest to `value`.
fn decompose(value: f64) -> (u8, i32) {
    if value <= 0.0 {
        return (1, 0);
    }
    let exp = value.log10().floor() as i32;
    let candidates: [(u8, i32); 3] = [(1, exp + 1), (2, exp), (5, exp)];
    let mut best = candidates[0];
    let mut best_err = f64::INFINITY;
    for &(m, e) in candidates.iter().chain([(1, exp)].iter()) {
        let v = (m as f64) * 10f64.powi(e);
        let err = (v - value).abs();
        if err < best_err {
            best_err = err;
            best = (m, e);
        }
    }
    best
}

/// Isotropic coordinate-search mesh: every coordinate refines/enlarges
/// together and there is no mantissa — the frame size is a single scalar
/// multiplied by granularity.
#[derive(Debug, Clone)]
pub struct CoordinateSearchMesh {
    n: usize,
    exponent: i32,
    g: Vec<f64>,
}

impl CoordinateSearchMesh {
    pub fn new(initial_frame_size: f64, granularity: &[f64]) -> Self {
        let (_, exp) = decompose(initial_frame_size);
        Self {
            n: granularity.len(),
            exponent: exp,
            g: granularity.to_vec(),
        }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn frame_size(&self, i: usize) -> f64 {
        let base = 10f64.powi(self.exponent);
        if self.g[i] > 0.0 { self.g[i] * base } else { base }
    }

    pub fn enlarge(&mut self) {
        self.exponent += 1;
    }

    pub fn refine(&mut self) {
        self.exponent -= 1;
    }

    pub fn project_on_mesh(&self, point: &Point, center: &Point) -> Point {
        let delta: Vec<f64> = (0..self.n).map(|i| self.frame_size(i)).collect();
        point.project_on_mesh(center, &delta, &self.g)
    }
}
