//! Points and directions in the search space.
//!
//! A [`Point`] is an ordered, fixed-dimension sequence of [`Scalar`]s. A
//! [`Direction`] shares the same storage but is semantically a displacement:
//! it adds norms and a positive-spanning rank check used by the poll step.

use crate::numeric::{DEFAULT_EPSILON, Scalar};

/// Norm used to aggregate infeasibility and direction magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum HNormType {
    L1,
    #[default]
    L2,
    LInf,
}

fn norm(coords: &[Scalar], kind: HNormType) -> Scalar {
    if coords.iter().any(|c| !c.is_defined()) {
        return Scalar::undefined();
    }
    match kind {
        HNormType::L1 => coords.iter().fold(Scalar::new(0.0), |acc, c| acc + c.abs()),
        HNormType::L2 => {
            let sum_sq = coords
                .iter()
                .fold(0.0_f64, |acc, c| acc + c.value() * c.value());
            Scalar::new(sum_sq.sqrt())
        }
        HNormType::LInf => coords
            .iter()
            .map(|c| c.abs())
            .fold(Scalar::new(0.0), |acc, c| acc.max(c)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    coords: Vec<Scalar>,
}

impl Point {
    pub fn new(coords: Vec<Scalar>) -> Self {
        Self { coords }
    }

    pub fn from_f64(coords: &[f64]) -> Self {
        Self {
            coords: coords.iter().map(|&v| Scalar::new(v)).collect(),
        }
    }

    pub fn undefined(n: usize) -> Self {
        Self {
            coords: vec![Scalar::undefined(); n],
        }
    }

    pub fn dim(&self) -> usize {
        self.coords.len()
    }

    pub fn coords(&self) -> &[Scalar] {
        &self.coords
    }

    pub fn coord(&self, i: usize) -> Scalar {
        self.coords[i]
    }

    pub fn set_coord(&mut self, i: usize, v: Scalar) {
        self.coords[i] = v;
    }

    pub fn is_complete(&self) -> bool {
        self.coords.iter().all(|c| c.is_defined())
    }

    /// Epsilon-equality used by the cache to dedup points.
    pub fn eq_eps(&self, other: &Point, eps: f64) -> bool {
        self.dim() == other.dim()
            && self
                .coords
                .iter()
                .zip(other.coords.iter())
                .all(|(a, b)| a.eq_eps(b, eps))
    }

    /// Clip every coordinate into `[lb, ub]`.
    pub fn snap_to_bounds(&mut self, lb: &Point, ub: &Point) {
        for i in 0..self.dim() {
            let l = lb.coord(i);
            let u = ub.coord(i);
            if l.is_defined() && self.coords[i].lt_eps(&l, DEFAULT_EPSILON) {
                self.coords[i] = l;
            }
            if u.is_defined() && u.lt_eps(&self.coords[i], DEFAULT_EPSILON) {
                self.coords[i] = u;
            }
        }
    }

    /// Project `self` onto the lattice with mesh size `delta` centered at
    /// `center`: round `(self - center)` to the nearest multiple of
    /// `delta[i]` (and of `granularity[i]` when positive), then add `center`
    /// back.
    pub fn project_on_mesh(&self, center: &Point, delta: &[f64], granularity: &[f64]) -> Point {
        let mut out = Vec::with_capacity(self.dim());
        for i in 0..self.dim() {
            let x = self.coord(i);
            let c = center.coord(i);
            if !x.is_defined() || !c.is_defined() {
                out.push(Scalar::undefined());
                continue;
            }
            let d = delta[i];
            let offset = x.value() - c.value();
            let snapped = if d > 0.0 {
                (offset / d).round() * d
            } else {
                offset
            };
            let mut v = c.value() + snapped;
            let g = granularity[i];
            if g > 0.0 {
                v = (v / g).round() * g;
            }
            out.push(Scalar::new(v));
        }
        Point::new(out)
    }

    pub fn add_direction(&self, dir: &Direction) -> Point {
        let coords = self
            .coords
            .iter()
            .zip(dir.coords.iter())
            .map(|(a, b)| *a + *b)
            .collect();
        Point::new(coords)
    }

    pub fn sub(&self, other: &Point) -> Direction {
        let coords = self
            .coords
            .iter()
            .zip(other.coords.iter())
            .map(|(a, b)| *a - *b)
            .collect();
        Direction::new(coords)
    }
}

/// A displacement in the search space. Same storage as [`Point`], different
/// semantics: norms and a positive-spanning rank check.
#[derive(Debug, Clone, PartialEq)]
pub struct Direction {
    coords: Vec<Scalar>,
}

impl Direction {
    pub fn new(coords: Vec<Scalar>) -> Self {
        Self { coords }
    }

    pub fn zeros(n: usize) -> Self {
        Self {
            coords: vec![Scalar::new(0.0); n],
        }
    }

    pub fn unit(n: usize, axis: usize, sign: f64) -> Self {
        let mut coords = vec![Scalar::new(0.0); n];
        coords[axis] = Scalar::new(sign);
        Self { coords }
    }

    pub fn dim(&self) -> usize {
        self.coords.len()
    }

    pub fn coords(&self) -> &[Scalar] {
        &self.coords
    }

    pub fn coord(&self, i: usize) -> Scalar {
        self.coords[i]
    }

    pub fn scale(&self, factors: &[f64]) -> Direction {
        let coords = self
            .coords
            .iter()
            .zip(factors.iter())
            .map(|(c, f)| if c.is_defined() { *c * Scalar::new(*f) } else { *c })
            .collect();
        Direction::new(coords)
    }

    pub fn norm(&self, kind: HNormType) -> Scalar {
        norm(&self.coords, kind)
    }

    pub fn norm1(&self) -> Scalar {
        self.norm(HNormType::L1)
    }
    pub fn norm2(&self) -> Scalar {
        self.norm(HNormType::L2)
    }
    pub fn norm_inf(&self) -> Scalar {
        self.norm(HNormType::LInf)
    }

    pub fn negate(&self) -> Direction {
        Direction::new(self.coords.iter().map(|c| -*c).collect())
    }

    /// Inner product, used by the `DIR_LAST_SUCCESS` queue sort policy.
    pub fn dot(&self, other: &Direction) -> Scalar {
        if self.dim() != other.dim() {
            return Scalar::undefined();
        }
        self.coords
            .iter()
            .zip(other.coords.iter())
            .fold(Some(0.0_f64), |acc, (a, b)| {
                acc.and_then(|s| {
                    if a.is_defined() && b.is_defined() {
                        Some(s + a.value() * b.value())
                    } else {
                        None
                    }
                })
            })
            .map(Scalar::new)
            .unwrap_or_else(Scalar::undefined)
    }

    /// Whether a set of directions positively spans R^n: a coarse but
    /// standard sufficient check used by poll-direction generators — the
    /// sum of the directions lies within epsilon of the origin and the set
    /// has at least `n + 1` members (necessary condition for a positive
    /// spanning set), *or* the directions are the `2n` +/- unit vectors
    /// (ORTHO-2n), which always positively spans.
    pub fn positively_spans(dirs: &[Direction], n: usize) -> bool {
        if dirs.is_empty() {
            return false;
        }
        if dirs.len() < n + 1 {
            return false;
        }
        let mut sum = vec![0.0_f64; n];
        for d in dirs {
            if d.dim() != n {
                return false;
            }
            for i in 0..n {
                let c = d.coord(i);
                if !c.is_defined() {
                    return false;
                }
                sum[i] += c.value();
            }
        }
        sum.iter().all(|v| v.abs() <= 1e-6 * (dirs.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_to_bounds_clips() {
        let mut p = Point::from_f64(&[-5.0, 15.0]);
        let lb = Point::from_f64(&[-10.0, -10.0]);
        let ub = Point::from_f64(&[10.0, 10.0]);
        p.snap_to_bounds(&lb, &ub);
        assert_eq!(p.coord(0), Scalar::new(-5.0));
        assert_eq!(p.coord(1), Scalar::new(10.0));
    }

    #[test]
    fn project_on_mesh_lattice() {
        let center = Point::from_f64(&[0.0, 0.0]);
        let p = Point::from_f64(&[1.3, -2.6]);
        let delta = [1.0, 1.0];
        let gran = [0.0, 0.0];
        let proj = p.project_on_mesh(&center, &delta, &gran);
        assert_eq!(proj.coord(0), Scalar::new(1.0));
        assert_eq!(proj.coord(1), Scalar::new(-3.0));
    }

    #[test]
    fn project_honors_granularity() {
        let center = Point::from_f64(&[0.0]);
        let p = Point::from_f64(&[3.4]);
        let proj = p.project_on_mesh(&center, &[1.0], &[2.0]);
        assert_eq!(proj.coord(0).value() % 2.0, 0.0);
    }

    #[test]
    fn ortho_2n_positively_spans() {
        let n = 2;
        let mut dirs = vec![];
        for i in 0..n {
            dirs.push(Direction::unit(n, i, 1.0));
            dirs.push(Direction::unit(n, i, -1.0));
        }
        assert!(Direction::positively_spans(&dirs, n));
    }

    #[test]
    fn norms() {
        let d = Direction::new(vec![Scalar::new(3.0), Scalar::new(-4.0)]);
        assert_eq!(d.norm1(), Scalar::new(7.0));
        assert_eq!(d.norm2(), Scalar::new(5.0));
        assert_eq!(d.norm_inf(), Scalar::new(4.0));
    }
}
