// ============================================================================
// GEOMETRY: points, 3×3 transforms, projective maps, polygon helpers
// ============================================================================

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(self, other: Point, t: f32) -> Point {
        Point::new(self.x + (other.x - self.x) * t, self.y + (other.y - self.y) * t)
    }

    pub fn midpoint(self, other: Point) -> Point {
        self.lerp(other, 0.5)
    }
}

/// Perpendicular distance from `p` to the line through `a` and `b`.
/// A zero-length chord degrades to the Euclidean distance to `a`.
pub fn perpendicular_distance(p: Point, a: Point, b: Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-9 {
        return p.distance(a);
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / len
}

/// (min, max) corners of a point set.
pub fn point_bounds(points: &[Point]) -> Option<(Point, Point)> {
    let first = *points.first()?;
    let mut min = first;
    let mut max = first;
    for p in &points[1..] {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    Some((min, max))
}

// ============================================================================
// 3×3 TRANSFORM
// ============================================================================

/// Row-major 3×3 matrix acting on column vectors `[x, y, 1]`.
/// Affine when the bottom row is `[0, 0, 1]`, projective otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub m: [[f32; 3]; 3],
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine { m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] };

    pub fn translate(dx: f32, dy: f32) -> Self {
        Affine { m: [[1.0, 0.0, dx], [0.0, 1.0, dy], [0.0, 0.0, 1.0]] }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Affine { m: [[sx, 0.0, 0.0], [0.0, sy, 0.0], [0.0, 0.0, 1.0]] }
    }

    /// Clockwise rotation on screen (y points down).
    pub fn rotate(degrees: f32) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Affine { m: [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]] }
    }

    /// Shear by angles (degrees) along x and y.
    pub fn skew(x_degrees: f32, y_degrees: f32) -> Self {
        let kx = x_degrees.to_radians().tan();
        let ky = y_degrees.to_radians().tan();
        Affine { m: [[1.0, kx, 0.0], [ky, 1.0, 0.0], [0.0, 0.0, 1.0]] }
    }

    /// `self` applied after `first`.
    pub fn after(&self, first: &Affine) -> Affine {
        let a = &self.m;
        let b = &first.m;
        let mut out = [[0.0f32; 3]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = a[r][0] * b[0][c] + a[r][1] * b[1][c] + a[r][2] * b[2][c];
            }
        }
        Affine { m: out }
    }

    /// `then` applied after `self`.
    pub fn then(&self, then: &Affine) -> Affine {
        then.after(self)
    }

    /// The same transform expressed about `pivot` instead of the origin.
    pub fn about(&self, pivot: Point) -> Affine {
        Affine::translate(pivot.x, pivot.y)
            .after(self)
            .after(&Affine::translate(-pivot.x, -pivot.y))
    }

    pub fn is_identity(&self) -> bool {
        self.m
            .iter()
            .flatten()
            .zip(Affine::IDENTITY.m.iter().flatten())
            .all(|(a, b)| (a - b).abs() < 1e-6)
    }

    /// Inverse, or `None` for a singular matrix.
    pub fn invert(&self) -> Option<Affine> {
        let m = &self.m;
        let (a, b, c) = (m[0][0], m[0][1], m[0][2]);
        let (d, e, f) = (m[1][0], m[1][1], m[1][2]);
        let (g, h, i) = (m[2][0], m[2][1], m[2][2]);

        let det = a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine {
            m: [
                [(e * i - f * h) * inv, (c * h - b * i) * inv, (b * f - c * e) * inv],
                [(f * g - d * i) * inv, (a * i - c * g) * inv, (c * d - a * f) * inv],
                [(d * h - e * g) * inv, (b * g - a * h) * inv, (a * e - b * d) * inv],
            ],
        })
    }

    /// Map a point, dividing through by w for projective matrices.
    /// Returns `None` when the point maps to infinity.
    pub fn apply(&self, p: Point) -> Option<Point> {
        let m = &self.m;
        let w = m[2][0] * p.x + m[2][1] * p.y + m[2][2];
        if w.abs() < 1e-8 {
            return None;
        }
        let x = (m[0][0] * p.x + m[0][1] * p.y + m[0][2]) / w;
        let y = (m[1][0] * p.x + m[1][1] * p.y + m[1][2]) / w;
        Some(Point::new(x, y))
    }

    /// Projective map taking the four `src` points onto the four `dst` points.
    /// `None` when the correspondence is degenerate (collinear corners).
    pub fn from_quad_to_quad(src: &[Point; 4], dst: &[Point; 4]) -> Option<Affine> {
        // Solve the 8 unknowns h0..h7 (h8 = 1) of the homography.
        let mut a = [[0.0f64; 9]; 8];
        for i in 0..4 {
            let (x, y) = (src[i].x as f64, src[i].y as f64);
            let (u, v) = (dst[i].x as f64, dst[i].y as f64);
            a[i * 2] = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, u];
            a[i * 2 + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, v];
        }
        let h = solve_8x8(a)?;
        let f = |v: f64| v as f32;
        Some(Affine {
            m: [
                [f(h[0]), f(h[1]), f(h[2])],
                [f(h[3]), f(h[4]), f(h[5])],
                [f(h[6]), f(h[7]), 1.0],
            ],
        })
    }
}

/// Gaussian elimination with partial pivoting on an augmented 8×9 system.
fn solve_8x8(mut a: [[f64; 9]; 8]) -> Option<[f64; 8]> {
    for col in 0..8 {
        let pivot = (col..8).max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))?;
        if a[pivot][col].abs() < 1e-10 {
            return None;
        }
        a.swap(col, pivot);
        for row in 0..8 {
            if row == col {
                continue;
            }
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }
    let mut out = [0.0f64; 8];
    for (i, v) in out.iter_mut().enumerate() {
        *v = a[i][8] / a[i][i];
    }
    Some(out)
}
