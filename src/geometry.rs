/// Core geometry types shared by the format parsers.
///
/// Layer: **Geometry accumulation**
/// Parsers push every accepted position through an `Accumulator`, which keeps
/// the bounding box and the center-of-mass sum. Normals that a file does not
/// carry come from `calculate_normal`.
use serde::{Deserialize, Serialize};

// ── 3-D ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Component at axis `i` (0 = x, 1 = y, 2 = z).
    pub fn axis(&self, i: usize) -> f32 {
        match i {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - other.y * self.z,
            self.z * other.x - self.x * other.z,
            self.x * other.y - other.x * self.y,
        )
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Append x, y, z to a flat buffer.
    pub fn push_to(self, buf: &mut Vec<f32>) {
        buf.extend_from_slice(&[self.x, self.y, self.z]);
    }
}

impl From<Vec3> for glam::Vec3 {
    fn from(v: Vec3) -> Self {
        glam::Vec3::new(v.x, v.y, v.z)
    }
}

/// Unnormalized face normal of the triangle (a, b, c): `(b - a) × (c - a)`.
pub fn calculate_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    b.sub(a).cross(c.sub(a))
}

/// Fetch the position at vertex index `i` from a flat xyz buffer.
pub fn vertex_at(buf: &[f32], i: usize) -> Option<Vec3> {
    let base = i.checked_mul(3)?;
    let xyz = buf.get(base..base + 3)?;
    Some(Vec3::new(xyz[0], xyz[1], xyz[2]))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Sentinel box: the first included point replaces all six bounds.
    pub const EMPTY: Self = Self {
        min: Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
        max: Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
    };

    pub fn include(self, p: Vec3) -> Self {
        Self {
            min: Vec3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            max: Vec3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        }
    }

    pub fn extent(&self) -> Vec3 {
        self.max.sub(self.min)
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Running bounds and center-of-mass sum, passed by value through a parse loop.
///
/// The sum is kept in `f64` and narrowed to `f32` once, in `finish`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    bounds: BoundingBox,
    sum: [f64; 3],
    count: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(self, p: Vec3) -> Self {
        Self {
            bounds: self.bounds.include(p),
            sum: [
                self.sum[0] + p.x as f64,
                self.sum[1] + p.y as f64,
                self.sum[2] + p.z as f64,
            ],
            count: self.count + 1,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Bounding box and center of mass, or `None` if nothing was accepted.
    pub fn finish(self) -> Option<(BoundingBox, Vec3)> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let center = Vec3::new(
            (self.sum[0] / n) as f32,
            (self.sum[1] / n) as f32,
            (self.sum[2] / n) as f32,
        );
        Some((self.bounds, center))
    }
}

impl FromIterator<Vec3> for Accumulator {
    fn from_iter<I: IntoIterator<Item = Vec3>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Accumulator::push)
    }
}
