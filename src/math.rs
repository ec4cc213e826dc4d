use std::ops::{Add, Mul, Neg, Sub};

// ─────────────────────────────────────────────────────────────────────────────
// Vec3
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Verbreed een VRML-drietal in enkele precisie.
    #[must_use]
    pub fn from_f32(v: [f32; 3]) -> Self {
        Self::new(f64::from(v[0]), f64::from(v[1]), f64::from(v[2]))
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_f32(self) -> [f32; 3] {
        [self.x as f32, self.y as f32, self.z as f32]
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    #[must_use]
    pub const fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len.is_finite() && len > 0.0 {
            Some(Self::new(self.x / len, self.y / len, self.z / len))
        } else {
            None
        }
    }

    /// Geeft `self * (1 - t) + rhs * t`.
    #[must_use]
    pub fn lerp(self, rhs: Self, t: f64) -> Self {
        Self::new(
            self.x + (rhs.x - self.x) * t,
            self.y + (rhs.y - self.y) * t,
            self.z + (rhs.z - self.z) * t,
        )
    }

    #[must_use]
    pub fn max_component(self) -> f64 {
        self.x.max(self.y).max(self.z)
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mat4
// ─────────────────────────────────────────────────────────────────────────────

/// Affiene 4x4-matrix in rijvolgorde, werkend op kolomvectoren.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4 {
    m: [[f64; 4]; 4],
}

impl Mat4 {
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    #[must_use]
    pub const fn translate(offset: Vec3) -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, offset.x],
                [0.0, 1.0, 0.0, offset.y],
                [0.0, 0.0, 1.0, offset.z],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    #[must_use]
    pub fn scale(s: Vec3) -> Self {
        Self {
            m: [
                [s.x, 0.0, 0.0, 0.0],
                [0.0, s.y, 0.0, 0.0],
                [0.0, 0.0, s.z, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Rotatie om een willekeurige as; een ontaarde as geeft de identiteit.
    #[must_use]
    pub fn rotate_axis(axis: Vec3, angle: f64) -> Self {
        let Some(axis) = axis.normalized() else {
            return Self::identity();
        };
        let c = angle.cos();
        let s = angle.sin();
        let t = 1.0 - c;
        let (x, y, z) = (axis.x, axis.y, axis.z);

        Self {
            m: [
                [t * x * x + c, t * x * y - s * z, t * x * z + s * y, 0.0],
                [t * x * y + s * z, t * y * y + c, t * y * z - s * x, 0.0],
                [t * x * z - s * y, t * y * z + s * x, t * z * z + c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Rotatie uit een VRML-viertal `axis angle`.
    #[must_use]
    pub fn rotation(r: [f32; 4]) -> Self {
        Self::rotate_axis(
            Vec3::from_f32([r[0], r[1], r[2]]),
            f64::from(r[3]),
        )
    }

    /// De matrix van een VRML Transform-node:
    /// `T × C × R × SR × S × -SR × -C`.
    #[must_use]
    pub fn vrml_transform(
        translation: [f32; 3],
        rotation: [f32; 4],
        scale: [f32; 3],
        scale_orientation: [f32; 4],
        center: [f32; 3],
    ) -> Self {
        let center = Vec3::from_f32(center);
        let orientation = Self::rotation(scale_orientation);
        let inverse_orientation = Self::rotation([
            scale_orientation[0],
            scale_orientation[1],
            scale_orientation[2],
            -scale_orientation[3],
        ]);

        Self::translate(Vec3::from_f32(translation))
            .compose(Self::translate(center))
            .compose(Self::rotation(rotation))
            .compose(orientation)
            .compose(Self::scale(Vec3::from_f32(scale)))
            .compose(inverse_orientation)
            .compose(Self::translate(-center))
    }

    #[must_use]
    pub fn compose(self, other: Self) -> Self {
        let mut result = Self::identity();
        for i in 0..4 {
            for j in 0..4 {
                result.m[i][j] = self.m[i][0] * other.m[0][j]
                    + self.m[i][1] * other.m[1][j]
                    + self.m[i][2] * other.m[2][j]
                    + self.m[i][3] * other.m[3][j];
            }
        }
        result
    }

    /// Inverse van een affiene matrix, `None` als hij singulier is.
    #[must_use]
    pub fn affine_inverse(self) -> Option<Self> {
        let m = &self.m;
        let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
        if !det.is_finite() || det.abs() < 1e-15 {
            return None;
        }
        let inv_det = 1.0 / det;

        let mut r = Self::identity();
        r.m[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det;
        r.m[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det;
        r.m[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det;
        r.m[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det;
        r.m[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det;
        r.m[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det;
        r.m[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det;
        r.m[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det;
        r.m[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det;

        let t = Vec3::new(m[0][3], m[1][3], m[2][3]);
        let inv_t = -r.apply_vec(t);
        r.m[0][3] = inv_t.x;
        r.m[1][3] = inv_t.y;
        r.m[2][3] = inv_t.z;
        Some(r)
    }

    #[must_use]
    pub fn apply_point(self, p: Vec3) -> Vec3 {
        self.apply_vec(p) + Vec3::new(self.m[0][3], self.m[1][3], self.m[2][3])
    }

    #[must_use]
    pub fn apply_vec(self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.m[0][0] * v.x + self.m[0][1] * v.y + self.m[0][2] * v.z,
            self.m[1][0] * v.x + self.m[1][1] * v.y + self.m[1][2] * v.z,
            self.m[2][0] * v.x + self.m[2][1] * v.y + self.m[2][2] * v.z,
        )
    }

    /// Grootste schaalfactor langs een as.
    #[must_use]
    pub fn max_scale(self) -> f64 {
        let column = |j: usize| Vec3::new(self.m[0][j], self.m[1][j], self.m[2][j]).length();
        column(0).max(column(1)).max(column(2))
    }

    #[must_use]
    pub const fn as_matrix(&self) -> &[[f64; 4]; 4] {
        &self.m
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::identity()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BSphere
// ─────────────────────────────────────────────────────────────────────────────

/// Omhullende bol. Een negatieve straal markeert de lege bol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BSphere {
    pub center: Vec3,
    pub radius: f64,
}

impl Default for BSphere {
    fn default() -> Self {
        Self::empty()
    }
}

impl BSphere {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: -1.0,
        }
    }

    #[must_use]
    pub const fn new(center: Vec3, radius: f64) -> Self {
        Self { center, radius }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.radius < 0.0
    }

    /// Groei tot `other` erin past.
    pub fn extend(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        let offset = other.center - self.center;
        let distance = offset.length();
        if distance + other.radius <= self.radius {
            return;
        }
        if distance + self.radius <= other.radius {
            *self = *other;
            return;
        }
        let radius = (distance + self.radius + other.radius) * 0.5;
        let center = match offset.normalized() {
            Some(direction) => self.center + direction * (radius - self.radius),
            None => self.center,
        };
        *self = Self::new(center, radius);
    }

    #[must_use]
    pub fn transform(&self, matrix: Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::new(matrix.apply_point(self.center), self.radius * matrix.max_scale())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Kleur
// ─────────────────────────────────────────────────────────────────────────────

/// RGB in `[0,1]` naar HSV met de tint in graden.
#[must_use]
pub fn rgb_to_hsv(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let v = max;
    let s = if max > 0.0 { delta / max } else { 0.0 };
    if s == 0.0 {
        return [0.0, 0.0, v];
    }
    let mut h = if r == max {
        (g - b) / delta
    } else if g == max {
        2.0 + (b - r) / delta
    } else {
        4.0 + (r - g) / delta
    };
    h *= 60.0;
    if h < 0.0 {
        h += 360.0;
    }
    [h, s, v]
}

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn hsv_to_rgb(hsv: [f32; 3]) -> [f32; 3] {
    let [h, s, v] = hsv;
    if s == 0.0 {
        return [v, v, v];
    }
    let h = if h >= 360.0 { 0.0 } else { h / 60.0 };
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector as i32 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}
