//! Axis remapping between the server's coordinate frame and the caller's.
//!
//! The server reports positions in a right-handed frame with X forward, Y left
//! and Z up. Callers pick their own frame by naming the world direction each
//! of their axes should point in; [`AxisMapping`] turns that choice into a
//! signed permutation matrix `M` and applies it to every spatial value.
//!
//! ```rust
//! use mocap_stream::axis::{AxisMapping, AxisMappingError, Direction};
//!
//! // Y-up, as used by most rendering engines.
//! let y_up = AxisMapping::new(Direction::Forward, Direction::Up, Direction::Right)?;
//! assert_eq!(y_up.transform_translation(&[0.0, 0.0, 2.0]), [0.0, 2.0, 0.0]);
//!
//! assert_eq!(
//!     AxisMapping::new(Direction::Up, Direction::Up, Direction::Left),
//!     Err(AxisMappingError::CoLinearAxes)
//! );
//! # Ok::<(), AxisMappingError>(())
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Three-component vector.
pub type Vector3 = [f64; 3];

/// Row-major 3×3 matrix.
pub type Matrix3 = [[f64; 3]; 3];

/// Unit directions an output axis can be aligned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Backward,
}

impl Direction {
    /// Server axis this direction lies along (0 = X, 1 = Y, 2 = Z).
    pub fn component(self) -> usize {
        match self {
            Direction::Forward | Direction::Backward => 0,
            Direction::Left | Direction::Right => 1,
            Direction::Up | Direction::Down => 2,
        }
    }

    fn sign(self) -> f64 {
        match self {
            Direction::Forward | Direction::Left | Direction::Up => 1.0,
            Direction::Backward | Direction::Right | Direction::Down => -1.0,
        }
    }

    /// Signed unit vector in server coordinates.
    pub fn unit(self) -> Vector3 {
        let mut unit = [0.0; 3];
        unit[self.component()] = self.sign();
        unit
    }
}

/// Why a requested axis triple was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisMappingError {
    #[error("Two or more axes lie along the same direction")]
    CoLinearAxes,

    #[error("Axes describe a left-handed coordinate system")]
    LeftHandedAxes,
}

/// Validated axis triple and the matrix it produces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisMapping {
    x: Direction,
    y: Direction,
    z: Direction,
    matrix: Matrix3,
}

impl Default for AxisMapping {
    fn default() -> Self {
        Self {
            x: Direction::Forward,
            y: Direction::Left,
            z: Direction::Up,
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

impl AxisMapping {
    /// Build a mapping where output X, Y and Z point along the given directions.
    pub fn new(x: Direction, y: Direction, z: Direction) -> Result<Self, AxisMappingError> {
        let mut seen = [false; 3];
        for direction in [x, y, z] {
            seen[direction.component()] = true;
        }
        if seen.contains(&false) {
            return Err(AxisMappingError::CoLinearAxes);
        }

        let (ux, uy, uz) = (x.unit(), y.unit(), z.unit());
        if cross(&ux, &uy) != uz {
            return Err(AxisMappingError::LeftHandedAxes);
        }

        Ok(Self { x, y, z, matrix: [ux, uy, uz] })
    }

    /// The directions this mapping was built from.
    pub fn directions(&self) -> (Direction, Direction, Direction) {
        (self.x, self.y, self.z)
    }

    pub fn matrix(&self) -> &Matrix3 {
        &self.matrix
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// `M · t`
    pub fn transform_translation(&self, translation: &Vector3) -> Vector3 {
        mul_vector(&self.matrix, translation)
    }

    /// `M · R · Mᵀ`
    pub fn transform_rotation(&self, rotation: &Matrix3) -> Matrix3 {
        mul(&mul(&self.matrix, rotation), &transpose(&self.matrix))
    }

    /// `M · Qᵀ · t` for a translation expressed relative to orientation `Q`.
    pub fn transform_translation_in(
        &self,
        orientation: &Matrix3,
        translation: &Vector3,
    ) -> Vector3 {
        mul_vector(&self.matrix, &mul_vector(&transpose(orientation), translation))
    }

    /// `M · Qᵀ · R · Q · Mᵀ` for a rotation expressed relative to orientation `Q`.
    pub fn transform_rotation_in(&self, orientation: &Matrix3, rotation: &Matrix3) -> Matrix3 {
        let local = mul(&mul(&transpose(orientation), rotation), orientation);
        self.transform_rotation(&local)
    }
}

pub fn cross(a: &Vector3, b: &Vector3) -> Vector3 {
    [a[1] * b[2] - a[2] * b[1], a[2] * b[0] - a[0] * b[2], a[0] * b[1] - a[1] * b[0]]
}

pub fn transpose(m: &Matrix3) -> Matrix3 {
    let mut out = [[0.0; 3]; 3];
    for (row, values) in m.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            out[col][row] = *value;
        }
    }
    out
}

pub fn mul(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0.0; 3]; 3];
    for (row, out_row) in out.iter_mut().enumerate() {
        for (col, cell) in out_row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[row][k] * b[k][col]).sum();
        }
    }
    out
}

pub fn mul_vector(m: &Matrix3, v: &Vector3) -> Vector3 {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Rotation matrix for a unit quaternion stored as `[x, y, z, w]`.
pub fn quaternion_to_matrix(q: &[f64; 4]) -> Matrix3 {
    let [x, y, z, w] = *q;
    [
        [1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y - z * w), 2.0 * (x * z + y * w)],
        [2.0 * (x * y + z * w), 1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z - x * w)],
        [2.0 * (x * z - y * w), 2.0 * (y * z + x * w), 1.0 - 2.0 * (x * x + y * y)],
    ]
}

/// Unit quaternion `[x, y, z, w]` for a rotation matrix.
pub fn matrix_to_quaternion(m: &Matrix3) -> [f64; 4] {
    let trace = m[0][0] + m[1][1] + m[2][2];
    if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        [(m[2][1] - m[1][2]) / s, (m[0][2] - m[2][0]) / s, (m[1][0] - m[0][1]) / s, 0.25 * s]
    } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
        let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
        [0.25 * s, (m[0][1] + m[1][0]) / s, (m[0][2] + m[2][0]) / s, (m[2][1] - m[1][2]) / s]
    } else if m[1][1] > m[2][2] {
        let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
        [(m[0][1] + m[1][0]) / s, 0.25 * s, (m[1][2] + m[2][1]) / s, (m[0][2] - m[2][0]) / s]
    } else {
        let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
        [(m[0][2] + m[2][0]) / s, (m[1][2] + m[2][1]) / s, 0.25 * s, (m[1][0] - m[0][1]) / s]
    }
}
