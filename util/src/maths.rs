//! # Vector maths
//!
//! Small set of vector operations used by the pilot to track the aircraft and describe the
//! checkpoint graph. Vectors are plain `nalgebra` column vectors, so addition, subtraction and
//! scaling are the usual operators.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{SVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// A 2D vector (screen/projection space).
pub type V2D = Vector2<f64>;

/// A 3D vector (graph and tracking space).
pub type V3D = Vector3<f64>;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Depth at which the depth colour saturates.
pub const MAX_DISTANCE_Z: f64 = 1500.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Oblique projection coefficients used when flattening a 3D point into 2D.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Perspective {
    pub x: f64,
    pub y: f64,
}

/// An 8-bit RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// A projected point and the colour encoding its depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projected2D {
    pub point: V2D,
    pub color: Rgba,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Perspective {
    fn default() -> Self {
        Self { x: -0.4, y: 0.3 }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Euclidian distance between two points of the same dimension.
pub fn distance<const D: usize>(a: &SVector<f64, D>, b: &SVector<f64, D>) -> f64 {
    (a - b).norm()
}

/// Componentwise mean of two points.
pub fn midpoint<const D: usize>(a: &SVector<f64, D>, b: &SVector<f64, D>) -> SVector<f64, D> {
    (a + b) * 0.5
}

/// Rotate a vector about the Z axis by the given angle in degrees.
///
/// Positive angles rotate counter-clockwise when looking down the Z axis. The Z component is
/// carried through unchanged.
pub fn rotate_z(v: &V3D, angle_deg: f64) -> V3D {
    let (sin, cos) = angle_deg.to_radians().sin_cos();

    V3D::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos, v.z)
}

/// Flatten a 3D point into 2D using an oblique projection.
pub fn to_2d(v: &V3D, perspective: &Perspective) -> V2D {
    V2D::new(v.x + v.z * perspective.x, v.y + v.z * perspective.y)
}

/// Flatten a 3D point into 2D, tagging it with its depth colour.
pub fn to_2d_color(v: &V3D, perspective: &Perspective) -> Projected2D {
    Projected2D {
        point: to_2d(v, perspective),
        color: depth_color(v.z),
    }
}

/// Encode a depth as a colour.
///
/// Points behind the origin (negative z) shade towards red, points in front shade towards blue,
/// and green fades out as the magnitude of the depth approaches [`MAX_DISTANCE_Z`].
pub fn depth_color(z: f64) -> Rgba {
    let (r, b) = if z < 0.0 {
        (channel(-z), 0)
    } else {
        (0, channel(z))
    };

    Rgba {
        r,
        g: channel(MAX_DISTANCE_Z - z.abs()),
        b,
        a: 255,
    }
}

/// Shortest signed angular distance in degrees to get from `from` to `to`.
///
/// The result lies in `[-180, 180)`.
pub fn ang_dist_deg(from: f64, to: f64) -> f64 {
    rem_euclid(to - from + 180.0, 360.0) - 180.0
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
pub fn rem_euclid(lhs: f64, rhs: f64) -> f64 {
    let r = lhs % rhs;
    if r < 0.0 {
        r + rhs.abs()
    } else {
        r
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Scale a depth magnitude onto a single 8-bit channel.
fn channel(magnitude: f64) -> u8 {
    (magnitude * 255.0 / MAX_DISTANCE_Z).max(0.0).min(255.0) as u8
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance() {
        let a = V3D::new(1.0, 2.0, 3.0);
        let b = V3D::new(4.0, 6.0, 3.0);

        assert_eq!(distance(&a, &b), 5.0);
        assert_eq!(distance(&b, &a), distance(&a, &b));
        assert_eq!(distance(&a, &a), 0.0);

        let p = V2D::new(0.0, 0.0);
        let q = V2D::new(3.0, 4.0);
        assert_eq!(distance(&p, &q), 5.0);
    }

    #[test]
    fn test_midpoint() {
        let a = V3D::new(0.0, 2.0, -4.0);
        let b = V3D::new(2.0, 4.0, 4.0);

        assert_eq!(midpoint(&a, &b), V3D::new(1.0, 3.0, 0.0));
    }

    #[test]
    fn test_rotate_z() {
        let v = V3D::new(1.380002, -0.43916, -1.0);

        // Zero rotation is exact
        assert_eq!(rotate_z(&v, 0.0), v);

        // Full turn is the identity within tolerance
        assert_relative_eq!(rotate_z(&v, 360.0), v, epsilon = 1e-9);

        // Quarter turn takes X onto Y
        let r = rotate_z(&V3D::new(1.0, 0.0, 2.0), 90.0);
        assert_relative_eq!(r, V3D::new(0.0, 1.0, 2.0), epsilon = 1e-12);

        // Rotations compose
        assert_relative_eq!(
            rotate_z(&rotate_z(&v, 30.0), 60.0),
            rotate_z(&v, 90.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_to_2d() {
        let v = V3D::new(1.0, 1.0, 10.0);

        assert_relative_eq!(to_2d(&v, &Perspective::default()), V2D::new(-3.0, 4.0));
        assert_eq!(to_2d(&v, &Perspective { x: 0.0, y: 0.0 }), V2D::new(1.0, 1.0));
    }

    #[test]
    fn test_depth_color() {
        assert_eq!(
            depth_color(0.0),
            Rgba {
                r: 0,
                g: 255,
                b: 0,
                a: 255
            }
        );
        assert_eq!(
            depth_color(-750.0),
            Rgba {
                r: 127,
                g: 127,
                b: 0,
                a: 255
            }
        );
        assert_eq!(
            depth_color(1500.0),
            Rgba {
                r: 0,
                g: 0,
                b: 255,
                a: 255
            }
        );

        // Saturates beyond the maximum distance
        assert_eq!(
            depth_color(-3000.0),
            Rgba {
                r: 255,
                g: 0,
                b: 0,
                a: 255
            }
        );

        let p = to_2d_color(&V3D::new(0.0, 0.0, 750.0), &Perspective::default());
        assert_eq!(p.color.b, 127);
        assert_relative_eq!(p.point, V2D::new(-300.0, 225.0));
    }

    #[test]
    fn test_ang_dist_deg() {
        assert_eq!(ang_dist_deg(10.0, 20.0), 10.0);
        assert_eq!(ang_dist_deg(20.0, 10.0), -10.0);
        assert_eq!(ang_dist_deg(170.0, -170.0), 20.0);
        assert_eq!(ang_dist_deg(-170.0, 170.0), -20.0);
        assert_eq!(ang_dist_deg(0.0, 360.0), 0.0);
    }
}
