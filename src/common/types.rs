//! Common types used throughout pole_ekf

use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};

/// Raw odometry x value marking "no new odometry this cycle"
pub const MISSING_ODOMETRY_SENTINEL: f64 = -2000.0;

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// 2D pose (position + heading) in the world frame.
///
/// The filter never wraps `theta`; call [`Pose2D::normalize_theta`] when a
/// principal value is needed for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0, theta: 0.0 }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.theta)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }

    /// Normalize theta to [-pi, pi]
    pub fn normalize_theta(&mut self) {
        self.theta = normalize_angle(self.theta);
    }
}

impl From<Vector3<f64>> for Pose2D {
    fn from(v: Vector3<f64>) -> Self {
        Self { x: v[0], y: v[1], theta: v[2] }
    }
}

/// Normalize angle to [-pi, pi).
///
/// Non-finite input yields NaN.
pub fn normalize_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

/// Absolute odometry pose sample as reported by the wheel encoders
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometryReading {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl OdometryReading {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Convert a raw host sample, mapping the missing-data sentinel to `None`
    pub fn from_raw(x: f64, y: f64, theta: f64) -> Option<Self> {
        if x == MISSING_ODOMETRY_SENTINEL {
            None
        } else {
            Some(Self { x, y, theta })
        }
    }
}

/// Range/bearing of a pole in the robot body frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarObservation {
    pub range: f64,
    pub bearing: f64,
}

impl PolarObservation {
    pub fn new(range: f64, bearing: f64) -> Self {
        Self { range, bearing }
    }

    /// Cartesian point in the body frame
    pub fn to_point(&self) -> Point2D {
        Point2D::new(self.range * self.bearing.cos(), self.range * self.bearing.sin())
    }
}

/// Known point landmark together with its current observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pole {
    /// Surveyed position in the world frame
    pub world: Point2D,
    pub observation: PolarObservation,
    /// Only visible poles take part in an update
    pub visible: bool,
}

impl Pole {
    pub fn new(world: Point2D, observation: PolarObservation, visible: bool) -> Self {
        Self { world, observation, visible }
    }

    pub fn visible(world: Point2D, observation: PolarObservation) -> Self {
        Self::new(world, observation, true)
    }

    /// Pole known on the map but not seen this cycle
    pub fn hidden(world: Point2D) -> Self {
        Self::new(world, PolarObservation::new(0.0, 0.0), false)
    }
}

/// Diagonal of the pose covariance, the lossy boundary representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CovarianceDiagonal {
    pub var_x: f64,
    pub var_y: f64,
    pub var_theta: f64,
}

impl CovarianceDiagonal {
    pub fn new(var_x: f64, var_y: f64, var_theta: f64) -> Self {
        Self { var_x, var_y, var_theta }
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&Vector3::new(self.var_x, self.var_y, self.var_theta))
    }
}

impl From<&Matrix3<f64>> for CovarianceDiagonal {
    fn from(m: &Matrix3<f64>) -> Self {
        Self { var_x: m[(0, 0)], var_y: m[(1, 1)], var_theta: m[(2, 2)] }
    }
}
