//! Differential-drive motion model
//!
//! Odometry is reduced to the travel of the two wheels. The arc length
//! `ds = (s_l + s_r) / 2` and heading change `dθ = (s_r - s_l) / b` are
//! projected into the world frame with the heading at the middle of the arc,
//! `θ + dθ / 2`.
//!
//! When no odometry is available the filter falls back to
//! [`extrapolate_pose`], which replays the last observed pose increment,
//! expressed in the robot frame, scaled by the ratio of elapsed times.

use nalgebra::{Matrix3, Matrix3x2, Vector3};

use crate::common::{normalize_angle, MotionModel, OdometryReading, Pose2D};

/// Travel of the left and right wheel since the previous cycle [m]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelTravel {
    pub left: f64,
    pub right: f64,
}

impl WheelTravel {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self { left: 0.0, right: 0.0 }
    }

    /// Wheel travel producing arc length `ds` and heading change `dtheta`
    pub fn from_arc(ds: f64, dtheta: f64, wheel_base: f64) -> Self {
        Self {
            left: ds - dtheta * wheel_base / 2.0,
            right: ds + dtheta * wheel_base / 2.0,
        }
    }

    /// Wheel travel implied by two consecutive absolute odometry samples.
    ///
    /// The position increment is projected onto the heading of the earlier
    /// sample, so lateral drift reported by the odometry is ignored.
    pub fn from_odometry(
        previous: &OdometryReading,
        current: &OdometryReading,
        wheel_base: f64,
    ) -> Self {
        let dx = current.x - previous.x;
        let dy = current.y - previous.y;
        let ds = dx * previous.theta.cos() + dy * previous.theta.sin();
        let dtheta = normalize_angle(current.theta - previous.theta);
        Self::from_arc(ds, dtheta, wheel_base)
    }
}

/// Motion model of a differential-drive robot with track width `b`
#[derive(Debug, Clone)]
pub struct DiffDriveMotionModel {
    wheel_base: f64,
}

impl DiffDriveMotionModel {
    pub fn new(wheel_base: f64) -> Self {
        Self { wheel_base }
    }

    /// Arc length and heading change of a wheel travel pair
    pub fn arc(&self, travel: &WheelTravel) -> (f64, f64) {
        let ds = (travel.left + travel.right) / 2.0;
        let dtheta = (travel.right - travel.left) / self.wheel_base;
        (ds, dtheta)
    }

    /// Pose after applying `travel` to `pose`
    pub fn propagate(&self, pose: &Pose2D, travel: &WheelTravel) -> Pose2D {
        Pose2D::from(pose.to_vector() + self.predict_delta(pose, travel))
    }
}

impl MotionModel for DiffDriveMotionModel {
    type Control = WheelTravel;

    fn predict_delta(&self, pose: &Pose2D, travel: &WheelTravel) -> Vector3<f64> {
        let (ds, dtheta) = self.arc(travel);
        let phi = pose.theta + dtheta / 2.0;
        Vector3::new(ds * phi.cos(), ds * phi.sin(), dtheta)
    }

    fn jacobian_state(&self, pose: &Pose2D, travel: &WheelTravel) -> Matrix3<f64> {
        let (ds, dtheta) = self.arc(travel);
        let phi = pose.theta + dtheta / 2.0;
        Matrix3::new(
            1., 0., -ds * phi.sin(),
            0., 1., ds * phi.cos(),
            0., 0., 1.,
        )
    }

    fn jacobian_input(&self, pose: &Pose2D, travel: &WheelTravel) -> Matrix3x2<f64> {
        let b = self.wheel_base;
        let (ds, dtheta) = self.arc(travel);
        let phi = pose.theta + dtheta / 2.0;
        let (s, c) = phi.sin_cos();
        let k = ds / (2.0 * b);
        Matrix3x2::new(
            0.5 * c + k * s, 0.5 * c - k * s,
            0.5 * s - k * c, 0.5 * s + k * c,
            -1.0 / b, 1.0 / b,
        )
    }
}

/// Pose with the time [s] it was committed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampedPose {
    pub pose: Pose2D,
    pub stamp: f64,
}

impl StampedPose {
    pub fn new(pose: Pose2D, stamp: f64) -> Self {
        Self { pose, stamp }
    }
}

/// Ratio of the time elapsed since `current` to the interval between
/// `last` and `current`.
///
/// Returns `None` when the ratio is indeterminate: a non-positive interval,
/// time running backwards, or any non-finite value.
pub fn elapsed_time_scale(last: &StampedPose, current: &StampedPose, now: f64) -> Option<f64> {
    let interval = current.stamp - last.stamp;
    let elapsed = now - current.stamp;
    let valid = interval.is_finite() && interval > 0.0 && elapsed.is_finite() && elapsed >= 0.0;
    if !valid {
        return None;
    }
    let scale = elapsed / interval;
    scale.is_finite().then_some(scale)
}

/// Dead-reckoning prediction that replays the `last -> current` increment
/// scaled by `scale`.
///
/// The increment is taken in the body frame of `last` and reapplied in the
/// body frame of `current`, so backward and sideways corrections keep their
/// direction and a turning robot keeps turning.
pub fn extrapolate_pose(last: &Pose2D, current: &Pose2D, scale: f64) -> Pose2D {
    let dx = current.x - last.x;
    let dy = current.y - last.y;
    let (s, c) = last.theta.sin_cos();
    let forward = (c * dx + s * dy) * scale;
    let lateral = (-s * dx + c * dy) * scale;
    let dtheta = (current.theta - last.theta) * scale;

    let (s, c) = current.theta.sin_cos();
    Pose2D::new(
        current.x + c * forward - s * lateral,
        current.y + s * forward + c * lateral,
        current.theta + dtheta,
    )
}
