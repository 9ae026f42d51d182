//! Common traits defining the seams of the filter

use nalgebra::{DMatrix, DVector, Matrix3, Matrix3x2, MatrixXx3, Vector3};

use crate::common::types::Pose2D;

/// Trait for robot motion models linearized by an EKF
pub trait MotionModel {
    /// Control type
    type Control;

    /// Pose increment in the world frame
    fn predict_delta(&self, pose: &Pose2D, control: &Self::Control) -> Vector3<f64>;

    /// Jacobian with respect to the previous pose
    fn jacobian_state(&self, pose: &Pose2D, control: &Self::Control) -> Matrix3<f64>;

    /// Jacobian with respect to the control input
    fn jacobian_input(&self, pose: &Pose2D, control: &Self::Control) -> Matrix3x2<f64>;
}

/// Trait for observation models over a stacked list of landmarks
///
/// Every method must stack its output in the order of `landmarks`.
pub trait ObservationModel {
    /// Landmark type
    type Landmark;

    /// Predict measurement from state
    fn predict(&self, pose: &Pose2D, landmarks: &[Self::Landmark]) -> DVector<f64>;

    /// Compute Jacobian with respect to state (for EKF)
    fn jacobian(&self, pose: &Pose2D, landmarks: &[Self::Landmark]) -> MatrixXx3<f64>;

    /// Measurement noise covariance
    fn noise(&self, landmarks: &[Self::Landmark]) -> DMatrix<f64>;

    /// Actual measurement vector
    fn measure(&self, landmarks: &[Self::Landmark]) -> DVector<f64>;
}
