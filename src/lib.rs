//! pole_ekf - EKF pose estimation for a differential-drive robot
//!
//! Fuses wheel odometry with range/bearing observations of surveyed poles.
//! The filter cycle lives in [`localization`]; [`utils`] carries plotting
//! helpers used by the simulation binary.

// Core modules
pub mod common;
pub mod utils;

// Algorithm modules
pub mod localization;

// Re-export common types for convenience
pub use common::{Point2D, Pose2D, OdometryReading, PolarObservation, Pole, CovarianceDiagonal};
pub use common::{MotionModel, ObservationModel};
pub use common::{LocalizationError, LocalizationResult};
pub use localization::{PoleEkf, PoleEkfConfig, PoleLocalizer, FilterState, CycleInput};
