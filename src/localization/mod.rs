// Pole localization module

pub mod motion_model;
pub mod process_noise;
pub mod observation_model;
pub mod ekf;

// Re-exports
pub use motion_model::{DiffDriveMotionModel, WheelTravel, StampedPose, elapsed_time_scale, extrapolate_pose};
pub use process_noise::{ProcessNoiseModel, ProcessNoiseConfig};
pub use observation_model::PoleObservationModel;
pub use ekf::{PoleEkf, PoleEkfConfig, PoleLocalizer, FilterState, CycleInput, Prediction, PredictionKind};
