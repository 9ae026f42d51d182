//! Utility modules for pole_ekf

pub mod visualization;

pub use visualization::{Visualizer, PathStyle, colors, covariance_ellipse_points};
