//! Wheel-slip process noise
//!
//! Each wheel contributes variance proportional to how far it travelled.

use nalgebra::{Matrix2, Matrix3, Matrix3x2};
use serde::{Deserialize, Serialize};

use super::motion_model::WheelTravel;

/// Gains of the slip-proportional control noise
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessNoiseConfig {
    /// Variance per metre of left wheel travel [m]
    pub k_left: f64,
    /// Variance per metre of right wheel travel [m]
    pub k_right: f64,
}

impl Default for ProcessNoiseConfig {
    fn default() -> Self {
        Self {
            k_left: 0.07,
            k_right: 0.07,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessNoiseModel {
    config: ProcessNoiseConfig,
}

impl ProcessNoiseModel {
    pub fn new(config: ProcessNoiseConfig) -> Self {
        Self { config }
    }

    /// Control-space covariance `diag(k_l·|s_l|, k_r·|s_r|)`
    pub fn q(&self, travel: &WheelTravel) -> Matrix2<f64> {
        Matrix2::new(
            self.config.k_left * travel.left.abs(), 0.,
            0., self.config.k_right * travel.right.abs(),
        )
    }

    /// Control noise mapped into pose space, `F_u · Q · F_uᵀ`
    pub fn pose_noise(&self, jacobian_input: &Matrix3x2<f64>, travel: &WheelTravel) -> Matrix3<f64> {
        jacobian_input * self.q(travel) * jacobian_input.transpose()
    }
}
