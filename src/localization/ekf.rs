//! Extended Kalman Filter (EKF) pole localization
//!
//! One filter cycle runs PREDICT, then UPDATE when at least one pole is
//! visible, then COMMIT:
//!
//! - PREDICT propagates the pose through [`DiffDriveMotionModel`] with the
//!   wheel travel implied by two odometry samples. Without odometry the last
//!   pose increment is extrapolated and the covariance inflated instead.
//! - UPDATE corrects the prediction against the visible poles:
//!   `Σ = H·P·Hᵀ + R`, `K = P·Hᵀ·Σ⁻¹`, `x' = x + K·(z − h(x))`. The
//!   covariance takes the Joseph form `(I − K·H)·P·(I − K·H)ᵀ + K·R·Kᵀ`,
//!   equal to `P − K·Σ·Kᵀ` in exact arithmetic and positive semi-definite
//!   under round-off even when `P` has grown large. UPDATE is skipped when
//!   the elapsed time of a dead-reckoning cycle is indeterminate.
//! - COMMIT returns a fresh [`FilterState`] holding the history the next
//!   prediction needs.
//!
//! The cycle is a pure function of the previous state and the cycle input;
//! [`PoleLocalizer`] wraps it for hosts that prefer to own a single mutable
//! estimate.

use std::path::Path;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::motion_model::{elapsed_time_scale, extrapolate_pose, DiffDriveMotionModel, StampedPose, WheelTravel};
use super::observation_model::PoleObservationModel;
use super::process_noise::{ProcessNoiseConfig, ProcessNoiseModel};
use crate::common::{
    CovarianceDiagonal, LocalizationError, LocalizationResult, MotionModel, ObservationModel,
    OdometryReading, Pole, Pose2D,
};

fn default_observation_variance() -> f64 {
    0.02 * 0.02
}

fn default_inflation_factor() -> f64 {
    2.0
}

fn default_use_odometry() -> bool {
    true
}

/// Configuration for the pole EKF
///
/// `wheel_base` has no default and must be supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoleEkfConfig {
    /// Distance between the two drive wheels [m]
    pub wheel_base: f64,
    /// Wheel-slip noise gains
    #[serde(default)]
    pub process_noise: ProcessNoiseConfig,
    /// Per-axis variance of a pole measurement [m^2]
    #[serde(default = "default_observation_variance")]
    pub observation_variance: f64,
    /// Covariance growth per cycle without odometry
    #[serde(default = "default_inflation_factor")]
    pub inflation_factor: f64,
    /// Ignore odometry and always dead-reckon when false
    #[serde(default = "default_use_odometry")]
    pub use_odometry: bool,
    /// Keep off-diagonal covariance terms between cycles.
    ///
    /// Off by default: only the diagonal survives a commit.
    #[serde(default)]
    pub keep_cross_covariance: bool,
}

impl PoleEkfConfig {
    pub fn new(wheel_base: f64) -> Self {
        Self {
            wheel_base,
            process_noise: ProcessNoiseConfig::default(),
            observation_variance: default_observation_variance(),
            inflation_factor: default_inflation_factor(),
            use_odometry: default_use_odometry(),
            keep_cross_covariance: false,
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> LocalizationResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> LocalizationResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> LocalizationResult<()> {
        if !(self.wheel_base.is_finite() && self.wheel_base > 0.0) {
            return Err(LocalizationError::InvalidParameter(format!(
                "wheel_base must be positive, got {}",
                self.wheel_base
            )));
        }
        // R must stay positive definite for Σ to be invertible
        if !(self.observation_variance.is_finite() && self.observation_variance > 0.0) {
            return Err(LocalizationError::InvalidParameter(format!(
                "observation_variance must be positive, got {}",
                self.observation_variance
            )));
        }
        if !(self.inflation_factor.is_finite() && self.inflation_factor >= 1.0) {
            return Err(LocalizationError::InvalidParameter(format!(
                "inflation_factor must be at least 1, got {}",
                self.inflation_factor
            )));
        }
        let ProcessNoiseConfig { k_left, k_right } = self.process_noise;
        if !(k_left.is_finite() && k_left >= 0.0 && k_right.is_finite() && k_right >= 0.0) {
            return Err(LocalizationError::InvalidParameter(format!(
                "process noise gains must be non-negative, got ({}, {})",
                k_left, k_right
            )));
        }
        Ok(())
    }
}

/// Pose estimate with the history needed by the next prediction
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    pub pose: Pose2D,
    pub covariance: Matrix3<f64>,
    /// Time [s] the pose was committed
    pub stamp: f64,
    /// Pose committed one cycle earlier
    pub last_pose: Option<StampedPose>,
    /// Most recent odometry sample seen by the filter
    pub last_odometry: Option<OdometryReading>,
}

impl FilterState {
    pub fn new(pose: Pose2D, covariance: Matrix3<f64>, stamp: f64) -> Self {
        Self {
            pose,
            covariance,
            stamp,
            last_pose: None,
            last_odometry: None,
        }
    }

    /// Initial state from the three variances a host message carries
    pub fn from_diagonal(pose: Pose2D, diagonal: CovarianceDiagonal, stamp: f64) -> Self {
        Self::new(pose, diagonal.to_matrix(), stamp)
    }

    pub fn covariance_diagonal(&self) -> CovarianceDiagonal {
        CovarianceDiagonal::from(&self.covariance)
    }
}

/// Inputs supplied by the host for one cycle
#[derive(Debug, Clone, Copy)]
pub struct CycleInput<'a> {
    /// `None` when no new odometry arrived
    pub odometry: Option<OdometryReading>,
    /// Map poles with this cycle's observations
    pub poles: &'a [Pole],
    /// Current time [s]
    pub time: f64,
}

impl<'a> CycleInput<'a> {
    pub fn new(odometry: Option<OdometryReading>, poles: &'a [Pole], time: f64) -> Self {
        Self { odometry, poles, time }
    }
}

/// How the prediction step was carried out
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PredictionKind {
    /// Propagated through the motion model
    Odometry(WheelTravel),
    /// Extrapolated from the last pose increment, covariance inflated
    DeadReckoning { time_scale: f64 },
    /// No pose history: pose held, covariance inflated
    Inflated,
    /// Elapsed time indeterminate: pose held, covariance inflated and the
    /// update skipped
    Held,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub pose: Pose2D,
    pub covariance: Matrix3<f64>,
    pub kind: PredictionKind,
}

/// Extended Kalman Filter over pole observations
#[derive(Debug, Clone)]
pub struct PoleEkf {
    config: PoleEkfConfig,
    motion: DiffDriveMotionModel,
    process_noise: ProcessNoiseModel,
    observation: PoleObservationModel,
}

impl PoleEkf {
    /// Create a filter, rejecting an invalid configuration
    pub fn new(config: PoleEkfConfig) -> LocalizationResult<Self> {
        config.validate()?;
        Ok(Self {
            motion: DiffDriveMotionModel::new(config.wheel_base),
            process_noise: ProcessNoiseModel::new(config.process_noise),
            observation: PoleObservationModel::new(config.observation_variance),
            config,
        })
    }

    pub fn config(&self) -> &PoleEkfConfig {
        &self.config
    }

    /// Prediction step
    pub fn predict(&self, state: &FilterState, odometry: Option<&OdometryReading>, time: f64) -> Prediction {
        let odometry_pair = if self.config.use_odometry {
            odometry.zip(state.last_odometry.as_ref())
        } else {
            None
        };

        if let Some((current, previous)) = odometry_pair {
            let travel = WheelTravel::from_odometry(previous, current, self.config.wheel_base);
            let delta = self.motion.predict_delta(&state.pose, &travel);
            let j_f = self.motion.jacobian_state(&state.pose, &travel);
            let j_u = self.motion.jacobian_input(&state.pose, &travel);
            let covariance = j_f * state.covariance * j_f.transpose()
                + self.process_noise.pose_noise(&j_u, &travel);
            return Prediction {
                pose: Pose2D::from(state.pose.to_vector() + delta),
                covariance,
                kind: PredictionKind::Odometry(travel),
            };
        }

        let covariance = state.covariance * self.config.inflation_factor;
        let current = StampedPose::new(state.pose, state.stamp);
        let time_scale = state
            .last_pose
            .as_ref()
            .and_then(|last| elapsed_time_scale(last, &current, time).map(|s| (last, s)));

        match time_scale {
            Some((last, time_scale)) => {
                debug!(time_scale, "no odometry, dead-reckoning from last pose increment");
                Prediction {
                    pose: extrapolate_pose(&last.pose, &state.pose, time_scale),
                    covariance,
                    kind: PredictionKind::DeadReckoning { time_scale },
                }
            }
            None if state.last_pose.is_some() => {
                debug!(time, stamp = state.stamp, "indeterminate elapsed time, holding state");
                Prediction {
                    pose: state.pose,
                    covariance,
                    kind: PredictionKind::Held,
                }
            }
            None => {
                debug!("no odometry and no pose history, inflating covariance");
                Prediction {
                    pose: state.pose,
                    covariance,
                    kind: PredictionKind::Inflated,
                }
            }
        }
    }

    /// Update step with the visible subset of `poles`.
    ///
    /// Returns the inputs unchanged when no pole is visible.
    pub fn update(
        &self,
        pose: &Pose2D,
        covariance: &Matrix3<f64>,
        poles: &[Pole],
    ) -> LocalizationResult<(Pose2D, Matrix3<f64>)> {
        let visible = PoleObservationModel::visible_poles(poles);
        if visible.is_empty() {
            debug!("no visible poles, skipping update");
            return Ok((*pose, *covariance));
        }

        let h_x = self.observation.predict(pose, &visible);
        let j_h = self.observation.jacobian(pose, &visible);
        let r = self.observation.noise(&visible);
        let z = self.observation.measure(&visible);

        let s = &j_h * covariance * j_h.transpose() + &r;
        let dim = s.nrows();
        let singular = || {
            warn!(dim, "innovation covariance is singular");
            LocalizationError::SingularInnovationCovariance { dim }
        };
        let cholesky = s.cholesky().ok_or_else(singular)?;

        // Kᵀ = Σ⁻¹·H·P for symmetric Σ and P
        let k_t = cholesky.solve(&(&j_h * covariance));
        if k_t.iter().any(|v| !v.is_finite()) {
            return Err(singular());
        }
        let k = k_t.transpose();

        let nu = z - h_x;
        trace!(innovation = ?nu.as_slice(), poles = visible.len(), "pole update");

        let correction: Vector3<f64> = &k * nu;
        let i_kh = Matrix3::identity() - &k * &j_h;
        let p = i_kh * covariance * i_kh.transpose() + &k * &r * k.transpose();

        Ok((Pose2D::from(pose.to_vector() + correction), p))
    }

    /// Full cycle: predict, update, commit
    pub fn cycle(&self, state: &FilterState, input: &CycleInput<'_>) -> LocalizationResult<FilterState> {
        let prediction = self.predict(state, input.odometry.as_ref(), input.time);
        let (pose, covariance) = match prediction.kind {
            PredictionKind::Held => (prediction.pose, prediction.covariance),
            _ => self.update(&prediction.pose, &prediction.covariance, input.poles)?,
        };
        self.commit(state, input, pose, covariance)
    }

    fn commit(
        &self,
        state: &FilterState,
        input: &CycleInput<'_>,
        pose: Pose2D,
        covariance: Matrix3<f64>,
    ) -> LocalizationResult<FilterState> {
        let covariance = if self.config.keep_cross_covariance {
            (covariance + covariance.transpose()) * 0.5
        } else {
            Matrix3::from_diagonal(&covariance.diagonal())
        };

        if !pose.is_finite() || covariance.iter().any(|v| !v.is_finite()) {
            warn!(?pose, "non-finite estimate, refusing to commit");
            return Err(LocalizationError::NumericalError(
                "filter produced a non-finite estimate".to_string(),
            ));
        }

        Ok(FilterState {
            pose,
            covariance,
            stamp: input.time,
            last_pose: Some(StampedPose::new(state.pose, state.stamp)),
            last_odometry: input.odometry.or(state.last_odometry),
        })
    }
}

/// Stateful wrapper owning one filter estimate
#[derive(Debug, Clone)]
pub struct PoleLocalizer {
    ekf: PoleEkf,
    state: FilterState,
}

impl PoleLocalizer {
    pub fn new(config: PoleEkfConfig, initial: FilterState) -> LocalizationResult<Self> {
        Ok(Self {
            ekf: PoleEkf::new(config)?,
            state: initial,
        })
    }

    /// Run one cycle. On error the previous estimate is kept.
    pub fn step(&mut self, input: &CycleInput<'_>) -> LocalizationResult<&FilterState> {
        self.state = self.ekf.cycle(&self.state, input)?;
        Ok(&self.state)
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn pose(&self) -> Pose2D {
        self.state.pose
    }
}
