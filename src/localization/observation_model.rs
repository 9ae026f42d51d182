//! Pole observation model
//!
//! A pole is measured as a Cartesian point in the robot body frame. The
//! expected point is the surveyed world position rotated by `-θ` and shifted
//! by `-(x, y)`; the measured point is the polar laser observation converted
//! to Cartesian coordinates. Poles stack two rows each, in input order.

use nalgebra::{DMatrix, DVector, MatrixXx3};

use crate::common::{ObservationModel, Pole, Pose2D};

/// Observation model for point landmarks with a fixed per-axis variance
#[derive(Debug, Clone)]
pub struct PoleObservationModel {
    variance: f64,
}

impl PoleObservationModel {
    pub fn new(variance: f64) -> Self {
        Self { variance }
    }

    /// Visible subset of `poles`, order preserved
    pub fn visible_poles(poles: &[Pole]) -> Vec<Pole> {
        poles.iter().filter(|p| p.visible).copied().collect()
    }
}

impl ObservationModel for PoleObservationModel {
    type Landmark = Pole;

    fn predict(&self, pose: &Pose2D, poles: &[Pole]) -> DVector<f64> {
        let (s, c) = pose.theta.sin_cos();
        let mut h_x = DVector::zeros(2 * poles.len());
        for (i, pole) in poles.iter().enumerate() {
            let dx = pole.world.x - pose.x;
            let dy = pole.world.y - pose.y;
            h_x[2 * i] = c * dx + s * dy;
            h_x[2 * i + 1] = -s * dx + c * dy;
        }
        h_x
    }

    fn jacobian(&self, pose: &Pose2D, poles: &[Pole]) -> MatrixXx3<f64> {
        let (s, c) = pose.theta.sin_cos();
        let mut h = MatrixXx3::zeros(2 * poles.len());
        for (i, pole) in poles.iter().enumerate() {
            let dx = pole.world.x - pose.x;
            let dy = pole.world.y - pose.y;
            h[(2 * i, 0)] = -c;
            h[(2 * i, 1)] = -s;
            h[(2 * i, 2)] = -s * dx + c * dy;
            h[(2 * i + 1, 0)] = s;
            h[(2 * i + 1, 1)] = -c;
            h[(2 * i + 1, 2)] = -c * dx - s * dy;
        }
        h
    }

    fn noise(&self, poles: &[Pole]) -> DMatrix<f64> {
        DMatrix::from_diagonal_element(2 * poles.len(), 2 * poles.len(), self.variance)
    }

    fn measure(&self, poles: &[Pole]) -> DVector<f64> {
        let mut z = DVector::zeros(2 * poles.len());
        for (i, pole) in poles.iter().enumerate() {
            let point = pole.observation.to_point();
            z[2 * i] = point.x;
            z[2 * i + 1] = point.y;
        }
        z
    }
}
