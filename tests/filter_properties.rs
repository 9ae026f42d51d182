use approx::assert_relative_eq;
use nalgebra::{Matrix3, SymmetricEigen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use pole_ekf::common::{normalize_angle, MISSING_ODOMETRY_SENTINEL};
use pole_ekf::localization::{DiffDriveMotionModel, PredictionKind, StampedPose, WheelTravel};
use pole_ekf::{
    CovarianceDiagonal, CycleInput, FilterState, OdometryReading, Point2D, PolarObservation, Pole,
    PoleEkf, PoleEkfConfig, PoleLocalizer, Pose2D,
};

const WHEEL_BASE: f64 = 0.4;

fn ekf() -> PoleEkf {
    PoleEkf::new(PoleEkfConfig::new(WHEEL_BASE)).unwrap()
}

fn full_covariance_ekf() -> PoleEkf {
    let mut config = PoleEkfConfig::new(WHEEL_BASE);
    config.keep_cross_covariance = true;
    PoleEkf::new(config).unwrap()
}

/// Pole observed without noise from `pose`
fn exact_pole(pose: &Pose2D, world: Point2D) -> Pole {
    let dx = world.x - pose.x;
    let dy = world.y - pose.y;
    let range = (dx * dx + dy * dy).sqrt();
    let bearing = normalize_angle(dy.atan2(dx) - pose.theta);
    Pole::visible(world, PolarObservation::new(range, bearing))
}

fn assert_symmetric_psd(p: &Matrix3<f64>) {
    for i in 0..3 {
        assert!(p[(i, i)] >= -1e-12, "negative variance {}", p[(i, i)]);
        for j in 0..3 {
            assert_relative_eq!(p[(i, j)], p[(j, i)], epsilon = 1e-12);
        }
    }
    let eigen = SymmetricEigen::new(*p);
    assert!(eigen.eigenvalues.iter().all(|&l| l >= -1e-9), "not PSD: {:?}", eigen.eigenvalues);
}

/// Random cycle inputs: odometry increments with dropouts and noisy poles
fn random_run(ekf: &PoleEkf, seed: u64, cycles: usize) -> Vec<FilterState> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.05).unwrap();
    let map: Vec<Point2D> = (0..6)
        .map(|_| Point2D::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0)))
        .collect();

    let mut odometry = OdometryReading::new(0.0, 0.0, 0.0);
    let mut state = FilterState::from_diagonal(Pose2D::origin(), CovarianceDiagonal::new(0.5, 0.5, 0.1), 0.0);
    let mut states = Vec::with_capacity(cycles);

    for i in 0..cycles {
        let ds = rng.gen_range(0.0..0.3);
        let dtheta = rng.gen_range(-0.2..0.2);
        odometry = OdometryReading::new(
            odometry.x + ds * odometry.theta.cos(),
            odometry.y + ds * odometry.theta.sin(),
            odometry.theta + dtheta,
        );
        let reading = if rng.gen_bool(0.15) { None } else { Some(odometry) };

        let poles: Vec<Pole> = map
            .iter()
            .map(|&world| {
                let mut pole = exact_pole(&state.pose, world);
                pole.observation.range += noise.sample(&mut rng);
                pole.observation.bearing += noise.sample(&mut rng);
                pole.visible = rng.gen_bool(0.5);
                pole
            })
            .collect();

        state = ekf
            .cycle(&state, &CycleInput::new(reading, &poles, 0.1 * (i + 1) as f64))
            .unwrap();
        states.push(state.clone());
    }
    states
}

/// Like `random_run`, but odometry and poles drop out together for long
/// stretches so the covariance is inflated many times in a row
fn dropout_run(ekf: &PoleEkf, seed: u64, cycles: usize) -> Vec<FilterState> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.05).unwrap();
    let map: Vec<Point2D> = (0..6)
        .map(|_| Point2D::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0)))
        .collect();

    let mut odometry = OdometryReading::new(0.0, 0.0, 0.0);
    let mut state = FilterState::from_diagonal(Pose2D::origin(), CovarianceDiagonal::new(0.5, 0.5, 0.1), 0.0);
    let mut states = Vec::with_capacity(cycles);
    let mut blackout = 0;
    let mut was_dark = false;

    for i in 0..cycles {
        let ds = rng.gen_range(0.0..0.3);
        let dtheta = rng.gen_range(-0.2..0.2);
        odometry = OdometryReading::new(
            odometry.x + ds * odometry.theta.cos(),
            odometry.y + ds * odometry.theta.sin(),
            odometry.theta + dtheta,
        );
        // at least one lit cycle between stretches
        if blackout == 0 && !was_dark && rng.gen_bool(0.1) {
            blackout = rng.gen_range(10..=20);
        }
        let dark = blackout > 0;
        if dark {
            blackout -= 1;
        }
        was_dark = dark;

        let reading = if dark { None } else { Some(odometry) };
        let poles: Vec<Pole> = map
            .iter()
            .map(|&world| {
                let mut pole = exact_pole(&state.pose, world);
                pole.observation.range += noise.sample(&mut rng);
                pole.observation.bearing += noise.sample(&mut rng);
                pole.visible = !dark;
                pole
            })
            .collect();

        state = ekf
            .cycle(&state, &CycleInput::new(reading, &poles, 0.1 * (i + 1) as f64))
            .unwrap();
        states.push(state.clone());
    }
    states
}

#[test]
fn covariance_stays_symmetric_and_psd() {
    for seed in 0..5 {
        for state in random_run(&ekf(), seed, 200) {
            assert_symmetric_psd(&state.covariance);
        }
        for state in random_run(&full_covariance_ekf(), seed, 200) {
            assert_symmetric_psd(&state.covariance);
        }
    }
}

#[test]
fn covariance_stays_psd_through_long_dropouts() {
    for seed in 0..5 {
        for state in dropout_run(&ekf(), seed, 300) {
            assert_symmetric_psd(&state.covariance);
        }
        for state in dropout_run(&full_covariance_ekf(), seed, 300) {
            assert_symmetric_psd(&state.covariance);
        }
    }
}

#[test]
fn update_after_repeated_inflation_keeps_covariance_psd() {
    let world = [Point2D::new(3.0, 1.0), Point2D::new(-1.0, 4.0)];
    for ekf in [ekf(), full_covariance_ekf()] {
        for blind_cycles in [10, 15, 20] {
            let mut state = FilterState::new(Pose2D::origin(), Matrix3::identity(), 0.0);
            for i in 0..blind_cycles {
                state = ekf
                    .cycle(&state, &CycleInput::new(None, &[], 0.1 * (i + 1) as f64))
                    .unwrap();
            }
            let poles: Vec<Pole> = world.iter().map(|&w| exact_pole(&state.pose, w)).collect();
            let time = 0.1 * (blind_cycles + 1) as f64;
            let next = ekf.cycle(&state, &CycleInput::new(None, &poles, time)).unwrap();

            assert_symmetric_psd(&next.covariance);
            for i in 0..3 {
                assert!(next.covariance[(i, i)] > 0.0);
                assert!(next.covariance[(i, i)] < 1.0);
            }
        }
    }
}

#[test]
fn cycles_are_deterministic() {
    let a = random_run(&ekf(), 7, 100);
    let b = random_run(&ekf(), 7, 100);
    assert_eq!(a, b);
}

#[test]
fn identity_update_keeps_state_and_contracts_covariance() {
    let ekf = ekf();
    let pose = Pose2D::new(1.0, 2.0, 0.3);
    let covariance = Matrix3::new(
        0.4, 0.05, 0.0,
        0.05, 0.3, 0.01,
        0.0, 0.01, 0.1,
    );
    let poles = [
        exact_pole(&pose, Point2D::new(4.0, 2.0)),
        exact_pole(&pose, Point2D::new(0.0, 6.0)),
    ];

    let (new_pose, new_cov) = ekf.update(&pose, &covariance, &poles).unwrap();
    assert_relative_eq!(new_pose.x, pose.x, epsilon = 1e-9);
    assert_relative_eq!(new_pose.y, pose.y, epsilon = 1e-9);
    assert_relative_eq!(new_pose.theta, pose.theta, epsilon = 1e-9);
    for i in 0..3 {
        assert!(new_cov[(i, i)] < covariance[(i, i)]);
    }
}

#[test]
fn no_visible_poles_pass_prediction_through() {
    let ekf = full_covariance_ekf();
    let mut state = FilterState::new(Pose2D::new(0.5, -0.5, 0.2), Matrix3::identity() * 0.3, 0.0);
    state.last_odometry = Some(OdometryReading::new(0.0, 0.0, 0.0));
    let odometry = OdometryReading::new(0.3, 0.05, 0.1);
    let hidden = [Pole::hidden(Point2D::new(2.0, 2.0))];

    let prediction = ekf.predict(&state, Some(&odometry), 0.1);
    let next = ekf.cycle(&state, &CycleInput::new(Some(odometry), &hidden, 0.1)).unwrap();

    assert_eq!(next.pose, prediction.pose);
    assert_eq!(next.covariance.diagonal(), prediction.covariance.diagonal());
}

#[test]
fn missing_odometry_doubles_covariance() {
    let ekf = ekf();
    let state = FilterState::from_diagonal(Pose2D::new(1.0, 2.0, 0.3), CovarianceDiagonal::new(0.1, 0.2, 0.3), 0.0);
    let reading = OdometryReading::from_raw(MISSING_ODOMETRY_SENTINEL, 0.0, 0.0);

    let next = ekf.cycle(&state, &CycleInput::new(reading, &[], 0.1)).unwrap();
    assert_eq!(next.pose, state.pose);
    assert_eq!(next.covariance, state.covariance * 2.0);
}

#[test]
fn missing_odometry_with_history_dead_reckons() {
    let ekf = ekf();
    let mut state = FilterState::new(Pose2D::new(1.0, 1.0, 0.0), Matrix3::identity() * 0.1, 1.0);
    state.last_pose = Some(StampedPose::new(Pose2D::new(0.0, 1.0, 0.0), 0.5));

    let prediction = ekf.predict(&state, None, 1.25);
    assert_eq!(prediction.kind, PredictionKind::DeadReckoning { time_scale: 0.5 });
    assert_relative_eq!(prediction.pose.x, 1.5, epsilon = 1e-12);
    assert_relative_eq!(prediction.pose.y, 1.0, epsilon = 1e-12);
    assert_eq!(prediction.covariance, state.covariance * 2.0);
}

#[test]
fn scenario_pole_seen_where_expected() {
    let ekf = ekf();
    let pole = Pole::visible(Point2D::new(1.0, 0.0), PolarObservation::new(1.0, 0.0));
    let (pose, _) = ekf.update(&Pose2D::origin(), &Matrix3::identity(), &[pole]).unwrap();
    assert_eq!(pose, Pose2D::origin());
}

#[test]
fn scenario_pole_seen_further_away() {
    let ekf = ekf();
    let pole = Pole::visible(Point2D::new(1.0, 0.0), PolarObservation::new(1.1, 0.0));
    let (pose, cov) = ekf.update(&Pose2D::origin(), &Matrix3::identity(), &[pole]).unwrap();

    // the pole appears 0.1 m further ahead, so the robot is pushed back along x
    assert_relative_eq!(pose.x, -0.1 / 1.0004, epsilon = 1e-12);
    assert_relative_eq!(pose.y, 0.0, epsilon = 1e-12);
    assert_relative_eq!(pose.theta, 0.0, epsilon = 1e-12);
    assert!(cov[(0, 0)] < 1.0);
    assert!(cov[(0, 0)] > 0.0);
}

#[test]
fn motion_only_straight_drive() {
    let ekf = ekf();
    let prior = Matrix3::identity() * 0.1;
    let mut state = FilterState::new(Pose2D::origin(), prior, 0.0);
    state.last_odometry = Some(OdometryReading::new(0.0, 0.0, 0.0));

    let next = ekf
        .cycle(&state, &CycleInput::new(Some(OdometryReading::new(1.0, 0.0, 0.0)), &[], 0.1))
        .unwrap();
    assert_relative_eq!(next.pose.x, 1.0, epsilon = 1e-12);
    assert_relative_eq!(next.pose.y, 0.0, epsilon = 1e-12);
    assert_relative_eq!(next.pose.theta, 0.0, epsilon = 1e-12);
    for i in 0..3 {
        assert!(next.covariance[(i, i)] >= prior[(i, i)]);
    }
}

#[test]
fn localizer_tracks_noisy_robot() {
    let mut rng = StdRng::seed_from_u64(3);
    let slip = Normal::new(0.0, 0.005).unwrap();
    let noise = Normal::new(0.0, 0.01).unwrap();
    let robot = DiffDriveMotionModel::new(WHEEL_BASE);
    let map = [
        Point2D::new(5.0, 0.0),
        Point2D::new(5.0, 10.0),
        Point2D::new(-5.0, 5.0),
        Point2D::new(0.0, 12.0),
    ];
    let command = WheelTravel::from_arc(0.1, 0.01, WHEEL_BASE);

    let initial = FilterState::from_diagonal(Pose2D::origin(), CovarianceDiagonal::new(0.01, 0.01, 0.001), 0.0);
    let mut localizer = PoleLocalizer::new(PoleEkfConfig::new(WHEEL_BASE), initial).unwrap();
    let mut truth = Pose2D::origin();
    let mut odometry = Pose2D::origin();

    for step in 1..=300 {
        truth = robot.propagate(&truth, &command);
        let measured = WheelTravel::new(command.left + slip.sample(&mut rng), command.right + slip.sample(&mut rng));
        odometry = robot.propagate(&odometry, &measured);
        let reading = if step % 20 == 0 {
            None
        } else {
            Some(OdometryReading::new(odometry.x, odometry.y, odometry.theta))
        };

        let poles: Vec<Pole> = map
            .iter()
            .map(|&world| {
                let mut pole = exact_pole(&truth, world);
                pole.observation.range += noise.sample(&mut rng);
                pole.observation.bearing += noise.sample(&mut rng) * 0.1;
                pole.visible = pole.observation.range < 12.0;
                pole
            })
            .collect();

        localizer.step(&CycleInput::new(reading, &poles, 0.1 * step as f64)).unwrap();
        let error = localizer.pose().position().distance(&truth.position());
        assert!(error < 0.5, "step {}: error {}", step, error);
    }

    let heading_error = normalize_angle(localizer.pose().theta - truth.theta);
    assert!(heading_error.abs() < 0.1);
    assert_symmetric_psd(&localizer.state().covariance);
}
