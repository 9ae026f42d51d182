// Pole EKF localization sample
//
// A differential-drive robot drives a circle through a field of poles. Wheel
// odometry is corrupted by slip, pole observations by range/bearing noise,
// and every few cycles the odometry message is dropped altogether.
//
// usage: pole_ekf_sim [config.toml]

use std::error::Error;
use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pole_ekf::common::{normalize_angle, MISSING_ODOMETRY_SENTINEL};
use pole_ekf::localization::{DiffDriveMotionModel, WheelTravel};
use pole_ekf::utils::{colors, PathStyle, Visualizer};
use pole_ekf::{
    CovarianceDiagonal, CycleInput, FilterState, OdometryReading, Point2D, PolarObservation, Pole,
    PoleEkfConfig, PoleLocalizer, Pose2D,
};

const DT: f64 = 0.1; // time step [s]
const SIM_TIME: f64 = 60.0; // simulation time [s]
const WHEEL_BASE: f64 = 0.4; // [m]
const MAX_RANGE: f64 = 8.0; // laser range [m]
const ODOMETRY_DROPOUT_PERIOD: usize = 25; // every n-th odometry message is lost

const V: f64 = 1.0; // [m/s]
const OMEGA: f64 = 0.1; // [rad/s]

const SLIP_STD: f64 = 0.01; // wheel travel noise per step [m]
const RANGE_STD: f64 = 0.02; // [m]
const BEARING_STD: f64 = 0.5 * PI / 180.0; // [rad]

fn pole_map() -> Vec<Point2D> {
    vec![
        Point2D::new(5.0, 0.0),
        Point2D::new(8.0, 6.0),
        Point2D::new(5.0, 14.0),
        Point2D::new(0.0, 18.0),
        Point2D::new(-6.0, 14.0),
        Point2D::new(-8.0, 6.0),
        Point2D::new(-4.0, 0.0),
        Point2D::new(0.0, 9.0),
    ]
}

/// Observe every pole of the map from the true pose
fn observe(
    truth: &Pose2D,
    map: &[Point2D],
    range_noise: &Normal<f64>,
    bearing_noise: &Normal<f64>,
    rng: &mut StdRng,
) -> Vec<Pole> {
    map.iter()
        .map(|&world| {
            let dx = world.x - truth.x;
            let dy = world.y - truth.y;
            let range = (dx * dx + dy * dy).sqrt();
            if range > MAX_RANGE {
                return Pole::hidden(world);
            }
            let bearing = normalize_angle(dy.atan2(dx) - truth.theta);
            Pole::visible(
                world,
                PolarObservation::new(
                    range + range_noise.sample(rng),
                    bearing + bearing_noise.sample(rng),
                ),
            )
        })
        .collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => PoleEkfConfig::from_file(&path)?,
        None => PoleEkfConfig::new(WHEEL_BASE),
    };
    info!(?config, "starting pole EKF simulation");

    let mut rng = StdRng::seed_from_u64(42);
    let slip = Normal::new(0.0, SLIP_STD)?;
    let range_noise = Normal::new(0.0, RANGE_STD)?;
    let bearing_noise = Normal::new(0.0, BEARING_STD)?;

    let robot = DiffDriveMotionModel::new(config.wheel_base);
    let map = pole_map();
    let command = WheelTravel::from_arc(V * DT, OMEGA * DT, config.wheel_base);

    let initial = FilterState::from_diagonal(Pose2D::origin(), CovarianceDiagonal::new(0.01, 0.01, 0.001), 0.0);
    let mut localizer = PoleLocalizer::new(config, initial)?;

    let mut truth = Pose2D::origin();
    let mut odometry = Pose2D::origin();
    let mut h_true = vec![truth];
    let mut h_odom = vec![odometry];
    let mut h_est = vec![localizer.pose()];
    let mut h_obs = Vec::new();

    let mut time = 0.0;
    let mut step = 0;
    while time < SIM_TIME {
        time += DT;
        step += 1;

        truth = robot.propagate(&truth, &command);
        let measured = WheelTravel::new(command.left + slip.sample(&mut rng), command.right + slip.sample(&mut rng));
        odometry = robot.propagate(&odometry, &measured);

        // the host sees the raw message, sentinel included
        let raw_x = if step % ODOMETRY_DROPOUT_PERIOD == 0 { MISSING_ODOMETRY_SENTINEL } else { odometry.x };
        let reading = OdometryReading::from_raw(raw_x, odometry.y, odometry.theta);

        let poles = observe(&truth, &map, &range_noise, &bearing_noise, &mut rng);
        let state = localizer.step(&CycleInput::new(reading, &poles, time))?;

        for pole in poles.iter().filter(|p| p.visible) {
            let local = pole.observation.to_point();
            let (s, c) = state.pose.theta.sin_cos();
            h_obs.push(Point2D::new(
                state.pose.x + c * local.x - s * local.y,
                state.pose.y + s * local.x + c * local.y,
            ));
        }
        h_true.push(truth);
        h_odom.push(odometry);
        h_est.push(state.pose);
    }

    let rmse = (h_true
        .iter()
        .zip(h_est.iter())
        .map(|(t, e)| t.position().distance(&e.position()).powi(2))
        .sum::<f64>()
        / h_true.len() as f64)
        .sqrt();
    let state = localizer.state();
    let diagonal = state.covariance_diagonal();
    info!(
        rmse,
        x = state.pose.x,
        y = state.pose.y,
        theta = state.pose.theta,
        var_x = diagonal.var_x,
        var_y = diagonal.var_y,
        var_theta = diagonal.var_theta,
        "simulation finished"
    );

    let mut vis = Visualizer::new();
    vis.set_title("Pole EKF localization")
        .set_x_range(-12.0, 12.0)
        .set_y_range(-4.0, 22.0);
    vis.plot_poles(&map.iter().map(|&p| Pole::hidden(p)).collect::<Vec<_>>())
        .plot_measurements(&h_obs)
        .plot_trajectory(&h_true, &PathStyle::new(colors::GROUND_TRUTH, "Ground truth"))
        .plot_trajectory(&h_odom, &PathStyle::new(colors::DEAD_RECKONING, "Odometry"))
        .plot_trajectory(&h_est, &PathStyle::new(colors::ESTIMATED, "EKF estimate"))
        .plot_covariance_ellipse(&state.pose, &state.covariance)
        .plot_robot(&state.pose, 1.0);

    std::fs::create_dir_all("./img")?;
    if let Err(e) = vis.save_svg("./img/pole_ekf.svg") {
        warn!(error = %e, "could not save plot");
    }

    Ok(())
}
