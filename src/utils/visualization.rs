//! Visualization utilities for pole_ekf
//!
//! Provides a unified interface for plotting using gnuplot.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};
use nalgebra::{Matrix2, Matrix3, SymmetricEigen, Vector2};

use crate::common::{LocalizationError, LocalizationResult, Point2D, Pole, Pose2D};

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const BLUE: &str = "#0000FF";
    pub const YELLOW: &str = "#FFFF00";
    pub const CYAN: &str = "#00FFFF";

    // Semantic colors
    pub const POLE: &str = BLACK;
    pub const ROBOT: &str = CYAN;
    pub const ESTIMATED: &str = "#35C788";
    pub const GROUND_TRUTH: &str = BLUE;
    pub const MEASUREMENT: &str = "#DD3355";
    pub const DEAD_RECKONING: &str = YELLOW;
}

/// Style for path rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }
}

/// Main visualizer struct
pub struct Visualizer {
    figure: Figure,
    title: String,
    x_label: String,
    y_label: String,
    x_range: Option<(f64, f64)>,
    y_range: Option<(f64, f64)>,
    aspect_ratio: Option<f64>,
}

impl Visualizer {
    /// Create a new visualizer
    pub fn new() -> Self {
        Self {
            figure: Figure::new(),
            title: String::new(),
            x_label: "X [m]".to_string(),
            y_label: "Y [m]".to_string(),
            x_range: None,
            y_range: None,
            aspect_ratio: Some(1.0),
        }
    }

    /// Set the plot title
    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    /// Set X axis range
    pub fn set_x_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.x_range = Some((min, max));
        self
    }

    /// Set Y axis range
    pub fn set_y_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.y_range = Some((min, max));
        self
    }

    /// Plot a trajectory
    pub fn plot_trajectory(&mut self, poses: &[Pose2D], style: &PathStyle) -> &mut Self {
        let x: Vec<f64> = poses.iter().map(|p| p.x).collect();
        let y: Vec<f64> = poses.iter().map(|p| p.y).collect();

        self.figure.axes2d()
            .lines(&x, &y, &[
                Caption(&style.caption),
                Color(&style.color),
                LineWidth(style.line_width),
            ]);
        self
    }

    /// Plot surveyed pole positions
    pub fn plot_poles(&mut self, poles: &[Pole]) -> &mut Self {
        let x: Vec<f64> = poles.iter().map(|p| p.world.x).collect();
        let y: Vec<f64> = poles.iter().map(|p| p.world.y).collect();

        self.figure.axes2d()
            .points(&x, &y, &[
                Caption("Poles"),
                Color(colors::POLE),
                PointSymbol('S'),
                PointSize(1.0),
            ]);
        self
    }

    /// Plot world-frame measurement points
    pub fn plot_measurements(&mut self, points: &[Point2D]) -> &mut Self {
        let x: Vec<f64> = points.iter().map(|p| p.x).collect();
        let y: Vec<f64> = points.iter().map(|p| p.y).collect();

        self.figure.axes2d()
            .points(&x, &y, &[
                Caption("Pole observations"),
                Color(colors::MEASUREMENT),
                PointSymbol('x'),
                PointSize(0.5),
            ]);
        self
    }

    /// Plot robot pose with direction indicator
    pub fn plot_robot(&mut self, pose: &Pose2D, size: f64) -> &mut Self {
        self.figure.axes2d()
            .points(&[pose.x], &[pose.y], &[
                Caption("Robot"),
                Color(colors::ROBOT),
                PointSymbol('O'),
                PointSize(size),
            ]);

        let arrow_len = size * 0.5;
        let end_x = pose.x + arrow_len * pose.theta.cos();
        let end_y = pose.y + arrow_len * pose.theta.sin();

        self.figure.axes2d()
            .lines(&[pose.x, end_x], &[pose.y, end_y], &[
                Color(colors::ROBOT),
                LineWidth(2.0),
            ]);
        self
    }

    /// Plot the 2-sigma position ellipse of a pose covariance
    pub fn plot_covariance_ellipse(&mut self, pose: &Pose2D, covariance: &Matrix3<f64>) -> &mut Self {
        let (x, y) = covariance_ellipse_points(pose, covariance, 2.0, 40);
        self.figure.axes2d()
            .lines(&x, &y, &[
                Color(colors::ESTIMATED),
                LineWidth(1.0),
            ]);
        self
    }

    /// Finalize and show the plot
    pub fn show(&mut self) -> LocalizationResult<()> {
        self.apply_settings();
        self.figure
            .show()
            .map(|_| ())
            .map_err(|e| LocalizationError::VisualizationError(e.to_string()))
    }

    /// Save plot to SVG file
    pub fn save_svg(&mut self, path: &str) -> LocalizationResult<()> {
        self.apply_settings();
        self.figure
            .save_to_svg(path, 800, 600)
            .map_err(|e| LocalizationError::VisualizationError(e.to_string()))
    }

    fn apply_settings(&mut self) {
        let axes = self.figure.axes2d();

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);

        if let Some((min, max)) = self.x_range {
            axes.set_x_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some((min, max)) = self.y_range {
            axes.set_y_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Outline of the `n_sigma` ellipse of the x/y block of `covariance`
pub fn covariance_ellipse_points(
    pose: &Pose2D,
    covariance: &Matrix3<f64>,
    n_sigma: f64,
    n_points: usize,
) -> (Vec<f64>, Vec<f64>) {
    let xy = Matrix2::new(
        covariance[(0, 0)], covariance[(0, 1)],
        covariance[(1, 0)], covariance[(1, 1)],
    );
    let eigen = SymmetricEigen::new(xy);
    // clamp to keep sqrt real when round-off pushes an eigenvalue below zero
    let r1 = n_sigma * eigen.eigenvalues[0].max(0.0).sqrt();
    let r2 = n_sigma * eigen.eigenvalues[1].max(0.0).sqrt();

    let mut xs = Vec::with_capacity(n_points + 1);
    let mut ys = Vec::with_capacity(n_points + 1);
    for i in 0..=n_points {
        let t = 2.0 * std::f64::consts::PI * (i as f64) / (n_points as f64);
        let p = eigen.eigenvectors * Vector2::new(r1 * t.cos(), r2 * t.sin());
        xs.push(pose.x + p[0]);
        ys.push(pose.y + p[1]);
    }
    (xs, ys)
}
