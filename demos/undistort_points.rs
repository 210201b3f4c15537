//! Distortion Report Example
//!
//! Loads a metric camera calibration, samples a grid over the sensor and reports
//! how far lens distortion moves each point, together with the residual left by
//! the linearised inverse mapping.
//!
//! Usage:
//! ```bash
//! cargo run --example undistort_points -- \
//!   --camera samples/metric_camera.yaml \
//!   --samples 25
//! ```

use clap::Parser;
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use log::info;
use photogrammetry_camera::camera::{CameraModel, MetricCamera};
use photogrammetry_camera::geometry;
use std::path::PathBuf;

/// Metric camera distortion report
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the camera calibration file
    #[arg(short = 'c', long)]
    camera: PathBuf,

    /// Approximate number of sensor points to sample
    #[arg(short = 'n', long, default_value_t = 25)]
    samples: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    Logger::try_with_str("info")?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .suppress_timestamp()
                .suffix("log"),
        )
        .duplicate_to_stdout(Duplicate::All)
        .format_for_files(detailed_format)
        .format_for_stdout(colored_detailed_format)
        .start()?;

    let cli = Cli::parse();
    info!("Camera Path: {:?}", cli.camera);

    let camera_path = cli.camera.to_str().ok_or("Invalid camera path string")?;
    let camera = MetricCamera::load_from_yaml(camera_path)?;
    info!("Loaded camera: {:?}", camera);

    // Sample in the principal-point frame, then shift into camera coordinates.
    let mut raw = geometry::sample_sensor_points(camera.sensor_size(), cli.samples);
    let pp = camera.principal_point().coords;
    for mut column in raw.column_iter_mut() {
        column += pp;
    }

    let radial = camera.compute_radial_distortions(&raw)?;
    let decentering = camera.compute_decentering_distortions(&raw)?;
    let ideal = camera.camera_to_ideal_camera(&raw)?;
    let round_trip = camera.ideal_camera_to_camera(&ideal)?;

    println!("\n=== DISTORTION REPORT ===");
    println!(
        "{:>10} {:>10} {:>12} {:>12} {:>12}",
        "x", "y", "|radial|", "|decenter|", "residual"
    );
    let mut max_residual: f64 = 0.0;
    for i in 0..raw.ncols() {
        let residual = (round_trip.column(i) - raw.column(i)).norm();
        max_residual = max_residual.max(residual);
        println!(
            "{:>10.3} {:>10.3} {:>12.3e} {:>12.3e} {:>12.3e}",
            raw[(0, i)],
            raw[(1, i)],
            radial.column(i).norm(),
            decentering.column(i).norm(),
            residual
        );
    }
    info!("Maximum round-trip residual: {:e}", max_residual);

    println!("\nSensor corners (camera frame):");
    for corner in camera.camera_sys_corners().column_iter() {
        println!("  ({:.3}, {:.3}, {:.3})", corner[0], corner[1], corner[2]);
    }
    println!("========================");

    Ok(())
}
