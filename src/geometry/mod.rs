//! Point batch construction and sensor sampling helpers.

use crate::camera::CameraModelError;
use nalgebra::{Matrix2xX, Vector2};

/// Builds a point batch from n×2 rows.
///
/// # Errors
///
/// [`CameraModelError::InvalidArgument`] if a row does not hold exactly two values.
pub fn points_from_rows(rows: &[Vec<f64>]) -> Result<Matrix2xX<f64>, CameraModelError> {
    let mut points = Matrix2xX::zeros(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if row.len() != 2 {
            return Err(CameraModelError::InvalidArgument(format!(
                "Point {} has {} coordinates, expected 2",
                i,
                row.len()
            )));
        }
        points.set_column(i, &Vector2::new(row[0], row[1]));
    }
    Ok(points)
}

/// Builds a point batch from interleaved `x0, y0, x1, y1, ...` values.
///
/// # Errors
///
/// [`CameraModelError::InvalidArgument`] if `data` has an odd length.
pub fn points_from_slice(data: &[f64]) -> Result<Matrix2xX<f64>, CameraModelError> {
    if data.len() % 2 != 0 {
        return Err(CameraModelError::InvalidArgument(format!(
            "Expected interleaved x/y pairs, found {} values",
            data.len()
        )));
    }
    Ok(Matrix2xX::from_column_slice(data))
}

/// Generate a grid of sample points evenly distributed over a square sensor
///
/// The sensor is centred on the fiducial origin, so points lie within
/// `±sensor_size / 2` on both axes.
///
/// # Arguments
///
/// * `sensor_size` - Side of the square sensor in millimetres
/// * `n` - The approximate number of points to generate
///
/// # Returns
///
/// A `Matrix2xX` with one cell-centre point per column
pub fn sample_sensor_points(sensor_size: f64, n: usize) -> Matrix2xX<f64> {
    let num_cells = (n as f64).sqrt().round().max(1.0) as usize;
    let cell_size = sensor_size / num_cells as f64;
    let half = sensor_size / 2.0;

    let mut points = Matrix2xX::zeros(num_cells * num_cells);
    let mut idx = 0;
    for i in 0..num_cells {
        for j in 0..num_cells {
            let x = (j as f64 + 0.5) * cell_size - half;
            let y = (i as f64 + 0.5) * cell_size - half;
            points.set_column(idx, &Vector2::new(x, y));
            idx += 1;
        }
    }

    points
}
