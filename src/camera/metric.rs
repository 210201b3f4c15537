//! Implements the metric frame camera model.
//!
//! This module provides the [`MetricCamera`] struct: the interior orientation of a
//! photogrammetric frame camera (principal distance, principal point, fiducial
//! marks, sensor size) together with odd-power radial distortion and two-parameter
//! Brown/Conrady decentering distortion. It adheres to the [`CameraModel`] trait
//! defined in the parent `camera` module ([`crate::camera`]).
//!
//! # Coordinate frames
//!
//! * *Camera coordinates* are raw measured sensor coordinates in the fiducial
//!   frame, in millimetres.
//! * *Principal-point coordinates* are camera coordinates minus the principal point.
//! * *Ideal camera coordinates* are distortion-free principal-point coordinates.
//!
//! Distortion displacements are signed so that `distorted = ideal + displacement`.

use crate::camera::{
    validation, CameraModel, CameraModelError, DecenteringDistortion, RadialDistortion,
};
use log::{debug, warn};
use nalgebra::{DVector, Matrix2xX, Matrix3x4, Point2, Vector2, Vector3};
use serde::Serialize;
use std::{fmt, fs, io::Write};
use yaml_rust::{Yaml, YamlLoader};

/// Identifier written to the `camera_model` field of saved calibration files.
const CAMERA_MODEL_NAME: &str = "metric_frame";

/// Represents a metric frame camera with radial and decentering distortion.
///
/// Fields are private; the principal point, fiducial marks and sensor size are
/// fixed at construction, while the focal length and distortion coefficients may
/// be updated by a calibration refinement loop through validated setters.
///
/// The principal point is expected to lie within `±sensor_size / 2` of the
/// fiducial origin. This is a caller precondition: violations are logged, not
/// rejected.
///
/// # Examples
///
/// ```rust
/// use nalgebra::{Matrix2xX, Point2};
/// use photogrammetry_camera::camera::{CameraModel, MetricCamera};
///
/// let camera = MetricCamera::new(
///     153.124,
///     Point2::new(0.002, -0.004),
///     &[1e-8, 0.0, 0.0],
///     &[0.0, 0.0],
///     Matrix2xX::zeros(0),
///     230.0,
/// )
/// .unwrap();
///
/// let raw = Matrix2xX::from_column_slice(&[100.002, -0.004]);
/// let ideal = camera.camera_to_ideal_camera(&raw).unwrap();
/// assert!((ideal[(0, 0)] - 99.99).abs() < 1e-9);
/// assert!(ideal[(1, 0)].abs() < 1e-12);
/// ```
#[derive(Clone, PartialEq)]
pub struct MetricCamera {
    focal_length: f64,
    principal_point: Point2<f64>,
    radial_distortions: RadialDistortion,
    decentering_distortions: DecenteringDistortion,
    fiducial_marks: Matrix2xX<f64>,
    sensor_size: f64,
}

/// Serialized layout of the `cam0` node of a calibration file.
#[derive(Serialize)]
struct CalibrationNode {
    camera_model: &'static str,
    focal_length: f64,
    principal_point: [f64; 2],
    radial_distortion: [f64; 3],
    decentering_distortion: [f64; 2],
    fiducial_marks: Vec<[f64; 2]>,
    sensor_size: f64,
}

#[derive(Serialize)]
struct CalibrationFile {
    cam0: CalibrationNode,
}

impl MetricCamera {
    /// Creates a new [`MetricCamera`] from calibration values.
    ///
    /// # Arguments
    ///
    /// * `focal_length` - Principal distance in millimetres.
    /// * `principal_point` - `(x0, y0)` in the fiducial frame.
    /// * `radial_distortions` - `[k0, k1, k2]`.
    /// * `decentering_distortions` - `[p1, p2]`.
    /// * `fiducial_marks` - Fiducial marks in camera space, one column per mark.
    /// * `sensor_size` - Side of the square sensor in millimetres.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidArgument`] if a coefficient slice has the wrong length.
    /// * [`CameraModelError::FocalLengthMustBePositive`]
    /// * [`CameraModelError::SensorSizeMustBePositive`]
    /// * [`CameraModelError::PrincipalPointMustBeFinite`]
    pub fn new(
        focal_length: f64,
        principal_point: Point2<f64>,
        radial_distortions: &[f64],
        decentering_distortions: &[f64],
        fiducial_marks: Matrix2xX<f64>,
        sensor_size: f64,
    ) -> Result<Self, CameraModelError> {
        let model = MetricCamera {
            focal_length,
            principal_point,
            radial_distortions: RadialDistortion::from_slice(radial_distortions)?,
            decentering_distortions: DecenteringDistortion::from_slice(decentering_distortions)?,
            fiducial_marks,
            sensor_size,
        };

        model.validate_params()?;
        Ok(model)
    }

    pub fn focal_length(&self) -> f64 {
        self.focal_length
    }

    /// Updates the principal distance.
    ///
    /// Results already returned by this camera are owned values and do not change.
    pub fn set_focal_length(&mut self, focal_length: f64) -> Result<(), CameraModelError> {
        validation::validate_focal_length(focal_length)?;
        debug!(
            "Focal length updated from {} to {}",
            self.focal_length, focal_length
        );
        self.focal_length = focal_length;
        Ok(())
    }

    pub fn principal_point(&self) -> &Point2<f64> {
        &self.principal_point
    }

    /// Fiducial marks in camera space, one column per mark.
    pub fn fiducial_marks(&self) -> &Matrix2xX<f64> {
        &self.fiducial_marks
    }

    pub fn sensor_size(&self) -> f64 {
        self.sensor_size
    }

    pub fn radial_distortions(&self) -> &RadialDistortion {
        &self.radial_distortions
    }

    pub fn set_radial_distortions(&mut self, coefficients: &[f64]) -> Result<(), CameraModelError> {
        self.radial_distortions = RadialDistortion::from_slice(coefficients)?;
        debug!("Radial distortion updated to {:?}", self.radial_distortions);
        Ok(())
    }

    pub fn decentering_distortions(&self) -> &DecenteringDistortion {
        &self.decentering_distortions
    }

    pub fn set_decentering_distortions(
        &mut self,
        coefficients: &[f64],
    ) -> Result<(), CameraModelError> {
        self.decentering_distortions = DecenteringDistortion::from_slice(coefficients)?;
        debug!(
            "Decentering distortion updated to {:?}",
            self.decentering_distortions
        );
        Ok(())
    }

    /// Parameters a calibration refinement may adjust, in the order
    /// `[f, k0, k1, k2, p1, p2]`.
    pub fn refinable_parameters(&self) -> DVector<f64> {
        DVector::from_vec(vec![
            self.focal_length,
            self.radial_distortions.k0,
            self.radial_distortions.k1,
            self.radial_distortions.k2,
            self.decentering_distortions.p1,
            self.decentering_distortions.p2,
        ])
    }

    /// Writes back a parameter vector laid out as in [`Self::refinable_parameters`].
    ///
    /// The model is left untouched when any value is rejected.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidArgument`] if `parameters` does not hold six values
    ///   or a distortion coefficient is not finite.
    /// * [`CameraModelError::FocalLengthMustBePositive`]
    pub fn set_refinable_parameters(
        &mut self,
        parameters: &DVector<f64>,
    ) -> Result<(), CameraModelError> {
        if parameters.len() != 6 {
            return Err(CameraModelError::InvalidArgument(format!(
                "Expected 6 refinable parameters, found {}",
                parameters.len()
            )));
        }
        validation::validate_focal_length(parameters[0])?;
        let radial = RadialDistortion::from_slice(&parameters.as_slice()[1..4])?;
        let decentering = DecenteringDistortion::from_slice(&parameters.as_slice()[4..6])?;

        self.focal_length = parameters[0];
        self.radial_distortions = radial;
        self.decentering_distortions = decentering;
        debug!("Refinable parameters updated: {:?}", self);
        Ok(())
    }

    /// Radial displacement `(Δx, Δy)` of a principal-point relative coordinate.
    fn radial_displacement(&self, centered: &Vector2<f64>) -> Vector2<f64> {
        let r = centered.norm();
        // No radial displacement on the optical axis; also avoids dividing by r.
        if r == 0.0 {
            return Vector2::zeros();
        }
        let RadialDistortion { k0, k1, k2 } = self.radial_distortions;
        let r3 = r * r * r;
        let r5 = r3 * r * r;
        let r7 = r5 * r * r;
        let delta_r = k0 * r3 + k1 * r5 + k2 * r7;
        centered * (delta_r / r)
    }

    /// Decentering displacement `(dx, dy)` of a principal-point relative coordinate.
    fn decentering_displacement(&self, centered: &Vector2<f64>) -> Vector2<f64> {
        let DecenteringDistortion { p1, p2 } = self.decentering_distortions;
        let x = centered.x;
        let y = centered.y;
        let r2 = x * x + y * y;
        Vector2::new(
            p1 * (r2 + 2.0 * x * x) + 2.0 * p2 * x * y,
            p2 * (r2 + 2.0 * y * y) + 2.0 * p1 * x * y,
        )
    }

    fn total_displacement(&self, centered: &Vector2<f64>) -> Vector2<f64> {
        self.radial_displacement(centered) + self.decentering_displacement(centered)
    }

    /// Validates the batch and applies `f` to each column.
    fn map_points<F>(
        &self,
        points: &Matrix2xX<f64>,
        f: F,
    ) -> Result<Matrix2xX<f64>, CameraModelError>
    where
        F: Fn(Vector2<f64>) -> Vector2<f64>,
    {
        validation::validate_points(points)?;
        let mut mapped = Matrix2xX::zeros(points.ncols());
        for (i, column) in points.column_iter().enumerate() {
            mapped.set_column(i, &f(Vector2::new(column[0], column[1])));
        }
        Ok(mapped)
    }

    /// Computes the radial distortion `(Δx, Δy)` of each point.
    ///
    /// Points are given in camera coordinates. With `r` the distance to the principal
    /// point, the radial displacement is `Δr = k0·r³ + k1·r⁵ + k2·r⁷`, decomposed along
    /// the radius. A point on the principal point has zero distortion.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::InvalidArgument`] if a coordinate is not finite.
    pub fn compute_radial_distortions(
        &self,
        points: &Matrix2xX<f64>,
    ) -> Result<Matrix2xX<f64>, CameraModelError> {
        let pp = self.principal_point.coords;
        self.map_points(points, |p| self.radial_displacement(&(p - pp)))
    }

    /// Computes the decentering distortion `(dx, dy)` of each point.
    ///
    /// Points are given in camera coordinates. With `x̄ = x − x0`, `ȳ = y − y0`:
    ///
    /// `dx = p1·(r² + 2x̄²) + 2·p2·x̄ȳ`
    /// `dy = p2·(r² + 2ȳ²) + 2·p1·x̄ȳ`
    ///
    /// # Errors
    ///
    /// [`CameraModelError::InvalidArgument`] if a coordinate is not finite.
    pub fn compute_decentering_distortions(
        &self,
        points: &Matrix2xX<f64>,
    ) -> Result<Matrix2xX<f64>, CameraModelError> {
        let pp = self.principal_point.coords;
        self.map_points(points, |p| self.decentering_displacement(&(p - pp)))
    }

    /// Sum of radial and decentering distortion of each point in camera coordinates.
    pub fn total_distortions(
        &self,
        points: &Matrix2xX<f64>,
    ) -> Result<Matrix2xX<f64>, CameraModelError> {
        let pp = self.principal_point.coords;
        self.map_points(points, |p| self.total_displacement(&(p - pp)))
    }

    /// Translates camera coordinates into the principal-point frame.
    ///
    /// This is a pure translation by the principal point; no distortion is removed.
    pub fn correction_to_principal_point(
        &self,
        points: &Matrix2xX<f64>,
    ) -> Result<Matrix2xX<f64>, CameraModelError> {
        let pp = self.principal_point.coords;
        self.map_points(points, |p| p - pp)
    }

    /// Corners of the sensor in the camera frame, one column per corner.
    ///
    /// The corners lie on the plane `z = −focal_length`, ordered counter-clockwise
    /// (seen from +z) starting at `(s/2, −s/2)`.
    pub fn camera_sys_corners(&self) -> Matrix3x4<f64> {
        let half = self.sensor_size / 2.0;
        let z = -self.focal_length;
        Matrix3x4::from_columns(&[
            Vector3::new(half, -half, z),
            Vector3::new(-half, -half, z),
            Vector3::new(-half, half, z),
            Vector3::new(half, half, z),
        ])
    }
}

/// Provides a debug string representation for [`MetricCamera`].
impl fmt::Debug for MetricCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MetricCamera [f: {} x0: {} y0: {} radial: {:?} decentering: {:?} fiducials: {} sensor: {}]",
            self.focal_length,
            self.principal_point.x,
            self.principal_point.y,
            self.radial_distortions.to_array(),
            self.decentering_distortions.to_array(),
            self.fiducial_marks.ncols(),
            self.sensor_size,
        )
    }
}

fn yaml_f64(node: &Yaml, name: &str) -> Result<f64, CameraModelError> {
    node.as_f64()
        .or_else(|| node.as_i64().map(|v| v as f64))
        .ok_or_else(|| CameraModelError::InvalidParams(format!("Invalid {}", name)))
}

fn yaml_f64_list(node: &Yaml, name: &str) -> Result<Vec<f64>, CameraModelError> {
    let items = node
        .as_vec()
        .ok_or_else(|| CameraModelError::InvalidParams(format!("Missing {}", name)))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| yaml_f64(item, &format!("{} at index {}", name, i)))
        .collect()
}

fn yaml_fiducial_marks(node: &Yaml) -> Result<Matrix2xX<f64>, CameraModelError> {
    if node.is_badvalue() || node.is_null() {
        return Ok(Matrix2xX::zeros(0));
    }
    let marks = node
        .as_vec()
        .ok_or_else(|| CameraModelError::InvalidParams("Invalid fiducial_marks".to_string()))?;

    let mut matrix = Matrix2xX::zeros(marks.len());
    for (i, mark) in marks.iter().enumerate() {
        let xy = yaml_f64_list(mark, &format!("fiducial mark {}", i))?;
        if xy.len() != 2 {
            return Err(CameraModelError::InvalidParams(format!(
                "Fiducial mark {} must have 2 coordinates, found {}",
                i,
                xy.len()
            )));
        }
        matrix.set_column(i, &Vector2::new(xy[0], xy[1]));
    }
    Ok(matrix)
}

impl CameraModel for MetricCamera {
    /// Transforms raw camera coordinates to ideal camera coordinates.
    ///
    /// Each point is first translated into the principal-point frame, then the radial
    /// and decentering distortion evaluated at that *observed* position is subtracted.
    /// The principal point itself maps to `(0, 0)`.
    ///
    /// This is the usual linear approximation: it does not iterate, so
    /// [`ideal_camera_to_camera`](CameraModel::ideal_camera_to_camera) only inverts it
    /// approximately when distortion is present.
    fn camera_to_ideal_camera(
        &self,
        points: &Matrix2xX<f64>,
    ) -> Result<Matrix2xX<f64>, CameraModelError> {
        let pp = self.principal_point.coords;
        self.map_points(points, |p| {
            let centered = p - pp;
            centered - self.total_displacement(&centered)
        })
    }

    /// Transforms ideal camera coordinates to simulated raw camera coordinates.
    ///
    /// Distortion is evaluated at the *ideal* position, added, and the principal point
    /// offset is re-applied. Round-tripping through both directions is exact for zero
    /// distortion and approximate otherwise.
    fn ideal_camera_to_camera(
        &self,
        points: &Matrix2xX<f64>,
    ) -> Result<Matrix2xX<f64>, CameraModelError> {
        let pp = self.principal_point.coords;
        self.map_points(points, |ideal| {
            ideal + self.total_displacement(&ideal) + pp
        })
    }

    /// Loads metric camera parameters from a YAML file.
    ///
    /// The file is expected to hold a `cam0` node with `focal_length`,
    /// `principal_point`, `radial_distortion`, `decentering_distortion`,
    /// `sensor_size` and optionally `fiducial_marks`.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::IOError`]: If there's an issue reading the file.
    /// * [`CameraModelError::YamlError`]: If the YAML content cannot be parsed.
    /// * [`CameraModelError::InvalidParams`]: If a field is missing or has the wrong type.
    /// * [`CameraModelError::InvalidArgument`]: If a coefficient list has the wrong length.
    /// * Errors from `validate_params` if the loaded values are invalid.
    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;

        if docs.is_empty() {
            return Err(CameraModelError::InvalidParams(
                "Empty YAML document".to_string(),
            ));
        }

        let cam = &docs[0]["cam0"];
        if cam.is_badvalue() {
            return Err(CameraModelError::InvalidParams(
                "Missing cam0 node".to_string(),
            ));
        }

        let principal_point = yaml_f64_list(&cam["principal_point"], "principal_point")?;
        if principal_point.len() != 2 {
            return Err(CameraModelError::InvalidParams(format!(
                "Expected 2 principal point coordinates, found {}",
                principal_point.len()
            )));
        }

        let model = MetricCamera::new(
            yaml_f64(&cam["focal_length"], "focal_length")?,
            Point2::new(principal_point[0], principal_point[1]),
            &yaml_f64_list(&cam["radial_distortion"], "radial_distortion")?,
            &yaml_f64_list(&cam["decentering_distortion"], "decentering_distortion")?,
            yaml_fiducial_marks(&cam["fiducial_marks"])?,
            yaml_f64(&cam["sensor_size"], "sensor_size")?,
        )?;

        debug!("Loaded {:?} from {}", model, path);
        Ok(model)
    }

    /// Saves the camera parameters to a YAML file readable by
    /// [`load_from_yaml`](CameraModel::load_from_yaml).
    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        let file_contents = CalibrationFile {
            cam0: CalibrationNode {
                camera_model: CAMERA_MODEL_NAME,
                focal_length: self.focal_length,
                principal_point: [self.principal_point.x, self.principal_point.y],
                radial_distortion: self.radial_distortions.to_array(),
                decentering_distortion: self.decentering_distortions.to_array(),
                fiducial_marks: self
                    .fiducial_marks
                    .column_iter()
                    .map(|mark| [mark[0], mark[1]])
                    .collect(),
                sensor_size: self.sensor_size,
            },
        };

        let yaml_string = serde_yaml::to_string(&file_contents)?;

        let mut file =
            fs::File::create(path).map_err(|e| CameraModelError::IOError(e.to_string()))?;
        file.write_all(yaml_string.as_bytes())
            .map_err(|e| CameraModelError::IOError(e.to_string()))?;

        debug!("Saved {:?} to {}", self, path);
        Ok(())
    }

    /// Validates the focal length, sensor size and principal point.
    ///
    /// A principal point outside the sensor extent is only logged.
    fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_focal_length(self.focal_length)?;
        validation::validate_sensor_size(self.sensor_size)?;
        validation::validate_principal_point(self.principal_point.x, self.principal_point.y)?;
        validation::validate_points(&self.fiducial_marks)?;

        let half = self.sensor_size / 2.0;
        if self.principal_point.x.abs() > half || self.principal_point.y.abs() > half {
            warn!(
                "Principal point ({}, {}) lies outside the sensor extent ±{}",
                self.principal_point.x, self.principal_point.y, half
            );
        }
        Ok(())
    }
}

/// Contains unit tests for the metric frame camera model.
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn camera_with(radial: &[f64], decentering: &[f64]) -> MetricCamera {
        MetricCamera::new(
            153.124,
            Point2::new(0.002, -0.004),
            radial,
            decentering,
            Matrix2xX::zeros(0),
            230.0,
        )
        .unwrap()
    }

    fn points(xy: &[f64]) -> Matrix2xX<f64> {
        Matrix2xX::from_column_slice(xy)
    }

    #[test]
    fn test_new_rejects_invalid_parameters() {
        let err = MetricCamera::new(
            0.0,
            Point2::origin(),
            &[0.0; 3],
            &[0.0; 2],
            Matrix2xX::zeros(0),
            230.0,
        )
        .unwrap_err();
        assert!(matches!(err, CameraModelError::FocalLengthMustBePositive));

        let err = MetricCamera::new(
            153.0,
            Point2::origin(),
            &[0.0; 3],
            &[0.0; 2],
            Matrix2xX::zeros(0),
            -1.0,
        )
        .unwrap_err();
        assert!(matches!(err, CameraModelError::SensorSizeMustBePositive));

        let err = MetricCamera::new(
            153.0,
            Point2::origin(),
            &[0.0; 2],
            &[0.0; 2],
            Matrix2xX::zeros(0),
            230.0,
        )
        .unwrap_err();
        assert!(matches!(err, CameraModelError::InvalidArgument(_)));

        let err = MetricCamera::new(
            153.0,
            Point2::origin(),
            &[0.0; 3],
            &[0.0; 3],
            Matrix2xX::zeros(0),
            230.0,
        )
        .unwrap_err();
        assert!(matches!(err, CameraModelError::InvalidArgument(_)));
    }

    #[test]
    fn test_principal_point_outside_sensor_is_accepted() {
        init_logger();
        let camera = MetricCamera::new(
            4360.0,
            Point2::new(2144.5, 1424.5),
            &[0.0; 3],
            &[0.0; 2],
            Matrix2xX::zeros(0),
            36.0,
        );
        assert!(camera.is_ok());
    }

    #[test]
    fn test_principal_point_maps_to_origin() {
        let camera = MetricCamera::new(
            4360.0,
            Point2::new(2144.5, 1424.5),
            &[0.0; 3],
            &[0.0; 2],
            Matrix2xX::zeros(0),
            5000.0,
        )
        .unwrap();

        let ideal = camera
            .camera_to_ideal_camera(&points(&[2144.5, 1424.5]))
            .unwrap();
        assert_eq!(ideal.ncols(), 1);
        assert_eq!(ideal[(0, 0)], 0.0);
        assert_eq!(ideal[(1, 0)], 0.0);
    }

    #[test]
    fn test_radial_distortion_zero_at_principal_point() {
        let camera = camera_with(&[1e-4, 1e-7, 1e-9], &[0.0, 0.0]);
        let distortion = camera
            .compute_radial_distortions(&points(&[0.002, -0.004]))
            .unwrap();
        assert_eq!(distortion[(0, 0)], 0.0);
        assert_eq!(distortion[(1, 0)], 0.0);
    }

    #[test]
    fn test_radial_distortion_along_x() {
        let camera = camera_with(&[1e-8, 0.0, 0.0], &[0.0, 0.0]);
        let distortion = camera
            .compute_radial_distortions(&points(&[100.002, -0.004]))
            .unwrap();
        assert_relative_eq!(distortion[(0, 0)], 0.01, epsilon = 1e-12);
        assert_relative_eq!(distortion[(1, 0)], 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_radial_distortion_points_away_from_principal_point() {
        let camera = camera_with(&[1e-8, 1e-12, 0.0], &[0.0, 0.0]);
        let pp = camera.principal_point().coords;
        let raw = points(&[pp.x + 30.0, pp.y - 40.0]);
        let distortion = camera.compute_radial_distortions(&raw).unwrap();

        // Δr = k0·50³ + k1·50⁵ along the direction (0.6, -0.8).
        let delta_r = 1e-8 * 50f64.powi(3) + 1e-12 * 50f64.powi(5);
        assert_relative_eq!(distortion[(0, 0)], 0.6 * delta_r, epsilon = 1e-12);
        assert_relative_eq!(distortion[(1, 0)], -0.8 * delta_r, epsilon = 1e-12);
    }

    #[test]
    fn test_radial_magnitude_non_decreasing() {
        let camera = camera_with(&[1e-8, 2e-13, 5e-18], &[0.0, 0.0]);
        let pp = camera.principal_point().coords;
        let radii: Vec<f64> = (0..=115).map(|i| i as f64).collect();
        let mut raw = Matrix2xX::zeros(radii.len());
        for (i, r) in radii.iter().enumerate() {
            // Diagonal direction exercises both components.
            let offset = r / 2f64.sqrt();
            raw.set_column(i, &Vector2::new(pp.x + offset, pp.y + offset));
        }

        let distortion = camera.compute_radial_distortions(&raw).unwrap();
        let magnitudes: Vec<f64> = distortion.column_iter().map(|c| c.norm()).collect();
        for pair in magnitudes.windows(2) {
            assert!(pair[1] >= pair[0], "{} < {}", pair[1], pair[0]);
        }
    }

    #[test]
    fn test_decentering_distortion() {
        let (p1, p2) = (2e-6, -1e-6);
        let camera = camera_with(&[0.0; 3], &[p1, p2]);
        let pp = camera.principal_point().coords;
        let (x, y) = (20.0, -10.0);
        let distortion = camera
            .compute_decentering_distortions(&points(&[pp.x + x, pp.y + y]))
            .unwrap();

        let r2 = x * x + y * y;
        assert_relative_eq!(
            distortion[(0, 0)],
            p1 * (r2 + 2.0 * x * x) + 2.0 * p2 * x * y,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            distortion[(1, 0)],
            p2 * (r2 + 2.0 * y * y) + 2.0 * p1 * x * y,
            epsilon = 1e-12
        );

        let at_pp = camera
            .compute_decentering_distortions(&points(&[pp.x, pp.y]))
            .unwrap();
        assert_eq!(at_pp[(0, 0)], 0.0);
        assert_eq!(at_pp[(1, 0)], 0.0);
    }

    #[test]
    fn test_total_distortion_is_sum() {
        let camera = camera_with(&[1e-8, 1e-13, 0.0], &[2e-6, -1e-6]);
        let raw = points(&[10.0, 20.0, -50.0, 75.0, 0.002, -0.004]);

        let radial = camera.compute_radial_distortions(&raw).unwrap();
        let decentering = camera.compute_decentering_distortions(&raw).unwrap();
        let total = camera.total_distortions(&raw).unwrap();
        assert_relative_eq!(total, radial + decentering, epsilon = 1e-15);
    }

    #[test]
    fn test_correction_to_principal_point() {
        let camera = camera_with(&[1e-8, 0.0, 0.0], &[1e-6, 1e-6]);
        let corrected = camera
            .correction_to_principal_point(&points(&[10.002, 9.996, -5.0, 0.0]))
            .unwrap();
        assert_relative_eq!(corrected[(0, 0)], 10.0, epsilon = 1e-12);
        assert_relative_eq!(corrected[(1, 0)], 10.0, epsilon = 1e-12);
        assert_relative_eq!(corrected[(0, 1)], -5.002, epsilon = 1e-12);
        assert_relative_eq!(corrected[(1, 1)], 0.004, epsilon = 1e-12);
    }

    #[test]
    fn test_camera_to_ideal_subtracts_distortion() {
        let camera = camera_with(&[1e-8, 0.0, 0.0], &[0.0, 0.0]);
        let ideal = camera
            .camera_to_ideal_camera(&points(&[100.002, -0.004]))
            .unwrap();
        assert_relative_eq!(ideal[(0, 0)], 99.99, epsilon = 1e-9);
        assert_relative_eq!(ideal[(1, 0)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ideal_to_camera_adds_distortion() {
        let camera = camera_with(&[1e-8, 0.0, 0.0], &[0.0, 0.0]);
        let raw = camera
            .ideal_camera_to_camera(&points(&[100.0, 0.0]))
            .unwrap();
        assert_relative_eq!(raw[(0, 0)], 100.002 + 0.01, epsilon = 1e-9);
        assert_relative_eq!(raw[(1, 0)], -0.004, epsilon = 1e-12);
    }

    #[test]
    fn test_round_trip_is_identity_without_distortion() {
        let camera = camera_with(&[0.0; 3], &[0.0; 2]);
        let raw = points(&[0.0, 0.0, 110.0, -110.0, -57.3, 12.25, 3.5, 99.0]);

        let ideal = camera.camera_to_ideal_camera(&raw).unwrap();
        let back = camera.ideal_camera_to_camera(&ideal).unwrap();
        assert_relative_eq!(back, raw, epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip_is_approximate_with_distortion() {
        let camera = camera_with(&[1e-8, 0.0, 0.0], &[2e-6, -1e-6]);
        let raw = points(&[80.0, -60.0]);

        let ideal = camera.camera_to_ideal_camera(&raw).unwrap();
        let back = camera.ideal_camera_to_camera(&ideal).unwrap();
        let residual = (back - &raw).norm();
        // Linearised inverse: close, but not exact.
        assert!(residual > 0.0);
        assert!(residual < 1e-3, "residual {}", residual);
    }

    #[test]
    fn test_transforms_preserve_batch_size() {
        let camera = camera_with(&[1e-8, 0.0, 0.0], &[2e-6, -1e-6]);
        let empty = Matrix2xX::zeros(0);
        assert_eq!(camera.camera_to_ideal_camera(&empty).unwrap().ncols(), 0);

        let raw = points(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(camera.ideal_camera_to_camera(&raw).unwrap().ncols(), 3);
        assert_eq!(camera.correction_to_principal_point(&raw).unwrap().ncols(), 3);
    }

    #[test]
    fn test_non_finite_points_are_rejected() {
        let camera = camera_with(&[1e-8, 0.0, 0.0], &[0.0, 0.0]);
        let raw = points(&[1.0, 2.0, f64::NAN, 4.0]);
        assert!(matches!(
            camera.camera_to_ideal_camera(&raw),
            Err(CameraModelError::InvalidArgument(_))
        ));
        assert!(matches!(
            camera.compute_radial_distortions(&raw),
            Err(CameraModelError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_camera_sys_corners() {
        let camera = camera_with(&[0.0; 3], &[0.0; 2]);
        let corners = camera.camera_sys_corners();

        assert_eq!(corners.ncols(), 4);
        for column in corners.column_iter() {
            assert_eq!(column[2], -153.124);
            assert_eq!(column[0].abs(), 115.0);
            assert_eq!(column[1].abs(), 115.0);
        }
        assert_eq!(corners.column(0).into_owned(), Vector3::new(115.0, -115.0, -153.124));
        assert_eq!(corners.column(2).into_owned(), Vector3::new(-115.0, 115.0, -153.124));
    }

    #[test]
    fn test_focal_length_update_is_observed_by_later_corners() {
        let mut camera = camera_with(&[0.0; 3], &[0.0; 2]);
        let before = camera.camera_sys_corners();

        camera.set_focal_length(88.0).unwrap();
        let after = camera.camera_sys_corners();

        assert!(before.row(2).iter().all(|z| *z == -153.124));
        assert!(after.row(2).iter().all(|z| *z == -88.0));

        assert!(matches!(
            camera.set_focal_length(-1.0),
            Err(CameraModelError::FocalLengthMustBePositive)
        ));
        assert_eq!(camera.focal_length(), 88.0);
    }

    #[test]
    fn test_distortion_setters() {
        let mut camera = camera_with(&[0.0; 3], &[0.0; 2]);
        camera.set_radial_distortions(&[1e-8, 2e-12, 0.0]).unwrap();
        camera.set_decentering_distortions(&[1e-6, -1e-6]).unwrap();
        assert_eq!(camera.radial_distortions().to_array(), [1e-8, 2e-12, 0.0]);
        assert_eq!(camera.decentering_distortions().to_array(), [1e-6, -1e-6]);

        assert!(camera.set_radial_distortions(&[1e-8]).is_err());
        assert_eq!(camera.radial_distortions().k0, 1e-8);
    }

    #[test]
    fn test_refinable_parameters() {
        let mut camera = camera_with(&[1e-8, 0.0, 0.0], &[1e-6, 0.0]);
        let mut parameters = camera.refinable_parameters();
        assert_eq!(parameters.len(), 6);
        assert_eq!(parameters[0], 153.124);
        assert_eq!(parameters[1], 1e-8);
        assert_eq!(parameters[4], 1e-6);

        parameters[0] = 152.9;
        parameters[5] = -2e-6;
        camera.set_refinable_parameters(&parameters).unwrap();
        assert_eq!(camera.focal_length(), 152.9);
        assert_eq!(camera.decentering_distortions().p2, -2e-6);

        let snapshot = camera.clone();
        let mut invalid = camera.refinable_parameters();
        invalid[0] = 0.0;
        assert!(camera.set_refinable_parameters(&invalid).is_err());
        assert!(camera
            .set_refinable_parameters(&DVector::from_vec(vec![150.0; 5]))
            .is_err());
        assert_eq!(camera, snapshot);
    }

    #[test]
    fn test_camera_is_shared_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MetricCamera>();

        let camera = camera_with(&[1e-8, 1e-13, 0.0], &[2e-6, -1e-6]);
        let raw = points(&[10.0, 20.0, -50.0, 75.0, 100.0, -100.0]);
        let expected = camera.camera_to_ideal_camera(&raw).unwrap();

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| camera.camera_to_ideal_camera(&raw).unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }

    /// Tests loading [`MetricCamera`] parameters from "samples/metric_camera.yaml".
    #[test]
    fn test_metric_load_from_yaml() {
        init_logger();
        let camera = MetricCamera::load_from_yaml("samples/metric_camera.yaml").unwrap();

        assert_eq!(camera.focal_length(), 153.124);
        assert_eq!(camera.principal_point().x, 0.002);
        assert_eq!(camera.principal_point().y, -0.004);
        assert_eq!(camera.radial_distortions().to_array(), [7.44e-9, -3.1e-13, 0.0]);
        assert_eq!(camera.decentering_distortions().to_array(), [1.43e-7, -2.8e-7]);
        assert_eq!(camera.fiducial_marks().ncols(), 4);
        assert_eq!(camera.fiducial_marks()[(0, 0)], -105.997);
        assert_eq!(camera.fiducial_marks()[(1, 3)], 106.004);
        assert_eq!(camera.sensor_size(), 230.0);
    }

    /// Tests saving [`MetricCamera`] parameters and reloading them.
    #[test]
    fn test_metric_save_to_yaml() {
        fs::create_dir_all("output").expect("Failed to create output directory for test.");
        let output_path = "output/metric_camera_saved.yaml";

        let camera = MetricCamera::load_from_yaml("samples/metric_camera.yaml").unwrap();
        camera.save_to_yaml(output_path).unwrap();
        let saved = MetricCamera::load_from_yaml(output_path).unwrap();
        assert_eq!(camera, saved);

        fs::remove_file(output_path).unwrap();
    }

    #[test]
    fn test_load_from_yaml_errors() {
        fs::create_dir_all("output").expect("Failed to create output directory for test.");

        assert!(matches!(
            MetricCamera::load_from_yaml("samples/does_not_exist.yaml"),
            Err(CameraModelError::IOError(_))
        ));

        let path = "output/metric_camera_bad_arity.yaml";
        fs::write(
            path,
            "cam0:\n  focal_length: 150\n  principal_point: [0.0, 0.0]\n  \
             radial_distortion: [0.0, 0.0]\n  decentering_distortion: [0.0, 0.0]\n  \
             sensor_size: 230\n",
        )
        .unwrap();
        assert!(matches!(
            MetricCamera::load_from_yaml(path),
            Err(CameraModelError::InvalidArgument(_))
        ));

        fs::write(path, "cam0:\n  focal_length: 150\n").unwrap();
        assert!(matches!(
            MetricCamera::load_from_yaml(path),
            Err(CameraModelError::InvalidParams(_))
        ));

        // Integer literals and a missing fiducial list are accepted.
        fs::write(
            path,
            "cam0:\n  focal_length: 150\n  principal_point: [0, 0]\n  \
             radial_distortion: [0, 0, 0]\n  decentering_distortion: [0, 0]\n  \
             sensor_size: 230\n",
        )
        .unwrap();
        let camera = MetricCamera::load_from_yaml(path).unwrap();
        assert_eq!(camera.focal_length(), 150.0);
        assert_eq!(camera.fiducial_marks().ncols(), 0);

        fs::remove_file(path).unwrap();
    }
}
