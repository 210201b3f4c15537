//! Camera model types shared by the metric frame camera.
//!
//! This module holds the error type, the distortion coefficient containers and
//! the [`CameraModel`] trait. The concrete model lives in [`metric`].

use nalgebra::Matrix2xX;
use serde::{Deserialize, Serialize};

pub mod metric;

pub use metric::MetricCamera;

/// Coefficients of the odd-power radial distortion polynomial
/// `Δr = k0·r³ + k1·r⁵ + k2·r⁷`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RadialDistortion {
    pub k0: f64,
    pub k1: f64,
    pub k2: f64,
}

impl RadialDistortion {
    /// Number of coefficients in the radial polynomial.
    pub const ARITY: usize = 3;

    /// Builds the coefficients from `[k0, k1, k2]`.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::InvalidArgument`] if `coefficients` does not hold
    /// exactly three values or any of them is not finite.
    pub fn from_slice(coefficients: &[f64]) -> Result<Self, CameraModelError> {
        validation::validate_coefficients("radial", coefficients, Self::ARITY)?;
        Ok(RadialDistortion {
            k0: coefficients[0],
            k1: coefficients[1],
            k2: coefficients[2],
        })
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.k0, self.k1, self.k2]
    }
}

/// Coefficients of the two-parameter Brown/Conrady decentering model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DecenteringDistortion {
    pub p1: f64,
    pub p2: f64,
}

impl DecenteringDistortion {
    /// Number of decentering coefficients.
    pub const ARITY: usize = 2;

    /// Builds the coefficients from `[p1, p2]`.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::InvalidArgument`] if `coefficients` does not hold
    /// exactly two values or any of them is not finite.
    pub fn from_slice(coefficients: &[f64]) -> Result<Self, CameraModelError> {
        validation::validate_coefficients("decentering", coefficients, Self::ARITY)?;
        Ok(DecenteringDistortion {
            p1: coefficients[0],
            p2: coefficients[1],
        })
    }

    pub fn to_array(&self) -> [f64; 2] {
        [self.p1, self.p2]
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    #[error("Sensor size must be positive")]
    SensorSizeMustBePositive,
    #[error("Principal point must be finite")]
    PrincipalPointMustBeFinite,
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CameraModelError {
    fn from(err: std::io::Error) -> Self {
        CameraModelError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for CameraModelError {
    fn from(err: yaml_rust::ScanError) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CameraModelError {
    fn from(err: serde_yaml::Error) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

/// Trait defining the core functionality for camera models.
///
/// Point batches are `Matrix2xX<f64>` with one column per point.
pub trait CameraModel {
    /// Map raw camera coordinates to distortion-free coordinates relative to
    /// the principal point.
    fn camera_to_ideal_camera(
        &self,
        points: &Matrix2xX<f64>,
    ) -> Result<Matrix2xX<f64>, CameraModelError>;

    /// Map ideal coordinates back to simulated raw camera coordinates.
    fn ideal_camera_to_camera(
        &self,
        points: &Matrix2xX<f64>,
    ) -> Result<Matrix2xX<f64>, CameraModelError>;

    /// Load camera parameters from a YAML file
    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError>
    where
        Self: Sized;

    /// Save camera parameters to a YAML file
    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError>;

    /// Validate camera parameters
    fn validate_params(&self) -> Result<(), CameraModelError>;
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_focal_length(focal_length: f64) -> Result<(), CameraModelError> {
        if !focal_length.is_finite() || focal_length <= 0.0 {
            return Err(CameraModelError::FocalLengthMustBePositive);
        }
        Ok(())
    }

    pub fn validate_sensor_size(sensor_size: f64) -> Result<(), CameraModelError> {
        if !sensor_size.is_finite() || sensor_size <= 0.0 {
            return Err(CameraModelError::SensorSizeMustBePositive);
        }
        Ok(())
    }

    pub fn validate_principal_point(x0: f64, y0: f64) -> Result<(), CameraModelError> {
        if !x0.is_finite() || !y0.is_finite() {
            return Err(CameraModelError::PrincipalPointMustBeFinite);
        }
        Ok(())
    }

    pub fn validate_coefficients(
        name: &str,
        coefficients: &[f64],
        arity: usize,
    ) -> Result<(), CameraModelError> {
        if coefficients.len() != arity {
            return Err(CameraModelError::InvalidArgument(format!(
                "Expected {} {} distortion coefficients, found {}",
                arity,
                name,
                coefficients.len()
            )));
        }
        if let Some(i) = coefficients.iter().position(|c| !c.is_finite()) {
            return Err(CameraModelError::InvalidArgument(format!(
                "{} distortion coefficient at index {} is not finite",
                name, i
            )));
        }
        Ok(())
    }

    /// Every coordinate of the batch must be finite.
    pub fn validate_points(points: &Matrix2xX<f64>) -> Result<(), CameraModelError> {
        for (i, column) in points.column_iter().enumerate() {
            if !column[0].is_finite() || !column[1].is_finite() {
                return Err(CameraModelError::InvalidArgument(format!(
                    "Point {} has non-finite coordinates ({}, {})",
                    i, column[0], column[1]
                )));
            }
        }
        Ok(())
    }
}
