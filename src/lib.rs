//! Photogrammetry Camera Library
//!
//! A metric frame camera model for photogrammetric image processing. The model
//! holds interior calibration parameters (principal distance, principal point,
//! fiducial marks, sensor size) and maps between raw measured image coordinates
//! and an ideal, distortion-free camera frame using:
//! - Odd-power radial distortion (`k0·r³ + k1·r⁵ + k2·r⁷`)
//! - Two-parameter Brown/Conrady decentering distortion
//!
//! Bundle adjustment, image I/O and multi-camera calibration are left to the
//! surrounding pipeline.

pub mod camera;
pub mod geometry;

// Re-export commonly used types
pub use camera::{
    CameraModel, CameraModelError, DecenteringDistortion, MetricCamera, RadialDistortion,
};
