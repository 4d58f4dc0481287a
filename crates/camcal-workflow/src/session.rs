use std::sync::Arc;

use camcal_3d::rotation::rotation_from_rvec;
use camcal_image::ImageSize;
use camcal_imgproc::{
    calibration::{distortion::PolynomialDistortion, CameraIntrinsic},
    chessboard::PatternSize,
};

use crate::error::WorkflowError;

/// The stages of a calibration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Nothing connected yet.
    Prepare,
    /// The frame source is streaming.
    Started,
    /// Chessboard samples are being collected.
    Detecting,
    /// Intrinsics have been estimated.
    Calibrated,
    /// Frames are undistorted and correspondences can be recorded.
    Undistorting,
    /// The frame source is released.
    Closed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Prepare => "prepare",
            Stage::Started => "started",
            Stage::Detecting => "detecting",
            Stage::Calibrated => "calibrated",
            Stage::Undistorting => "undistorting",
            Stage::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The chessboard used for calibration and how many views of it to collect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardGeometry {
    /// Number of board views to collect before calibrating.
    pub boards_number: usize,
    /// Inner corners along a board row.
    pub corners_hor: usize,
    /// Inner corners along a board column.
    pub corners_ver: usize,
    /// Width of a square in world units.
    pub square_width: f64,
    /// Height of a square in world units.
    pub square_height: f64,
}

impl BoardGeometry {
    /// Create a validated geometry.
    ///
    /// # Errors
    ///
    /// Counts must be positive, with at least two corners per direction, and square sizes must
    /// be positive finite numbers.
    pub fn new(
        boards_number: usize,
        corners_hor: usize,
        corners_ver: usize,
        square_width: f64,
        square_height: f64,
    ) -> Result<Self, WorkflowError> {
        let geometry = Self {
            boards_number,
            corners_hor,
            corners_ver,
            square_width,
            square_height,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Check the geometry.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.boards_number == 0 {
            return Err(WorkflowError::InvalidGeometry(
                "the number of boards must be positive".to_string(),
            ));
        }
        if self.corners_hor < 2 || self.corners_ver < 2 {
            return Err(WorkflowError::InvalidGeometry(format!(
                "a board needs at least 2 x 2 inner corners, got {} x {}",
                self.corners_hor, self.corners_ver
            )));
        }
        for (name, value) in [
            ("square width", self.square_width),
            ("square height", self.square_height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(WorkflowError::InvalidGeometry(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// The corner grid searched in the frames.
    pub fn pattern(&self) -> PatternSize {
        PatternSize {
            cols: self.corners_hor,
            rows: self.corners_ver,
        }
    }

    /// World coordinates of the inner corners, row-major.
    ///
    /// Corner `k = j * corners_hor + i` sits at `(i * square_width, j * square_height, 0)`.
    pub fn world_template(&self) -> Vec<[f64; 3]> {
        (0..self.corners_ver)
            .flat_map(|j| {
                (0..self.corners_hor).map(move |i| {
                    [
                        i as f64 * self.square_width,
                        j as f64 * self.square_height,
                        0.0,
                    ]
                })
            })
            .collect()
    }
}

/// One accepted board observation.
#[derive(Debug, Clone)]
pub struct ChessboardSample {
    /// Refined corner pixels, row-major.
    pub image_points: Vec<[f64; 2]>,
    /// The world template shared by all samples of a session.
    pub world_points: Arc<[[f64; 3]]>,
}

/// Samples accumulated during detection, with the resolution they were observed at.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    samples: Vec<ChessboardSample>,
    image_size: Option<ImageSize>,
}

impl SampleSet {
    /// Append a sample seen in a frame of `image_size`.
    ///
    /// The first sample fixes the resolution of the set. A sample from a frame of another
    /// size is refused and `false` is returned.
    pub fn push(&mut self, sample: ChessboardSample, image_size: ImageSize) -> bool {
        match self.image_size {
            Some(size) if size != image_size => false,
            _ => {
                self.samples.push(sample);
                self.image_size = Some(image_size);
                true
            }
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample was collected.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.image_size = None;
    }

    /// The resolution shared by all samples.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    /// The samples in acceptance order.
    pub fn samples(&self) -> &[ChessboardSample] {
        &self.samples
    }
}

/// Camera matrix and lens distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntrinsicModel {
    /// The camera matrix.
    pub intrinsic: CameraIntrinsic,
    /// The lens distortion.
    pub distortion: PolynomialDistortion,
}

impl IntrinsicModel {
    /// The camera matrix, row-major.
    pub fn camera_matrix(&self) -> [[f64; 3]; 3] {
        self.intrinsic.matrix()
    }

    /// The distortion vector `k1, k2, p1, p2, k3, k4, k5, k6`.
    pub fn distortion_coefficients(&self) -> [f64; 8] {
        self.distortion.coefficients()
    }

    /// Whether every parameter is a finite number.
    pub fn is_finite(&self) -> bool {
        self.camera_matrix().iter().flatten().all(|v| v.is_finite())
            && self.distortion_coefficients().iter().all(|v| v.is_finite())
    }
}

/// Camera pose relative to the world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEstimate {
    /// Rotation vector, world to camera.
    pub rvec: [f64; 3],
    /// Translation vector, world to camera.
    pub tvec: [f64; 3],
    /// The rotation matrix of `rvec`.
    pub rotation: [[f64; 3]; 3],
}

impl PoseEstimate {
    /// Build a pose from its rotation and translation vectors.
    pub fn from_vectors(rvec: [f64; 3], tvec: [f64; 3]) -> Self {
        Self {
            rvec,
            tvec,
            rotation: rotation_from_rvec(&rvec),
        }
    }
}

/// A pixel paired with its world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// The pixel.
    pub pixel: [f64; 2],
    /// The world point.
    pub world: [f64; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_template() -> Result<(), WorkflowError> {
        let geometry = BoardGeometry::new(3, 4, 3, 20.0, 25.0)?;
        let template = geometry.world_template();
        assert_eq!(template.len(), 12);
        assert_eq!(template[0], [0.0, 0.0, 0.0]);
        assert_eq!(template[1], [20.0, 0.0, 0.0]);
        assert_eq!(template[4], [0.0, 25.0, 0.0]);
        assert_eq!(template[11], [60.0, 50.0, 0.0]);
        assert_eq!(template, geometry.world_template());
        Ok(())
    }

    #[test]
    fn test_geometry_validation() {
        assert!(BoardGeometry::new(0, 9, 6, 25.0, 25.0).is_err());
        assert!(BoardGeometry::new(5, 1, 6, 25.0, 25.0).is_err());
        assert!(BoardGeometry::new(5, 9, 6, 0.0, 25.0).is_err());
        assert!(BoardGeometry::new(5, 9, 6, 25.0, f64::NAN).is_err());
        assert!(BoardGeometry::new(5, 9, 6, 25.0, 24.5).is_ok());
    }

    #[test]
    fn test_sample_set_tracks_resolution() {
        let template: Arc<[[f64; 3]]> = Arc::from(vec![[0.0; 3]; 4]);
        let mut samples = SampleSet::default();
        assert!(samples.is_empty());

        let sample = ChessboardSample {
            image_points: vec![[0.0; 2]; 4],
            world_points: template,
        };
        assert!(samples.push(sample.clone(), ImageSize { width: 640, height: 480 }));
        assert_eq!(samples.len(), 1);
        assert_eq!(samples.image_size(), Some(ImageSize { width: 640, height: 480 }));

        // a frame of another size cannot join the set
        assert!(!samples.push(sample.clone(), ImageSize { width: 1280, height: 720 }));
        assert_eq!(samples.len(), 1);
        assert_eq!(samples.image_size(), Some(ImageSize { width: 640, height: 480 }));
        assert!(samples.push(sample, ImageSize { width: 640, height: 480 }));
        assert_eq!(samples.len(), 2);

        samples.clear();
        assert!(samples.is_empty());
        assert_eq!(samples.image_size(), None);
    }
}
