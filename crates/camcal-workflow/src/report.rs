use std::fmt;

use camcal_image::ImageSize;
use camcal_imgproc::calibration::distortion::COEFFICIENT_NAMES;
use chrono::{DateTime, Local};

use crate::session::{BoardGeometry, IntrinsicModel, PoseEstimate};

/// Summary of a calibration, printed for the operator.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    /// When the calibration finished.
    pub timestamp: DateTime<Local>,
    /// Number of board views used.
    pub samples: usize,
    /// The board.
    pub geometry: BoardGeometry,
    /// Resolution of the calibrated frames.
    pub resolution: ImageSize,
    /// The estimated model.
    pub model: IntrinsicModel,
    /// Root mean square reprojection error in pixels.
    pub rms: f64,
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = &self.geometry;
        let k = &self.model.intrinsic;
        writeln!(f, "calibration {}", self.timestamp.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "samples: {}", self.samples)?;
        writeln!(
            f,
            "board: {} x {} corners, squares {} x {}",
            g.corners_hor, g.corners_ver, g.square_width, g.square_height
        )?;
        writeln!(f, "resolution: {}", self.resolution)?;
        writeln!(f, "rms reprojection error: {:.4} px", self.rms)?;
        for (name, value) in [
            ("fx", k.fx),
            ("fy", k.fy),
            ("cx", k.cx),
            ("cy", k.cy),
            ("skew", k.skew),
        ] {
            writeln!(f, "{name} = {value:.6}")?;
        }
        for (name, value) in COEFFICIENT_NAMES
            .iter()
            .zip(self.model.distortion_coefficients())
        {
            writeln!(f, "{name} = {value:.6e}")?;
        }
        Ok(())
    }
}

/// Solved camera pose, printed for the operator.
#[derive(Debug, Clone, Copy)]
pub struct PoseReport {
    /// The pose.
    pub pose: PoseEstimate,
    /// Root mean square reprojection error in pixels.
    pub rms: f64,
    /// Number of correspondences used.
    pub correspondences: usize,
}

impl fmt::Display for PoseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [rx, ry, rz] = self.pose.rvec;
        let [tx, ty, tz] = self.pose.tvec;
        writeln!(f, "pose from {} correspondences", self.correspondences)?;
        writeln!(f, "rms reprojection error: {:.4} px", self.rms)?;
        writeln!(f, "rvec: [{rx:.6}, {ry:.6}, {rz:.6}]")?;
        writeln!(f, "rotation:")?;
        for row in &self.pose.rotation {
            writeln!(f, "  [{:.6}, {:.6}, {:.6}]", row[0], row[1], row[2])?;
        }
        writeln!(f, "tvec: [{tx:.6}, {ty:.6}, {tz:.6}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_imgproc::calibration::{distortion::PolynomialDistortion, CameraIntrinsic};

    #[test]
    fn test_calibration_report_lists_every_parameter() -> Result<(), crate::WorkflowError> {
        let report = CalibrationReport {
            timestamp: Local::now(),
            samples: 10,
            geometry: BoardGeometry::new(10, 9, 6, 25.0, 25.0)?,
            resolution: ImageSize {
                width: 640,
                height: 480,
            },
            model: IntrinsicModel {
                intrinsic: CameraIntrinsic {
                    fx: 600.0,
                    fy: 601.0,
                    cx: 319.5,
                    cy: 239.5,
                    skew: 0.0,
                },
                distortion: PolynomialDistortion::default(),
            },
            rms: 0.25,
        };
        let text = report.to_string();
        for label in ["fx =", "fy =", "cx =", "cy =", "skew ="]
            .into_iter()
            .chain(COEFFICIENT_NAMES)
        {
            assert!(text.contains(label), "missing {label}");
        }
        assert!(text.contains("resolution: [640, 480]"));
        assert!(text.contains("samples: 10"));
        Ok(())
    }

    #[test]
    fn test_pose_report() {
        let report = PoseReport {
            pose: PoseEstimate::from_vectors([0.0; 3], [1.0, 2.0, 3.0]),
            rms: 0.5,
            correspondences: 4,
        };
        let text = report.to_string();
        assert!(text.contains("tvec: [1.000000, 2.000000, 3.000000]"));
        assert!(text.contains("rvec: [0.000000, 0.000000, 0.000000]"));
        assert_eq!(text.lines().count(), 8);
    }
}
