use std::sync::Mutex;

use camcal_3d::{
    calibration::{calibrate_camera, CalibError},
    pnp::{solve_pnp, PnPError},
    projection::project_point_rvec,
};
use camcal_image::{Image, ImageError, ImageSize};
use camcal_imgproc::{
    calibration::undistort::UndistortMap,
    chessboard::{find_chessboard_corners, ChessboardParams, PatternSize},
    color::gray_from_rgb_u8,
    ImgprocError,
};

use crate::{
    config::CalibrationPolicy,
    session::{Correspondence, IntrinsicModel, PoseEstimate, SampleSet},
};

/// Error types of the vision operations.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    /// An image could not be created.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// An image processing operation failed.
    #[error(transparent)]
    Imgproc(#[from] ImgprocError),

    /// The calibration failed.
    #[error(transparent)]
    Calibration(#[from] CalibError),

    /// The pose estimation failed.
    #[error(transparent)]
    PnP(#[from] PnPError),
}

/// Intrinsics estimated from a sample set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOutput {
    /// The estimated camera model.
    pub model: IntrinsicModel,
    /// Root mean square reprojection error in pixels.
    pub rms: f64,
}

/// Pose estimated from correspondences.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSolution {
    /// The estimated pose.
    pub pose: PoseEstimate,
    /// Root mean square reprojection error in pixels.
    pub rms: f64,
}

/// The computer vision capabilities the workflow relies on.
///
/// The acquisition thread and the controller share one backend, hence `Send + Sync`.
pub trait VisionBackend: Send + Sync {
    /// Find the inner corners of a chessboard, refined to subpixel accuracy, row-major.
    fn find_chessboard(
        &self,
        frame: &Image<u8, 3>,
        pattern: PatternSize,
    ) -> Result<Option<Vec<[f64; 2]>>, VisionError>;

    /// Estimate the camera model from the samples.
    fn calibrate(
        &self,
        samples: &SampleSet,
        image_size: ImageSize,
        policy: &CalibrationPolicy,
    ) -> Result<CalibrationOutput, VisionError>;

    /// Remove the lens distortion from a frame.
    fn undistort(
        &self,
        frame: &Image<u8, 3>,
        model: &IntrinsicModel,
    ) -> Result<Image<u8, 3>, VisionError>;

    /// Estimate the camera pose from pixel to world correspondences.
    fn solve_pose(
        &self,
        correspondences: &[Correspondence],
        model: &IntrinsicModel,
    ) -> Result<PoseSolution, VisionError>;

    /// Project a world point into the image.
    fn project(&self, world: &[f64; 3], pose: &PoseEstimate, model: &IntrinsicModel) -> [f64; 2];
}

/// [`VisionBackend`] built on `camcal-imgproc` and `camcal-3d`.
pub struct NativeVision {
    chessboard: ChessboardParams,
    // the correction map of the last model and frame size
    undistort_cache: Mutex<Option<(IntrinsicModel, UndistortMap)>>,
}

impl NativeVision {
    /// Create a backend detecting chessboards with `chessboard`.
    pub fn new(chessboard: ChessboardParams) -> Self {
        Self {
            chessboard,
            undistort_cache: Mutex::new(None),
        }
    }
}

impl Default for NativeVision {
    fn default() -> Self {
        Self::new(ChessboardParams::default())
    }
}

impl VisionBackend for NativeVision {
    fn find_chessboard(
        &self,
        frame: &Image<u8, 3>,
        pattern: PatternSize,
    ) -> Result<Option<Vec<[f64; 2]>>, VisionError> {
        let mut gray = Image::<u8, 1>::from_size_val(frame.size(), 0)?;
        gray_from_rgb_u8(frame, &mut gray)?;
        Ok(find_chessboard_corners(&gray, pattern, &self.chessboard)?)
    }

    fn calibrate(
        &self,
        samples: &SampleSet,
        image_size: ImageSize,
        policy: &CalibrationPolicy,
    ) -> Result<CalibrationOutput, VisionError> {
        let (object_points, image_points): (Vec<_>, Vec<_>) = samples
            .samples()
            .iter()
            .map(|s| (s.world_points.to_vec(), s.image_points.clone()))
            .unzip();

        let result = calibrate_camera(
            &object_points,
            &image_points,
            image_size,
            &(*policy).into(),
        )?;

        Ok(CalibrationOutput {
            model: IntrinsicModel {
                intrinsic: result.intrinsic,
                distortion: result.distortion,
            },
            rms: result.rms,
        })
    }

    fn undistort(
        &self,
        frame: &Image<u8, 3>,
        model: &IntrinsicModel,
    ) -> Result<Image<u8, 3>, VisionError> {
        // a poisoned cache only loses the map, rebuild it
        let mut cache = self
            .undistort_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let stale = !matches!(
            cache.as_ref(),
            Some((cached, map)) if cached == model && map.size() == frame.size()
        );
        if stale {
            log::debug!("building the undistortion map for {}", frame.size());
            let map = UndistortMap::new(&model.intrinsic, &model.distortion, frame.size());
            *cache = Some((*model, map));
        }

        match cache.as_ref() {
            Some((_, map)) => Ok(map.apply(frame)?),
            None => Ok(frame.clone()),
        }
    }

    fn solve_pose(
        &self,
        correspondences: &[Correspondence],
        model: &IntrinsicModel,
    ) -> Result<PoseSolution, VisionError> {
        let world = correspondences.iter().map(|c| c.world).collect::<Vec<_>>();
        let image = correspondences.iter().map(|c| c.pixel).collect::<Vec<_>>();
        let result = solve_pnp(&world, &image, &model.intrinsic, &model.distortion)?;
        Ok(PoseSolution {
            pose: PoseEstimate {
                rvec: result.rvec,
                tvec: result.translation,
                rotation: result.rotation,
            },
            rms: result.reproj_rmse,
        })
    }

    fn project(&self, world: &[f64; 3], pose: &PoseEstimate, model: &IntrinsicModel) -> [f64; 2] {
        project_point_rvec(
            world,
            &pose.rvec,
            &pose.tvec,
            &model.intrinsic,
            &model.distortion,
        )
    }
}
