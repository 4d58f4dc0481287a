//! Perspective-n-Point pose estimation.
//!
//! A linear estimate (plane homography for coplanar points, DLT otherwise) seeds a
//! Levenberg-Marquardt refinement of the reprojection error.

/// Linear pose initialisation.
pub mod init;

/// LM-based pose refinement.
pub mod refine;

use camcal_imgproc::calibration::{distortion::PolynomialDistortion, CameraIntrinsic};
use thiserror::Error;

pub use init::initial_pose;
pub use refine::refine_pose;

use crate::optim::LMParams;

/// Why a pose could not be estimated.
#[derive(Debug, Error, PartialEq)]
pub enum PnPError {
    /// Fewer correspondences than the solver needs.
    #[error("Pose estimation needs {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences.
        required: usize,
        /// Number of correspondences given.
        actual: usize,
    },

    /// World and image point lists differ in length.
    #[error("Mismatched point sets: {0} world points, {1} image points")]
    MismatchedLengths(usize, usize),

    /// The correspondences do not determine a pose, e.g. all points are collinear.
    #[error("Degenerate point configuration")]
    Degenerate,
}

/// A camera pose solved from correspondences. `rotation` and `translation` take world
/// coordinates into the camera frame.
#[derive(Debug, Clone)]
pub struct PnPResult {
    /// World to camera rotation.
    pub rotation: [[f64; 3]; 3],
    /// World origin in camera coordinates.
    pub translation: [f64; 3],
    /// `rotation` as an axis-angle vector.
    pub rvec: [f64; 3],
    /// Root-mean-square reprojection error in pixels.
    pub reproj_rmse: f64,
    /// Number of refinement iterations.
    pub num_iterations: usize,
    /// Whether the refinement converged before its iteration budget ran out.
    pub converged: bool,
}

/// Minimum number of correspondences accepted by [`solve_pnp`].
pub const MIN_CORRESPONDENCES: usize = 4;

pub(crate) fn check_inputs(world: &[[f64; 3]], image: &[[f64; 2]]) -> Result<(), PnPError> {
    if world.len() != image.len() {
        return Err(PnPError::MismatchedLengths(world.len(), image.len()));
    }
    if world.len() < MIN_CORRESPONDENCES {
        return Err(PnPError::InsufficientCorrespondences {
            required: MIN_CORRESPONDENCES,
            actual: world.len(),
        });
    }
    Ok(())
}

/// Estimate the pose of a calibrated camera from 2D-3D correspondences.
///
/// # Arguments
///
/// * `world` - 3d coordinates in the world frame.
/// * `image` - The corresponding pixel coordinates.
/// * `intrinsic` - The intrinsic parameters of the camera.
/// * `distortion` - The lens distortion of the camera.
///
/// # Returns
///
/// The world to camera pose and its reprojection error.
pub fn solve_pnp(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> Result<PnPResult, PnPError> {
    check_inputs(world, image)?;
    let (rotation, translation) = initial_pose(world, image, intrinsic, distortion)?;
    refine_pose(
        world,
        image,
        intrinsic,
        distortion,
        &rotation,
        &translation,
        &LMParams::default().with_max_iterations(50),
    )
}
