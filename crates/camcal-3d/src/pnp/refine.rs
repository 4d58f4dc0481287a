//! Levenberg-Marquardt pose refinement for PnP solutions.

use camcal_imgproc::calibration::{distortion::PolynomialDistortion, CameraIntrinsic};

use super::{check_inputs, PnPError, PnPResult};
use crate::{
    optim::{levenberg_marquardt, LMParams, LeastSquaresProblem, Termination},
    projection::project_point_rvec,
    rotation::{rotation_from_rvec, rvec_from_rotation},
};

/// Pixel reprojection residuals of a pose parametrised as `[rvec, tvec]`.
struct ReprojectionProblem<'a> {
    world: &'a [[f64; 3]],
    image: &'a [[f64; 2]],
    intrinsic: &'a CameraIntrinsic,
    distortion: &'a PolynomialDistortion,
}

impl LeastSquaresProblem for ReprojectionProblem<'_> {
    fn num_residuals(&self) -> usize {
        2 * self.world.len()
    }

    fn residuals(&self, params: &[f64], out: &mut [f64]) {
        let rvec = [params[0], params[1], params[2]];
        let tvec = [params[3], params[4], params[5]];
        for ((pw, pi), r) in self
            .world
            .iter()
            .zip(self.image.iter())
            .zip(out.chunks_exact_mut(2))
        {
            let p = project_point_rvec(pw, &rvec, &tvec, self.intrinsic, self.distortion);
            r[0] = p[0] - pi[0];
            r[1] = p[1] - pi[1];
        }
    }
}

/// Refine a pose by minimizing the pixel reprojection error.
///
/// # Arguments
///
/// * `world` - 3d coordinates in the world frame.
/// * `image` - The corresponding pixel coordinates.
/// * `intrinsic` - The intrinsic parameters of the camera.
/// * `distortion` - The lens distortion of the camera.
/// * `rotation` - Initial world to camera rotation.
/// * `translation` - Initial world to camera translation.
/// * `params` - The solver parameters.
pub fn refine_pose(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
    rotation: &[[f64; 3]; 3],
    translation: &[f64; 3],
    params: &LMParams,
) -> Result<PnPResult, PnPError> {
    check_inputs(world, image)?;

    let problem = ReprojectionProblem {
        world,
        image,
        intrinsic,
        distortion,
    };

    let rvec0 = rvec_from_rotation(rotation);
    let mut x = [
        rvec0[0],
        rvec0[1],
        rvec0[2],
        translation[0],
        translation[1],
        translation[2],
    ];
    let report = levenberg_marquardt(&problem, &mut x, params);

    if !x.iter().all(|v| v.is_finite()) {
        return Err(PnPError::Degenerate);
    }

    let rvec = [x[0], x[1], x[2]];
    let reproj_rmse = (2.0 * report.cost / world.len() as f64).sqrt();
    log::trace!(
        "pnp refinement: {} iterations, rmse {reproj_rmse:.3e} px",
        report.iterations
    );

    Ok(PnPResult {
        rotation: rotation_from_rvec(&rvec),
        translation: [x[3], x[4], x[5]],
        rvec,
        reproj_rmse,
        num_iterations: report.iterations,
        converged: report.termination != Termination::MaxIterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::project_points;
    use approx::assert_relative_eq;

    #[test]
    fn test_refine_from_perturbed_pose() -> Result<(), PnPError> {
        let intrinsic = CameraIntrinsic {
            fx: 600.0,
            fy: 600.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        };
        let world = (0..3)
            .flat_map(|j| (0..4).map(move |i| [i as f64 * 0.1, j as f64 * 0.1, 0.0]))
            .collect::<Vec<_>>();
        let rvec = [0.05, -0.1, 0.02];
        let tvec = [-0.15, -0.1, 1.0];
        let image = project_points(
            &world,
            &rotation_from_rvec(&rvec),
            &tvec,
            &intrinsic,
            &PolynomialDistortion::default(),
        );

        let result = refine_pose(
            &world,
            &image,
            &intrinsic,
            &PolynomialDistortion::default(),
            &rotation_from_rvec(&[0.08, -0.05, 0.0]),
            &[-0.1, -0.12, 1.1],
            &LMParams::default(),
        )?;

        assert!(result.converged);
        assert!(result.reproj_rmse < 1e-6);
        for i in 0..3 {
            assert_relative_eq!(result.rvec[i], rvec[i], epsilon = 1e-6);
            assert_relative_eq!(result.translation[i], tvec[i], epsilon = 1e-6);
        }
        Ok(())
    }
}
