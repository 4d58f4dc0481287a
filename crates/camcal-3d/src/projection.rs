use camcal_imgproc::calibration::{
    distortion::{distort_normalized, PolynomialDistortion},
    CameraIntrinsic,
};

use crate::{linalg::mat33_mul_vec3, rotation::rotation_from_rvec};

/// Project a 3d point expressed in the camera frame into the image.
///
/// Points on the camera plane (`z == 0`) project to non-finite coordinates.
pub fn project_camera_point(
    point: &[f64; 3],
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> [f64; 2] {
    let inv_z = 1.0 / point[2];
    let (xd, yd) = distort_normalized(point[0] * inv_z, point[1] * inv_z, distortion);
    let (u, v) = intrinsic.to_pixel(xd, yd);
    [u, v]
}

/// Project 3d world points into the image of a camera with lens distortion.
///
/// # Arguments
///
/// * `points_world` - The 3d points in the world frame.
/// * `rotation` - Rotation from the world to the camera frame.
/// * `translation` - Translation from the world to the camera frame.
/// * `intrinsic` - The intrinsic parameters of the camera.
/// * `distortion` - The distortion parameters of the camera.
///
/// Example:
///
/// ```
/// use camcal_3d::projection::project_points;
/// use camcal_imgproc::calibration::{distortion::PolynomialDistortion, CameraIntrinsic};
///
/// let intrinsic = CameraIntrinsic { fx: 500.0, fy: 500.0, cx: 320.0, cy: 240.0, skew: 0.0 };
/// let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
///
/// let points = project_points(
///     &[[1.0, 2.0, 5.0]],
///     &identity,
///     &[0.0, 0.0, 0.0],
///     &intrinsic,
///     &PolynomialDistortion::default(),
/// );
/// assert_eq!(points, vec![[420.0, 440.0]]);
/// ```
pub fn project_points(
    points_world: &[[f64; 3]],
    rotation: &[[f64; 3]; 3],
    translation: &[f64; 3],
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> Vec<[f64; 2]> {
    points_world
        .iter()
        .map(|pw| {
            let pr = mat33_mul_vec3(rotation, pw);
            let pc = [
                pr[0] + translation[0],
                pr[1] + translation[1],
                pr[2] + translation[2],
            ];
            project_camera_point(&pc, intrinsic, distortion)
        })
        .collect()
}

/// Project a single world point with a pose given as rotation and translation vectors.
pub fn project_point_rvec(
    point_world: &[f64; 3],
    rvec: &[f64; 3],
    tvec: &[f64; 3],
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> [f64; 2] {
    let rotation = rotation_from_rvec(rvec);
    let pr = mat33_mul_vec3(&rotation, point_world);
    let pc = [pr[0] + tvec[0], pr[1] + tvec[1], pr[2] + tvec[2]];
    project_camera_point(&pc, intrinsic, distortion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn intrinsic() -> CameraIntrinsic {
        CameraIntrinsic {
            fx: 600.0,
            fy: 600.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        }
    }

    #[test]
    fn test_project_translated_point() {
        let p = project_point_rvec(
            &[0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.0],
            &[0.1, -0.2, 2.0],
            &intrinsic(),
            &PolynomialDistortion::default(),
        );
        assert_relative_eq!(p[0], 350.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_project_with_distortion() {
        let distortion = PolynomialDistortion {
            k1: 0.1,
            ..Default::default()
        };
        let p = project_camera_point(&[1.0, 0.0, 2.0], &intrinsic(), &distortion);
        // x = 0.5, r2 = 0.25, radial factor 1.025
        assert_relative_eq!(p[0], 320.0 + 600.0 * 0.5125, epsilon = 1e-9);
        assert_relative_eq!(p[1], 240.0, epsilon = 1e-9);
    }

    #[test]
    fn test_project_rotated_point() {
        let p = project_point_rvec(
            &[1.0, 0.0, 0.0],
            &[0.0, 0.0, std::f64::consts::FRAC_PI_2],
            &[0.0, 0.0, 4.0],
            &intrinsic(),
            &PolynomialDistortion::default(),
        );
        assert_relative_eq!(p[0], 320.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 240.0 + 150.0, epsilon = 1e-9);
    }
}
