use crate::linalg::{closest_rotation, norm3};

/// Convert an axis-angle rotation vector to a rotation matrix (Rodrigues formula).
///
/// # Arguments
///
/// * `rvec` - Rotation axis scaled by the rotation angle in radians.
///
/// # Returns
///
/// The 3x3 rotation matrix, row-major.
pub fn rotation_from_rvec(rvec: &[f64; 3]) -> [[f64; 3]; 3] {
    let theta = norm3(rvec);
    if theta < 1e-12 {
        // first order expansion
        return [
            [1.0, -rvec[2], rvec[1]],
            [rvec[2], 1.0, -rvec[0]],
            [-rvec[1], rvec[0], 1.0],
        ];
    }

    let (kx, ky, kz) = (rvec[0] / theta, rvec[1] / theta, rvec[2] / theta);
    let (s, c) = theta.sin_cos();
    let v = 1.0 - c;

    [
        [c + kx * kx * v, kx * ky * v - kz * s, kx * kz * v + ky * s],
        [ky * kx * v + kz * s, c + ky * ky * v, ky * kz * v - kx * s],
        [kz * kx * v - ky * s, kz * ky * v + kx * s, c + kz * kz * v],
    ]
}

/// Convert a rotation matrix to an axis-angle rotation vector.
///
/// The input is first projected onto the closest rotation, so slightly non-orthogonal
/// matrices are accepted.
pub fn rvec_from_rotation(rotation: &[[f64; 3]; 3]) -> [f64; 3] {
    let r = closest_rotation(rotation);

    let trace = r[0][0] + r[1][1] + r[2][2];
    let cos_theta = ((trace - 1.0) / 2.0).clamp(-1.0, 1.0);
    let theta = cos_theta.acos();

    let axis_sin = [r[2][1] - r[1][2], r[0][2] - r[2][0], r[1][0] - r[0][1]];

    if theta < 1e-9 {
        return [0.5 * axis_sin[0], 0.5 * axis_sin[1], 0.5 * axis_sin[2]];
    }

    if std::f64::consts::PI - theta < 1e-6 {
        // sin(theta) vanishes, read the axis from the symmetric part
        let xx = ((r[0][0] + 1.0) / 2.0).max(0.0).sqrt();
        let yy = ((r[1][1] + 1.0) / 2.0).max(0.0).sqrt();
        let zz = ((r[2][2] + 1.0) / 2.0).max(0.0).sqrt();
        let axis = if xx >= yy && xx >= zz {
            [xx, (r[0][1] + r[1][0]) / (4.0 * xx), (r[0][2] + r[2][0]) / (4.0 * xx)]
        } else if yy >= zz {
            [(r[0][1] + r[1][0]) / (4.0 * yy), yy, (r[1][2] + r[2][1]) / (4.0 * yy)]
        } else {
            [(r[0][2] + r[2][0]) / (4.0 * zz), (r[1][2] + r[2][1]) / (4.0 * zz), zz]
        };
        let n = norm3(&axis);
        return [
            axis[0] / n * theta,
            axis[1] / n * theta,
            axis[2] / n * theta,
        ];
    }

    let scale = theta / (2.0 * theta.sin());
    [
        axis_sin[0] * scale,
        axis_sin[1] * scale,
        axis_sin[2] * scale,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rotation_about_z() {
        let r = rotation_from_rvec(&[0.0, 0.0, std::f64::consts::FRAC_PI_2]);
        let expected = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(r[i][j], expected[i][j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_rvec_from_rotation() {
        let rvec = [0.2, -0.4, 0.1];
        let back = rvec_from_rotation(&rotation_from_rvec(&rvec));
        for i in 0..3 {
            assert_relative_eq!(back[i], rvec[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_identity_and_half_turn() {
        let zero = rvec_from_rotation(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        for v in zero {
            assert_relative_eq!(v, 0.0, epsilon = 1e-12);
        }

        let half_turn_x = [[1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]];
        let rvec = rvec_from_rotation(&half_turn_x);
        assert_relative_eq!(rvec[0].abs(), std::f64::consts::PI, epsilon = 1e-9);
        assert_relative_eq!(rvec[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(rvec[2], 0.0, epsilon = 1e-9);
    }
}
