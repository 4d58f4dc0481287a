//! Intrinsic camera calibration from views of a planar target.
//!
//! The focal lengths are initialised in closed form from the view homographies with the
//! principal point held at the image centre (Zhang's method restricted to a zero skew camera),
//! each view pose is decomposed from its homography, and everything is refined jointly by
//! minimizing the reprojection error.

use camcal_image::ImageSize;
use camcal_imgproc::calibration::{distortion::PolynomialDistortion, CameraIntrinsic};

use crate::{
    homography::{find_homography, pose_from_homography, HomographyError},
    optim::{levenberg_marquardt, LMParams, LeastSquaresProblem},
    projection::project_point_rvec,
    rotation::rvec_from_rotation,
};

/// Error types for the intrinsic calibration.
#[derive(Debug, thiserror::Error)]
pub enum CalibError {
    /// No view was given.
    #[error("Calibration needs at least one view")]
    NoViews,

    /// A view has different numbers of world and image points.
    #[error("View {view}: {world} world points but {image} image points")]
    MismatchedView {
        /// Index of the offending view.
        view: usize,
        /// Number of world points.
        world: usize,
        /// Number of image points.
        image: usize,
    },

    /// A view has too few points.
    #[error("View {view}: at least {required} points are needed, got {actual}")]
    InsufficientPoints {
        /// Index of the offending view.
        view: usize,
        /// Minimum number of points per view.
        required: usize,
        /// Number of points given.
        actual: usize,
    },

    /// The target points of a view are not on the `z = 0` plane.
    #[error("View {view}: world points must lie on the z = 0 plane")]
    NonPlanarTarget {
        /// Index of the offending view.
        view: usize,
    },

    /// The homography of a view could not be estimated.
    #[error("View {view}: {source}")]
    Homography {
        /// Index of the offending view.
        view: usize,
        /// The underlying homography error.
        #[source]
        source: HomographyError,
    },

    /// The views do not constrain the camera model.
    #[error("Degenerate calibration: {0}")]
    Degenerate(String),
}

/// Which parameters the calibration estimates.
///
/// The defaults keep the principal point at the image centre and estimate `k1, k2, p1, p2, k3`;
/// the rational terms `k4..k6` are only used with `rational_model`, and `k4`, `k5` stay fixed
/// even then unless released explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationFlags {
    /// Keep the principal point at the image centre.
    pub fix_principal_point: bool,
    /// Keep `k4` at zero in the rational model.
    pub fix_k4: bool,
    /// Keep `k5` at zero in the rational model.
    pub fix_k5: bool,
    /// Estimate the denominator of the rational radial model.
    pub rational_model: bool,
}

impl Default for CalibrationFlags {
    fn default() -> Self {
        Self {
            fix_principal_point: true,
            fix_k4: true,
            fix_k5: true,
            rational_model: false,
        }
    }
}

impl CalibrationFlags {
    /// Set whether the principal point is fixed.
    pub fn with_fix_principal_point(mut self, fix: bool) -> Self {
        self.fix_principal_point = fix;
        self
    }

    /// Set whether the rational radial model is estimated.
    pub fn with_rational_model(mut self, rational: bool) -> Self {
        self.rational_model = rational;
        self
    }
}

/// Output of [`calibrate_camera`].
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// The estimated camera matrix.
    pub intrinsic: CameraIntrinsic,
    /// The estimated lens distortion.
    pub distortion: PolynomialDistortion,
    /// Rotation vector of every view, target to camera.
    pub rvecs: Vec<[f64; 3]>,
    /// Translation vector of every view, target to camera.
    pub tvecs: Vec<[f64; 3]>,
    /// Root mean square reprojection error in pixels.
    pub rms: f64,
}

// layout of the full intrinsic vector
const FX: usize = 0;
const FY: usize = 1;
const CX: usize = 2;
const CY: usize = 3;
const K1: usize = 4;
const K2: usize = 5;
const P1: usize = 6;
const P2: usize = 7;
const K3: usize = 8;
const K4: usize = 9;
const K5: usize = 10;
const K6: usize = 11;
const NUM_INTRINSIC: usize = 12;

fn free_intrinsics(flags: &CalibrationFlags) -> Vec<usize> {
    let mut free = vec![FX, FY];
    if !flags.fix_principal_point {
        free.extend([CX, CY]);
    }
    free.extend([K1, K2, P1, P2, K3]);
    if flags.rational_model {
        if !flags.fix_k4 {
            free.push(K4);
        }
        if !flags.fix_k5 {
            free.push(K5);
        }
        free.push(K6);
    }
    free
}

fn model_from(full: &[f64; NUM_INTRINSIC]) -> (CameraIntrinsic, PolynomialDistortion) {
    (
        CameraIntrinsic {
            fx: full[FX],
            fy: full[FY],
            cx: full[CX],
            cy: full[CY],
            skew: 0.0,
        },
        PolynomialDistortion {
            k1: full[K1],
            k2: full[K2],
            k3: full[K3],
            k4: full[K4],
            k5: full[K5],
            k6: full[K6],
            p1: full[P1],
            p2: full[P2],
        },
    )
}

struct CalibrationProblem<'a> {
    object_points: &'a [Vec<[f64; 3]>],
    image_points: &'a [Vec<[f64; 2]>],
    base: [f64; NUM_INTRINSIC],
    free: Vec<usize>,
    num_residuals: usize,
}

impl CalibrationProblem<'_> {
    fn intrinsics(&self, params: &[f64]) -> [f64; NUM_INTRINSIC] {
        let mut full = self.base;
        for (value, idx) in params.iter().zip(self.free.iter()) {
            full[*idx] = *value;
        }
        full
    }

    fn view_pose(&self, params: &[f64], view: usize) -> ([f64; 3], [f64; 3]) {
        let o = self.free.len() + 6 * view;
        (
            [params[o], params[o + 1], params[o + 2]],
            [params[o + 3], params[o + 4], params[o + 5]],
        )
    }
}

impl LeastSquaresProblem for CalibrationProblem<'_> {
    fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    fn residuals(&self, params: &[f64], out: &mut [f64]) {
        let (intrinsic, distortion) = model_from(&self.intrinsics(params));

        let mut o = 0;
        for (view, (world, image)) in self
            .object_points
            .iter()
            .zip(self.image_points.iter())
            .enumerate()
        {
            let (rvec, tvec) = self.view_pose(params, view);
            for (pw, pi) in world.iter().zip(image.iter()) {
                let p = project_point_rvec(pw, &rvec, &tvec, &intrinsic, &distortion);
                out[o] = p[0] - pi[0];
                out[o + 1] = p[1] - pi[1];
                o += 2;
            }
        }
    }
}

/// Closed form focal lengths from the view homographies, principal point and skew known.
///
/// With `K = diag(fx, fy, 1)` after moving the principal point to the origin, every homography
/// `[h1 h2 h3]` satisfies `h1^T B h2 = 0` and `h1^T B h1 = h2^T B h2` with
/// `B = diag(1 / fx^2, 1 / fy^2, 1)`.
fn init_focal_lengths(
    homographies: &[[[f64; 3]; 3]],
    cx: f64,
    cy: f64,
) -> Result<(f64, f64), CalibError> {
    let (mut a00, mut a01, mut a11) = (0.0, 0.0, 0.0);
    let (mut b0, mut b1) = (0.0, 0.0);

    for h in homographies {
        let mut hc = [
            [
                h[0][0] - cx * h[2][0],
                h[0][1] - cx * h[2][1],
                h[0][2] - cx * h[2][2],
            ],
            [
                h[1][0] - cy * h[2][0],
                h[1][1] - cy * h[2][1],
                h[1][2] - cy * h[2][2],
            ],
            h[2],
        ];
        let norm = hc.iter().flatten().map(|v| v * v).sum::<f64>().sqrt();
        hc.iter_mut().flatten().for_each(|v| *v /= norm);

        let (h11, h12) = (hc[0][0], hc[0][1]);
        let (h21, h22) = (hc[1][0], hc[1][1]);
        let (h31, h32) = (hc[2][0], hc[2][1]);

        let rows = [
            ([h11 * h12, h21 * h22], -h31 * h32),
            (
                [h11 * h11 - h12 * h12, h21 * h21 - h22 * h22],
                -(h31 * h31 - h32 * h32),
            ),
        ];
        for (row, rhs) in rows {
            a00 += row[0] * row[0];
            a01 += row[0] * row[1];
            a11 += row[1] * row[1];
            b0 += row[0] * rhs;
            b1 += row[1] * rhs;
        }
    }

    let det = a00 * a11 - a01 * a01;
    if !det.is_finite() || det.abs() <= 1e-12 * (a00 * a11).max(f64::MIN_POSITIVE) {
        return Err(CalibError::Degenerate(
            "the views lack perspective diversity".to_string(),
        ));
    }

    let inv_fx2 = (a11 * b0 - a01 * b1) / det;
    let inv_fy2 = (a00 * b1 - a01 * b0) / det;
    if inv_fx2.is_nan() || inv_fy2.is_nan() || inv_fx2 <= 0.0 || inv_fy2 <= 0.0 {
        return Err(CalibError::Degenerate(
            "no positive focal length fits the views".to_string(),
        ));
    }

    Ok((1.0 / inv_fx2.sqrt(), 1.0 / inv_fy2.sqrt()))
}

/// Estimate the intrinsic parameters of a camera from views of a planar target.
///
/// # Arguments
///
/// * `object_points` - For every view, the target points on the `z = 0` plane.
/// * `image_points` - For every view, the observed pixels of the target points.
/// * `image_size` - The size of the calibrated images.
/// * `flags` - Which parameters to estimate.
///
/// # Returns
///
/// The camera model, the pose of every view and the RMS reprojection error.
pub fn calibrate_camera(
    object_points: &[Vec<[f64; 3]>],
    image_points: &[Vec<[f64; 2]>],
    image_size: ImageSize,
    flags: &CalibrationFlags,
) -> Result<CalibrationResult, CalibError> {
    if object_points.is_empty() {
        return Err(CalibError::NoViews);
    }
    if object_points.len() != image_points.len() {
        return Err(CalibError::MismatchedView {
            view: object_points.len().min(image_points.len()),
            world: object_points.len(),
            image: image_points.len(),
        });
    }

    for (view, (world, image)) in object_points.iter().zip(image_points.iter()).enumerate() {
        if world.len() != image.len() {
            return Err(CalibError::MismatchedView {
                view,
                world: world.len(),
                image: image.len(),
            });
        }
        if world.len() < 4 {
            return Err(CalibError::InsufficientPoints {
                view,
                required: 4,
                actual: world.len(),
            });
        }
        if world.iter().any(|p| p[2].abs() > 1e-9) {
            return Err(CalibError::NonPlanarTarget { view });
        }
    }

    let cx = (image_size.width as f64 - 1.0) * 0.5;
    let cy = (image_size.height as f64 - 1.0) * 0.5;

    let homographies = object_points
        .iter()
        .zip(image_points.iter())
        .enumerate()
        .map(|(view, (world, image))| {
            let plane = world.iter().map(|p| [p[0], p[1]]).collect::<Vec<_>>();
            find_homography(&plane, image).map_err(|source| CalibError::Homography { view, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (fx, fy) = init_focal_lengths(&homographies, cx, cy)?;
    log::debug!("initial focal lengths fx {fx:.2}, fy {fy:.2}");

    let mut base = [0.0; NUM_INTRINSIC];
    base[FX] = fx;
    base[FY] = fy;
    base[CX] = cx;
    base[CY] = cy;

    let free = free_intrinsics(flags);
    let mut params = free.iter().map(|idx| base[*idx]).collect::<Vec<_>>();

    for (view, h) in homographies.iter().enumerate() {
        // K^-1 H maps the target plane to normalized coordinates
        let normalized = [
            [
                (h[0][0] - cx * h[2][0]) / fx,
                (h[0][1] - cx * h[2][1]) / fx,
                (h[0][2] - cx * h[2][2]) / fx,
            ],
            [
                (h[1][0] - cy * h[2][0]) / fy,
                (h[1][1] - cy * h[2][1]) / fy,
                (h[1][2] - cy * h[2][2]) / fy,
            ],
            h[2],
        ];
        let (rotation, tvec) = pose_from_homography(&normalized).ok_or_else(|| {
            CalibError::Degenerate(format!("cannot recover the pose of view {view}"))
        })?;
        params.extend(rvec_from_rotation(&rotation));
        params.extend(tvec);
    }

    let num_points = image_points.iter().map(|v| v.len()).sum::<usize>();
    let problem = CalibrationProblem {
        object_points,
        image_points,
        base,
        free,
        num_residuals: 2 * num_points,
    };

    let report = levenberg_marquardt(&problem, &mut params, &LMParams::default());
    log::debug!(
        "calibration refinement stopped after {} iterations ({:?})",
        report.iterations,
        report.termination
    );

    let rms = (2.0 * report.cost / num_points as f64).sqrt();
    let full = problem.intrinsics(&params);
    let (intrinsic, distortion) = model_from(&full);

    if !rms.is_finite()
        || !full.iter().all(|v| v.is_finite())
        || intrinsic.fx <= 0.0
        || intrinsic.fy <= 0.0
    {
        return Err(CalibError::Degenerate(
            "the refinement did not converge".to_string(),
        ));
    }

    let (rvecs, tvecs) = (0..object_points.len())
        .map(|view| problem.view_pose(&params, view))
        .unzip();

    Ok(CalibrationResult {
        intrinsic,
        distortion,
        rvecs,
        tvecs,
        rms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::project_point_rvec;
    use approx::assert_relative_eq;

    fn board(cols: usize, rows: usize, square: f64) -> Vec<[f64; 3]> {
        (0..rows)
            .flat_map(|j| (0..cols).map(move |i| [i as f64 * square, j as f64 * square, 0.0]))
            .collect()
    }

    fn observe(
        world: &[[f64; 3]],
        poses: &[([f64; 3], [f64; 3])],
        intrinsic: &CameraIntrinsic,
        distortion: &PolynomialDistortion,
    ) -> (Vec<Vec<[f64; 3]>>, Vec<Vec<[f64; 2]>>) {
        poses
            .iter()
            .map(|(rvec, tvec)| {
                let image = world
                    .iter()
                    .map(|p| project_point_rvec(p, rvec, tvec, intrinsic, distortion))
                    .collect();
                (world.to_vec(), image)
            })
            .unzip()
    }

    #[test]
    fn test_calibrate_synthetic_views() -> Result<(), CalibError> {
        let intrinsic = CameraIntrinsic {
            fx: 820.0,
            fy: 800.0,
            cx: 319.5,
            cy: 239.5,
            skew: 0.0,
        };
        let distortion = PolynomialDistortion {
            k1: -0.15,
            k2: 0.05,
            p1: 0.001,
            p2: -0.0005,
            ..Default::default()
        };
        let poses = [
            ([0.3, 0.1, 0.05], [-120.0, -80.0, 600.0]),
            ([-0.25, 0.2, -0.1], [-110.0, -70.0, 650.0]),
            ([0.1, -0.35, 0.2], [-130.0, -60.0, 620.0]),
            ([-0.2, -0.2, 0.0], [-100.0, -90.0, 580.0]),
            ([0.35, 0.3, -0.15], [-140.0, -75.0, 700.0]),
        ];
        let (world, image) = observe(&board(9, 6, 30.0), &poses, &intrinsic, &distortion);

        let result = calibrate_camera(
            &world,
            &image,
            ImageSize {
                width: 640,
                height: 480,
            },
            &CalibrationFlags::default(),
        )?;

        assert_relative_eq!(result.intrinsic.fx, 820.0, epsilon = 1e-3);
        assert_relative_eq!(result.intrinsic.fy, 800.0, epsilon = 1e-3);
        assert_eq!(result.intrinsic.cx, 319.5);
        assert_eq!(result.intrinsic.cy, 239.5);
        assert_relative_eq!(result.distortion.k1, -0.15, epsilon = 1e-5);
        assert_relative_eq!(result.distortion.k2, 0.05, epsilon = 1e-4);
        assert_eq!(result.distortion.k4, 0.0);
        assert!(result.rms < 1e-6);
        assert_eq!(result.rvecs.len(), 5);
        for (tvec, (_, expected)) in result.tvecs.iter().zip(poses.iter()) {
            assert_relative_eq!(tvec[2], expected[2], epsilon = 1e-3);
        }
        Ok(())
    }

    #[test]
    fn test_fronto_parallel_views_are_degenerate() {
        let intrinsic = CameraIntrinsic {
            fx: 700.0,
            fy: 700.0,
            cx: 319.5,
            cy: 239.5,
            skew: 0.0,
        };
        let poses = [
            ([0.0, 0.0, 0.0], [-100.0, -60.0, 500.0]),
            ([0.0, 0.0, 0.0], [-80.0, -50.0, 600.0]),
        ];
        let (world, image) = observe(
            &board(7, 5, 25.0),
            &poses,
            &intrinsic,
            &PolynomialDistortion::default(),
        );
        let result = calibrate_camera(
            &world,
            &image,
            ImageSize {
                width: 640,
                height: 480,
            },
            &CalibrationFlags::default(),
        );
        assert!(matches!(result, Err(CalibError::Degenerate(_))));
    }

    #[test]
    fn test_input_validation() {
        let size = ImageSize {
            width: 640,
            height: 480,
        };
        let flags = CalibrationFlags::default();

        assert!(matches!(
            calibrate_camera(&[], &[], size, &flags),
            Err(CalibError::NoViews)
        ));

        let world = vec![board(2, 2, 10.0)];
        let image = vec![vec![[0.0, 0.0]; 3]];
        assert!(matches!(
            calibrate_camera(&world, &image, size, &flags),
            Err(CalibError::MismatchedView { view: 0, .. })
        ));

        let lifted = vec![vec![[0.0, 0.0, 1.0]; 4]];
        let image = vec![vec![[0.0, 0.0]; 4]];
        assert!(matches!(
            calibrate_camera(&lifted, &image, size, &flags),
            Err(CalibError::NonPlanarTarget { view: 0 })
        ));
    }

    #[test]
    fn test_free_parameters() {
        assert_eq!(
            free_intrinsics(&CalibrationFlags::default()),
            vec![FX, FY, K1, K2, P1, P2, K3]
        );
        let rational = CalibrationFlags::default()
            .with_rational_model(true)
            .with_fix_principal_point(false);
        assert_eq!(
            free_intrinsics(&rational),
            vec![FX, FY, CX, CY, K1, K2, P1, P2, K3, K6]
        );
    }
}
