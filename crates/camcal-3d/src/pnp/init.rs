use camcal_imgproc::calibration::{
    distortion::{undistort_point, PolynomialDistortion},
    CameraIntrinsic,
};

use super::{check_inputs, PnPError};
use crate::{
    homography::{find_homography, pose_from_homography},
    linalg::{closest_rotation, det_mat33, mat33_mul, mat33_mul_vec3},
};

// relative size of the smallest spread direction below which points count as coplanar
const PLANARITY_TOL: f64 = 1e-8;

/// Principal axes of a point cloud.
struct PointSpread {
    centroid: [f64; 3],
    // rows are the principal directions, largest spread first, forming a proper rotation
    axes: [[f64; 3]; 3],
    variances: [f64; 3],
}

fn point_spread(points: &[[f64; 3]]) -> PointSpread {
    let n = points.len() as f64;
    let mut centroid = [0.0; 3];
    for p in points {
        for k in 0..3 {
            centroid[k] += p[k] / n;
        }
    }

    let mut cov = faer::Mat::<f64>::zeros(3, 3);
    for p in points {
        let d = [p[0] - centroid[0], p[1] - centroid[1], p[2] - centroid[2]];
        for i in 0..3 {
            for j in 0..3 {
                cov.write(i, j, cov.read(i, j) + d[i] * d[j] / n);
            }
        }
    }

    let svd = cov.svd();
    let u = svd.u();
    let s = svd.s_diagonal();

    let mut axes = [[0.0; 3]; 3];
    for (k, axis) in axes.iter_mut().enumerate() {
        for (i, val) in axis.iter_mut().enumerate() {
            *val = u.read(i, k);
        }
    }
    if det_mat33(&axes) < 0.0 {
        axes[2] = axes[2].map(|v| -v);
    }

    PointSpread {
        centroid,
        axes,
        variances: [s.read(0), s.read(1), s.read(2)],
    }
}

/// Pose of coplanar points from the homography between their plane and the image.
fn planar_pose(
    world: &[[f64; 3]],
    normalized: &[[f64; 2]],
    spread: &PointSpread,
) -> Result<([[f64; 3]; 3], [f64; 3]), PnPError> {
    let c = spread.centroid;
    let local = world
        .iter()
        .map(|p| {
            let q = mat33_mul_vec3(&spread.axes, &[p[0] - c[0], p[1] - c[1], p[2] - c[2]]);
            [q[0], q[1]]
        })
        .collect::<Vec<_>>();

    let homo = find_homography(&local, normalized).map_err(|_| PnPError::Degenerate)?;
    let (r_local, t_local) = pose_from_homography(&homo).ok_or(PnPError::Degenerate)?;

    // x_cam = R_local * E * (p - c) + t_local
    let rotation = mat33_mul(&r_local, &spread.axes);
    let rc = mat33_mul_vec3(&rotation, &c);
    Ok((
        rotation,
        [t_local[0] - rc[0], t_local[1] - rc[1], t_local[2] - rc[2]],
    ))
}

/// Pose of non-coplanar points from the direct linear transform of the projection matrix.
fn dlt_pose(
    world: &[[f64; 3]],
    normalized: &[[f64; 2]],
    spread: &PointSpread,
) -> Result<([[f64; 3]; 3], [f64; 3]), PnPError> {
    let c = spread.centroid;
    let n = world.len();
    let mean_dist = world
        .iter()
        .map(|p| ((p[0] - c[0]).powi(2) + (p[1] - c[1]).powi(2) + (p[2] - c[2]).powi(2)).sqrt())
        .sum::<f64>()
        / n as f64;
    if mean_dist <= f64::EPSILON {
        return Err(PnPError::Degenerate);
    }
    let scale = 3f64.sqrt() / mean_dist;

    let rows = (2 * n).max(12);
    let mut mat_a = faer::Mat::<f64>::zeros(rows, 12);
    for (i, (p, x)) in world.iter().zip(normalized.iter()).enumerate() {
        let q = [
            (p[0] - c[0]) * scale,
            (p[1] - c[1]) * scale,
            (p[2] - c[2]) * scale,
            1.0,
        ];
        for k in 0..4 {
            mat_a.write(2 * i, k, q[k]);
            mat_a.write(2 * i, 8 + k, -x[0] * q[k]);
            mat_a.write(2 * i + 1, 4 + k, q[k]);
            mat_a.write(2 * i + 1, 8 + k, -x[1] * q[k]);
        }
    }

    let svd = mat_a.svd();
    let s = svd.s_diagonal();
    if s.read(10) <= 1e-12 * s.read(0).max(1.0) {
        return Err(PnPError::Degenerate);
    }
    let v = svd.v().col(11);
    let mut proj = [[0.0; 4]; 3];
    for (r, row) in proj.iter_mut().enumerate() {
        for (k, val) in row.iter_mut().enumerate() {
            *val = v.read(4 * r + k);
        }
    }

    let mut m = [
        [proj[0][0], proj[0][1], proj[0][2]],
        [proj[1][0], proj[1][1], proj[1][2]],
        [proj[2][0], proj[2][1], proj[2][2]],
    ];
    let mut p4 = [proj[0][3], proj[1][3], proj[2][3]];
    let mut det = det_mat33(&m);
    if det < 0.0 {
        m.iter_mut().flatten().for_each(|v| *v = -*v);
        p4 = p4.map(|v| -v);
        det = -det;
    }
    if det <= f64::EPSILON {
        return Err(PnPError::Degenerate);
    }

    let lambda = det.cbrt();
    let rotation = closest_rotation(&m);
    let rc = mat33_mul_vec3(&rotation, &c);
    let translation = [
        p4[0] / lambda / scale - rc[0],
        p4[1] / lambda / scale - rc[1],
        p4[2] / lambda / scale - rc[2],
    ];
    Ok((rotation, translation))
}

/// Linear estimate of the world to camera pose.
///
/// Coplanar points, or fewer than six points, use the homography between their best-fit plane
/// and the undistorted image points. Otherwise the projection matrix is estimated with the DLT
/// and projected onto a rigid motion.
///
/// # Returns
///
/// The rotation and translation from the world frame to the camera frame.
pub fn initial_pose(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> Result<([[f64; 3]; 3], [f64; 3]), PnPError> {
    check_inputs(world, image)?;

    let normalized = image
        .iter()
        .map(|p| {
            let (x, y) = undistort_point(p[0], p[1], intrinsic, distortion);
            [x, y]
        })
        .collect::<Vec<_>>();

    let spread = point_spread(world);
    let [s0, s1, s2] = spread.variances;
    if s1.is_nan() || s1 <= PLANARITY_TOL * s0 {
        // collinear or coincident points
        return Err(PnPError::Degenerate);
    }

    if world.len() < 6 || s2 <= PLANARITY_TOL * s0 {
        log::trace!("pnp init from the plane homography");
        planar_pose(world, &normalized, &spread)
    } else {
        log::trace!("pnp init from the dlt");
        dlt_pose(world, &normalized, &spread)
    }
}
