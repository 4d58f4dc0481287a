use crate::linalg::{self, mat33_mul};

/// Error types for homography estimation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HomographyError {
    /// Fewer correspondences than the four a homography needs.
    #[error("Homography requires at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences.
        required: usize,
        /// Number of correspondences given.
        actual: usize,
    },

    /// Source and destination point sets differ in length.
    #[error("Mismatched point sets: {0} source points, {1} destination points")]
    MismatchedLengths(usize, usize),

    /// The points do not determine a homography, e.g. they are collinear.
    #[error("Degenerate point configuration")]
    Degenerate,
}

/// Similarity transform that moves the centroid to the origin and the mean distance to sqrt(2).
fn normalization_transform(points: &[[f64; 2]]) -> Option<[[f64; 3]; 3]> {
    let n = points.len() as f64;
    let (mx, my) = points
        .iter()
        .fold((0.0, 0.0), |acc, p| (acc.0 + p[0] / n, acc.1 + p[1] / n));
    let mean_dist = points
        .iter()
        .map(|p| ((p[0] - mx).powi(2) + (p[1] - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some([[s, 0.0, -s * mx], [0.0, s, -s * my], [0.0, 0.0, 1.0]])
}

fn apply(t: &[[f64; 3]; 3], p: &[f64; 2]) -> [f64; 2] {
    [
        t[0][0] * p[0] + t[0][1] * p[1] + t[0][2],
        t[1][0] * p[0] + t[1][1] * p[1] + t[1][2],
    ]
}

/// Estimate the homography mapping `src` points onto `dst` points.
///
/// Uses the normalized direct linear transform: both point sets are conditioned with a
/// similarity transform, the 2N x 9 system is solved through its smallest singular vector,
/// and the conditioning is undone.
///
/// # Arguments
///
/// * `src` - The source 2d points.
/// * `dst` - The destination 2d points.
///
/// # Returns
///
/// The homography from `src` to `dst`, scaled so that its last entry is one.
pub fn find_homography(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<[[f64; 3]; 3], HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::MismatchedLengths(src.len(), dst.len()));
    }
    let n = src.len();
    if n < 4 {
        return Err(HomographyError::InsufficientCorrespondences {
            required: 4,
            actual: n,
        });
    }

    let t_src = normalization_transform(src).ok_or(HomographyError::Degenerate)?;
    let t_dst = normalization_transform(dst).ok_or(HomographyError::Degenerate)?;

    // construct matrix A, padded to at least 9 rows for a full V
    let rows = (2 * n).max(9);
    let mut mat_a = faer::Mat::<f64>::zeros(rows, 9);
    for i in 0..n {
        let [x, y] = apply(&t_src, &src[i]);
        let [u, v] = apply(&t_dst, &dst[i]);

        mat_a.write(2 * i, 0, x);
        mat_a.write(2 * i, 1, y);
        mat_a.write(2 * i, 2, 1.0);
        mat_a.write(2 * i, 6, -u * x);
        mat_a.write(2 * i, 7, -u * y);
        mat_a.write(2 * i, 8, -u);

        mat_a.write(2 * i + 1, 3, x);
        mat_a.write(2 * i + 1, 4, y);
        mat_a.write(2 * i + 1, 5, 1.0);
        mat_a.write(2 * i + 1, 6, -v * x);
        mat_a.write(2 * i + 1, 7, -v * y);
        mat_a.write(2 * i + 1, 8, -v);
    }

    // the solution is the right singular vector of the smallest singular value
    let svd = mat_a.svd();
    let s = svd.s_diagonal();
    if s.read(7) <= 1e-12 * s.read(0).max(1.0) {
        // rank below 8: the points do not pin down the map
        return Err(HomographyError::Degenerate);
    }
    let h = svd.v().col(8);

    let h_norm = [
        [h.read(0), h.read(1), h.read(2)],
        [h.read(3), h.read(4), h.read(5)],
        [h.read(6), h.read(7), h.read(8)],
    ];

    // denormalize: H = T_dst^-1 * H_norm * T_src
    let s_dst = t_dst[0][0];
    let t_dst_inv = [
        [1.0 / s_dst, 0.0, -t_dst[0][2] / s_dst],
        [0.0, 1.0 / s_dst, -t_dst[1][2] / s_dst],
        [0.0, 0.0, 1.0],
    ];
    let mut homo = mat33_mul(&t_dst_inv, &mat33_mul(&h_norm, &t_src));

    if linalg::det_mat33(&homo).abs() < 1e-12 || homo[2][2].abs() < f64::EPSILON {
        return Err(HomographyError::Degenerate);
    }
    linalg::normalize_mat33_inplace(&mut homo);

    Ok(homo)
}

/// Recover the pose of a plane from its homography into normalized image coordinates.
///
/// `homo` maps plane coordinates `(X, Y)` to normalized camera coordinates, so it equals
/// `[r1 r2 t]` up to scale. The sign is chosen to put the plane in front of the camera and the
/// rotation is projected onto SO(3).
///
/// # Returns
///
/// The rotation and translation from the plane frame to the camera frame.
pub fn pose_from_homography(homo: &[[f64; 3]; 3]) -> Option<([[f64; 3]; 3], [f64; 3])> {
    let col = |j: usize| [homo[0][j], homo[1][j], homo[2][j]];
    let (h1, h2, h3) = (col(0), col(1), col(2));

    let norms = linalg::norm3(&h1) + linalg::norm3(&h2);
    if !norms.is_finite() || norms <= f64::EPSILON {
        return None;
    }
    let mut lambda = 2.0 / norms;
    if h3[2] * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1.map(|v| v * lambda);
    let r2 = h2.map(|v| v * lambda);
    let r3 = linalg::cross_vec3(&r1, &r2);
    let t = h3.map(|v| v * lambda);

    let rotation = linalg::closest_rotation(&[
        [r1[0], r2[0], r3[0]],
        [r1[1], r2[1], r3[1]],
        [r1[2], r2[2], r3[2]],
    ]);

    Some((rotation, t))
}

/// Map a 2d point through a homography.
pub fn transform_point(homo: &[[f64; 3]; 3], p: &[f64; 2]) -> [f64; 2] {
    let w = homo[2][0] * p[0] + homo[2][1] * p[1] + homo[2][2];
    [
        (homo[0][0] * p[0] + homo[0][1] * p[1] + homo[0][2]) / w,
        (homo[1][0] * p[0] + homo[1][1] * p[1] + homo[1][2]) / w,
    ]
}
