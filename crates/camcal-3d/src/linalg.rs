/// Compute the dot product of two 3d vectors.
#[inline]
pub fn dot_product3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Compute the cross product of two 3d vectors.
#[inline]
pub fn cross_vec3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Euclidean norm of a 3d vector.
#[inline]
pub fn norm3(a: &[f64; 3]) -> f64 {
    dot_product3(a, a).sqrt()
}

/// Multiply a 3x3 matrix with a 3d vector.
#[inline]
pub fn mat33_mul_vec3(m: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        dot_product3(&m[0], v),
        dot_product3(&m[1], v),
        dot_product3(&m[2], v),
    ]
}

/// Multiply two 3x3 matrices.
pub fn mat33_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Transpose a 3x3 matrix.
pub fn transpose_mat33(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ]
}

/// Determinant of a 3x3 matrix.
pub fn det_mat33(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Inverse of a 3x3 matrix through its adjugate, `None` when singular.
pub fn inverse_mat33(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let det = det_mat33(m);
    let max = m.iter().flatten().map(|v| v.abs()).fold(0.0, f64::max);
    if !det.is_finite() || det.abs() <= f64::EPSILON * max.powi(3) {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}

/// Scale a 3x3 matrix so that its last entry is one.
///
/// Matrices whose last entry vanishes are scaled to unit Frobenius norm instead.
pub fn normalize_mat33_inplace(m: &mut [[f64; 3]; 3]) {
    let last = m[2][2];
    let scale = if last.abs() > f64::EPSILON {
        1.0 / last
    } else {
        let norm = m.iter().flatten().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            1.0 / norm
        } else {
            return;
        }
    };
    m.iter_mut().flatten().for_each(|v| *v *= scale);
}

/// Convert a 3x3 array to a faer matrix.
pub fn mat33_to_faer(m: &[[f64; 3]; 3]) -> faer::Mat<f64> {
    faer::Mat::<f64>::from_fn(3, 3, |i, j| m[i][j])
}

/// Project a 3x3 matrix onto the closest rotation matrix.
///
/// Uses the SVD `M = U S V^T` and returns `U V^T`, flipping the last singular direction when
/// needed so that the result is a proper rotation.
pub fn closest_rotation(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let svd = mat33_to_faer(m).svd();
    let (u, v) = (svd.u(), svd.v());

    let mut r = [[0.0; 3]; 3];
    for (i, row) in r.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = (0..3).map(|k| u.read(i, k) * v.read(j, k)).sum();
        }
    }

    if det_mat33(&r) < 0.0 {
        for (i, row) in r.iter_mut().enumerate() {
            for (j, val) in row.iter_mut().enumerate() {
                *val -= 2.0 * u.read(i, 2) * v.read(j, 2);
            }
        }
    }

    r
}
