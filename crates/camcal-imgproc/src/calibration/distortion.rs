use super::CameraIntrinsic;

/// Names of the distortion coefficients, in the order of [`PolynomialDistortion::coefficients`].
pub const COEFFICIENT_NAMES: [&str; 8] = ["k1", "k2", "p1", "p2", "k3", "k4", "k5", "k6"];

/// Represents the polynomial distortion parameters of a camera
///
/// Radial terms `k1..k3` form the numerator and `k4..k6` the denominator of the rational radial
/// factor; `p1` and `p2` are the tangential terms.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PolynomialDistortion {
    /// The first radial distortion coefficient
    pub k1: f64,
    /// The second radial distortion coefficient
    pub k2: f64,
    /// The third radial distortion coefficient
    pub k3: f64,
    /// The fourth radial distortion coefficient
    pub k4: f64,
    /// The fifth radial distortion coefficient
    pub k5: f64,
    /// The sixth radial distortion coefficient
    pub k6: f64,
    /// The first tangential distortion coefficient
    pub p1: f64,
    /// The second tangential distortion coefficient
    pub p2: f64,
}

impl PolynomialDistortion {
    /// Build the model from coefficients ordered `k1, k2, p1, p2, k3, k4, k5, k6`.
    pub fn from_coefficients(c: [f64; 8]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
            k4: c[5],
            k5: c[6],
            k6: c[7],
        }
    }

    /// The coefficients ordered `k1, k2, p1, p2, k3, k4, k5, k6`.
    pub fn coefficients(&self) -> [f64; 8] {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
    }
}

/// Apply the distortion model to a point in normalized camera coordinates.
pub fn distort_normalized(x: f64, y: f64, distortion: &PolynomialDistortion) -> (f64, f64) {
    let d = distortion;
    let r2 = x * x + y * y;
    let r4 = r2 * r2;
    let r6 = r4 * r2;

    // radial distortion
    let kr = (1.0 + d.k1 * r2 + d.k2 * r4 + d.k3 * r6) / (1.0 + d.k4 * r2 + d.k5 * r4 + d.k6 * r6);

    // tangential distortion
    let xd = x * kr + 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
    let yd = y * kr + d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;

    (xd, yd)
}

/// Distort a point using polynomial distortion
///
/// # Arguments
///
/// * `x` - The x coordinate of the ideal pixel
/// * `y` - The y coordinate of the ideal pixel
/// * `intrinsic` - The intrinsic parameters of the camera
/// * `distortion` - The distortion parameters of the camera
///
/// # Returns
///
/// The pixel at which a lens with this distortion images the point.
pub fn distort_point_polynomial(
    x: f64,
    y: f64,
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> (f64, f64) {
    let (xn, yn) = intrinsic.to_normalized(x, y);
    let (xd, yd) = distort_normalized(xn, yn, distortion);
    intrinsic.to_pixel(xd, yd)
}

/// Invert [`distort_normalized`] by fixed point iteration.
pub fn undistort_normalized(xd: f64, yd: f64, distortion: &PolynomialDistortion) -> (f64, f64) {
    const ITERATIONS: usize = 20;
    let d = distortion;

    let (mut x, mut y) = (xd, yd);
    for _ in 0..ITERATIONS {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let icdist =
            (1.0 + d.k4 * r2 + d.k5 * r4 + d.k6 * r6) / (1.0 + d.k1 * r2 + d.k2 * r4 + d.k3 * r6);
        if !icdist.is_finite() {
            return (xd, yd);
        }
        let dx = 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
        let dy = d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;
        x = (xd - dx) * icdist;
        y = (yd - dy) * icdist;
    }

    (x, y)
}

/// Remove the lens distortion of an observed pixel.
///
/// # Returns
///
/// The ideal point in normalized camera coordinates.
pub fn undistort_point(
    u: f64,
    v: f64,
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> (f64, f64) {
    let (xd, yd) = intrinsic.to_normalized(u, v);
    undistort_normalized(xd, yd, distortion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn intrinsic() -> CameraIntrinsic {
        CameraIntrinsic {
            fx: 100.0,
            fy: 100.0,
            cx: 50.0,
            cy: 40.0,
            skew: 0.0,
        }
    }

    #[test]
    fn test_distort_point_polynomial() {
        let distortion = PolynomialDistortion {
            k1: 0.1,
            ..Default::default()
        };
        let (x, y) = distort_point_polynomial(100.0, 40.0, &intrinsic(), &distortion);
        assert_relative_eq!(x, 101.25, epsilon = 1e-9);
        assert_relative_eq!(y, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_distortion_is_identity() {
        let distortion = PolynomialDistortion::default();
        let (x, y) = distort_point_polynomial(12.5, 77.0, &intrinsic(), &distortion);
        assert_relative_eq!(x, 12.5, epsilon = 1e-12);
        assert_relative_eq!(y, 77.0, epsilon = 1e-12);
    }

    #[test]
    fn test_undistort_inverts_distort() {
        let distortion = PolynomialDistortion::from_coefficients([
            -0.2, 0.05, 0.001, -0.002, 0.0, 0.0, 0.0, 0.0,
        ]);
        let (xd, yd) = distort_normalized(0.3, -0.2, &distortion);
        let (x, y) = undistort_normalized(xd, yd, &distortion);
        assert_relative_eq!(x, 0.3, epsilon = 1e-8);
        assert_relative_eq!(y, -0.2, epsilon = 1e-8);
    }

    #[test]
    fn test_coefficient_order() {
        let distortion = PolynomialDistortion::from_coefficients([1., 2., 3., 4., 5., 6., 7., 8.]);
        assert_eq!(distortion.p1, 3.0);
        assert_eq!(distortion.k3, 5.0);
        assert_eq!(distortion.coefficients(), [1., 2., 3., 4., 5., 6., 7., 8.]);
        assert_eq!(COEFFICIENT_NAMES[4], "k3");
    }

    #[test]
    fn test_skew_roundtrip() {
        let intrinsic = CameraIntrinsic {
            skew: 2.0,
            ..intrinsic()
        };
        let (x, y) = intrinsic.to_normalized(70.0, 60.0);
        let (u, v) = intrinsic.to_pixel(x, y);
        assert_relative_eq!(u, 70.0, epsilon = 1e-12);
        assert_relative_eq!(v, 60.0, epsilon = 1e-12);
    }
}
