use camcal_image::Image;

use crate::{filter::spatial_gradient, interpolation::bilinear_f32, ImgprocError};

/// Parameters of the iterative subpixel corner refinement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubPixParams {
    /// Half side of the search window; the window spans `2 * half_window + 1` pixels.
    pub half_window: usize,
    /// Maximum number of refinement iterations per corner.
    pub max_iterations: usize,
    /// Stop when the corner moves less than this many pixels in one iteration.
    pub epsilon: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iterations: 30,
            epsilon: 0.1,
        }
    }
}

impl SubPixParams {
    /// Set the half side of the search window.
    pub fn with_half_window(mut self, half_window: usize) -> Self {
        self.half_window = half_window;
        self
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence threshold in pixels.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }
}

/// Refine corner locations to subpixel accuracy.
///
/// For a true corner `q`, the image gradient at any nearby point `p` is orthogonal to `p - q`.
/// Every iteration solves the 2x2 least squares system built from that constraint over a
/// gaussian weighted window centred on the current estimate.
///
/// A corner that drifts further than the window from its starting point is restored to it.
///
/// # Arguments
///
/// * `image` - Single channel float image the corners were found in.
/// * `corners` - The corners to refine, updated in place.
/// * `params` - The refinement parameters.
pub fn corner_subpix(
    image: &Image<f32, 1>,
    corners: &mut [[f64; 2]],
    params: &SubPixParams,
) -> Result<(), ImgprocError> {
    let mut dx = Image::<f32, 1>::from_size_val(image.size(), 0.0)?;
    let mut dy = Image::<f32, 1>::from_size_val(image.size(), 0.0)?;
    spatial_gradient(image, &mut dx, &mut dy)?;

    let hw = params.half_window as isize;
    let sigma2 = (params.half_window.max(1) as f64).powi(2);
    let eps2 = params.epsilon * params.epsilon;

    // gaussian mask over the window
    let mask: Vec<f64> = (-hw..=hw)
        .flat_map(|i| (-hw..=hw).map(move |j| (i, j)))
        .map(|(i, j)| (-((i * i + j * j) as f64) / sigma2).exp())
        .collect();

    for corner in corners.iter_mut() {
        let start = *corner;
        let mut q = start;

        for _ in 0..params.max_iterations {
            let (mut a, mut b, mut c) = (0.0f64, 0.0f64, 0.0f64);
            let (mut bb1, mut bb2) = (0.0f64, 0.0f64);

            for (k, w) in mask.iter().enumerate() {
                let i = k as isize / (2 * hw + 1) - hw;
                let j = k as isize % (2 * hw + 1) - hw;
                let px = q[0] + j as f64;
                let py = q[1] + i as f64;

                let gx = bilinear_f32(&dx, px as f32, py as f32) as f64;
                let gy = bilinear_f32(&dy, px as f32, py as f32) as f64;

                let gxx = gx * gx * w;
                let gxy = gx * gy * w;
                let gyy = gy * gy * w;

                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }

            let det = a * c - b * b;
            if det.abs() <= f64::EPSILON * a.max(c).max(1.0) {
                break;
            }

            let next = [(c * bb1 - b * bb2) / det, (a * bb2 - b * bb1) / det];
            let step2 = (next[0] - q[0]).powi(2) + (next[1] - q[1]).powi(2);
            q = next;

            if step2 <= eps2 {
                break;
            }
        }

        let drift = ((q[0] - start[0]).powi(2) + (q[1] - start[1]).powi(2)).sqrt();
        *corner = if drift.is_finite() && drift <= params.half_window as f64 {
            q
        } else {
            start
        };
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Anti-aliased X junction centred at `(cx, cy)`.
    fn x_junction(size: usize, cx: f64, cy: f64) -> Image<f32, 1> {
        const SS: usize = 8;
        Image::from_fn([size, size].into(), |x, y| {
            let mut white = 0;
            for sy in 0..SS {
                for sx in 0..SS {
                    let u = x as f64 - 0.5 + (sx as f64 + 0.5) / SS as f64;
                    let v = y as f64 - 0.5 + (sy as f64 + 0.5) / SS as f64;
                    if (u - cx) * (v - cy) > 0.0 {
                        white += 1;
                    }
                }
            }
            [white as f32 / (SS * SS) as f32]
        })
    }

    #[test]
    fn refine_x_junction() -> Result<(), ImgprocError> {
        let image = x_junction(41, 20.3, 19.6);
        let mut corners = [[21.0, 19.0]];
        corner_subpix(&image, &mut corners, &SubPixParams::default())?;
        assert_relative_eq!(corners[0][0], 20.3, epsilon = 0.2);
        assert_relative_eq!(corners[0][1], 19.6, epsilon = 0.2);
        Ok(())
    }

    #[test]
    fn flat_region_keeps_start() -> Result<(), ImgprocError> {
        let image = Image::<f32, 1>::from_size_val([21, 21].into(), 0.3)?;
        let mut corners = [[10.0, 10.0]];
        corner_subpix(&image, &mut corners, &SubPixParams::default())?;
        assert_eq!(corners[0], [10.0, 10.0]);
        Ok(())
    }
}
