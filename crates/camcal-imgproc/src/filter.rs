use rayon::prelude::*;

use camcal_image::{ops::ensure_same_size, Image, ImageError};

/// Binomial approximation of a gaussian with sigma 1.
const BINOMIAL_KERNEL_5: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Blur a single channel float image with a separable 5-tap binomial kernel.
///
/// Border pixels are replicated.
///
/// # Arguments
///
/// * `src` - The input image.
/// * `dst` - The output image, same size as `src`.
pub fn gaussian_blur5(src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    ensure_same_size(src, dst)?;

    let (rows, cols) = (src.rows(), src.cols());
    let data = src.as_slice();

    // horizontal pass
    let mut tmp = vec![0.0f32; rows * cols];
    tmp.par_chunks_exact_mut(cols)
        .zip(data.par_chunks_exact(cols))
        .for_each(|(out_row, in_row)| {
            for (x, out) in out_row.iter_mut().enumerate() {
                *out = BINOMIAL_KERNEL_5
                    .iter()
                    .enumerate()
                    .map(|(k, w)| {
                        let xi = (x as isize + k as isize - 2).clamp(0, cols as isize - 1);
                        w * in_row[xi as usize]
                    })
                    .sum();
            }
        });

    // vertical pass
    dst.as_slice_mut()
        .par_chunks_exact_mut(cols)
        .enumerate()
        .for_each(|(y, out_row)| {
            for (x, out) in out_row.iter_mut().enumerate() {
                *out = BINOMIAL_KERNEL_5
                    .iter()
                    .enumerate()
                    .map(|(k, w)| {
                        let yi = (y as isize + k as isize - 2).clamp(0, rows as isize - 1);
                        w * tmp[yi as usize * cols + x]
                    })
                    .sum();
            }
        });

    Ok(())
}

/// Compute the image gradient with central differences.
///
/// # Arguments
///
/// * `src` - The input image.
/// * `dx` - The output horizontal derivative.
/// * `dy` - The output vertical derivative.
pub fn spatial_gradient(
    src: &Image<f32, 1>,
    dx: &mut Image<f32, 1>,
    dy: &mut Image<f32, 1>,
) -> Result<(), ImageError> {
    ensure_same_size(src, dx)?;
    ensure_same_size(src, dy)?;

    let (rows, cols) = (src.rows(), src.cols());
    let data = src.as_slice();

    dx.as_slice_mut()
        .par_chunks_exact_mut(cols)
        .zip(dy.as_slice_mut().par_chunks_exact_mut(cols))
        .enumerate()
        .for_each(|(y, (dx_row, dy_row))| {
            let y_prev = y.saturating_sub(1);
            let y_next = (y + 1).min(rows - 1);
            for x in 0..cols {
                let x_prev = x.saturating_sub(1);
                let x_next = (x + 1).min(cols - 1);
                dx_row[x] = 0.5 * (data[y * cols + x_next] - data[y * cols + x_prev]);
                dy_row[x] = 0.5 * (data[y_next * cols + x] - data[y_prev * cols + x]);
            }
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn blur_constant_image() -> Result<(), ImageError> {
        let src = Image::<f32, 1>::from_size_val([7, 5].into(), 0.5)?;
        let mut dst = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
        gaussian_blur5(&src, &mut dst)?;
        for v in dst.as_slice() {
            assert_relative_eq!(*v, 0.5, epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn blur_impulse_sums_to_one() -> Result<(), ImageError> {
        let mut src = Image::<f32, 1>::from_size_val([9, 9].into(), 0.0)?;
        src.set_pixel(4, 4, [1.0])?;
        let mut dst = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
        gaussian_blur5(&src, &mut dst)?;
        let total: f32 = dst.as_slice().iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-5);
        assert_relative_eq!(dst.get_pixel(4, 4)?[0], 36.0 / 256.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn gradient_of_ramp() -> Result<(), ImageError> {
        let src = Image::<f32, 1>::from_fn([5, 4].into(), |x, y| [x as f32 + 2.0 * y as f32]);
        let mut dx = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
        let mut dy = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
        spatial_gradient(&src, &mut dx, &mut dy)?;
        assert_relative_eq!(dx.get_pixel(2, 2)?[0], 1.0);
        assert_relative_eq!(dy.get_pixel(2, 2)?[0], 2.0);
        // one-sided at the border
        assert_relative_eq!(dx.get_pixel(0, 0)?[0], 0.5);
        Ok(())
    }
}
