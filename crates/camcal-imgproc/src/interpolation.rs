use camcal_image::Image;

/// Kernel for bilinear interpolation on an 8-bit image.
///
/// Returns `None` when `(u, v)` falls outside the image; the caller decides the border value.
///
/// # Arguments
///
/// * `image` - The input image container.
/// * `u` - The x coordinate of the pixel to interpolate.
/// * `v` - The y coordinate of the pixel to interpolate.
pub fn bilinear_u8<const C: usize>(image: &Image<u8, C>, u: f32, v: f32) -> Option<[u8; C]> {
    // absorbs rounding of coordinates that land exactly on the border
    const SLACK: f32 = 1e-3;

    let (rows, cols) = (image.rows(), image.cols());
    let (max_u, max_v) = ((cols - 1) as f32, (rows - 1) as f32);
    if !(u > -SLACK && v > -SLACK && u < max_u + SLACK && v < max_v + SLACK) {
        return None;
    }
    let (u, v) = (u.clamp(0.0, max_u), v.clamp(0.0, max_v));

    let iu0 = (u.trunc() as usize).min(cols - 1);
    let iv0 = (v.trunc() as usize).min(rows - 1);
    let iu1 = (iu0 + 1).min(cols - 1);
    let iv1 = (iv0 + 1).min(rows - 1);

    let frac_u = u - iu0 as f32;
    let frac_v = v - iv0 as f32;

    let w00 = (1.0 - frac_u) * (1.0 - frac_v);
    let w01 = frac_u * (1.0 - frac_v);
    let w10 = (1.0 - frac_u) * frac_v;
    let w11 = frac_u * frac_v;

    let data = image.as_slice();
    let base00 = (iv0 * cols + iu0) * C;
    let base01 = (iv0 * cols + iu1) * C;
    let base10 = (iv1 * cols + iu0) * C;
    let base11 = (iv1 * cols + iu1) * C;

    let mut pixel = [0u8; C];
    for (k, p) in pixel.iter_mut().enumerate() {
        let val = data[base00 + k] as f32 * w00
            + data[base01 + k] as f32 * w01
            + data[base10 + k] as f32 * w10
            + data[base11 + k] as f32 * w11;
        *p = val.round().clamp(0.0, 255.0) as u8;
    }

    Some(pixel)
}

/// Kernel for bilinear interpolation on a single channel float image.
///
/// Coordinates outside the image are clamped to the border.
pub fn bilinear_f32(image: &Image<f32, 1>, u: f32, v: f32) -> f32 {
    let (rows, cols) = (image.rows(), image.cols());
    let u = u.clamp(0.0, (cols - 1) as f32);
    let v = v.clamp(0.0, (rows - 1) as f32);

    let iu0 = u.trunc() as usize;
    let iv0 = v.trunc() as usize;
    let iu1 = (iu0 + 1).min(cols - 1);
    let iv1 = (iv0 + 1).min(rows - 1);

    let frac_u = u - iu0 as f32;
    let frac_v = v - iv0 as f32;

    let data = image.as_slice();
    let p00 = data[iv0 * cols + iu0];
    let p01 = data[iv0 * cols + iu1];
    let p10 = data[iv1 * cols + iu0];
    let p11 = data[iv1 * cols + iu1];

    p00 * (1.0 - frac_u) * (1.0 - frac_v)
        + p01 * frac_u * (1.0 - frac_v)
        + p10 * (1.0 - frac_u) * frac_v
        + p11 * frac_u * frac_v
}
