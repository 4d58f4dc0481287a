use camcal_image::{Image, ImageError, ImageSize};

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

// BT.601 limited range, fixed point
#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16).max(0) * 298;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    [
        clamp_u8((c + 409 * e + 128) >> 8),
        clamp_u8((c - 100 * d - 208 * e + 128) >> 8),
        clamp_u8((c + 516 * d + 128) >> 8),
    ]
}

/// Convert a packed YUYV 4:2:2 buffer to an RGB8 image.
///
/// # Errors
///
/// Fails when the buffer holds fewer than `2 * width * height` bytes or the width is odd.
pub fn yuyv_to_rgb8(buf: &[u8], size: ImageSize) -> Result<Image<u8, 3>, ImageError> {
    let needed = 2 * size.width * size.height;
    if buf.len() < needed || size.width % 2 != 0 {
        return Err(ImageError::InvalidChannelShape(buf.len(), needed));
    }

    let mut data = Vec::with_capacity(3 * size.width * size.height);
    for chunk in buf[..needed].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        data.extend(yuv_to_rgb(y0, u, v));
        data.extend(yuv_to_rgb(y1, u, v));
    }
    Image::new(size, data)
}
