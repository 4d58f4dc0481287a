use crate::parallel;
use camcal_image::{ops::ensure_same_size, Image, ImageError};

/// Convert an RGB8 image to grayscale using the formula:
///
/// Y = 77 * R + 150 * G + 29 * B
///
/// # Arguments
///
/// * `src` - The input RGB8 image.
/// * `dst` - The output grayscale image.
///
/// Precondition: the input and output images must have the same size.
///
/// # Example
///
/// ```
/// use camcal_image::{Image, ImageSize};
/// use camcal_imgproc::color::gray_from_rgb_u8;
///
/// let image = Image::<u8, 3>::new(ImageSize { width: 1, height: 1 }, vec![255, 255, 255]).unwrap();
/// let mut gray = Image::<u8, 1>::from_size_val(image.size(), 0).unwrap();
///
/// gray_from_rgb_u8(&image, &mut gray).unwrap();
/// assert_eq!(gray.as_slice(), &[255]);
/// ```
pub fn gray_from_rgb_u8(src: &Image<u8, 3>, dst: &mut Image<u8, 1>) -> Result<(), ImageError> {
    ensure_same_size(src, dst)?;

    parallel::par_map_pixels(src, dst, |src_pixel, dst_pixel| {
        let r = src_pixel[0] as u32;
        let g = src_pixel[1] as u32;
        let b = src_pixel[2] as u32;
        dst_pixel[0] = ((r * 77 + g * 150 + b * 29 + 128) >> 8).min(255) as u8;
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_image::ImageSize;

    #[test]
    fn gray_from_rgb_u8_values() -> Result<(), ImageError> {
        let image = Image::<u8, 3>::new(
            ImageSize {
                width: 2,
                height: 2,
            },
            vec![0, 0, 0, 255, 255, 255, 255, 0, 0, 0, 0, 255],
        )?;
        let mut gray = Image::<u8, 1>::from_size_val(image.size(), 0)?;
        gray_from_rgb_u8(&image, &mut gray)?;
        assert_eq!(gray.as_slice(), &[0, 255, 77, 29]);
        Ok(())
    }
}
