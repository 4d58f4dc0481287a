use crate::{Image, ImageError};

/// Fail with [`ImageError::InvalidImageSize`] unless both images have the same size.
///
/// The channel counts may differ.
pub fn ensure_same_size<T, U, const C1: usize, const C2: usize>(
    src: &Image<T, C1>,
    dst: &Image<U, C2>,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }
    Ok(())
}

/// Write the intensities of `src` into `dst` as `f32`, divided by `full_scale`.
///
/// With `full_scale = 255.0` an 8-bit image maps onto `[0, 1]`.
///
/// ```
/// use camcal_image::Image;
/// use camcal_image::ops::normalize_intensity;
///
/// let image = Image::<u8, 1>::new([2, 1].into(), vec![0, 255]).unwrap();
/// let mut unit = Image::<f32, 1>::from_size_val(image.size(), 0.0).unwrap();
///
/// normalize_intensity(&image, &mut unit, 255.0).unwrap();
/// assert_eq!(unit.as_slice(), &[0.0, 1.0]);
/// ```
pub fn normalize_intensity<T, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<f32, C>,
    full_scale: f32,
) -> Result<(), ImageError>
where
    T: Copy + num_traits::ToPrimitive,
{
    ensure_same_size(src, dst)?;
    for (out, value) in dst.as_slice_mut().iter_mut().zip(src.as_slice()) {
        *out = value.to_f32().ok_or(ImageError::CastError)? / full_scale;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normalize_rgb() -> Result<(), ImageError> {
        let image = Image::<u8, 3>::new([1, 2].into(), vec![0, 51, 255, 102, 0, 255])?;
        let mut unit = Image::<f32, 3>::from_size_val(image.size(), -1.0)?;
        normalize_intensity(&image, &mut unit, 255.0)?;
        let expected = [0.0, 0.2, 1.0, 0.4, 0.0, 1.0];
        for (value, expected) in unit.as_slice().iter().zip(expected) {
            assert_relative_eq!(*value, expected, epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn size_mismatch() -> Result<(), ImageError> {
        let image = Image::<u8, 1>::from_size_val([2, 2].into(), 0)?;
        let mut dst = Image::<f32, 1>::from_size_val([3, 2].into(), 0.0)?;
        assert_eq!(
            normalize_intensity(&image, &mut dst, 255.0),
            Err(ImageError::InvalidImageSize(2, 2, 3, 2))
        );
        let rgb = Image::<u8, 3>::from_size_val([2, 2].into(), 0)?;
        assert!(ensure_same_size(&image, &rgb).is_ok());
        Ok(())
    }
}
