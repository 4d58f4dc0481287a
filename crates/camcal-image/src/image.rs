use crate::error::ImageError;

/// Width and height of an image in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageSize {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl ImageSize {
    /// Number of pixels covered by this size.
    #[inline]
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Whether `(x, y)` addresses a pixel inside this size.
    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.width, self.height)
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

/// An owned image with `C` interleaved channels per pixel, stored row by row.
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T, const C: usize> {
    size: ImageSize,
    data: Vec<T>,
}

impl<T, const C: usize> Image<T, C> {
    /// Wrap `data` as an image of `size`.
    ///
    /// # Errors
    ///
    /// [`ImageError::InvalidChannelShape`] when `data` does not hold exactly
    /// `width * height * C` values.
    ///
    /// ```
    /// use camcal_image::Image;
    ///
    /// let image = Image::<u8, 3>::new([4, 2].into(), vec![0; 24]).unwrap();
    /// assert_eq!(image.size().area(), 8);
    /// assert!(Image::<u8, 3>::new([4, 2].into(), vec![0; 23]).is_err());
    /// ```
    pub fn new(size: ImageSize, data: Vec<T>) -> Result<Self, ImageError> {
        let expected = size.area() * C;
        if data.len() != expected {
            return Err(ImageError::InvalidChannelShape(data.len(), expected));
        }

        Ok(Self { size, data })
    }

    /// An image of `size` with every channel set to `val`.
    pub fn from_size_val(size: ImageSize, val: T) -> Result<Self, ImageError>
    where
        T: Clone,
    {
        Self::new(size, vec![val; size.area() * C])
    }

    /// Build an image from `f(x, y)`, visiting pixels in storage order.
    pub fn from_fn(size: ImageSize, mut f: impl FnMut(usize, usize) -> [T; C]) -> Self {
        let mut data = Vec::with_capacity(size.area() * C);
        for y in 0..size.height {
            for x in 0..size.width {
                data.extend(f(x, y));
            }
        }
        Self { size, data }
    }

    /// Size in pixels.
    #[inline]
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// Alias of [`Image::width`].
    #[inline]
    pub fn cols(&self) -> usize {
        self.size.width
    }

    /// Alias of [`Image::height`].
    #[inline]
    pub fn rows(&self) -> usize {
        self.size.height
    }

    /// Channels per pixel.
    #[inline]
    pub fn num_channels(&self) -> usize {
        C
    }

    /// The interleaved channel values.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The interleaved channel values, mutably.
    #[inline]
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    fn pixel_range(&self, x: usize, y: usize) -> Result<std::ops::Range<usize>, ImageError> {
        if !self.size.contains(x, y) {
            return Err(ImageError::PixelIndexOutOfBounds(x, y));
        }
        let start = (y * self.size.width + x) * C;
        Ok(start..start + C)
    }

    /// The channels of the pixel at `(x, y)`.
    ///
    /// # Errors
    ///
    /// [`ImageError::PixelIndexOutOfBounds`] outside the image.
    pub fn get_pixel(&self, x: usize, y: usize) -> Result<&[T], ImageError> {
        let range = self.pixel_range(x, y)?;
        Ok(&self.data[range])
    }

    /// Overwrite the channels of the pixel at `(x, y)`.
    ///
    /// # Errors
    ///
    /// [`ImageError::PixelIndexOutOfBounds`] outside the image.
    pub fn set_pixel(&mut self, x: usize, y: usize, value: [T; C]) -> Result<(), ImageError> {
        let range = self.pixel_range(x, y)?;
        for (dst, v) in self.data[range].iter_mut().zip(value) {
            *dst = v;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_helpers() {
        let size = ImageSize::from([4, 3]);
        assert_eq!(size.area(), 12);
        assert!(size.contains(3, 2));
        assert!(!size.contains(4, 0));
        assert!(!size.contains(0, 3));
        assert_eq!(size.to_string(), "[4, 3]");
    }

    #[test]
    fn rgb_image_layout() -> Result<(), ImageError> {
        let image = Image::<u8, 3>::from_fn([2, 2].into(), |x, y| [x as u8, y as u8, 9]);
        assert_eq!(image.num_channels(), 3);
        assert_eq!((image.cols(), image.rows()), (2, 2));
        assert_eq!(image.as_slice(), &[0, 0, 9, 1, 0, 9, 0, 1, 9, 1, 1, 9]);
        assert_eq!(image.get_pixel(1, 1)?, &[1, 1, 9]);
        Ok(())
    }

    #[test]
    fn image_wrong_length() {
        let image = Image::<u8, 1>::new([2, 2].into(), vec![0u8; 3]);
        assert_eq!(image, Err(ImageError::InvalidChannelShape(3, 4)));
    }

    #[test]
    fn image_pixels() -> Result<(), ImageError> {
        let mut image = Image::<u8, 3>::from_size_val([3, 2].into(), 0)?;
        image.set_pixel(2, 1, [1, 2, 3])?;
        assert_eq!(image.get_pixel(2, 1)?, &[1, 2, 3]);
        assert_eq!(image.get_pixel(0, 0)?, &[0, 0, 0]);
        assert!(image.get_pixel(3, 0).is_err());
        Ok(())
    }

    #[test]
    fn image_from_fn() {
        let image = Image::<usize, 1>::from_fn([3, 2].into(), |x, y| [y * 3 + x]);
        assert_eq!(image.as_slice(), &[0, 1, 2, 3, 4, 5]);
    }
}
