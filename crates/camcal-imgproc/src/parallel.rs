use rayon::prelude::*;

use camcal_image::Image;

/// Run `f` on the rows of `dst` in parallel. `f` receives the row index and the row's
/// interleaved channels.
pub fn par_rows_mut<T, const C: usize>(
    dst: &mut Image<T, C>,
    f: impl Fn(usize, &mut [T]) + Send + Sync,
) where
    T: Send,
{
    let row_len = C * dst.cols();
    if row_len == 0 {
        return;
    }
    dst.as_slice_mut()
        .par_chunks_exact_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| f(y, row));
}

/// Map every pixel of `src` to the pixel at the same position in `dst`, rows in parallel.
///
/// Both images must have the same size.
pub fn par_map_pixels<T1, const C1: usize, T2, const C2: usize>(
    src: &Image<T1, C1>,
    dst: &mut Image<T2, C2>,
    f: impl Fn(&[T1], &mut [T2]) + Send + Sync,
) where
    T1: Sync,
    T2: Send,
{
    let src_row_len = C1 * src.cols();
    let src = src.as_slice();
    par_rows_mut(dst, |y, row| {
        let src_row = &src[y * src_row_len..(y + 1) * src_row_len];
        for (src_pixel, dst_pixel) in src_row.chunks_exact(C1).zip(row.chunks_exact_mut(C2)) {
            f(src_pixel, dst_pixel);
        }
    });
}
