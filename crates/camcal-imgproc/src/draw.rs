use camcal_image::Image;

/// Row colors used when drawing a detected chessboard, cycled per row.
const CHESSBOARD_ROW_COLORS: [[u8; 3]; 6] = [
    [255, 0, 0],
    [255, 128, 0],
    [200, 200, 0],
    [0, 255, 0],
    [0, 200, 200],
    [0, 0, 255],
];

/// Paint one pixel, clipping anything outside the image.
#[inline]
fn plot<const C: usize>(img: &mut Image<u8, C>, x: i64, y: i64, color: [u8; C]) {
    if let (Ok(x), Ok(y)) = (usize::try_from(x), usize::try_from(y)) {
        let _ = img.set_pixel(x, y, color);
    }
}

/// Draw the segment from `p0` to `p1` (Bresenham) with a square brush `thickness` pixels
/// wide. Parts outside the image are clipped.
pub fn draw_line<const C: usize>(
    img: &mut Image<u8, C>,
    p0: (i64, i64),
    p1: (i64, i64),
    color: [u8; C],
    thickness: usize,
) {
    let (mut x0, mut y0) = p0;
    let (x1, y1) = p1;

    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };

    let mut err = dx - dy;
    let half = if thickness > 1 {
        thickness as i64 / 2
    } else {
        0
    };

    loop {
        for i in -half..=half {
            for j in -half..=half {
                plot(img, x0 + i, y0 + j, color);
            }
        }

        if x0 == x1 && y0 == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x0 += sx;
        }
        if e2 < dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Draw a ring around `center`: every pixel whose distance to the center is within
/// `thickness / 2` of `radius`.
pub fn draw_circle<const C: usize>(
    img: &mut Image<u8, C>,
    center: (i64, i64),
    radius: usize,
    color: [u8; C],
    thickness: usize,
) {
    let (cx, cy) = center;
    let half = thickness.max(1) as f64 / 2.0;
    let r_in = (radius as f64 - half).max(0.0);
    let r_out = radius as f64 + half;
    let reach = r_out.ceil() as i64;

    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let d = ((dx * dx + dy * dy) as f64).sqrt();
            if d >= r_in && d <= r_out {
                plot(img, cx + dx, cy + dy, color);
            }
        }
    }
}

/// Draws the detected corners of a chessboard, joined row by row.
///
/// `corners` must be ordered row-major with `cols` corners per row; a trailing partial row is
/// drawn as far as it goes.
pub fn draw_chessboard_corners(img: &mut Image<u8, 3>, corners: &[[f64; 2]], cols: usize) {
    if cols == 0 {
        return;
    }

    let mut prev: Option<(i64, i64)> = None;
    for (idx, corner) in corners.iter().enumerate() {
        let color = CHESSBOARD_ROW_COLORS[(idx / cols) % CHESSBOARD_ROW_COLORS.len()];
        let p = (corner[0].round() as i64, corner[1].round() as i64);
        draw_circle(img, p, 4, color, 1);
        if let Some(q) = prev {
            draw_line(img, q, p, color, 1);
        }
        prev = Some(p);
    }
}
