use rayon::prelude::*;

use camcal_image::{ops::normalize_intensity, Image};

use crate::{filter::gaussian_blur5, ImgprocError};

mod subpix;
pub use subpix::{corner_subpix, SubPixParams};

/// Number of inner corners of a chessboard pattern.
///
/// `cols` counts the corners along a board row, `rows` along a board column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternSize {
    /// Inner corners per row.
    pub cols: usize,
    /// Inner corners per column.
    pub rows: usize,
}

impl PatternSize {
    /// Total number of inner corners.
    pub fn num_corners(&self) -> usize {
        self.cols * self.rows
    }
}

/// Parameters of the chessboard detector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChessboardParams {
    /// Minimum saddle response, relative to the strongest one, for a corner candidate.
    pub response_threshold: f32,
    /// Radius of the non-maximum suppression window.
    pub nms_radius: usize,
    /// Matching radius, as a fraction of the local grid spacing.
    pub match_tolerance: f64,
    /// Parameters of the final subpixel refinement.
    pub subpix: SubPixParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            response_threshold: 0.2,
            nms_radius: 3,
            match_tolerance: 0.35,
            subpix: SubPixParams::default(),
        }
    }
}

impl ChessboardParams {
    /// Set the subpixel refinement parameters.
    pub fn with_subpix(mut self, subpix: SubPixParams) -> Self {
        self.subpix = subpix;
        self
    }

    /// Set the relative response threshold.
    pub fn with_response_threshold(mut self, response_threshold: f32) -> Self {
        self.response_threshold = response_threshold;
        self
    }
}

struct Candidate {
    pos: [f64; 2],
    response: f32,
}

/// Locate the inner corners of a chessboard in a grayscale image.
///
/// Candidates are the local maxima of the saddle response `Ixy^2 - Ixx * Iyy` of the smoothed
/// image. The strongest `cols * rows` of them are wrapped in their convex hull, the largest
/// quadrilateral inscribed in the hull is taken as the board outline, and the projective grid
/// it spans must match one candidate per corner. Matched corners are refined with
/// [`corner_subpix`].
///
/// # Arguments
///
/// * `gray` - The input grayscale image.
/// * `pattern` - The number of inner corners of the board.
/// * `params` - The detector parameters.
///
/// # Returns
///
/// The corners ordered row by row, or `None` when the full board is not visible.
pub fn find_chessboard_corners(
    gray: &Image<u8, 1>,
    pattern: PatternSize,
    params: &ChessboardParams,
) -> Result<Option<Vec<[f64; 2]>>, ImgprocError> {
    if pattern.cols < 2 || pattern.rows < 2 {
        return Err(ImgprocError::InvalidPatternSize(pattern.cols, pattern.rows));
    }

    let margin = params.nms_radius + 2;
    if gray.cols() <= 2 * margin || gray.rows() <= 2 * margin {
        return Ok(None);
    }

    let mut image = Image::<f32, 1>::from_size_val(gray.size(), 0.0)?;
    normalize_intensity(gray, &mut image, 255.0)?;

    let mut blurred = Image::<f32, 1>::from_size_val(gray.size(), 0.0)?;
    gaussian_blur5(&image, &mut blurred)?;
    let mut smooth = Image::<f32, 1>::from_size_val(gray.size(), 0.0)?;
    gaussian_blur5(&blurred, &mut smooth)?;

    let response = saddle_response(&smooth);
    let candidates = find_candidates(&response, gray.cols(), gray.rows(), margin, params);

    let n = pattern.num_corners();
    if candidates.len() < n {
        return Ok(None);
    }

    let core = candidates[..n].iter().map(|c| c.pos).collect::<Vec<_>>();
    let hull = simplify_hull(convex_hull(&core));
    let Some(quad) = max_area_quad(&hull) else {
        return Ok(None);
    };

    // start from the top-left most corner, keep the hull winding
    let start = (0..4)
        .min_by(|&a, &b| {
            (quad[a][0] + quad[a][1]).total_cmp(&(quad[b][0] + quad[b][1]))
        })
        .unwrap_or(0);
    let q = [
        quad[start],
        quad[(start + 1) % 4],
        quad[(start + 2) % 4],
        quad[(start + 3) % 4],
    ];

    // the board axis along a row can leave the first corner either way round the outline
    let mut labelings = [[q[0], q[1], q[2], q[3]], [q[0], q[3], q[2], q[1]]];
    labelings.sort_by(|a, b| horizontality(b).total_cmp(&horizontality(a)));

    for outline in labelings {
        let Some(map) = SquareToQuad::new(outline) else {
            continue;
        };
        if let Some(mut corners) = match_grid(&candidates, &map, pattern, params.match_tolerance)
        {
            corner_subpix(&blurred, &mut corners, &params.subpix)?;
            return Ok(Some(corners));
        }
    }

    Ok(None)
}

fn saddle_response(src: &Image<f32, 1>) -> Vec<f32> {
    let (rows, cols) = (src.rows(), src.cols());
    let data = src.as_slice();
    let mut response = vec![0.0f32; rows * cols];

    response
        .par_chunks_exact_mut(cols)
        .enumerate()
        .for_each(|(y, row)| {
            if y == 0 || y + 1 >= rows {
                return;
            }
            for x in 1..cols - 1 {
                let at = |dx: isize, dy: isize| {
                    data[(y as isize + dy) as usize * cols + (x as isize + dx) as usize]
                };
                let c = at(0, 0);
                let ixx = at(1, 0) - 2.0 * c + at(-1, 0);
                let iyy = at(0, 1) - 2.0 * c + at(0, -1);
                let ixy = 0.25 * (at(1, 1) - at(1, -1) - at(-1, 1) + at(-1, -1));
                row[x] = (ixy * ixy - ixx * iyy).max(0.0);
            }
        });

    response
}

fn find_candidates(
    response: &[f32],
    cols: usize,
    rows: usize,
    margin: usize,
    params: &ChessboardParams,
) -> Vec<Candidate> {
    let max = response.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let threshold = max * params.response_threshold;
    let r = params.nms_radius as isize;

    let mut candidates = Vec::new();
    for y in margin..rows - margin {
        for x in margin..cols - margin {
            let v = response[y * cols + x];
            if v < threshold {
                continue;
            }

            // ties go to the first pixel in raster order
            let mut is_max = true;
            'nms: for dy in -r..=r {
                for dx in -r..=r {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let other =
                        response[(y as isize + dy) as usize * cols + (x as isize + dx) as usize];
                    let earlier = dy < 0 || (dy == 0 && dx < 0);
                    if other > v || (earlier && other == v) {
                        is_max = false;
                        break 'nms;
                    }
                }
            }
            if !is_max {
                continue;
            }

            let (mut sw, mut sx, mut sy) = (0.0f64, 0.0f64, 0.0f64);
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let w = response[(y as isize + dy) as usize * cols + (x as isize + dx) as usize]
                        as f64;
                    sw += w;
                    sx += w * (x as isize + dx) as f64;
                    sy += w * (y as isize + dy) as f64;
                }
            }

            candidates.push(Candidate {
                pos: [sx / sw, sy / sw],
                response: v,
            });
        }
    }

    candidates.sort_by(|a, b| b.response.total_cmp(&a.response));
    candidates
}

fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

fn dist(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// Andrew's monotone chain; collinear points are dropped.
fn convex_hull(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<[f64; 2]> = Vec::with_capacity(pts.len());
    for p in pts.iter() {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], *p) <= 0.0
        {
            lower.pop();
        }
        lower.push(*p);
    }

    let mut upper: Vec<[f64; 2]> = Vec::with_capacity(pts.len());
    for p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], *p) <= 0.0
        {
            upper.pop();
        }
        upper.push(*p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Drop hull vertices whose turn is almost flat.
fn simplify_hull(mut hull: Vec<[f64; 2]>) -> Vec<[f64; 2]> {
    const MIN_SINE: f64 = 0.05;
    loop {
        let m = hull.len();
        if m <= 4 {
            return hull;
        }
        let flat = (0..m).find(|&i| {
            let prev = hull[(i + m - 1) % m];
            let next = hull[(i + 1) % m];
            let norm = dist(prev, hull[i]) * dist(hull[i], next);
            norm <= 0.0 || cross(prev, hull[i], next).abs() / norm < MIN_SINE
        });
        match flat {
            Some(i) => {
                hull.remove(i);
            }
            None => return hull,
        }
    }
}

fn quad_area(q: &[[f64; 2]; 4]) -> f64 {
    0.5 * (cross(q[0], q[1], q[2]) + cross(q[0], q[2], q[3])).abs()
}

/// Largest quadrilateral with vertices on the hull, kept in hull order.
fn max_area_quad(hull: &[[f64; 2]]) -> Option<[[f64; 2]; 4]> {
    const MAX_HULL_VERTICES: usize = 40;
    let m = hull.len();
    if !(4..=MAX_HULL_VERTICES).contains(&m) {
        return None;
    }

    let mut best: Option<([[f64; 2]; 4], f64)> = None;
    for a in 0..m {
        for b in a + 1..m {
            for c in b + 1..m {
                for d in c + 1..m {
                    let q = [hull[a], hull[b], hull[c], hull[d]];
                    let area = quad_area(&q);
                    if best.map_or(true, |(_, best_area)| area > best_area) {
                        best = Some((q, area));
                    }
                }
            }
        }
    }

    best.filter(|(_, area)| *area > 0.0).map(|(q, _)| q)
}

fn horizontality(outline: &[[f64; 2]; 4]) -> f64 {
    let dx = (outline[1][0] - outline[0][0]).abs();
    let dy = (outline[1][1] - outline[0][1]).abs();
    dx / (dx + dy).max(f64::EPSILON)
}

/// Projective map of the unit square onto a quadrilateral.
///
/// `(0, 0)`, `(1, 0)`, `(1, 1)` and `(0, 1)` land on the four outline corners in order.
struct SquareToQuad {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
    g: f64,
    h: f64,
}

impl SquareToQuad {
    fn new(q: [[f64; 2]; 4]) -> Option<Self> {
        let [[x0, y0], [x1, y1], [x2, y2], [x3, y3]] = q;
        let sx = x0 - x1 + x2 - x3;
        let sy = y0 - y1 + y2 - y3;

        let (g, h) = if sx.abs() < 1e-9 && sy.abs() < 1e-9 {
            (0.0, 0.0)
        } else {
            let (dx1, dx2) = (x1 - x2, x3 - x2);
            let (dy1, dy2) = (y1 - y2, y3 - y2);
            let det = dx1 * dy2 - dx2 * dy1;
            if det.abs() < 1e-12 {
                return None;
            }
            ((sx * dy2 - dx2 * sy) / det, (dx1 * sy - sx * dy1) / det)
        };

        Some(Self {
            a: x1 - x0 + g * x1,
            b: x3 - x0 + h * x3,
            c: x0,
            d: y1 - y0 + g * y1,
            e: y3 - y0 + h * y3,
            f: y0,
            g,
            h,
        })
    }

    fn apply(&self, u: f64, v: f64) -> [f64; 2] {
        let w = self.g * u + self.h * v + 1.0;
        [
            (self.a * u + self.b * v + self.c) / w,
            (self.d * u + self.e * v + self.f) / w,
        ]
    }
}

fn match_grid(
    candidates: &[Candidate],
    map: &SquareToQuad,
    pattern: PatternSize,
    tolerance: f64,
) -> Option<Vec<[f64; 2]>> {
    let (cols, rows) = (pattern.cols, pattern.rows);
    let predicted = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .map(|(r, c)| {
            map.apply(
                c as f64 / (cols - 1) as f64,
                r as f64 / (rows - 1) as f64,
            )
        })
        .collect::<Vec<_>>();

    let mut used = vec![false; candidates.len()];
    let mut corners = Vec::with_capacity(predicted.len());

    for (idx, p) in predicted.iter().enumerate() {
        let (r, c) = (idx / cols, idx % cols);
        let mut spacing = f64::INFINITY;
        if c > 0 {
            spacing = spacing.min(dist(*p, predicted[idx - 1]));
        }
        if c + 1 < cols {
            spacing = spacing.min(dist(*p, predicted[idx + 1]));
        }
        if r > 0 {
            spacing = spacing.min(dist(*p, predicted[idx - cols]));
        }
        if r + 1 < rows {
            spacing = spacing.min(dist(*p, predicted[idx + cols]));
        }
        let radius = tolerance * spacing;

        let nearest = candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| !used[*i])
            .map(|(i, cand)| (i, dist(*p, cand.pos)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        let (i, _) = nearest?;
        used[i] = true;
        corners.push(candidates[i].pos);
    }

    Some(corners)
}
