use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use camcal_image::{Image, ImageSize};
use camcal_imgproc::{
    calibration::{distortion::PolynomialDistortion, undistort::UndistortMap, CameraIntrinsic},
    chessboard::{find_chessboard_corners, ChessboardParams, PatternSize},
};

fn render_board(size: ImageSize, square: usize) -> Image<u8, 1> {
    let origin = square;
    Image::from_fn(size, |x, y| {
        if x < origin || y < origin || x >= origin + 10 * square || y >= origin + 7 * square {
            return [255];
        }
        if ((x - origin) / square + (y - origin) / square) % 2 == 0 {
            [0]
        } else {
            [255]
        }
    })
}

fn bench_undistort(c: &mut Criterion) {
    let mut group = c.benchmark_group("Undistort");

    let intrinsic = CameraIntrinsic {
        fx: 600.0,
        fy: 600.0,
        cx: 319.5,
        cy: 239.5,
        skew: 0.0,
    };
    let distortion = PolynomialDistortion {
        k1: -0.2,
        k2: 0.05,
        p1: 0.001,
        p2: -0.001,
        ..Default::default()
    };

    for (width, height) in [(320, 240), (640, 480), (1280, 720)].iter() {
        let size = ImageSize {
            width: *width,
            height: *height,
        };
        let image = Image::<u8, 3>::from_fn(size, |x, y| [x as u8, y as u8, (x ^ y) as u8]);
        let map = UndistortMap::new(&intrinsic, &distortion, size);

        let parameter_string = format!("{width}x{height}");

        group.bench_with_input(
            BenchmarkId::new("map_new", &parameter_string),
            &size,
            |b, size| b.iter(|| black_box(UndistortMap::new(&intrinsic, &distortion, *size))),
        );

        group.bench_with_input(
            BenchmarkId::new("map_apply", &parameter_string),
            &image,
            |b, image| b.iter(|| black_box(map.apply(image))),
        );
    }

    group.finish();
}

fn bench_chessboard(c: &mut Criterion) {
    let mut group = c.benchmark_group("Chessboard");
    let pattern = PatternSize { cols: 9, rows: 6 };
    let params = ChessboardParams::default();

    for (width, height, square) in [(320, 240, 20), (640, 480, 40)].iter() {
        let image = render_board(
            ImageSize {
                width: *width,
                height: *height,
            },
            *square,
        );
        let parameter_string = format!("{width}x{height}");

        group.bench_with_input(
            BenchmarkId::new("find_chessboard_corners", &parameter_string),
            &image,
            |b, image| b.iter(|| black_box(find_chessboard_corners(image, pattern, &params))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_undistort, bench_chessboard);
criterion_main!(benches);
