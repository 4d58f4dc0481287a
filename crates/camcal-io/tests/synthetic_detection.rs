use camcal_3d::{projection::project_points, rotation::rotation_from_rvec};
use camcal_image::Image;
use camcal_imgproc::{
    calibration::distortion::PolynomialDistortion,
    chessboard::{find_chessboard_corners, ChessboardParams, PatternSize},
    color::gray_from_rgb_u8,
};
use camcal_io::{FrameSource, SyntheticChessboardCamera};

#[test]
fn detect_corners_of_synthetic_board() -> Result<(), Box<dyn std::error::Error>> {
    let pose = ([0.05, -0.04, 0.0], [-100.0, -62.5, 470.0]);
    let mut camera = SyntheticChessboardCamera::default().with_poses(vec![pose]);
    camera.open()?;
    let frame = camera.grab()?.ok_or("no frame")?;

    let mut gray = Image::<u8, 1>::from_size_val(frame.size(), 0)?;
    gray_from_rgb_u8(&frame, &mut gray)?;

    let pattern = PatternSize { cols: 9, rows: 6 };
    let corners = find_chessboard_corners(&gray, pattern, &ChessboardParams::default())?
        .ok_or("board not found")?;

    let world = (0..6)
        .flat_map(|j| (0..9).map(move |i| [i as f64 * 25.0, j as f64 * 25.0, 0.0]))
        .collect::<Vec<_>>();
    let expected = project_points(
        &world,
        &rotation_from_rvec(&pose.0),
        &pose.1,
        camera.intrinsic(),
        &PolynomialDistortion::default(),
    );

    assert_eq!(corners.len(), expected.len());
    for (found, truth) in corners.iter().zip(expected.iter()) {
        let err = ((found[0] - truth[0]).powi(2) + (found[1] - truth[1]).powi(2)).sqrt();
        assert!(err < 0.5, "corner {found:?} expected at {truth:?}");
    }
    Ok(())
}
