use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    time::Duration,
};

use argh::FromArgs;
use camcal::{
    io::{folder::write_image_rgb8, FrameSource, ImageFolderSource, SyntheticChessboardCamera},
    workflow::{FramePacket, NativeVision, WorkflowConfig, WorkflowController},
};

mod command;

use command::{enabled_commands, parse_command, Command, HELP};

#[derive(FromArgs)]
/// Calibrate a camera interactively from the terminal
struct Args {
    /// path to a JSON workflow configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// the V4L2 device to open, e.g. /dev/video0
    #[argh(option, short = 'd')]
    device: Option<String>,

    /// stream a synthetic chessboard camera, the default source
    #[argh(switch)]
    synthetic: bool,

    /// replay the images of a folder
    #[argh(option)]
    replay: Option<PathBuf>,

    /// the frames per second to process
    #[argh(option, short = 'f')]
    fps: Option<u32>,

    /// the file the parameters are saved to
    #[argh(option, short = 'p')]
    params: Option<PathBuf>,

    /// list the video devices and exit
    #[argh(switch)]
    list_devices: bool,
}

#[cfg(all(feature = "v4l", target_os = "linux"))]
fn camera_source(
    device: &str,
    fps: u32,
) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    use camcal::{
        image::ImageSize,
        io::v4l::{V4lCamera, V4lCameraConfig},
    };

    Ok(Box::new(V4lCamera::new(V4lCameraConfig {
        device_path: device.to_string(),
        size: ImageSize {
            width: 640,
            height: 480,
        },
        fps,
    })))
}

#[cfg(not(all(feature = "v4l", target_os = "linux")))]
fn camera_source(
    device: &str,
    _fps: u32,
) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    Err(format!("cannot open {device}: camcal was built without the v4l feature").into())
}

/// Build a fresh frame source; the replay folder wins over the synthetic camera.
fn frame_source(args: &Args) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    if let Some(device) = &args.device {
        return camera_source(device, args.fps.unwrap_or(30));
    }
    if let Some(dir) = &args.replay {
        if args.synthetic {
            log::warn!("both --replay and --synthetic given, replaying {}", dir.display());
        }
        return Ok(Box::new(ImageFolderSource::new(dir)));
    }
    Ok(Box::new(SyntheticChessboardCamera::default()))
}

fn list_devices() {
    #[cfg(all(feature = "v4l", target_os = "linux"))]
    {
        let devices = camcal::io::v4l::enumerate_devices();
        if devices.is_empty() {
            println!("no video devices found");
        }
        for device in devices {
            println!(
                "{}: {} ({})",
                device.index,
                device.path.display(),
                device.name.as_deref().unwrap_or("unknown")
            );
        }
    }
    #[cfg(not(all(feature = "v4l", target_os = "linux")))]
    println!("camcal was built without the v4l feature");
}

fn print_status(controller: &WorkflowController) {
    let stage = controller.stage();
    println!("stage: {stage}");
    if let Some(geometry) = controller.geometry() {
        println!(
            "samples: {}/{} ({} x {} corners)",
            controller.saved_count(),
            geometry.boards_number,
            geometry.corners_hor,
            geometry.corners_ver
        );
    }
    if let Some(report) = controller.calibration_report() {
        println!("calibrated, rms {:.4} px", report.rms);
    }
    if !controller.correspondences().is_empty() {
        println!("correspondences: {}", controller.correspondences().len());
    }
    if let Some(report) = controller.pose() {
        println!("pose solved, rms {:.4} px", report.rms);
    }
    if controller.tick_faults() > 0 {
        println!("failed frames: {}", controller.tick_faults());
    }
    println!("enabled: {}", enabled_commands(stage).join(", "));
}

fn run_command(
    controller: &mut WorkflowController,
    command: Command,
    args: &Args,
    latest: Option<&FramePacket>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Connect => {
            controller.connect(frame_source(args)?)?;
            println!("streaming");
        }
        Command::Detect(geometry) => {
            controller.begin_detection(geometry)?;
            println!(
                "show the {} x {} board in {} poses",
                geometry.corners_hor, geometry.corners_ver, geometry.boards_number
            );
        }
        Command::Calibrate => println!("{}", controller.calibrate()?),
        Command::Undistort { use_saved } => {
            controller.undistort(use_saved)?;
            println!("undistorting");
        }
        Command::Pick(pixel) => controller.set_preview_point(pixel)?,
        Command::Record(world) => {
            let c = controller.record_correspondence(world)?;
            println!(
                "correspondence {}: ({:.2}, {:.2}) -> ({}, {}, {})",
                controller.correspondences().len(),
                c.pixel[0],
                c.pixel[1],
                c.world[0],
                c.world[1],
                c.world[2]
            );
        }
        Command::Reset => controller.reset_correspondences()?,
        Command::Solve => println!("{}", controller.solve_pose()?),
        Command::Mark(world) => {
            let pixel = controller.mark_position(world)?;
            println!("marked at ({:.2}, {:.2})", pixel[0], pixel[1]);
        }
        Command::Save => {
            let saved = controller.save_parameters()?;
            println!("saved {saved:?} to {}", controller.store().path().display());
        }
        Command::Snapshot(path) => {
            let packet = latest.ok_or("no frame received yet")?;
            let frame = packet.processed.as_ref().unwrap_or(&packet.raw);
            write_image_rgb8(&path, frame)?;
            println!("wrote {}", path.display());
        }
        Command::Status => print_status(controller),
        Command::Disconnect => controller.disconnect(),
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    if args.list_devices {
        list_devices();
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => WorkflowConfig::from_file(path)?,
        None => WorkflowConfig::default(),
    };
    if let Some(params) = &args.params {
        config = config.with_params_path(params);
    }
    if let Some(fps) = args.fps {
        config = config.with_tick_period(Duration::from_secs_f64(1.0 / fps.max(1) as f64));
    }

    let tick = config.tick_period();
    let vision = Arc::new(NativeVision::new(config.chessboard_params()));
    let mut controller = WorkflowController::new(config, vision);

    // create a cancel token to stop on ctrl-c
    let cancel_token = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let cancel_token = cancel_token.clone();
        move || cancel_token.store(true, Ordering::SeqCst)
    })?;

    // stdin blocks, read it on its own thread
    let (line_tx, line_rx) = mpsc::channel::<String>();
    std::thread::Builder::new()
        .name("camcal-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    println!("{HELP}");
    let mut latest: Option<FramePacket> = None;

    while !cancel_token.load(Ordering::SeqCst) {
        match line_rx.recv_timeout(tick) {
            Ok(line) => match parse_command(&line) {
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => {
                    if let Err(err) = run_command(&mut controller, command, &args, latest.as_ref())
                    {
                        println!("error: {err}");
                    }
                }
                Ok(None) => {}
                Err(err) => println!("{err}"),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let saved = controller.saved_count();
        if let Some(packet) = controller.poll() {
            latest = Some(packet);
        }
        if controller.saved_count() > saved {
            if let Some(geometry) = controller.geometry() {
                println!(
                    "sample {}/{}",
                    controller.saved_count(),
                    geometry.boards_number
                );
            }
        }
    }

    controller.disconnect();
    Ok(())
}
