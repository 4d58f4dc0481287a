use std::path::PathBuf;

use camcal_workflow::{BoardGeometry, Stage, WorldInput};

/// Commands typed by the operator.
pub const HELP: &str = "\
commands:
  connect                                   open the frame source and start streaming
  detect <boards> <cols> <rows> <sw> <sh>   collect chessboard samples
  calibrate                                 estimate the intrinsics
  undistort [saved]                         undistort with the estimated or saved intrinsics
  pick <u> <v>                              select an image point
  record <x> <y> <z>                        pair the selected point with a world point (- if unknown)
  reset                                     drop the recorded correspondences
  solve                                     estimate the camera pose
  mark <x> <y> <z>                          project a world point into the stream
  save                                      save the parameters
  snapshot <file>                           write the latest frame
  status                                    show the session
  disconnect                                release the frame source
  help                                      show this text
  quit                                      leave";

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect,
    Detect(BoardGeometry),
    Calibrate,
    Undistort { use_saved: bool },
    Pick([f64; 2]),
    Record(WorldInput),
    Reset,
    Solve,
    Mark([f64; 3]),
    Save,
    Snapshot(PathBuf),
    Status,
    Disconnect,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("Unknown command {0:?}, type help for the list")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid number {0:?}")]
    InvalidNumber(String),
}

fn number<T: std::str::FromStr>(token: &str) -> Result<T, CommandError> {
    token
        .parse()
        .map_err(|_| CommandError::InvalidNumber(token.to_string()))
}

fn exact<'a, const N: usize>(
    args: &[&'a str],
    usage: &'static str,
) -> Result<[&'a str; N], CommandError> {
    args.try_into().map_err(|_| CommandError::Usage(usage))
}

fn world_point(args: &[&str], usage: &'static str) -> Result<[f64; 3], CommandError> {
    let [x, y, z] = exact::<3>(args, usage)?;
    Ok([number(x)?, number(y)?, number(z)?])
}

/// Parse one input line. Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    let Some((name, args)) = tokens.split_first() else {
        return Ok(None);
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "connect" => Command::Connect,
        "detect" => {
            let usage = "detect <boards> <cols> <rows> <square width> <square height>";
            let [boards, cols, rows, sw, sh] = exact::<5>(args, usage)?;
            Command::Detect(BoardGeometry {
                boards_number: number(boards)?,
                corners_hor: number(cols)?,
                corners_ver: number(rows)?,
                square_width: number(sw)?,
                square_height: number(sh)?,
            })
        }
        "calibrate" => Command::Calibrate,
        "undistort" => match args {
            [] => Command::Undistort { use_saved: false },
            ["saved"] => Command::Undistort { use_saved: true },
            _ => return Err(CommandError::Usage("undistort [saved]")),
        },
        "pick" => {
            let [u, v] = exact::<2>(args, "pick <u> <v>")?;
            Command::Pick([number(u)?, number(v)?])
        }
        "record" => {
            let coords = exact::<3>(args, "record <x> <y> <z>")?;
            let mut world = [None; 3];
            for (slot, token) in world.iter_mut().zip(coords) {
                if token != "-" {
                    *slot = Some(number(token)?);
                }
            }
            Command::Record(world)
        }
        "reset" => Command::Reset,
        "solve" => Command::Solve,
        "mark" => Command::Mark(world_point(args, "mark <x> <y> <z>")?),
        "save" => Command::Save,
        "snapshot" => {
            let [path] = exact::<1>(args, "snapshot <file>")?;
            Command::Snapshot(PathBuf::from(path))
        }
        "status" => Command::Status,
        "disconnect" => Command::Disconnect,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// The workflow commands enabled in `stage`.
pub fn enabled_commands(stage: Stage) -> &'static [&'static str] {
    match stage {
        Stage::Prepare | Stage::Closed => &["connect"],
        Stage::Started => &["detect", "undistort saved", "disconnect"],
        Stage::Detecting => &["detect", "calibrate", "disconnect"],
        Stage::Calibrated => &["detect", "undistort", "undistort saved", "save", "disconnect"],
        Stage::Undistorting => &[
            "detect", "pick", "record", "reset", "solve", "mark", "save", "disconnect",
        ],
    }
}
