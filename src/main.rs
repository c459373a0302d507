//! Purpose: `misphere-stitch` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Each stitched photo produces exactly one JSON line on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Batch requests run strictly one after another; the first error aborts.
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod report;

use misphere_stitch::api::{
    AdaptiveDistance, AppGeneration, Config, Error, ErrorKind, OutputFormat, Pose, StitchClient,
    StitchRequest, default_config_path, plan_jobs, to_exit_code, write_patched_copy,
};
use report::{StitchReport, report_json};

fn main() {
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse_from(std::env::args_os().collect::<Vec<OsString>>()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(exit_code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `misphere-stitch --help`."));
            }
        },
    };

    init_tracing(cli.verbose);
    let config = resolve_config(&cli)?;

    let result = match cli.command {
        Command::Stitch(args) => run_stitch(config, args),
        Command::Probe => run_probe(config),
        Command::PosePatch { src, dest, pose } => run_pose_patch(&src, &dest, &pose),
    };
    result.map(|()| 0).map_err(add_bridge_hint)
}

#[derive(Parser)]
#[command(
    name = "misphere-stitch",
    version,
    about = "Stitch 360 photos with the MiSphere converter app over adb",
    long_about = None,
    after_help = r#"EXAMPLES
  $ misphere-stitch stitch IMG_0001.jpg pano.jpg
  $ misphere-stitch stitch --png --pose 90,0,0 photos/ panos/
  $ misphere-stitch --serial emulator-5554 probe

CONFIG
  Defaults are read from ~/.misphere-stitch/config.toml when present.
  Set RUST_LOG to override log filtering (logs go to stderr)."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "TOML config file (default: ~/.misphere-stitch/config.toml)",
        value_hint = ValueHint::FilePath
    )]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "adb executable", value_hint = ValueHint::ExecutablePath)]
    adb: Option<PathBuf>,
    #[arg(long, global = true, help = "Device serial passed to adb -s")]
    serial: Option<String>,
    #[arg(
        long,
        global = true,
        help = "Target a legacy app release (settings file + EXIF pose patch)"
    )]
    legacy: bool,
    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Log more (-v info, -vv debug)")]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Stitch photos on the device and pull the panoramas back",
        override_usage = "misphere-stitch stitch [OPTIONS] <SRC>... <DEST>",
        after_help = r#"NOTES
  - Directory sources expand to their .jpg files.
  - With a single file source DEST may be a file name; otherwise it must be an existing directory."#
    )]
    Stitch(StitchArgs),
    #[command(about = "Report whether the stitching app is running")]
    Probe,
    #[command(about = "Write a copy of SRC with the pose matrix patched into its EXIF user comment")]
    PosePatch {
        #[arg(value_hint = ValueHint::FilePath)]
        src: PathBuf,
        #[arg(value_hint = ValueHint::FilePath)]
        dest: PathBuf,
        #[arg(long, allow_hyphen_values = true, value_name = "YAW,PITCH,ROLL")]
        pose: String,
    },
}

#[derive(clap::Args)]
struct StitchArgs {
    #[arg(required = true, num_args = 2.., value_name = "PATH", value_hint = ValueHint::AnyPath)]
    paths: Vec<PathBuf>,
    #[arg(short, long, default_value_t = 95, value_parser = clap::value_parser!(u8).range(1..=100), help = "JPEG quality")]
    quality: u8,
    #[arg(long, help = "Save panoramas as PNG")]
    png: bool,
    #[arg(long, help = "Disable purple fringe removal")]
    no_depurple: bool,
    #[arg(
        long,
        default_value_t = 3,
        value_parser = clap::value_parser!(u8).range(0..=3),
        help = "0: 1-2 m, 1: 2-3 m, 2: < 5 m, 3: auto"
    )]
    distance: u8,
    #[arg(short = 'c', long, value_hint = ValueHint::FilePath, help = "Calibration file staged beside the output")]
    calibration_file: Option<PathBuf>,
    #[arg(
        long,
        allow_hyphen_values = true,
        value_name = "YAW,PITCH,ROLL",
        help = "Pose in degrees; without it the photo's own EXIF pose is used"
    )]
    pose: Option<String>,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn resolve_config(cli: &Cli) -> Result<Config, Error> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let path = default_config_path();
            if path.is_file() {
                Config::load(&path)?
            } else {
                Config::default()
            }
        }
    };
    if let Some(adb) = &cli.adb {
        config.bridge.adb = adb.clone();
    }
    if let Some(serial) = &cli.serial {
        config.bridge.serial = Some(serial.clone());
    }
    if cli.legacy {
        config.device.generation = AppGeneration::Legacy;
    }
    Ok(config)
}

fn run_stitch(config: Config, args: StitchArgs) -> Result<(), Error> {
    let Some((dest, sources)) = args.paths.split_last() else {
        return Err(Error::new(ErrorKind::Usage).with_message("missing source and destination"));
    };
    let format = if args.png {
        OutputFormat::Png
    } else {
        OutputFormat::Jpeg
    };
    let pose = args.pose.as_deref().map(str::parse::<Pose>).transpose()?;
    let adaptive = AdaptiveDistance::from_code(args.distance)?;
    let jobs = plan_jobs(sources, dest, format)?;
    if jobs.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("no .jpg files found in the given sources"));
    }

    let client = StitchClient::new(config);
    let total = jobs.len();
    for (index, job) in jobs.into_iter().enumerate() {
        let request = StitchRequest::new(&job.source, &job.destination)
            .with_format(format)
            .with_quality(args.quality)?
            .with_depurple(!args.no_depurple)
            .with_adaptive(adaptive)
            .with_calibration(args.calibration_file.clone())
            .with_pose(pose);
        info!(src = %job.source.display(), index = index + 1, total, "stitching");
        let started = Instant::now();
        let outcome = client.stitch(&request)?;
        let report = StitchReport {
            src: job.source.display().to_string(),
            dest: outcome.destination.display().to_string(),
            remote_name: outcome.remote_name,
            format: outcome.format.to_string(),
            polls: outcome.polls,
            pulls: outcome.pulls,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            time: time_now().unwrap_or_default(),
        };
        emit_json(report_json(&report));
    }
    Ok(())
}

fn run_probe(config: Config) -> Result<(), Error> {
    let running = StitchClient::new(config).probe()?;
    emit_json(json!({ "running": running }));
    Ok(())
}

fn run_pose_patch(src: &Path, dest: &Path, pose: &str) -> Result<(), Error> {
    let pose: Pose = pose.parse()?;
    write_patched_copy(src, dest, &pose)?;
    emit_json(json!({
        "patched": {
            "src": src.display().to_string(),
            "dest": dest.display().to_string(),
            "pose": [pose.yaw(), pose.pitch(), pose.roll()],
        }
    }));
    Ok(())
}

fn add_bridge_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::BridgeInvocation {
        return err;
    }
    err.with_hint(
        "Check that adb is installed (or pass --adb) and that `adb devices` lists the device.",
    )
}

fn time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn emit_json(value: Value) {
    let json = serde_json::to_string(&value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, true));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    let fallback = match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::NotFound => "not found",
        ErrorKind::Io => "i/o error",
        ErrorKind::BridgeInvocation => "adb could not be run",
        ErrorKind::BridgeCommand => "device command failed",
        ErrorKind::ProtocolViolation => "unexpected bridge output",
        ErrorKind::LaunchTimeout => "app did not start",
        ErrorKind::OutputTimeout => "no output appeared",
        ErrorKind::AmbiguousOutput => "more than one output file",
        ErrorKind::Integrity => "output file is incomplete",
        ErrorKind::MalformedInput => "malformed input image",
    };
    fallback.to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(command) = err.command() {
        inner.insert("command".to_string(), json!(command));
    }
    if let Some(attempts) = err.attempts() {
        inner.insert("attempts".to_string(), json!(attempts));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn colorize_label(label: &str, enabled: bool, code: &str) -> String {
    if !enabled {
        return label.to_string();
    }
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, "31"),
        error_message(err)
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!("{} {hint}", colorize_label("hint:", use_color, "33")));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, "33"),
            path.display()
        ));
    }
    if let Some(command) = err.command() {
        lines.push(format!("{} {command}", colorize_label("command:", use_color, "33")));
    }
    if let Some(attempts) = err.attempts() {
        lines.push(format!(
            "{} {attempts}",
            colorize_label("attempts:", use_color, "33")
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, "33")
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
