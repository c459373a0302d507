//! Purpose: Start the stitching app with a parameter set and confirm it is running.
//! Exports: `AppGeneration`, `LaunchParams`, `Liveness`, `AppController`, `classify_liveness`,
//! `settings_xml`.
//! Role: Owns force-stop, intent launch, the `ps | grep` liveness probe and legacy settings.
//! Invariants: Each launch attempt is force-stop, start, settle, probe, in that order.
//! Invariants: A probe with stderr output is a protocol violation and is never retried.
use std::io::Write;
use std::time::Duration;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DeviceConfig;
use crate::core::bridge::{BridgeBackend, BridgeClient, CommandResult};
use crate::core::error::{Error, ErrorKind};
use crate::core::pose::{Pose, PoseStrategy};
use crate::core::remote_fs::remote_join;
use crate::core::request::{AdaptiveDistance, OutputFormat};
use crate::core::retry::{RetryPolicy, Step};
use crate::core::shell::ShellCommand;

const ACTION_AUTOMATED: &str = "STITCH_AUTOMATED";
const ACTION_SEND: &str = "android.intent.action.SEND";
const EXTRA_STREAM: &str = "android.intent.extra.STREAM";

/// Which release of the stitching app is installed on the device.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppGeneration {
    /// Reads every parameter, including the pose, from intent extras.
    #[default]
    Automated,
    /// Reads parameters from its preferences file and the pose from EXIF.
    Legacy,
}

impl AppGeneration {
    pub fn pose_strategy(self) -> PoseStrategy {
        match self {
            AppGeneration::Automated => PoseStrategy::IntentExtras,
            AppGeneration::Legacy => PoseStrategy::ExifPatch,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaunchParams {
    pub format: OutputFormat,
    pub quality: u8,
    pub depurple: bool,
    pub adaptive: AdaptiveDistance,
    pub pose: Option<Pose>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Liveness {
    Running,
    NotRunning,
}

pub fn classify_liveness(result: &CommandResult) -> Result<Liveness, Error> {
    let stdout_empty = result.stdout.trim().is_empty();
    let stderr_empty = result.stderr.trim().is_empty();
    match (result.status, stdout_empty, stderr_empty) {
        (0, false, true) => Ok(Liveness::Running),
        (0 | 1, true, true) => Ok(Liveness::NotRunning),
        (status, _, _) => Err(Error::new(ErrorKind::ProtocolViolation)
            .with_message(format!(
                "unexpected process listing result: status={status}, stdout={:?}, stderr={:?}",
                result.stdout.to_str_lossy(),
                result.stderr.to_str_lossy()
            ))
            .with_hint("The bridge misbehaved; check `adb devices` and the device shell.")),
    }
}

/// Shared-preferences document the legacy app reads its options from.
pub fn settings_xml(params: &LaunchParams) -> String {
    format!(
        "<?xml version='1.0' encoding='utf-8' standalone='yes' ?>\n\
         <map>\n    \
         <int name=\"adaptive\" value=\"{adaptive}\" />\n    \
         <boolean name=\"depurple\" value=\"{depurple}\" />\n    \
         <boolean name=\"tiff\" value=\"{lossless}\" />\n    \
         <int name=\"jpg_q\" value=\"{quality}\" />\n\
         </map>\n",
        adaptive = params.adaptive.code(),
        depurple = params.depurple,
        lossless = params.format.is_lossless(),
        quality = params.quality,
    )
}

pub struct AppController<'a, B> {
    bridge: &'a BridgeClient<B>,
    device: &'a DeviceConfig,
    attempts: u32,
    settle: Duration,
}

impl<'a, B: BridgeBackend> AppController<'a, B> {
    pub fn new(
        bridge: &'a BridgeClient<B>,
        device: &'a DeviceConfig,
        attempts: u32,
        settle: Duration,
    ) -> Self {
        Self {
            bridge,
            device,
            attempts,
            settle,
        }
    }

    pub fn force_stop(&self) -> Result<(), Error> {
        self.bridge.shell(
            &ShellCommand::new("am")
                .arg("force-stop")
                .arg(&self.device.package),
        )?;
        Ok(())
    }

    pub fn liveness(&self) -> Result<Liveness, Error> {
        let probe = ShellCommand::new("ps")
            .pipe(ShellCommand::new("grep").arg(&self.device.package));
        classify_liveness(&self.bridge.shell_tolerant(&probe)?)
    }

    /// Push the legacy preferences file carrying `params`.
    pub fn write_settings(&self, params: &LaunchParams) -> Result<(), Error> {
        let mut file = tempfile::Builder::new()
            .prefix("misphere-settings")
            .suffix(".xml")
            .tempfile()
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to create settings file")
                    .with_source(err)
            })?;
        file.write_all(settings_xml(params).as_bytes())
            .and_then(|()| file.flush())
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write settings file")
                    .with_path(file.path())
                    .with_source(err)
            })?;
        self.bridge.push(file.path(), &self.device.settings_file)
    }

    /// (Re)start the app on the staged `file_name`; returns the attempt that succeeded.
    pub fn launch(&self, file_name: &str, params: &LaunchParams) -> Result<u32, Error> {
        let start = self.start_command(file_name, params);
        RetryPolicy::immediate(self.attempts).run(
            |attempt| {
                self.force_stop()?;
                self.bridge.shell(&start)?;
                if !self.settle.is_zero() {
                    std::thread::sleep(self.settle);
                }
                match self.liveness()? {
                    Liveness::Running => {
                        info!(package = %self.device.package, attempt, "app running");
                        Ok(Step::Done(attempt))
                    }
                    Liveness::NotRunning => {
                        warn!(package = %self.device.package, attempt, "app not running after launch");
                        Ok(Step::Retry)
                    }
                }
            },
            |attempts| {
                Error::new(ErrorKind::LaunchTimeout)
                    .with_message(format!("could not start {}", self.device.package))
                    .with_attempts(attempts)
            },
        )
    }

    pub fn start_command(&self, file_name: &str, params: &LaunchParams) -> ShellCommand {
        let uri = format!("file://{}", remote_join(&self.device.source_dir, file_name));
        let component = format!("{}/{}", self.device.package, self.device.activity);
        let command = ShellCommand::new("am").arg("start").arg("-a");
        match self.device.generation {
            AppGeneration::Legacy => command
                .args([ACTION_SEND, "--eu", EXTRA_STREAM])
                .arg(uri)
                .arg(component),
            AppGeneration::Automated => {
                let mut command = command
                    .args([ACTION_AUTOMATED, "--eu", EXTRA_STREAM])
                    .arg(uri);
                if let Some(pose) = params.pose {
                    command = command
                        .args(["--ez", "ignore_exif", "true"])
                        .args(["--ef", "yaw"])
                        .arg(format!("{:.2}", pose.yaw()))
                        .args(["--ef", "pitch"])
                        .arg(format!("{:.2}", pose.pitch()))
                        .args(["--ef", "roll"])
                        .arg(format!("{:.2}", pose.roll()));
                }
                command
                    .args(["--ei", "jpeg_q"])
                    .arg(params.quality.to_string())
                    .args(["--ez", "depurple"])
                    .arg(params.depurple.to_string())
                    .args(["--ez", "lossless"])
                    .arg(params.format.is_lossless().to_string())
                    .args(["--ei", "adaptive"])
                    .arg(params.adaptive.code().to_string())
                    .arg(component)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fake::FakeDevice;

    fn result(status: i32, stdout: &str, stderr: &str) -> CommandResult {
        CommandResult {
            status,
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn params(pose: Option<Pose>) -> LaunchParams {
        LaunchParams {
            format: OutputFormat::Jpeg,
            quality: 95,
            depurple: true,
            adaptive: AdaptiveDistance::Auto,
            pose,
        }
    }

    #[test]
    fn liveness_classification_table() {
        assert_eq!(
            classify_liveness(&result(0, "1234\n", "")).expect("running"),
            Liveness::Running
        );
        assert_eq!(
            classify_liveness(&result(1, "", "")).expect("stopped"),
            Liveness::NotRunning
        );
        assert_eq!(
            classify_liveness(&result(0, "", "")).expect("stopped"),
            Liveness::NotRunning
        );
        for bad in [
            result(0, "", "permission denied"),
            result(0, "1234\n", "warning"),
            result(2, "", ""),
            result(1, "1234\n", ""),
            result(255, "", "error: no devices"),
        ] {
            assert_eq!(
                classify_liveness(&bad).expect_err("violation").kind(),
                ErrorKind::ProtocolViolation
            );
        }
    }

    #[test]
    fn automated_intent_carries_pose_and_options() {
        let device = FakeDevice::new();
        let bridge = BridgeClient::new(&device, RetryPolicy::immediate(1));
        let config = DeviceConfig::default();
        let controller = AppController::new(&bridge, &config, 1, Duration::ZERO);
        let pose = Pose::new(90.0, -1.5, 0.25).expect("pose");
        let line = controller
            .start_command("a.jpg", &params(Some(pose)))
            .render()
            .expect("render");
        assert_eq!(
            line,
            "am start -a STITCH_AUTOMATED --eu android.intent.extra.STREAM \
             file:///mnt/sdcard/panosrc/a.jpg --ez ignore_exif true --ef yaw 90.00 \
             --ef pitch -1.50 --ef roll 0.25 --ei jpeg_q 95 --ez depurple true \
             --ez lossless false --ei adaptive 3 \
             com.hirota41.misphereconverter/.IntentActivity"
        );
    }

    #[test]
    fn automated_intent_without_pose_reads_exif() {
        let device = FakeDevice::new();
        let bridge = BridgeClient::new(&device, RetryPolicy::immediate(1));
        let config = DeviceConfig::default();
        let controller = AppController::new(&bridge, &config, 1, Duration::ZERO);
        let line = controller
            .start_command("a.jpg", &params(None))
            .render()
            .expect("render");
        assert!(!line.contains("ignore_exif"));
        assert!(!line.contains("--ef"));
    }

    #[test]
    fn legacy_intent_is_a_plain_share() {
        let device = FakeDevice::new();
        let bridge = BridgeClient::new(&device, RetryPolicy::immediate(1));
        let config = DeviceConfig {
            generation: AppGeneration::Legacy,
            ..DeviceConfig::default()
        };
        let controller = AppController::new(&bridge, &config, 1, Duration::ZERO);
        let line = controller
            .start_command("a b.jpg", &params(None))
            .render()
            .expect("render");
        assert_eq!(
            line,
            "am start -a android.intent.action.SEND --eu android.intent.extra.STREAM \
             'file:///mnt/sdcard/panosrc/a b.jpg' \
             com.hirota41.misphereconverter/.IntentActivity"
        );
    }

    #[test]
    fn launch_retries_until_running() {
        let device = FakeDevice::new();
        device.fail_starts(2);
        let bridge = BridgeClient::new(&device, RetryPolicy::immediate(1));
        let config = DeviceConfig::default();
        let controller = AppController::new(&bridge, &config, 10, Duration::ZERO);
        let attempt = controller.launch("a.jpg", &params(None)).expect("launch");
        assert_eq!(attempt, 3);
        assert_eq!(device.launches().len(), 3);
        let log = device.shell_log();
        assert!(log[0].starts_with("am force-stop"));
        assert!(log[1].starts_with("am start"));
        assert!(log[2].starts_with("ps | grep"));
    }

    #[test]
    fn launch_gives_up_after_budget() {
        let device = FakeDevice::new();
        device.fail_starts(100);
        let bridge = BridgeClient::new(&device, RetryPolicy::immediate(1));
        let config = DeviceConfig::default();
        let controller = AppController::new(&bridge, &config, 10, Duration::ZERO);
        let err = controller
            .launch("a.jpg", &params(None))
            .expect_err("timeout");
        assert_eq!(err.kind(), ErrorKind::LaunchTimeout);
        assert_eq!(device.launches().len(), 10);
    }

    #[test]
    fn protocol_violation_aborts_launch_immediately() {
        let device = FakeDevice::new();
        device.script_liveness(vec![result(0, "", "permission denied")]);
        let bridge = BridgeClient::new(&device, RetryPolicy::immediate(1));
        let config = DeviceConfig::default();
        let controller = AppController::new(&bridge, &config, 10, Duration::ZERO);
        let err = controller
            .launch("a.jpg", &params(None))
            .expect_err("violation");
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
        assert_eq!(device.launches().len(), 1);
    }

    #[test]
    fn settings_document_encodes_options() {
        let xml = settings_xml(&LaunchParams {
            format: OutputFormat::Png,
            quality: 80,
            depurple: false,
            adaptive: AdaptiveDistance::Near,
            pose: None,
        });
        assert!(xml.contains("<int name=\"adaptive\" value=\"0\" />"));
        assert!(xml.contains("<boolean name=\"depurple\" value=\"false\" />"));
        assert!(xml.contains("<boolean name=\"tiff\" value=\"true\" />"));
        assert!(xml.contains("<int name=\"jpg_q\" value=\"80\" />"));
    }

    #[test]
    fn settings_are_pushed_to_preferences_path() {
        let device = FakeDevice::new();
        let bridge = BridgeClient::new(&device, RetryPolicy::immediate(1));
        let config = DeviceConfig::default();
        let controller = AppController::new(&bridge, &config, 1, Duration::ZERO);
        controller.write_settings(&params(None)).expect("settings");
        let pushed = device.remote(&config.settings_file).expect("pushed");
        assert_eq!(pushed, settings_xml(&params(None)).into_bytes());
    }
}
