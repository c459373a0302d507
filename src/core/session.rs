//! Purpose: Compose the bridge stages into one blocking "stitch this photo" call.
//! Exports: `Session`, `StitchOutcome`.
//! Role: prepare -> transfer -> launch -> await output -> retrieve -> validate.
//! Invariants: Both working directories are reset at the start of every `process_image`.
//! Invariants: Any fatal stage error aborts the call; there is no partial success.
//! Invariants: Not safe to run concurrently against one device (directory resets race).
use std::path::PathBuf;

use tracing::info;

use crate::config::{Config, DeviceConfig, TimingConfig};
use crate::core::app::{AppController, AppGeneration, LaunchParams, Liveness};
use crate::core::bridge::{BridgeBackend, BridgeClient};
use crate::core::error::Error;
use crate::core::integrity::retrieve_validated;
use crate::core::poller::await_output;
use crate::core::remote_fs::{push_file, remote_join, reset_directory};
use crate::core::request::{OutputFormat, StitchRequest};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StitchOutcome {
    pub destination: PathBuf,
    pub remote_name: String,
    pub format: OutputFormat,
    pub launch_attempts: u32,
    pub polls: u32,
    pub pulls: u32,
}

pub struct Session<B> {
    bridge: BridgeClient<B>,
    device: DeviceConfig,
    timing: TimingConfig,
}

impl<B: BridgeBackend> Session<B> {
    pub fn new(backend: B, config: &Config) -> Self {
        Self {
            bridge: BridgeClient::new(backend, config.timing.bridge_retry()),
            device: config.device.clone(),
            timing: config.timing.clone(),
        }
    }

    pub fn bridge(&self) -> &BridgeClient<B> {
        &self.bridge
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    fn controller(&self) -> AppController<'_, B> {
        AppController::new(
            &self.bridge,
            &self.device,
            self.timing.launch_attempts,
            self.timing.launch_settle(),
        )
    }

    /// Whether the stitching app currently has a live process.
    pub fn probe(&self) -> Result<bool, Error> {
        Ok(self.controller().liveness()? == Liveness::Running)
    }

    pub fn process_image(&self, request: &StitchRequest) -> Result<StitchOutcome, Error> {
        let controller = self.controller();
        let generation = self.device.generation;
        let format = request.format();
        let mut params = LaunchParams {
            format,
            quality: request.quality(),
            depurple: request.depurple(),
            adaptive: request.adaptive(),
            pose: None,
        };

        if generation == AppGeneration::Legacy {
            controller.write_settings(&params)?;
        }

        info!(src = %request.source().display(), "resetting device directories");
        reset_directory(&self.bridge, &self.device.source_dir)?;
        reset_directory(&self.bridge, &self.device.output_dir)?;

        if let Some(calibration) = request.calibration() {
            push_file(&self.bridge, calibration, &self.device.output_dir)?;
        }

        let prepared = generation
            .pose_strategy()
            .prepare_source(request.source(), request.pose())?;
        params.pose = prepared.launch_pose();
        let file_name = prepared.file_name()?;
        push_file(&self.bridge, prepared.path(), &self.device.source_dir)?;
        info!(file = %file_name, "source staged");

        let launch_attempts = controller.launch(&file_name, &params)?;
        let ready = await_output(
            &self.bridge,
            &self.device.output_dir,
            format,
            &self.timing.poll_retry(),
        )?;

        let remote = remote_join(&self.device.output_dir, &ready.file_name);
        let pulls = retrieve_validated(
            &self.bridge,
            &remote,
            request.destination(),
            format,
            &self.timing.pull_retry(),
        )?;

        Ok(StitchOutcome {
            destination: request.destination().to_path_buf(),
            remote_name: ready.file_name,
            format,
            launch_attempts,
            polls: ready.polls,
            pulls,
        })
    }
}
