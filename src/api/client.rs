//! Purpose: Public client that stitches photos on the configured adb device.
//! Exports: `StitchClient`.
//! Role: Binds a `Config` to the real adb backend; the CLI's only entry into the core.
//! Invariants: One client drives one device; requests run strictly one after another.

use crate::config::Config;
use crate::core::bridge::AdbBackend;
use crate::core::error::Error;
use crate::core::request::StitchRequest;
use crate::core::session::{Session, StitchOutcome};

pub type ApiResult<T> = Result<T, Error>;

pub struct StitchClient {
    config: Config,
    session: Session<AdbBackend>,
}

impl StitchClient {
    pub fn new(config: Config) -> Self {
        let backend =
            AdbBackend::new(config.bridge.adb.clone()).with_serial(config.bridge.serial.clone());
        let session = Session::new(backend, &config);
        Self { config, session }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stitch(&self, request: &StitchRequest) -> ApiResult<StitchOutcome> {
        self.session.process_image(request)
    }

    pub fn probe(&self) -> ApiResult<bool> {
        self.session.probe()
    }
}
