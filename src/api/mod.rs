//! Purpose: Define the stable public Rust API boundary for misphere-stitch.
//! Exports: The client, request/outcome types and errors needed by the CLI and embedders.
//! Role: Public, additive-only surface over the core modules.
//! Invariants: Callers never need to name bridge plumbing to run a stitch.

mod client;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::config::{BridgeConfig, Config, DeviceConfig, TimingConfig};
pub use crate::core::app::AppGeneration;
pub use crate::core::bridge::{AdbBackend, BridgeBackend, CommandResult};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::pose::{Pose, write_patched_copy};
pub use crate::core::request::{AdaptiveDistance, OutputFormat, StitchRequest};
pub use crate::core::session::{Session, StitchOutcome};
pub use crate::paths::{Job, default_config_path, plan_jobs};
pub use client::StitchClient;
