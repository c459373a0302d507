//! Purpose: Wait for the stitched output file to appear in the device output directory.
//! Exports: `await_output`, `OutputReady`.
//! Role: Turns the app's asynchronous write into a blocking call with a bounded budget.
//! Invariants: Stops at the first non-empty match set; more than one match fails at once.
//! Invariants: Extension matching is case-insensitive.
use tracing::{debug, info};

use crate::core::bridge::{BridgeBackend, BridgeClient};
use crate::core::error::{Error, ErrorKind};
use crate::core::remote_fs::list_directory;
use crate::core::request::OutputFormat;
use crate::core::retry::{RetryPolicy, Step};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputReady {
    pub file_name: String,
    pub polls: u32,
}

pub fn await_output<B: BridgeBackend>(
    bridge: &BridgeClient<B>,
    dir: &str,
    format: OutputFormat,
    policy: &RetryPolicy,
) -> Result<OutputReady, Error> {
    policy.run(
        |poll| {
            let mut matches: Vec<String> = list_directory(bridge, dir)?
                .into_iter()
                .filter(|name| format.matches(name))
                .collect();
            debug!(dir, poll, matches = matches.len(), "poll output directory");
            match matches.len() {
                0 => Ok(Step::Retry),
                1 => {
                    let file_name = matches.remove(0);
                    info!(dir, file = %file_name, poll, "output ready");
                    Ok(Step::Done(OutputReady {
                        file_name,
                        polls: poll,
                    }))
                }
                _ => Err(Error::new(ErrorKind::AmbiguousOutput)
                    .with_message(format!(
                        "expected one {} file in {dir}, found {}",
                        format.extension(),
                        matches.join(", ")
                    ))
                    .with_hint("Another session may be using the same device.")
                    .with_attempts(poll)),
            }
        },
        |attempts| {
            Error::new(ErrorKind::OutputTimeout)
                .with_message(format!(
                    "no {} file appeared in {dir}",
                    format.extension()
                ))
                .with_attempts(attempts)
        },
    )
}
