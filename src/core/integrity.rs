//! Purpose: Decide whether a pulled output file is completely written, and re-pull until it is.
//! Exports: `has_trailer`, `file_has_trailer`, `retrieve_validated`.
//! Role: Last stage of a session; guards against pulling a file the app is still writing.
//! Invariants: A buffer shorter than the trailer is invalid, never an error.
//! Invariants: At most `policy.attempts` pulls; exhaustion is an `Integrity` error.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{info, warn};

use crate::core::bridge::{BridgeBackend, BridgeClient};
use crate::core::error::{Error, ErrorKind};
use crate::core::remote_fs::pull_file;
use crate::core::request::OutputFormat;
use crate::core::retry::{RetryPolicy, Step};

pub fn has_trailer(bytes: &[u8], format: OutputFormat) -> bool {
    bytes.ends_with(format.trailer())
}

/// Check only the tail of the file on disk.
pub fn file_has_trailer(path: &Path, format: OutputFormat) -> Result<bool, Error> {
    let io_err = |err: std::io::Error| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read pulled file")
            .with_path(path)
            .with_source(err)
    };
    let trailer = format.trailer();
    let mut file = File::open(path).map_err(io_err)?;
    let size = file.metadata().map_err(io_err)?.len();
    let len = trailer.len() as u64;
    if size < len {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(size - len)).map_err(io_err)?;
    let mut tail = Vec::with_capacity(trailer.len());
    file.read_to_end(&mut tail).map_err(io_err)?;
    Ok(has_trailer(&tail, format))
}

/// Pull `remote` to `local`, repeating the pull until the trailer check passes.
/// Returns the number of pulls it took.
pub fn retrieve_validated<B: BridgeBackend>(
    bridge: &BridgeClient<B>,
    remote: &str,
    local: &Path,
    format: OutputFormat,
    policy: &RetryPolicy,
) -> Result<u32, Error> {
    policy.run(
        |attempt| {
            pull_file(bridge, remote, local)?;
            if file_has_trailer(local, format)? {
                info!(remote, path = %local.display(), attempt, "output retrieved");
                return Ok(Step::Done(attempt));
            }
            warn!(remote, attempt, "pulled file is incomplete; pulling again");
            Ok(Step::Retry)
        },
        |attempts| {
            Error::new(ErrorKind::Integrity)
                .with_message(format!("{remote} never ended with the {format} trailer"))
                .with_path(local)
                .with_attempts(attempts)
        },
    )
}
