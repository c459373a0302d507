//! Purpose: Device-side directory management and file transfer over the bridge.
//! Exports: `reset_directory`, `list_directory`, `push_file`, `pull_file`, `remote_join`.
//! Role: Working-directory hygiene and staging for a stitch session.
//! Invariants: Reset runs mkdir, sentinel touch, wildcard delete, in that order.
//! Invariants: The sentinel name never starts with `.` so the `*` glob always matches it.
use std::path::Path;

use tracing::debug;

use crate::core::bridge::{BridgeBackend, BridgeClient};
use crate::core::error::{Error, ErrorKind};
use crate::core::shell::ShellCommand;

const SENTINEL: &str = "sentinel";

/// Join a device directory and an entry name with exactly one `/`.
pub fn remote_join(dir: &str, name: &str) -> String {
    format!(
        "{}/{}",
        dir.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}

/// Ensure `dir` exists on the device and holds no (non-hidden) entries.
pub fn reset_directory<B: BridgeBackend>(bridge: &BridgeClient<B>, dir: &str) -> Result<(), Error> {
    debug!(dir, "reset remote directory");
    bridge.shell(&ShellCommand::new("mkdir").arg("-p").arg(dir))?;
    bridge.shell(&ShellCommand::new("touch").arg(remote_join(dir, SENTINEL)))?;
    bridge.shell(&ShellCommand::new("rm").glob_in(dir, "*"))?;
    Ok(())
}

pub fn list_directory<B: BridgeBackend>(
    bridge: &BridgeClient<B>,
    dir: &str,
) -> Result<Vec<String>, Error> {
    let result = bridge.shell(&ShellCommand::new("ls").arg(dir))?;
    Ok(result.stdout_lines().collect())
}

pub fn push_file<B: BridgeBackend>(
    bridge: &BridgeClient<B>,
    local: &Path,
    remote_dir: &str,
) -> Result<(), Error> {
    if !local.is_file() {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("local file does not exist")
            .with_path(local));
    }
    debug!(path = %local.display(), remote_dir, "push");
    bridge.push(local, remote_dir)
}

pub fn pull_file<B: BridgeBackend>(
    bridge: &BridgeClient<B>,
    remote: &str,
    local: &Path,
) -> Result<(), Error> {
    debug!(remote, path = %local.display(), "pull");
    bridge.pull(remote, local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fake::FakeDevice;
    use crate::core::retry::RetryPolicy;

    #[test]
    fn join_normalizes_slashes() {
        assert_eq!(remote_join("/sdcard/out/", "a.jpg"), "/sdcard/out/a.jpg");
        assert_eq!(remote_join("/sdcard/out", "/a.jpg"), "/sdcard/out/a.jpg");
    }

    #[test]
    fn reset_issues_commands_in_order() {
        let device = FakeDevice::new();
        let bridge = BridgeClient::new(&device, RetryPolicy::immediate(1));
        reset_directory(&bridge, "/sdcard/src/").expect("reset");
        assert_eq!(
            device.shell_log(),
            vec![
                "mkdir -p /sdcard/src/".to_string(),
                "touch /sdcard/src/sentinel".to_string(),
                "rm /sdcard/src/*".to_string(),
            ]
        );
    }

    #[test]
    fn reset_is_idempotent_and_empties() {
        let device = FakeDevice::new();
        device.put_remote("/sdcard/out/old.jpg", b"stale".to_vec());
        let bridge = BridgeClient::new(&device, RetryPolicy::immediate(1));

        reset_directory(&bridge, "/sdcard/out/").expect("first reset");
        assert!(list_directory(&bridge, "/sdcard/out/").expect("ls").is_empty());

        reset_directory(&bridge, "/sdcard/out/").expect("second reset");
        assert!(list_directory(&bridge, "/sdcard/out/").expect("ls").is_empty());
    }

    #[test]
    fn push_rejects_missing_local_file() {
        let device = FakeDevice::new();
        let bridge = BridgeClient::new(&device, RetryPolicy::immediate(1));
        let err = push_file(&bridge, Path::new("/definitely/missing.jpg"), "/sdcard/src/")
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(device.shell_log().is_empty());
    }

    #[test]
    fn push_then_pull_round_trips_contents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let local = temp.path().join("a.jpg");
        std::fs::write(&local, b"\xff\xd8payload\xff\xd9").expect("write");

        let device = FakeDevice::new();
        let bridge = BridgeClient::new(&device, RetryPolicy::immediate(1));
        push_file(&bridge, &local, "/sdcard/src/").expect("push");
        assert_eq!(
            device.remote("/sdcard/src/a.jpg").as_deref(),
            Some(&b"\xff\xd8payload\xff\xd9"[..])
        );

        let back = temp.path().join("back.jpg");
        pull_file(&bridge, "/sdcard/src/a.jpg", &back).expect("pull");
        assert_eq!(std::fs::read(back).expect("read"), b"\xff\xd8payload\xff\xd9");
    }
}
