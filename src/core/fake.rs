// In-memory device used by unit tests: a remote file map plus a scripted app process.
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ffi::OsString;
use std::io;
use std::path::Path;

use crate::core::bridge::{BridgeBackend, CommandResult};

struct PendingOutput {
    path: String,
    contents: Vec<u8>,
    polls_left: u32,
}

#[derive(Default)]
pub(crate) struct FakeDevice {
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    dirs: RefCell<BTreeSet<String>>,
    shell_log: RefCell<Vec<String>>,
    invocations: Cell<u32>,
    invoke_failures: Cell<u32>,
    running: Cell<bool>,
    failed_starts: Cell<u32>,
    liveness_script: RefCell<VecDeque<CommandResult>>,
    outputs: RefCell<Vec<(String, Vec<u8>, u32)>>,
    pending: RefCell<Vec<PendingOutput>>,
    truncated_pulls: Cell<u32>,
    pulls: Cell<u32>,
}

impl FakeDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put_remote(&self, path: &str, contents: Vec<u8>) {
        self.dirs.borrow_mut().insert(parent(path).to_string());
        self.files.borrow_mut().insert(path.to_string(), contents);
    }

    pub(crate) fn remote(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).cloned()
    }

    pub(crate) fn shell_log(&self) -> Vec<String> {
        self.shell_log.borrow().clone()
    }

    pub(crate) fn launches(&self) -> Vec<String> {
        self.shell_log
            .borrow()
            .iter()
            .filter(|line| line.starts_with("am start"))
            .cloned()
            .collect()
    }

    pub(crate) fn invocations(&self) -> u32 {
        self.invocations.get()
    }

    pub(crate) fn pulls(&self) -> u32 {
        self.pulls.get()
    }

    /// Fail the next `count` invocations as if adb could not be spawned.
    pub(crate) fn fail_invocations(&self, count: u32) {
        self.invoke_failures.set(count);
    }

    /// The next `count` launches leave the app not running.
    pub(crate) fn fail_starts(&self, count: u32) {
        self.failed_starts.set(count);
    }

    /// Replace the next liveness probes with fixed results.
    pub(crate) fn script_liveness(&self, results: Vec<CommandResult>) {
        self.liveness_script.borrow_mut().extend(results);
    }

    /// After each launch, `path` appears once the parent has been listed `after_polls` times.
    pub(crate) fn produce_on_launch(&self, path: &str, contents: Vec<u8>, after_polls: u32) {
        self.outputs
            .borrow_mut()
            .push((path.to_string(), contents, after_polls));
    }

    /// The next `count` pulls deliver a truncated copy.
    pub(crate) fn truncate_pulls(&self, count: u32) {
        self.truncated_pulls.set(count);
    }

    fn shell(&self, line: &str) -> CommandResult {
        self.shell_log.borrow_mut().push(line.to_string());
        let words = shlex::split(line).unwrap_or_default();
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["mkdir", "-p", dir] => {
                self.dirs.borrow_mut().insert(normalize(dir));
                ok("")
            }
            ["touch", path] => {
                if !self.dirs.borrow().contains(parent(path)) {
                    return fail("touch: no such directory");
                }
                self.files.borrow_mut().entry(path.to_string()).or_default();
                ok("")
            }
            ["rm", glob] => {
                let dir = normalize(glob.trim_end_matches('*'));
                let mut files = self.files.borrow_mut();
                let before = files.len();
                files.retain(|path, _| parent(path) != dir);
                if files.len() == before {
                    return fail("rm: No such file or directory");
                }
                ok("")
            }
            ["ls", dir] => {
                let dir = normalize(dir);
                self.advance_pending(&dir);
                if !self.dirs.borrow().contains(&dir) {
                    return fail("ls: No such file or directory");
                }
                let listing: Vec<String> = self
                    .files
                    .borrow()
                    .keys()
                    .filter(|path| parent(path) == dir)
                    .map(|path| format!("{}\n", basename(path)))
                    .collect();
                ok(&listing.concat())
            }
            ["ps", "|", "grep", package] => {
                if let Some(scripted) = self.liveness_script.borrow_mut().pop_front() {
                    return scripted;
                }
                if self.running.get() {
                    ok(&format!("u0_a77 4242 1 1234 5678 S {package}\n"))
                } else {
                    CommandResult {
                        status: 1,
                        ..CommandResult::default()
                    }
                }
            }
            ["am", "force-stop", _] => {
                self.running.set(false);
                ok("")
            }
            ["am", "start", ..] => {
                if self.failed_starts.get() > 0 {
                    self.failed_starts.set(self.failed_starts.get() - 1);
                    return ok("Starting: Intent");
                }
                self.running.set(true);
                let mut pending = self.pending.borrow_mut();
                for (path, contents, after_polls) in self.outputs.borrow().iter() {
                    pending.push(PendingOutput {
                        path: path.clone(),
                        contents: contents.clone(),
                        polls_left: *after_polls,
                    });
                }
                ok("Starting: Intent")
            }
            _ => fail("sh: unknown command"),
        }
    }

    fn advance_pending(&self, dir: &str) {
        let mut pending = self.pending.borrow_mut();
        let mut files = self.files.borrow_mut();
        pending.retain_mut(|output| {
            if parent(&output.path) != dir {
                return true;
            }
            output.polls_left = output.polls_left.saturating_sub(1);
            if output.polls_left == 0 {
                files.insert(output.path.clone(), output.contents.clone());
                return false;
            }
            true
        });
    }

    fn push(&self, local: &str, remote: &str) -> io::Result<CommandResult> {
        let contents = std::fs::read(local)?;
        let dest = if remote.ends_with('/') || self.dirs.borrow().contains(remote) {
            format!("{}/{}", normalize(remote), basename(local))
        } else {
            remote.to_string()
        };
        self.files.borrow_mut().insert(dest, contents);
        Ok(ok("1 file pushed"))
    }

    fn pull(&self, remote: &str, local: &str) -> io::Result<CommandResult> {
        self.pulls.set(self.pulls.get() + 1);
        let Some(mut contents) = self.remote(remote) else {
            return Ok(fail("adb: error: remote object does not exist"));
        };
        if self.truncated_pulls.get() > 0 {
            self.truncated_pulls.set(self.truncated_pulls.get() - 1);
            contents.truncate(contents.len() / 2);
        }
        std::fs::write(Path::new(local), contents)?;
        Ok(ok("1 file pulled"))
    }
}

impl BridgeBackend for FakeDevice {
    fn invoke(&self, args: &[OsString]) -> io::Result<CommandResult> {
        self.invocations.set(self.invocations.get() + 1);
        if self.invoke_failures.get() > 0 {
            self.invoke_failures.set(self.invoke_failures.get() - 1);
            return Err(io::Error::new(io::ErrorKind::NotFound, "adb not found"));
        }
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        match args.as_slice() {
            [cmd, line] if cmd == "shell" => Ok(self.shell(line)),
            [cmd, local, remote] if cmd == "push" => self.push(local, remote),
            [cmd, remote, local] if cmd == "pull" => self.pull(remote, local),
            _ => Ok(fail("adb: unknown command")),
        }
    }
}

fn ok(stdout: &str) -> CommandResult {
    CommandResult::success(stdout.as_bytes())
}

fn fail(stderr: &str) -> CommandResult {
    CommandResult {
        status: 1,
        stdout: Vec::new(),
        stderr: format!("{stderr}\n").into_bytes(),
    }
}

fn normalize(dir: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
