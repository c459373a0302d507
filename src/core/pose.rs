//! Purpose: Camera pose value type and the two ways of handing it to the stitcher.
//! Exports: `Pose`, `PoseStrategy`, `PreparedSource`, `rotation_matrix`, `pack_matrix`,
//! `unpack_matrix`, `locate_user_comment`, `write_rotation_matrix`, `write_patched_copy`.
//! Role: Strategy A passes yaw/pitch/roll as intent extras; strategy B patches the
//! rotation matrix into the EXIF user-comment field of a temporary copy of the photo.
//! Invariants: Matrix is Rz(-yaw) * Ry(roll) * Rx(-pitch), packed row-major as 9 LE f32.
//! Invariants: The source photo is never modified; patches go to a scratch copy.
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use nalgebra::{Matrix3, Rotation3, Vector3};
use tempfile::TempDir;
use tracing::debug;

use crate::core::error::{Error, ErrorKind};

const MAX_DEGREES: f64 = 360.0;

/// UserComment IFD entry: tag 0x9286, type UNDEFINED, count 36, little-endian.
const USER_COMMENT_ENTRY: [u8; 8] = [0x86, 0x92, 0x07, 0x00, 0x24, 0x00, 0x00, 0x00];
const HEADER_WINDOW: usize = 4096;
/// SOI + APP1 marker + APP1 length + "Exif\0\0" precede the TIFF header.
const TIFF_BASE: u64 = 12;
pub const MATRIX_BYTES: usize = 36;

/// Orientation in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    yaw: f64,
    pitch: f64,
    roll: f64,
}

impl Pose {
    pub fn new(yaw: f64, pitch: f64, roll: f64) -> Result<Self, Error> {
        for (name, value) in [("yaw", yaw), ("pitch", pitch), ("roll", roll)] {
            if !value.is_finite() || value.abs() > MAX_DEGREES {
                return Err(Error::new(ErrorKind::Usage).with_message(format!(
                    "{name} must be a finite angle within ±{MAX_DEGREES} degrees, got {value}"
                )));
            }
        }
        Ok(Self { yaw, pitch, roll })
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn roll(&self) -> f64 {
        self.roll
    }
}

impl FromStr for Pose {
    type Err = Error;

    /// Parses `yaw,pitch,roll`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let usage = || {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid pose {s:?}"))
                .with_hint("Use yaw,pitch,roll in degrees, e.g. --pose 90,0,-5.5")
        };
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| usage().with_source(err))?;
        match values.as_slice() {
            [yaw, pitch, roll] => Pose::new(*yaw, *pitch, *roll),
            _ => Err(usage()),
        }
    }
}

pub fn rotation_matrix(pose: &Pose) -> Matrix3<f64> {
    let yaw = Rotation3::from_axis_angle(&Vector3::z_axis(), (-pose.yaw).to_radians());
    let roll = Rotation3::from_axis_angle(&Vector3::y_axis(), pose.roll.to_radians());
    let pitch = Rotation3::from_axis_angle(&Vector3::x_axis(), (-pose.pitch).to_radians());
    (yaw * roll * pitch).into_inner()
}

pub fn pack_matrix(matrix: &Matrix3<f64>) -> [u8; MATRIX_BYTES] {
    let mut out = [0u8; MATRIX_BYTES];
    for row in 0..3 {
        for col in 0..3 {
            let idx = (row * 3 + col) * 4;
            out[idx..idx + 4].copy_from_slice(&(matrix[(row, col)] as f32).to_le_bytes());
        }
    }
    out
}

pub fn unpack_matrix(bytes: &[u8; MATRIX_BYTES]) -> [f32; 9] {
    let mut out = [0f32; 9];
    for (value, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
        *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    out
}

/// Find the file offset of the user-comment payload from the start of the file.
pub fn locate_user_comment(header: &[u8]) -> Result<u64, Error> {
    let window = &header[..header.len().min(HEADER_WINDOW)];
    let malformed = |message: &str| {
        Error::new(ErrorKind::MalformedInput)
            .with_message(message.to_string())
            .with_hint("The legacy pose patch needs an unmodified camera JPEG.")
    };
    let found = window
        .windows(USER_COMMENT_ENTRY.len())
        .position(|candidate| candidate == USER_COMMENT_ENTRY)
        .ok_or_else(|| malformed("EXIF user comment entry not found in the first 4096 bytes"))?;
    let value_at = found + USER_COMMENT_ENTRY.len();
    let Some(raw) = window.get(value_at..value_at + 4) else {
        return Err(malformed("EXIF user comment entry is truncated"));
    };
    let offset = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    Ok(u64::from(offset) + TIFF_BASE)
}

/// Overwrite the user-comment payload of the JPEG at `path` with the packed pose matrix.
pub fn write_rotation_matrix(path: &Path, pose: &Pose) -> Result<(), Error> {
    let io_err = |err: std::io::Error| {
        Error::new(ErrorKind::Io)
            .with_message("failed to patch pose into image")
            .with_path(path)
            .with_source(err)
    };
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(io_err)?;
    let mut header = Vec::with_capacity(HEADER_WINDOW);
    (&mut file)
        .take(HEADER_WINDOW as u64)
        .read_to_end(&mut header)
        .map_err(io_err)?;
    let offset = locate_user_comment(&header).map_err(|err| err.with_path(path))?;
    let size = file.metadata().map_err(io_err)?.len();
    if offset + MATRIX_BYTES as u64 > size {
        return Err(Error::new(ErrorKind::MalformedInput)
            .with_message(format!("user comment payload at {offset} lies past end of file"))
            .with_path(path));
    }
    debug!(path = %path.display(), offset, "patching pose matrix");
    file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
    file.write_all(&pack_matrix(&rotation_matrix(pose)))
        .map_err(io_err)?;
    file.flush().map_err(io_err)
}

/// How a pose reaches the stitcher.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PoseStrategy {
    IntentExtras,
    ExifPatch,
}

/// The file to push plus the pose to send as launch extras, if any.
#[derive(Debug)]
pub struct PreparedSource {
    path: PathBuf,
    launch_pose: Option<Pose>,
    _scratch: Option<TempDir>,
}

impl PreparedSource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn launch_pose(&self) -> Option<Pose> {
        self.launch_pose
    }

    /// Name the app will see in its source directory.
    pub fn file_name(&self) -> Result<String, Error> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message("source path has no file name")
                    .with_path(&self.path)
            })
    }
}

impl PoseStrategy {
    pub fn prepare_source(
        self,
        source: &Path,
        pose: Option<Pose>,
    ) -> Result<PreparedSource, Error> {
        match (self, pose) {
            (_, None) | (PoseStrategy::IntentExtras, Some(_)) => Ok(PreparedSource {
                path: source.to_path_buf(),
                launch_pose: pose,
                _scratch: None,
            }),
            (PoseStrategy::ExifPatch, Some(pose)) => patched_copy(source, &pose),
        }
    }
}

fn patched_copy(source: &Path, pose: &Pose) -> Result<PreparedSource, Error> {
    let name = source.file_name().ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("source path has no file name")
            .with_path(source)
    })?;
    let scratch = tempfile::Builder::new()
        .prefix("misphere-pose")
        .tempdir()
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to create scratch directory")
                .with_source(err)
        })?;
    let path = scratch.path().join(name);
    write_patched_copy(source, &path, pose)?;
    Ok(PreparedSource {
        path,
        launch_pose: None,
        _scratch: Some(scratch),
    })
}

/// Copy `source` to `dest` and patch the pose into the copy; `source` is never modified.
/// The copy is staged beside `dest` and only renamed into place once the patch succeeds.
pub fn write_patched_copy(source: &Path, dest: &Path, pose: &Pose) -> Result<(), Error> {
    if is_same_file(source, dest) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("destination must differ from the source image")
            .with_path(dest));
    }
    let mut input = File::open(source).map_err(|err| {
        let kind = if err.kind() == std::io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::Io
        };
        Error::new(kind)
            .with_message("failed to open source image")
            .with_path(source)
            .with_source(err)
    })?;
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::Builder::new()
        .prefix(".misphere-pose")
        .tempfile_in(dir)
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to create patched copy")
                .with_path(dest)
                .with_source(err)
        })?;
    std::io::copy(&mut input, staged.as_file_mut())
        .and_then(|_| staged.as_file_mut().flush())
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to copy source image")
                .with_path(source)
                .with_source(err)
        })?;
    write_rotation_matrix(staged.path(), pose).map_err(|err| err.with_path(source))?;
    staged.persist(dest).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to move patched copy into place")
            .with_path(dest)
            .with_source(err.error)
    })?;
    Ok(())
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
