// Stitch request value types: output format, distance hint and the validated request.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::pose::Pose;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    /// Extension the app gives its output files, with the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => ".jpg",
            OutputFormat::Png => ".png",
        }
    }

    /// Bytes every completely written file of this format ends with.
    pub fn trailer(self) -> &'static [u8] {
        match self {
            OutputFormat::Jpeg => b"\xff\xd9",
            OutputFormat::Png => b"\x00\x00\x00\x00IEND\xae\x42\x60\x82",
        }
    }

    pub fn is_lossless(self) -> bool {
        self == OutputFormat::Png
    }

    pub fn matches(self, file_name: &str) -> bool {
        file_name.to_ascii_lowercase().ends_with(self.extension())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
        })
    }
}

/// Subject-distance hint passed to the stitcher.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptiveDistance {
    /// 1-2 m.
    Near,
    /// 2-3 m.
    Mid,
    /// Under 5 m.
    Far,
    #[default]
    Auto,
}

impl AdaptiveDistance {
    pub fn code(self) -> u8 {
        match self {
            AdaptiveDistance::Near => 0,
            AdaptiveDistance::Mid => 1,
            AdaptiveDistance::Far => 2,
            AdaptiveDistance::Auto => 3,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, Error> {
        match code {
            0 => Ok(AdaptiveDistance::Near),
            1 => Ok(AdaptiveDistance::Mid),
            2 => Ok(AdaptiveDistance::Far),
            3 => Ok(AdaptiveDistance::Auto),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("adaptive distance must be 0..=3, got {other}"))),
        }
    }
}

impl FromStr for AdaptiveDistance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().parse::<u8>().map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid adaptive distance {s:?}"))
                .with_source(err)
        })?;
        Self::from_code(code)
    }
}

/// Everything one stitch session needs; immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct StitchRequest {
    source: PathBuf,
    destination: PathBuf,
    format: OutputFormat,
    quality: u8,
    depurple: bool,
    adaptive: AdaptiveDistance,
    calibration: Option<PathBuf>,
    pose: Option<Pose>,
}

impl StitchRequest {
    pub const DEFAULT_QUALITY: u8 = 95;

    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            format: OutputFormat::Jpeg,
            quality: Self::DEFAULT_QUALITY,
            depurple: true,
            adaptive: AdaptiveDistance::Auto,
            calibration: None,
            pose: None,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Result<Self, Error> {
        if !(1..=100).contains(&quality) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("JPEG quality must be 1..=100, got {quality}")));
        }
        self.quality = quality;
        Ok(self)
    }

    pub fn with_depurple(mut self, depurple: bool) -> Self {
        self.depurple = depurple;
        self
    }

    pub fn with_adaptive(mut self, adaptive: AdaptiveDistance) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_calibration(mut self, calibration: Option<PathBuf>) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_pose(mut self, pose: Option<Pose>) -> Self {
        self.pose = pose;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn depurple(&self) -> bool {
        self.depurple
    }

    pub fn adaptive(&self) -> AdaptiveDistance {
        self.adaptive
    }

    pub fn calibration(&self) -> Option<&Path> {
        self.calibration.as_deref()
    }

    pub fn pose(&self) -> Option<Pose> {
        self.pose
    }
}
