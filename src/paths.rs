//! Purpose: Local path resolution for config files and batch stitch jobs.
//! Exports: `default_config_path`, `expand_sources`, `plan_jobs`, `Job`.
//! Role: Keep CLI and API-client path semantics aligned from one source.
//! Invariants: Directory sources expand to their `.jpg` entries (any case), sorted by name.
//! Invariants: A destination that is not a directory is only valid for a single file source.
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};
use crate::core::request::OutputFormat;

/// One source photo and where its panorama lands.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Job {
    pub source: PathBuf,
    pub destination: PathBuf,
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home)
        .join(".misphere-stitch")
        .join("config.toml")
}

pub fn expand_sources(sources: &[PathBuf]) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    for source in sources {
        if !source.is_dir() {
            files.push(source.clone());
            continue;
        }
        let entries = std::fs::read_dir(source).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read source directory")
                .with_path(source)
                .with_source(err)
        })?;
        let mut found = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to read source directory entry")
                        .with_path(source)
                        .with_source(err)
                })?
                .path();
            if OutputFormat::Jpeg.matches(&path.to_string_lossy()) && path.is_file() {
                found.push(path);
            }
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

/// Expand `sources` and pair each photo with its destination under `dest`.
pub fn plan_jobs(
    sources: &[PathBuf],
    dest: &Path,
    format: OutputFormat,
) -> Result<Vec<Job>, Error> {
    let single_file = sources.len() == 1 && sources[0].is_file();
    if !dest.is_dir() {
        if !single_file {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("destination is not a directory or does not exist")
                .with_path(dest)
                .with_hint(
                    "With several sources or a source directory, pass an existing directory.",
                ));
        }
        return Ok(vec![Job {
            source: sources[0].clone(),
            destination: dest.to_path_buf(),
        }]);
    }
    expand_sources(sources)?
        .into_iter()
        .map(|source| {
            let name = source.file_name().ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message("source path has no file name")
                    .with_path(&source)
            })?;
            let mut destination = dest.join(name);
            if format == OutputFormat::Png {
                destination.set_extension("png");
            }
            Ok(Job {
                source,
                destination,
            })
        })
        .collect()
}
