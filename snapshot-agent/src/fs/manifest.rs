//! Per-run manifests.
//!
//! A run's file set lives in one of two forms under the metadata directory:
//!
//! - in progress: `backup.<name>/files`, one remote name per line
//! - finalized: `backup.<name>.zip`, members `backup.<name>/<remote name>.sia`
//!
//! The archive marks the run finished. Finalizing removes the in-progress
//! directory and is never undone.

use crate::{AgentError, Result};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const RUN_PREFIX: &str = "backup.";
const ARCHIVE_EXTENSION: &str = ".zip";
const MEMBER_SUFFIX: &str = ".sia";
const FILE_LIST: &str = "files";

/// File set of one run as recorded locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    /// Remote names, in recorded order
    pub files: Vec<String>,
    pub finished: bool,
}

impl Manifest {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn name_set(&self) -> HashSet<&str> {
        self.files.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn in_progress_dir(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", RUN_PREFIX, name))
    }

    fn file_list(&self, name: &str) -> PathBuf {
        self.in_progress_dir(name).join(FILE_LIST)
    }

    fn archive(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", RUN_PREFIX, name, ARCHIVE_EXTENSION))
    }

    pub fn is_finished(&self, name: &str) -> bool {
        self.archive(name).is_file()
    }

    /// Load a run's manifest; `None` if no run by that name exists.
    pub fn load(&self, name: &str) -> Result<Option<Manifest>> {
        let archive = self.archive(name);
        if archive.is_file() {
            let files = read_archive(&archive, name)?;
            return Ok(Some(Manifest {
                name: name.to_string(),
                files,
                finished: true,
            }));
        }

        let dir = self.in_progress_dir(name);
        if dir.is_dir() {
            let list = self.file_list(name);
            let files = if list.is_file() {
                fs::read_to_string(&list)?
                    .lines()
                    .map(str::trim_end)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect()
            } else {
                Vec::new()
            };
            return Ok(Some(Manifest {
                name: name.to_string(),
                files,
                finished: false,
            }));
        }

        Ok(None)
    }

    /// Register a new run with an empty file set. No-op if it already exists.
    pub fn begin(&self, name: &str) -> Result<()> {
        if self.is_finished(name) {
            return Err(AgentError::Finalized(name.to_string()));
        }
        fs::create_dir_all(self.in_progress_dir(name))?;
        Ok(())
    }

    /// Replace the in-progress file set of a run.
    pub fn write_in_progress(&self, name: &str, remote_names: &[String]) -> Result<()> {
        if self.is_finished(name) {
            return Err(AgentError::Finalized(name.to_string()));
        }
        let dir = self.in_progress_dir(name);
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!("{}.tmp", FILE_LIST));
        {
            let mut out = File::create(&tmp)?;
            for remote_name in remote_names {
                writeln!(out, "{}", remote_name)?;
            }
            out.sync_all()?;
        }
        fs::rename(&tmp, self.file_list(name))?;

        debug!(run = %name, "Recorded {} files in manifest", remote_names.len());
        Ok(())
    }

    /// Write the archive form and drop the in-progress form.
    pub fn finalize(&self, name: &str, remote_names: &[String]) -> Result<()> {
        if self.is_finished(name) {
            return Err(AgentError::Finalized(name.to_string()));
        }
        fs::create_dir_all(&self.dir)?;

        let archive = self.archive(name);
        let tmp = archive.with_extension("zip.tmp");
        {
            let mut zip = ZipWriter::new(File::create(&tmp)?);
            for remote_name in remote_names {
                zip.start_file(
                    format!("{}{}/{}{}", RUN_PREFIX, name, remote_name, MEMBER_SUFFIX),
                    SimpleFileOptions::default(),
                )?;
            }
            zip.finish()?;
        }
        fs::rename(&tmp, &archive)?;

        let dir = self.in_progress_dir(name);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }

        info!(run = %name, "Finalized manifest with {} files", remote_names.len());
        Ok(())
    }

    /// Delete every form of a run's manifest.
    pub fn remove(&self, name: &str) -> Result<()> {
        let archive = self.archive(name);
        if archive.is_file() {
            fs::remove_file(&archive)?;
        }
        let dir = self.in_progress_dir(name);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Backup history, most recent first.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(rest) = file_name.strip_prefix(RUN_PREFIX) else {
                continue;
            };
            let file_type = entry.file_type()?;
            let name = match rest.strip_suffix(ARCHIVE_EXTENSION) {
                Some(name) if file_type.is_file() => name,
                None if file_type.is_dir() => rest,
                _ => continue,
            };
            if is_run_name(name) {
                names.push(name.to_string());
            }
        }

        names.sort_unstable_by(|a, b| b.cmp(a));
        names.dedup();
        Ok(names)
    }

    pub fn latest(&self) -> Result<Option<String>> {
        Ok(self.list()?.into_iter().next())
    }

    /// The run taken right before `name`, if any.
    pub fn previous(&self, name: &str) -> Result<Option<String>> {
        let history = self.list()?;
        Ok(history
            .iter()
            .position(|n| n == name)
            .and_then(|idx| history.get(idx + 1).cloned()))
    }
}

/// Run names are decimal timestamps.
pub fn is_run_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

fn read_archive(path: &Path, name: &str) -> Result<Vec<String>> {
    let archive = ZipArchive::new(File::open(path)?)?;
    let prefix = format!("{}{}/", RUN_PREFIX, name);

    let mut files = Vec::new();
    for member in archive.file_names() {
        let Some(stripped) = member.strip_suffix(MEMBER_SUFFIX) else {
            continue;
        };
        let remote_name = match stripped.rfind(&prefix) {
            Some(idx) => &stripped[idx + prefix.len()..],
            None => {
                warn!(run = %name, "Archive member {} outside the run directory", member);
                stripped
            }
        };
        files.push(remote_name.to_string());
    }
    // ZipArchive::file_names does not keep insertion order.
    files.sort();
    Ok(files)
}
