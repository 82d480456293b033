//! The job log: an append-only record of everything the normalize and
//! slice stages print, which also doubles as the source of truth for
//! print progress.

use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;

#[allow(clippy::expect_used)]
static PROGRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Sent [0-9]+/[0-9]+ \[([0-9]+)%\]").expect("constant regex pattern is valid"));

/// Handle to the job log on disk.
#[derive(Clone, Debug)]
pub struct JobLog {
    path: PathBuf,
}

impl JobLog {
    /// Create a new handle to the log at `path`. Nothing is touched on disk
    /// until the log is opened or read.
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_owned() }
    }

    /// Return the path on the filesystem.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the log for a new job, discarding whatever the last job wrote.
    pub fn truncate(&self) -> io::Result<File> {
        self.create_parent()?;
        File::create(&self.path)
    }

    /// Open the log for appending.
    pub fn append(&self) -> io::Result<File> {
        self.create_parent()?;
        OpenOptions::new().create(true).append(true).open(&self.path)
    }

    /// Return the full log text, or an empty string if no job has run yet.
    pub async fn read(&self) -> io::Result<String> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// Return the most recently reported print progress, as a percentage.
    ///
    /// This never fails; a log that can't be read reports 0.
    pub async fn progress(&self) -> u8 {
        match self.read().await {
            Ok(text) => parse_progress(&text),
            Err(e) => {
                tracing::warn!(
                    error = format!("{:?}", e),
                    path = format!("{:?}", self.path),
                    "failed to read job log"
                );
                0
            }
        }
    }

    fn create_parent(&self) -> io::Result<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }
}

/// Extract the latest `Sent <n>/<m> [<p>%]` percentage from log text.
///
/// The log is chronological, so the last match wins, not the largest.
/// A line still being written can't have its closing `%]` yet, and so
/// never matches.
pub fn parse_progress(text: &str) -> u8 {
    PROGRESS
        .captures_iter(text)
        .filter_map(|captures| captures[1].parse::<u64>().ok())
        .last()
        .map(|percent| u8::try_from(percent.min(100)).unwrap_or(100))
        .unwrap_or(0)
}
