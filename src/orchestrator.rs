//! The print orchestrator: the only way a job gets into the print slot.
//!
//! A submission runs fetch and normalize in the foreground, then starts
//! slice-and-print in the background and takes the lock on its behalf.
//! There's no signal for "slicing worked", so the orchestrator waits a
//! short detection window instead: a run that's still going once the
//! window closes is reported as printing, one that exits inside it has
//! died early. A slow crash after the window is misreported as success.

use std::{io, path::PathBuf};

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::process::Child;

use crate::{
    config::Config,
    stages::{normalize, slice},
    Fetch, JobLog, JobRequest, LockOwner, LockStore,
};

/// What became of a submitted job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Slice-and-print outlived the detection window, and is still running.
    Printing {
        /// Process id of the running slice-and-print stage.
        pid: u32,
    },

    /// Another job already holds the print slot. Nothing was done.
    Locked {
        /// Owner of the print slot, if it could be determined.
        owner: Option<LockOwner>,
    },

    /// The normalize stage exited non-zero. No lock was taken.
    NormalizeFailed {
        /// Exit code of the normalize tool, if it exited normally.
        exit_code: Option<i32>,
    },

    /// Slice-and-print exited inside the detection window.
    DiedEarly {
        /// Exit code of the slice-and-print stage, if it exited normally.
        exit_status: Option<i32>,
    },
}

impl JobOutcome {
    /// HTTP-level verdict for this outcome.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Printing { .. } => StatusCode::OK,
            Self::Locked { .. } => StatusCode::LOCKED,
            Self::NormalizeFailed { .. } => StatusCode::CONFLICT,
            Self::DiedEarly { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human readable summary of this outcome.
    pub fn message(&self) -> String {
        match self {
            Self::Printing { .. } => "Looks like it's printing correctly".to_owned(),
            Self::Locked { owner: Some(owner) } => format!("Locked by process {}", owner.pid),
            Self::Locked { owner: None } => "Locked".to_owned(),
            Self::NormalizeFailed { .. } => "Model normalize failed.".to_owned(),
            Self::DiedEarly { exit_status } => format!(
                "Process died within the detection window with exit status {}",
                exit_status.map_or_else(|| "unknown".to_owned(), |code| code.to_string())
            ),
        }
    }
}

/// Possible errors returned while submitting a job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The submission was malformed.
    #[error("invalid job request: {0}")]
    InvalidRequest(String),

    /// A source model could not be fetched.
    #[error("failed to fetch source models")]
    Fetch(#[source] anyhow::Error),

    /// The lock record could not be read or written.
    #[error("lock record i/o failed")]
    LockIo(#[source] anyhow::Error),

    /// A pipeline stage could not be started or waited on.
    #[error("failed to run the {stage} stage")]
    Stage {
        /// Name of the stage that failed.
        stage: &'static str,
        /// Underlying i/o error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// HTTP-level verdict for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Fetch(_) => StatusCode::BAD_GATEWAY,
            Self::LockIo(_) | Self::Stage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn lock_io<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::LockIo(err.into())
    }

    fn stage(stage: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Stage { stage, source }
    }
}

/// Point-in-time view of the print slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobStatus {
    /// Owner of the print slot, if a job is running.
    pub owner: Option<LockOwner>,

    /// Most recently reported print progress, as a percentage.
    pub progress: u8,
}

/// Runs jobs through the single print slot.
pub struct PrintOrchestrator<FetchT, LockT>
where
    FetchT: Fetch,
    LockT: LockStore,
{
    config: Config,
    fetcher: FetchT,
    lock: LockT,
    log: JobLog,
}

impl<FetchT, LockT> PrintOrchestrator<FetchT, LockT>
where
    FetchT: Fetch,
    LockT: LockStore,
{
    /// Create a new [PrintOrchestrator].
    pub fn new(config: Config, fetcher: FetchT, lock: LockT) -> Self {
        let log = JobLog::new(&config.paths.log);
        Self {
            config,
            fetcher,
            lock,
            log,
        }
    }

    /// Return the [Config] this orchestrator was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submit a job to the print slot.
    #[tracing::instrument(skip_all, fields(urls = request.urls.len(), count = request.count))]
    pub async fn submit(&self, request: &JobRequest) -> Result<JobOutcome, Error> {
        request.validate()?;

        // Held from the lock check until the lock is taken (or the job is
        // turned away), so two submissions can never both pass the check.
        let exclusive = self.lock.exclusive().await.map_err(Error::lock_io)?;

        if self.lock.is_locked().await.map_err(Error::lock_io)? {
            let owner = self.lock.current_owner().await.map_err(Error::lock_io)?;
            tracing::info!(pid = owner.map(|owner| owner.pid), "print slot is locked");
            return Ok(JobOutcome::Locked { owner });
        }

        let paths = &self.config.paths;

        let fetched = self
            .fetcher
            .fetch(&request.urls, &paths.fetch)
            .await
            .map_err(|e| Error::Fetch(e.into()))?;
        let inputs = request.replicate(&fetched)?;
        tracing::debug!(inputs = inputs.len(), "fetched source models");

        let status = normalize::run(
            &self.config.normalize,
            &self.config.bounds,
            request.scale,
            &paths.current_model,
            &inputs,
            &self.log,
        )
        .await
        .map_err(Error::stage("normalize"))?;
        if !status.success() {
            return Ok(JobOutcome::NormalizeFailed {
                exit_code: status.code(),
            });
        }

        let mut child = slice::spawn(
            &self.config.slice,
            request,
            &paths.current_model,
            &paths.lock,
            &self.log,
        )
        .map_err(Error::stage("slice"))?;
        let Some(pid) = child.id() else {
            return Err(Error::Stage {
                stage: "slice",
                source: io::Error::other("slice-and-print exited before it could be tracked"),
            });
        };

        if let Err(e) = self.lock.acquire(pid).await {
            // Nothing may print without a lock record.
            if let Err(kill) = child.start_kill() {
                tracing::warn!(error = format!("{:?}", kill), pid = pid, "failed to stop unlocked print");
            }
            return Err(Error::lock_io(e));
        }
        drop(exclusive);

        self.detect(child, pid).await
    }

    /// Wait out the detection window on a freshly started print.
    async fn detect(&self, mut child: Child, pid: u32) -> Result<JobOutcome, Error> {
        match tokio::time::timeout(self.config.detection_window(), child.wait()).await {
            Ok(Ok(status)) => {
                tracing::warn!(pid = pid, status = format!("{}", status), "slice-and-print died early");
                // The wrapper removes the record itself, unless it exited
                // before the record was written.
                self.lock.release_if_owner(pid).await.map_err(Error::lock_io)?;
                Ok(JobOutcome::DiedEarly {
                    exit_status: status.code(),
                })
            }
            Ok(Err(e)) => Err(Error::Stage {
                stage: "slice",
                source: e,
            }),
            Err(_) => {
                tracing::info!(pid = pid, "slice-and-print survived the detection window");
                tokio::spawn(reap(child, pid));
                Ok(JobOutcome::Printing { pid })
            }
        }
    }

    /// Return the most recently reported print progress, as a percentage.
    pub async fn progress(&self) -> u8 {
        self.log.progress().await
    }

    /// Return the raw job log, or an empty string if there isn't one.
    pub async fn log(&self) -> io::Result<String> {
        self.log.read().await
    }

    /// Return the current owner of the print slot (reclaiming it first if
    /// the owner is gone) along with the latest progress.
    pub async fn status(&self) -> Result<JobStatus, Error> {
        let owner = if self.lock.is_locked().await.map_err(Error::lock_io)? {
            self.lock.current_owner().await.map_err(Error::lock_io)?
        } else {
            None
        };
        Ok(JobStatus {
            owner,
            progress: self.progress().await,
        })
    }

    /// Unconditionally clear the print slot. This does not stop a print
    /// that is still running.
    pub async fn release(&self) -> Result<(), Error> {
        let _exclusive = self.lock.exclusive().await.map_err(Error::lock_io)?;
        self.lock.release().await.map_err(Error::lock_io)
    }

    /// Return the path of the current normalized model, if there is one.
    pub async fn current_model(&self) -> Option<PathBuf> {
        let path = &self.config.paths.current_model;
        match tokio::fs::try_exists(path).await {
            Ok(true) => Some(path.clone()),
            _ => None,
        }
    }
}

/// Wait on a detached print so it doesn't linger as a zombie (which would
/// keep its lock looking alive), logging how it ended.
async fn reap(mut child: Child, pid: u32) {
    match child.wait().await {
        Ok(status) if status.success() => {
            tracing::info!(pid = pid, "slice-and-print finished");
        }
        Ok(status) => {
            tracing::warn!(pid = pid, status = format!("{}", status), "slice-and-print failed");
        }
        Err(e) => {
            tracing::warn!(pid = pid, error = format!("{:?}", e), "failed to wait on slice-and-print");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_outcome_status_codes() {
        assert_eq!(JobOutcome::Printing { pid: 1 }.status_code(), StatusCode::OK);
        assert_eq!(JobOutcome::Locked { owner: None }.status_code(), StatusCode::LOCKED);
        assert_eq!(
            JobOutcome::NormalizeFailed { exit_code: Some(1) }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            JobOutcome::DiedEarly { exit_status: Some(1) }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::InvalidRequest("nope".to_owned()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Fetch(anyhow::anyhow!("offline")).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::LockIo(anyhow::anyhow!("read only")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_died_early_message() {
        assert_eq!(
            JobOutcome::DiedEarly { exit_status: Some(1) }.message(),
            "Process died within the detection window with exit status 1"
        );
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(JobOutcome::NormalizeFailed { exit_code: Some(2) }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "normalize_failed", "exit_code": 2}));
    }
}
