//! Code for the configuration of the application.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::Volume;

/// The configuration of the application.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Where the lock, log, and model slots live.
    pub paths: PathsConfig,

    /// Maximum bounding box every normalized model must fit within.
    pub bounds: Volume,

    /// The bounding/scaling tool.
    pub normalize: NormalizeConfig,

    /// The slice-and-print driver.
    pub slice: SliceConfig,

    /// How long a freshly spawned slice-and-print run has to survive
    /// before it's reported as printing, in milliseconds.
    pub detection_window_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            bounds: Volume {
                width: 285.0,
                depth: 153.0,
                height: 155.0,
            },
            normalize: NormalizeConfig::default(),
            slice: SliceConfig::default(),
            detection_window_ms: 5000,
        }
    }
}

impl Config {
    /// Parse a configuration from a toml file.
    pub fn from_file(file: &Path) -> Result<Self> {
        let config = std::fs::read_to_string(file)?;
        Self::from_str(&config)
    }

    /// Parse a configuration from a toml string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(config: &str) -> Result<Self> {
        let config: Self = toml::from_str(config)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values make sense together, beyond what parsing can tell.
    pub fn validate(&self) -> Result<()> {
        for (name, mm) in [
            ("width", self.bounds.width),
            ("depth", self.bounds.depth),
            ("height", self.bounds.height),
        ] {
            ensure!(
                mm.is_finite() && mm > 0.0,
                "bounds.{} must be a positive length, got {}",
                name,
                mm
            );
        }
        ensure!(self.detection_window_ms > 0, "detection_window_ms must be greater than 0");
        Ok(())
    }

    /// Return the detection window as a [Duration].
    pub fn detection_window(&self) -> Duration {
        Duration::from_millis(self.detection_window_ms)
    }
}

/// Locations of the single-instance files used by a job.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Lock record naming the pid of the running print.
    pub lock: PathBuf,

    /// Combined output of the normalize and slice stages.
    pub log: PathBuf,

    /// Slot fetched models are downloaded into.
    pub fetch: PathBuf,

    /// The normalized model currently being printed.
    pub current_model: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            lock: PathBuf::from("tmp/make.pid"),
            log: PathBuf::from("tmp/make.log"),
            fetch: PathBuf::from("data/fetch.stl"),
            current_model: PathBuf::from("data/print.stl"),
        }
    }
}

/// The external tool used to bound and scale the fetched models.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Program to run.
    pub program: PathBuf,

    /// Arguments passed before the bounds, scale, and inputs.
    pub args: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("./vendor/stltwalker/stltwalker"),
            args: vec![],
        }
    }
}

/// The external build driver that slices and prints the normalized model.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SliceConfig {
    /// Program to run.
    pub program: PathBuf,

    /// Arguments passed before the slicer settings and target.
    pub args: Vec<String>,

    /// Directory to run the program from, if not the current one.
    pub working_dir: Option<PathBuf>,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("make"),
            args: vec![],
            working_dir: None,
        }
    }
}
