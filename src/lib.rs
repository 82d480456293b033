#![allow(refining_impl_trait)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! This crate implements a single exclusive print slot: it takes one or
//! more remote 3D models, bounds and scales them, and hands the result off
//! to a long-running slice-and-print process, reporting progress as the
//! job runs.

pub mod config;
mod job_log;
pub mod lock;
mod orchestrator;
mod request;
pub mod stages;
mod traits;

pub use job_log::{parse_progress, JobLog};
pub use lock::{FileLockStore, LockError, LockOwner, SubmitGuard};
pub use orchestrator::{Error, JobOutcome, JobStatus, PrintOrchestrator};
pub use request::JobRequest;
pub use traits::{Fetch, LockStore};

use serde::{Deserialize, Serialize};

/// Set of three values to represent the extent of a 3-D Volume. This contains
/// the width, depth, and height values, generally used to represent some
/// maximum or minimum.
///
/// All measurements are in millimeters.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Volume {
    /// Width of the volume ("left and right"), in millimeters.
    pub width: f64,

    /// Depth of the volume ("front to back"), in millimeters.
    pub depth: f64,

    /// Height of the volume ("up and down"), in millimeters.
    pub height: f64,
}
