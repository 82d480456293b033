//! This module contains the three pipeline stages a print job runs
//! through, in order: fetch the source models, normalize (bound and
//! scale) them into the current model, then slice and print that.
//!
//! Normalize and slice both shell out, sending their combined output to
//! the [crate::JobLog].

pub mod fetch;
pub mod normalize;
pub mod slice;
