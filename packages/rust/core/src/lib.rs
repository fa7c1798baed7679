//! Core pipeline orchestration for graphfeat.
//!
//! This crate ties together acquisition, algorithm dispatch, feature
//! assembly, and publication into one run per request (see [`Pipeline`]).

pub mod lease;
pub mod pipeline;
pub mod reaper;

pub use lease::{AddressLeases, Lease};
pub use pipeline::{
    Pipeline, ProgressReporter, SilentProgress, Submission, UploadPayload, default_name,
};
