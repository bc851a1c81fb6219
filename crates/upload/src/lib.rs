//! Upload coordinator for the FMS.
//!
//! [`UploadCoordinator`] drives a file from a local path to a server-side
//! job: it validates the request, registers the upload with the storage
//! service, copies and hashes the bytes, hands the file over and keeps the
//! job record current. It also implements the retry and cancel policy.
//!
//! The remote services are reached through the [`StorageService`],
//! [`JobTracker`] and [`FileCatalog`] traits, implemented for the HTTP
//! clients and by in-memory doubles in tests.

mod chunked;
mod coordinator;
mod error;
mod options;
mod retry;
mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{StartedUpload, UploadCoordinator, UploadOutcome};
pub use error::{FileFailure, UploadError};
pub use options::{CoordinatorOptions, UploadMode};
pub use services::{FileCatalog, JobTracker, StorageService};

pub use fms_transfer::ProgressCallback;
