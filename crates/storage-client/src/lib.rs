//! HTTP clients for the FMS services an upload talks to.
//!
//! - [`StorageClient`]: the file-storage-service upload API
//!   (`file-storage-service/2.0/upload`).
//! - [`CatalogClient`]: the metadata catalog, queried for existing content.
//!
//! Neither client retries. Any non-2xx response is returned verbatim as
//! [`StorageClientError::Api`].

pub mod catalog;
pub mod client;
pub mod error;

#[cfg(test)]
pub(crate) mod mock_http;

pub use catalog::{CatalogClient, CatalogError};
pub use client::StorageClient;
pub use error::StorageClientError;
