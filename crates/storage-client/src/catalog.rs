//! Metadata catalog queries.

use tracing::debug;

use fms_protocol::constants::{CATALOG_BASE_PATH, HTTP_REQUEST_TIMEOUT};

use crate::client::{send_json, service_url};
use crate::error::StorageClientError;

/// Errors from the catalog client.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Request(#[from] StorageClientError),
}

#[derive(serde::Deserialize)]
struct ExistsResponse {
    exists: bool,
}

/// Client for the file metadata catalog.
#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(StorageClientError::from)?;
        Ok(Self {
            http,
            base_url: service_url(base_url, CATALOG_BASE_PATH)?,
        })
    }

    /// Returns whether a file with this MD5 and name is already stored.
    pub async fn file_exists_by_md5_and_name(
        &self,
        md5: &str,
        file_name: &str,
    ) -> Result<bool, CatalogError> {
        debug!(md5, file_name, "GET catalog exists");
        let req = self
            .http
            .get(format!("{}/exists", self.base_url))
            .query(&[("md5", md5), ("fileName", file_name)]);
        let resp: ExistsResponse = send_json(req).await?;
        Ok(resp.exists)
    }
}
