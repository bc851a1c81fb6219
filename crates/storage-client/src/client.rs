//! file-storage-service upload API client.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::RequestBuilder;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::debug;

use fms_protocol::constants::{HTTP_CHUNK_TIMEOUT, HTTP_REQUEST_TIMEOUT, UPLOAD_BASE_PATH};
use fms_protocol::{
    RegisterUploadRequest, RegisterUploadResponse, StartUploadRequest, StartUploadResponse,
    UploadChunkResponse, UploadCompleteRequest, UploadFinalizeResponse, UploadMetadataResponse,
    UploadStatusResponse,
};

use crate::error::StorageClientError;

/// Client for `file-storage-service/2.0/upload`.
///
/// Holds no upload state. Every method is a single request/response.
#[derive(Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    base_url: String,
}

impl StorageClient {
    /// Creates a client rooted at the FMS host, e.g. `https://fms.example.org`.
    pub fn new(base_url: &str) -> Result<Self, StorageClientError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: service_url(base_url, UPLOAD_BASE_PATH)?,
        })
    }

    /// Root URL of the upload API, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// Registers intent to upload and obtains the job and upload directory.
    pub async fn start_upload(
        &self,
        request: &StartUploadRequest,
    ) -> Result<StartUploadResponse, StorageClientError> {
        debug!(path = %request.file_path, "POST start upload");
        send_json(self.http.post(self.url("")).json(request)).await
    }

    /// Tells the server the local copy is done and hands over the file.
    pub async fn upload_complete(
        &self,
        request: &UploadCompleteRequest,
    ) -> Result<Vec<UploadMetadataResponse>, StorageClientError> {
        debug!(job_id = %request.job_id, files = request.files.len(), "POST uploadComplete");
        send_json(self.http.post(self.url("/uploadComplete")).json(request)).await
    }

    /// Registers a chunked upload.
    pub async fn register_upload(
        &self,
        request: &RegisterUploadRequest,
    ) -> Result<RegisterUploadResponse, StorageClientError> {
        debug!(file = %request.file_name, size = request.file_size, "POST registerUpload");
        send_json(self.http.post(self.url("/registerUpload")).json(request)).await
    }

    /// Sends chunk `chunk_number` (1-based) of a registered upload.
    pub async fn upload_chunk(
        &self,
        upload_id: &str,
        chunk_number: u64,
        data: Vec<u8>,
    ) -> Result<UploadChunkResponse, StorageClientError> {
        debug!(upload_id, chunk_number, bytes = data.len(), "POST uploadChunk");
        let url = self.url(&format!("/uploadChunk/{}/{chunk_number}", encode(upload_id)));
        let req = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(HTTP_CHUNK_TIMEOUT)
            .body(data);
        send_json(req).await
    }

    /// Fetches the server-side state of a chunked upload.
    pub async fn get_status(
        &self,
        upload_id: &str,
    ) -> Result<UploadStatusResponse, StorageClientError> {
        debug!(upload_id, "GET upload status");
        send_json(self.http.get(self.url(&format!("/{}", encode(upload_id))))).await
    }

    /// Cancels a chunked upload.
    pub async fn cancel_upload(&self, upload_id: &str) -> Result<(), StorageClientError> {
        debug!(upload_id, "DELETE upload");
        send(self.http.delete(self.url(&format!("/{}", encode(upload_id))))).await?;
        Ok(())
    }

    /// Asks the server to assemble a chunked upload.
    pub async fn finalize(
        &self,
        upload_id: &str,
    ) -> Result<UploadFinalizeResponse, StorageClientError> {
        debug!(upload_id, "PATCH finalize");
        let url = self.url(&format!("/finalize/{}", encode(upload_id)));
        send_json(self.http.patch(url)).await
    }
}

/// Characters escaped in a path segment; RFC 3986 unreserved ones pass through.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Joins a host root and a service path, validating the root.
pub(crate) fn service_url(base_url: &str, path: &str) -> Result<String, StorageClientError> {
    let root = base_url.trim_end_matches('/');
    reqwest::Url::parse(root).map_err(|e| StorageClientError::InvalidBaseUrl(format!("{root}: {e}")))?;
    Ok(format!("{root}/{path}"))
}

/// Sends a request and returns the body of a 2xx response.
pub(crate) async fn send(req: RequestBuilder) -> Result<Vec<u8>, StorageClientError> {
    let resp = req.send().await?;
    let status = resp.status();

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(StorageClientError::Api {
            status: status.as_u16(),
            body,
        });
    }

    Ok(resp.bytes().await?.to_vec())
}

pub(crate) async fn send_json<T: DeserializeOwned>(
    req: RequestBuilder,
) -> Result<T, StorageClientError> {
    let body = send(req).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_http::mock_server;
    use fms_protocol::{FssRequestFile, RemoteUploadStatus, ServiceFields, UploadRequest};

    fn client(url: &str) -> StorageClient {
        StorageClient::new(url).unwrap()
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            StorageClient::new("not a url"),
            Err(StorageClientError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn base_url_appends_service_path() {
        let c = client("https://fms.example.org/");
        assert_eq!(
            c.base_url(),
            "https://fms.example.org/file-storage-service/2.0/upload"
        );
    }

    #[tokio::test]
    async fn start_upload_posts_request() {
        let (url, handle) =
            mock_server(200, r#"{"jobId":"job-1","uploadDirectory":"/fms/upload/job-1"}"#).await;

        let request = StartUploadRequest {
            job_name: "plate.czi".into(),
            user: "alice".into(),
            file_path: "/data/plate.czi".into(),
            service_fields: ServiceFields::default(),
        };
        let resp = client(&url).start_upload(&request).await.unwrap();
        assert_eq!(resp.job_id, "job-1");
        assert_eq!(resp.upload_directory, "/fms/upload/job-1");

        let req = handle.await.unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.target, "/file-storage-service/2.0/upload");
        let body = req.json();
        assert_eq!(body["jobName"], "plate.czi");
        assert_eq!(body["filePath"], "/data/plate.czi");
    }

    #[tokio::test]
    async fn upload_complete_sends_files() {
        let (url, handle) =
            mock_server(200, r#"[{"fileId":"f-1","fileName":"plate.czi","readPath":"/x"}]"#).await;

        let request = UploadCompleteRequest {
            job_id: "job-1".into(),
            files: vec![FssRequestFile {
                file_name: "plate.czi".into(),
                md5hex: "abc".into(),
                file_type: "image".into(),
                metadata: UploadRequest::new("/data/plate.czi", "image"),
                should_be_in_archive: true,
                should_be_in_local: false,
            }],
        };
        let resp = client(&url).upload_complete(&request).await.unwrap();
        assert_eq!(resp.len(), 1);
        assert_eq!(resp[0].file_id, "f-1");
        assert_eq!(resp[0].extra["readPath"], "/x");

        let req = handle.await.unwrap();
        assert_eq!(req.target, "/file-storage-service/2.0/upload/uploadComplete");
        let body = req.json();
        assert_eq!(body["jobId"], "job-1");
        assert_eq!(body["files"][0]["md5hex"], "abc");
        assert_eq!(body["files"][0]["shouldBeInArchive"], true);
    }

    #[tokio::test]
    async fn register_upload_returns_chunk_size() {
        let (url, handle) = mock_server(200, r#"{"uploadId":"up-1","chunkSize":1048576}"#).await;

        let request = RegisterUploadRequest {
            file_name: "plate.czi".into(),
            file_size: 10,
            md5: "abc".into(),
        };
        let resp = client(&url).register_upload(&request).await.unwrap();
        assert_eq!(resp.upload_id, "up-1");
        assert_eq!(resp.chunk_size, 1_048_576);

        let req = handle.await.unwrap();
        assert_eq!(req.target, "/file-storage-service/2.0/upload/registerUpload");
        assert_eq!(req.json()["fileSize"], 10);
    }

    #[tokio::test]
    async fn upload_chunk_sends_raw_bytes() {
        let (url, handle) = mock_server(
            200,
            r#"{"chunkNumber":3,"uploadId":"up-1","errorCount":0}"#,
        )
        .await;

        let resp = client(&url)
            .upload_chunk("up-1", 3, vec![0, 1, 2, 255])
            .await
            .unwrap();
        assert_eq!(resp.chunk_number, 3);
        assert_eq!(resp.error_count, 0);

        let req = handle.await.unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.target, "/file-storage-service/2.0/upload/uploadChunk/up-1/3");
        assert_eq!(req.header("content-type"), Some("application/octet-stream"));
        assert_eq!(req.body, vec![0, 1, 2, 255]);
    }

    #[test]
    fn path_segments_are_escaped() {
        assert_eq!(encode("up-1_a.b~c"), "up-1_a.b~c");
        assert_eq!(encode("a/b c"), "a%2Fb%20c");
    }

    #[tokio::test]
    async fn get_status_uses_get() {
        let (url, handle) = mock_server(
            200,
            r#"{"uploadStatus":"WORKING","chunkStatuses":["COMPLETE","PENDING"]}"#,
        )
        .await;

        let resp = client(&url).get_status("up1").await.unwrap();
        assert_eq!(resp.upload_status, RemoteUploadStatus::Working);
        assert_eq!(resp.completed_chunks(), 1);

        let req = handle.await.unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.target, "/file-storage-service/2.0/upload/up1");
    }

    #[tokio::test]
    async fn cancel_uses_delete() {
        let (url, handle) = mock_server(200, "").await;
        client(&url).cancel_upload("up1").await.unwrap();

        let req = handle.await.unwrap();
        assert_eq!(req.method, "DELETE");
        assert_eq!(req.target, "/file-storage-service/2.0/upload/up1");
    }

    #[tokio::test]
    async fn finalize_uses_patch() {
        let (url, handle) = mock_server(200, r#"{"uploadId":"up1","fileId":"f-9"}"#).await;
        let resp = client(&url).finalize("up1").await.unwrap();
        assert_eq!(resp.file_id.as_deref(), Some("f-9"));

        let req = handle.await.unwrap();
        assert_eq!(req.method, "PATCH");
        assert_eq!(req.target, "/file-storage-service/2.0/upload/finalize/up1");
    }

    #[tokio::test]
    async fn non_success_surfaces_status_and_body() {
        let (url, _handle) = mock_server(409, r#"{"error":"duplicate"}"#).await;
        let err = client(&url).get_status("up1").await.unwrap_err();
        match err {
            StorageClientError::Api { status, body } => {
                assert_eq!(status, 409);
                assert!(body.contains("duplicate"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_json_error() {
        let (url, _handle) = mock_server(200, "not json").await;
        let err = client(&url).finalize("up1").await.unwrap_err();
        assert!(matches!(err, StorageClientError::Json(_)));
    }
}
