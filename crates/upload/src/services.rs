//! Seams between the coordinator and the remote services.
//!
//! Each trait is implemented for the matching HTTP client. Tests swap in
//! in-memory doubles.

use futures_util::future::BoxFuture;

use fms_job_client::{JobClient, JobClientError};
use fms_protocol::{
    JobPatch, RegisterUploadRequest, RegisterUploadResponse, StartUploadRequest,
    StartUploadResponse, UploadChunkResponse, UploadCompleteRequest, UploadFinalizeResponse,
    UploadJob, UploadMetadataResponse, UploadStatusResponse,
};
use fms_storage_client::{CatalogClient, CatalogError, StorageClient, StorageClientError};

/// The file-storage-service upload API.
pub trait StorageService: Send + Sync {
    fn start_upload<'a>(
        &'a self,
        request: &'a StartUploadRequest,
    ) -> BoxFuture<'a, Result<StartUploadResponse, StorageClientError>>;

    fn upload_complete<'a>(
        &'a self,
        request: &'a UploadCompleteRequest,
    ) -> BoxFuture<'a, Result<Vec<UploadMetadataResponse>, StorageClientError>>;

    fn register_upload<'a>(
        &'a self,
        request: &'a RegisterUploadRequest,
    ) -> BoxFuture<'a, Result<RegisterUploadResponse, StorageClientError>>;

    fn upload_chunk<'a>(
        &'a self,
        upload_id: &'a str,
        chunk_number: u64,
        data: Vec<u8>,
    ) -> BoxFuture<'a, Result<UploadChunkResponse, StorageClientError>>;

    fn finalize<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<UploadFinalizeResponse, StorageClientError>>;

    fn cancel_upload<'a>(&'a self, upload_id: &'a str)
    -> BoxFuture<'a, Result<(), StorageClientError>>;

    fn get_status<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<UploadStatusResponse, StorageClientError>>;
}

/// The job-storage-service.
pub trait JobTracker: Send + Sync {
    fn get_job<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<UploadJob, JobClientError>>;

    fn update_job<'a>(
        &'a self,
        job_id: &'a str,
        patch: &'a JobPatch,
        append: bool,
    ) -> BoxFuture<'a, Result<(), JobClientError>>;

    fn wait_for_job_to_exist<'a>(
        &'a self,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<(), JobClientError>>;
}

/// The metadata catalog, used to detect content that is already stored.
pub trait FileCatalog: Send + Sync {
    fn file_exists_by_md5_and_name<'a>(
        &'a self,
        md5: &'a str,
        file_name: &'a str,
    ) -> BoxFuture<'a, Result<bool, CatalogError>>;
}

impl StorageService for StorageClient {
    fn start_upload<'a>(
        &'a self,
        request: &'a StartUploadRequest,
    ) -> BoxFuture<'a, Result<StartUploadResponse, StorageClientError>> {
        Box::pin(StorageClient::start_upload(self, request))
    }

    fn upload_complete<'a>(
        &'a self,
        request: &'a UploadCompleteRequest,
    ) -> BoxFuture<'a, Result<Vec<UploadMetadataResponse>, StorageClientError>> {
        Box::pin(StorageClient::upload_complete(self, request))
    }

    fn register_upload<'a>(
        &'a self,
        request: &'a RegisterUploadRequest,
    ) -> BoxFuture<'a, Result<RegisterUploadResponse, StorageClientError>> {
        Box::pin(StorageClient::register_upload(self, request))
    }

    fn upload_chunk<'a>(
        &'a self,
        upload_id: &'a str,
        chunk_number: u64,
        data: Vec<u8>,
    ) -> BoxFuture<'a, Result<UploadChunkResponse, StorageClientError>> {
        Box::pin(StorageClient::upload_chunk(self, upload_id, chunk_number, data))
    }

    fn finalize<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<UploadFinalizeResponse, StorageClientError>> {
        Box::pin(StorageClient::finalize(self, upload_id))
    }

    fn cancel_upload<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageClientError>> {
        Box::pin(StorageClient::cancel_upload(self, upload_id))
    }

    fn get_status<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<UploadStatusResponse, StorageClientError>> {
        Box::pin(StorageClient::get_status(self, upload_id))
    }
}

impl JobTracker for JobClient {
    fn get_job<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<UploadJob, JobClientError>> {
        Box::pin(JobClient::get_job(self, job_id))
    }

    fn update_job<'a>(
        &'a self,
        job_id: &'a str,
        patch: &'a JobPatch,
        append: bool,
    ) -> BoxFuture<'a, Result<(), JobClientError>> {
        Box::pin(JobClient::update_job(self, job_id, patch, append))
    }

    fn wait_for_job_to_exist<'a>(
        &'a self,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<(), JobClientError>> {
        Box::pin(JobClient::wait_for_job_to_exist(self, job_id))
    }
}

impl FileCatalog for CatalogClient {
    fn file_exists_by_md5_and_name<'a>(
        &'a self,
        md5: &'a str,
        file_name: &'a str,
    ) -> BoxFuture<'a, Result<bool, CatalogError>> {
        Box::pin(CatalogClient::file_exists_by_md5_and_name(self, md5, file_name))
    }
}
