use std::path::Path;

use serde::{Deserialize, Serialize};

/// Describes the local file an upload request refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// Absolute path of the file on the uploading machine.
    pub original_path: String,
    /// File type understood by the FMS (e.g. `image`, `csv`, `zeiss`).
    pub file_type: String,
    /// Name to store the file under. Defaults to the basename of `original_path`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_name: String,
}

/// A single annotation applied to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Caller-supplied metadata attached to an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,
}

/// File + metadata handed to the coordinator to start an upload.
///
/// A copy of this is persisted in `serviceFields.files` so a failed job can
/// be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file: FileDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_metadata: Option<CustomMetadata>,
}

impl UploadRequest {
    /// Creates a request for `path` with no custom metadata.
    pub fn new(path: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            file: FileDescriptor {
                original_path: path.into(),
                file_type: file_type.into(),
                file_name: String::new(),
            },
            custom_metadata: None,
        }
    }

    /// Name the file is stored under on the server.
    pub fn file_name(&self) -> String {
        if !self.file.file_name.is_empty() {
            return self.file.file_name.clone();
        }
        Path::new(&self.file.original_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Progress of a single file copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub source_path: String,
    pub bytes_copied: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Returns the copy progress as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        self.bytes_copied as f64 / self.total_bytes as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_request_field_names() {
        let json = r#"{
            "file": {"originalPath": "/data/a.czi", "fileType": "zeiss"},
            "customMetadata": {"annotations": [{"name": "Well", "values": ["A1"]}], "templateId": 7}
        }"#;
        let req: UploadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.file.original_path, "/data/a.czi");
        assert_eq!(req.file.file_type, "zeiss");
        let meta = req.custom_metadata.unwrap();
        assert_eq!(meta.annotations[0].values, vec!["A1".to_string()]);
        assert_eq!(meta.template_id, Some(7));
    }

    #[test]
    fn upload_request_omits_empty() {
        let req = UploadRequest::new("/data/a.czi", "zeiss");
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("fileName"));
        assert!(!json.contains("customMetadata"));
    }

    #[test]
    fn file_name_defaults_to_basename() {
        let mut req = UploadRequest::new("/data/plate/a.czi", "zeiss");
        assert_eq!(req.file_name(), "a.czi");

        req.file.file_name = "renamed.czi".into();
        assert_eq!(req.file_name(), "renamed.czi");
    }

    #[test]
    fn progress_percentage() {
        let p = UploadProgress {
            source_path: "/a".into(),
            bytes_copied: 250,
            total_bytes: 1000,
        };
        assert!((p.percentage() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn progress_percentage_empty_file() {
        let p = UploadProgress {
            source_path: "/a".into(),
            bytes_copied: 0,
            total_bytes: 0,
        };
        assert!((p.percentage() - 100.0).abs() < f64::EPSILON);
    }
}
