use std::path::{Component, Path};

use crate::TransferError;

/// Validates the name a file is written under inside an upload directory.
///
/// Rejects:
/// - Empty names
/// - Anything with more than one path component (`a/b`, `./a`)
/// - Parent directory references (`..`)
/// - Absolute paths and Windows prefixes (`/a`, `C:\a`)
pub fn validate_file_name(file_name: &str) -> Result<(), TransferError> {
    if file_name.is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }

    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidPath(format!(
            "parent directory traversal not allowed: {file_name}"
        ))),
        (Some(Component::RootDir | Component::Prefix(_)), _) => Err(TransferError::InvalidPath(
            format!("absolute path not allowed: {file_name}"),
        )),
        _ => Err(TransferError::InvalidPath(format!(
            "file name must be a single path component: {file_name}"
        ))),
    }
}
