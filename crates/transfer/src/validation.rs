use std::path::{Component, Path};

use crate::TransferError;

/// Validates that a file name is a single plain path component.
///
/// Downloads are saved under the uploaded file's name, so the name must
/// not be able to address anything outside the target directory.
///
/// Rejects:
/// - Empty names
/// - Absolute paths and Windows prefixes (`C:`, `\\server`)
/// - `.` and `..`
/// - Names containing a path separator
pub fn validate_file_name(file_name: &str) -> Result<(), TransferError> {
    if file_name.is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }

    if file_name.contains('/') || file_name.contains('\\') {
        return Err(TransferError::InvalidPath(format!(
            "path separator not allowed: {file_name}"
        )));
    }

    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidPath(format!(
            "parent directory traversal not allowed: {file_name}"
        ))),
        (Some(Component::Prefix(_)), _) => Err(TransferError::InvalidPath(format!(
            "path prefix not allowed: {file_name}"
        ))),
        _ => Err(TransferError::InvalidPath(format!(
            "not a plain file name: {file_name}"
        ))),
    }
}
