use std::path::{Component, Path};

use crate::TransferError;

/// Validates a path that will be written into an archive or joined onto a
/// download directory.
///
/// Rejects empty paths, absolute paths, `..` traversal and Windows prefix
/// components. Trailing `/` (directory entries) is fine.
pub fn validate_entry_path(entry_path: &str) -> Result<(), TransferError> {
    if entry_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    let path = Path::new(entry_path);

    if path.is_absolute() || entry_path.starts_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {entry_path}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {entry_path}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "path prefix not allowed: {entry_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

/// Reduces a server-provided file name to a single safe path segment.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "download".into(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_path() {
        assert!(validate_entry_path("").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_entry_path("../../../etc/passwd").is_err());
        assert!(validate_entry_path("Photos/../../escape").is_err());
        assert!(validate_entry_path("..").is_err());
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(validate_entry_path("/tmp/malicious").is_err());
    }

    #[test]
    fn accepts_archive_paths() {
        assert!(validate_entry_path("a.txt").is_ok());
        assert!(validate_entry_path("Photos/2023/a.jpg").is_ok());
        assert!(validate_entry_path("Photos/empty/").is_ok());
        assert!(validate_entry_path(".hidden/file").is_ok());
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\x\\a.txt"), "a.txt");
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
    }

    #[test]
    fn sanitize_falls_back_for_empty_names() {
        assert_eq!(sanitize_file_name(""), "download");
        assert_eq!(sanitize_file_name(".."), "download");
        assert_eq!(sanitize_file_name("dir/"), "download");
    }
}
