//! Folder picker.
//!
//! Recursively lists a directory the way a browser folder picker does: one
//! flat list of files, each carrying a relative path that starts with the
//! picked folder's own name and uses `/` as separator.

use std::path::Path;

use crate::TransferError;
use crate::entry::FileHandle;

/// Lists every file under `root` with `RootName/sub/file` relative paths.
///
/// Files are sorted by relative path.
pub fn pick_folder(root: &Path) -> Result<Vec<FileHandle>, TransferError> {
    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| TransferError::InvalidPath(root.display().to_string()))?;

    let mut files = Vec::new();
    walk_dir(root, root, &root_name, &mut files)?;
    files.sort_by(|a, b| a.relative_path().cmp(&b.relative_path()));
    Ok(files)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    root_name: &str,
    files: &mut Vec<FileHandle>,
) -> Result<(), TransferError> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        // Symlinks are not followed, so a link to an ancestor cannot loop.
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(root, &path, root_name, files)?;
        } else if metadata.is_file() {
            let rel_path = path.strip_prefix(root).map_err(std::io::Error::other)?;

            // Normalize to forward slashes.
            let rel_str = rel_path.to_string_lossy().replace('\\', "/");

            files.push(
                FileHandle::from_path_with_size(&path, metadata.len())
                    .with_relative_path(format!("{root_name}/{rel_str}")),
            );
        }
    }

    Ok(())
}
