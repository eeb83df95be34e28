use chrono::{Local, NaiveDateTime};

use crate::entry::FileHandle;
use crate::normalize::ArchiveNaming;

/// The one file offered per send.
#[derive(Debug, Clone)]
pub enum TransferArtifact {
    /// The selected file, unmodified.
    Passthrough(FileHandle),
    /// A synthesized archive of the selection.
    Archive(FileHandle),
}

impl TransferArtifact {
    pub fn file(&self) -> &FileHandle {
        match self {
            TransferArtifact::Passthrough(f) | TransferArtifact::Archive(f) => f,
        }
    }

    pub fn into_file(self) -> FileHandle {
        match self {
            TransferArtifact::Passthrough(f) | TransferArtifact::Archive(f) => f,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, TransferArtifact::Archive(_))
    }
}

/// Names an archive: `<dir>.zip`, `<folder>.zip`, or a `YYYYMMDDHHMMSS.zip`
/// timestamp taken from `now`.
pub fn archive_name(naming: &ArchiveNaming, now: NaiveDateTime) -> String {
    match naming {
        ArchiveNaming::Directory(name) | ArchiveNaming::FolderPicker(name) => {
            format!("{name}.zip")
        }
        ArchiveNaming::Loose => timestamp_archive_name(now),
    }
}

/// `YYYYMMDDHHMMSS.zip`.
pub fn timestamp_archive_name(now: NaiveDateTime) -> String {
    format!("{}.zip", now.format("%Y%m%d%H%M%S"))
}

/// Local wall clock used for archive names.
pub(crate) fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn directory_naming() {
        let name = archive_name(&ArchiveNaming::Directory("Photos".into()), at(2024, 1, 1, 0, 0, 0));
        assert_eq!(name, "Photos.zip");
    }

    #[test]
    fn folder_picker_naming() {
        let name = archive_name(&ArchiveNaming::FolderPicker("2023".into()), at(2024, 1, 1, 0, 0, 0));
        assert_eq!(name, "2023.zip");
    }

    #[test]
    fn loose_naming_is_zero_padded_timestamp() {
        let name = archive_name(&ArchiveNaming::Loose, at(2024, 3, 7, 9, 5, 2));
        assert_eq!(name, "20240307090502.zip");
    }

    #[test]
    fn timestamp_name_shape() {
        let name = timestamp_archive_name(local_now());
        assert_eq!(name.len(), 18);
        assert!(name[..14].chars().all(|c| c.is_ascii_digit()));
        assert!(name.ends_with(".zip"));
    }

    #[test]
    fn artifact_accessors() {
        let artifact = TransferArtifact::Passthrough(FileHandle::from_bytes("a", b"a".to_vec()));
        assert!(!artifact.is_archive());
        assert_eq!(artifact.file().name(), "a");
        assert_eq!(artifact.into_file().size(), 1);
    }
}
