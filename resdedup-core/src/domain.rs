// resdedup_core/src/domain.rs
use serde::{Deserialize, Serialize};

/// How an entry's bytes sit in the archive container.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageMethod {
    Stored,
    Deflated,
}

impl From<zip::CompressionMethod> for StorageMethod {
    fn from(m: zip::CompressionMethod) -> Self {
        match m {
            zip::CompressionMethod::Stored => StorageMethod::Stored,
            // anything else is re-encoded with deflate on rebuild
            _ => StorageMethod::Deflated,
        }
    }
}

impl From<StorageMethod> for zip::CompressionMethod {
    fn from(m: StorageMethod) -> Self {
        match m {
            StorageMethod::Stored => zip::CompressionMethod::Stored,
            StorageMethod::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

/// One physical entry as listed in the source archive's central directory.
#[derive(Clone, Debug)]
pub struct ArchiveEntry {
    /// Archive-relative, `/`-separated, case-sensitive.
    pub path: String,
    pub size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
    pub method: StorageMethod,
    pub is_dir: bool,
    pub modified: Option<zip::DateTime>,
    pub unix_mode: Option<u32>,
}

impl ArchiveEntry {
    /// Text after the last `.` of the file name, empty when there is none.
    pub fn extension(&self) -> &str {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((_, ext)) => ext,
            None => "",
        }
    }

    pub fn file_name(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some((_, name)) => name,
            None => &self.path,
        }
    }

    /// Containing directory, empty for entries at the archive root.
    pub fn parent_dir(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        }
    }
}
