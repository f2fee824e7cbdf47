#![forbid(unsafe_code)]

pub mod domain;
pub mod error;
pub mod policy;

pub mod util {
    pub mod crc_forward;
}

pub mod table;

pub mod read {
    pub mod extract;
}

pub mod index {
    pub mod fingerprint;
}

pub mod source;
pub mod resolve;
pub mod edit;

pub mod pack {
    pub mod writer;
}

pub mod report;
pub mod pipeline;

// Re-exports: stable API surface
pub use domain::{ArchiveEntry, StorageMethod};
pub use error::{DedupError, Result};
pub use pipeline::{analyze_archive, process_archive, process_archive_with};
pub use policy::{DEFAULT_TABLE_NAME, FingerprintPolicy, MergeOptions, StoragePolicy};
pub use read::extract::{list_entries, read_table};
pub use report::{MergeReport, human_bytes};
pub use resolve::{MergeWarning, MergedGroup, RewritePlan};
pub use table::ResourceTable;
