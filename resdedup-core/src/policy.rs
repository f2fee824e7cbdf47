use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_TABLE_NAME: &str = "resources.arsc";

/// Which metadata buckets candidate duplicates. A run uses exactly one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FingerprintPolicy {
    /// (CRC-32, size, extension): merges across directories.
    #[default]
    ContentAndExtension,
    /// (parent directory, CRC-32): merges only inside one directory.
    SameDirectory,
}

/// Compression for entries outside the store-verbatim set.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoragePolicy {
    #[default]
    PreserveSource,
    DeflateAll,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeOptions {
    pub fingerprint: FingerprintPolicy,
    /// Entry paths or file names that must be written with method = stored.
    pub store_verbatim: BTreeSet<String>,
    pub table_name: String,
    pub compression: StoragePolicy,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            fingerprint: FingerprintPolicy::default(),
            store_verbatim: BTreeSet::from([DEFAULT_TABLE_NAME.to_string()]),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            compression: StoragePolicy::default(),
        }
    }
}

impl MergeOptions {
    /// Options with extra verbatim names; the table is always among them.
    pub fn with_store_verbatim<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut opts = Self::default();
        opts.store_verbatim.extend(names.into_iter().map(Into::into));
        opts
    }

    pub fn is_store_verbatim(&self, path: &str) -> bool {
        let name = path.rsplit_once('/').map(|(_, n)| n).unwrap_or(path);
        path == self.table_name
            || self.store_verbatim.contains(path)
            || self.store_verbatim.contains(name)
    }
}
