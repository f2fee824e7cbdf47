use std::collections::HashMap;

use crate::domain::ArchiveEntry;
use crate::policy::FingerprintPolicy;

/// Cheap composite key that buckets candidate duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    ContentAndExtension { crc32: u32, size: u64, extension: String },
    SameDirectory { dir: String, crc32: u32 },
}

impl Fingerprint {
    pub fn of(entry: &ArchiveEntry, policy: FingerprintPolicy) -> Self {
        match policy {
            FingerprintPolicy::ContentAndExtension => Fingerprint::ContentAndExtension {
                crc32: entry.crc32,
                size: entry.size,
                extension: entry.extension().to_string(),
            },
            FingerprintPolicy::SameDirectory => Fingerprint::SameDirectory {
                dir: entry.parent_dir().to_string(),
                crc32: entry.crc32,
            },
        }
    }
}

/// Entries sharing a fingerprint, in first-seen order.
#[derive(Clone, Debug)]
pub struct Bucket {
    pub fingerprint: Fingerprint,
    pub entries: Vec<ArchiveEntry>,
}

/// A bucket with at least two members; the first is the provisional canonical.
pub type DuplicateGroup = Bucket;

#[derive(Clone, Debug, Default)]
pub struct FingerprintIndex {
    buckets: Vec<Bucket>,
    by_key: HashMap<Fingerprint, usize>,
}

impl FingerprintIndex {
    /// Buckets every non-empty file entry; `exclude` names paths that never take part.
    pub fn build<'a>(
        entries: impl IntoIterator<Item = &'a ArchiveEntry>,
        policy: FingerprintPolicy,
        exclude: &[&str],
    ) -> Self {
        let mut idx = Self::default();
        for e in entries {
            if e.is_dir || e.size == 0 || exclude.contains(&e.path.as_str()) {
                continue;
            }
            idx.insert(e.clone(), policy);
        }
        idx
    }

    fn insert(&mut self, entry: ArchiveEntry, policy: FingerprintPolicy) {
        let key = Fingerprint::of(&entry, policy);
        match self.by_key.get(&key) {
            Some(&i) => self.buckets[i].entries.push(entry),
            None => {
                self.by_key.insert(key.clone(), self.buckets.len());
                self.buckets.push(Bucket {
                    fingerprint: key,
                    entries: vec![entry],
                });
            }
        }
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn get(&self, key: &Fingerprint) -> Option<&Bucket> {
        self.by_key.get(key).map(|&i| &self.buckets[i])
    }

    pub fn duplicate_groups(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.buckets.iter().filter(|b| b.entries.len() >= 2)
    }
}
