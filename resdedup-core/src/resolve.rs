//! Turns fingerprint buckets into canonical/duplicate assignments.
//!
//! A bucket only says that entries *look* alike. Every candidate is
//! confirmed against the bucket's first entry by a strong digest of the
//! actual content before it is planned for merging. Anything that cannot
//! be confirmed is left alone and surfaces as a [`MergeWarning`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::fingerprint::FingerprintIndex;
use crate::source::ContentSource;

/// Recoverable conditions; the affected entries are kept as they are.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeWarning {
    /// Same fingerprint, different content.
    FingerprintCollision { canonical: String, candidate: String },
    /// Listed in the archive but absent from the content source, e.g. after
    /// two names collapsed on a case-insensitive file system.
    MissingExtractedFile { path: String },
}

impl std::fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeWarning::FingerprintCollision {
                canonical,
                candidate,
            } => write!(
                f,
                "{canonical} and {candidate} share a fingerprint but differ in content"
            ),
            MergeWarning::MissingExtractedFile { path } => write!(
                f,
                "{path} is missing from the extracted tree (case-insensitive file system?)"
            ),
        }
    }
}

/// A confirmed duplicate: its bytes equal those of `canonical`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub path: String,
    pub canonical: String,
    pub size: u64,
}

/// One collapsed group as it appears in the report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedGroup {
    pub canonical: String,
    pub duplicates: Vec<String>,
}

/// Everything the editor and the rebuilder act on. Both read the same plan,
/// so they cannot disagree on which entry survives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewritePlan {
    substitutions: BTreeMap<String, String>,
    deletions: Vec<Deletion>,
}

impl RewritePlan {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deletions.len()
    }

    /// Canonical path for a planned duplicate.
    pub fn canonical_for(&self, path: &str) -> Option<&str> {
        self.substitutions.get(path).map(String::as_str)
    }

    /// (duplicate, canonical) pairs, ordered by duplicate path.
    pub fn substitutions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.substitutions
            .iter()
            .map(|(d, c)| (d.as_str(), c.as_str()))
    }

    /// Files to delete, in resolution order.
    pub fn deletions(&self) -> &[Deletion] {
        &self.deletions
    }

    pub fn reclaimed_bytes(&self) -> u64 {
        self.deletions.iter().map(|d| d.size).sum()
    }

    fn push(&mut self, path: &str, canonical: &str, size: u64) {
        self.substitutions
            .insert(path.to_string(), canonical.to_string());
        self.deletions.push(Deletion {
            path: path.to_string(),
            canonical: canonical.to_string(),
            size,
        });
    }
}

#[derive(Clone, Debug, Default)]
pub struct Resolution {
    pub plan: RewritePlan,
    pub groups: Vec<MergedGroup>,
    pub warnings: Vec<MergeWarning>,
}

pub fn resolve(index: &FingerprintIndex, source: &mut dyn ContentSource) -> Result<Resolution> {
    let mut res = Resolution::default();

    for group in index.duplicate_groups() {
        let canonical = &group.entries[0];
        let Some(canonical_digest) = source.digest(&canonical.path)? else {
            tracing::warn!(path = %canonical.path, "canonical entry missing, group skipped");
            res.warnings.push(MergeWarning::MissingExtractedFile {
                path: canonical.path.clone(),
            });
            continue;
        };

        let mut duplicates = Vec::new();
        for candidate in &group.entries[1..] {
            if candidate.path == canonical.path {
                tracing::warn!(path = %candidate.path, "entry name listed twice, not merged");
                continue;
            }
            match source.digest(&candidate.path)? {
                None => {
                    tracing::warn!(path = %candidate.path, "duplicate candidate missing, not merged");
                    res.warnings.push(MergeWarning::MissingExtractedFile {
                        path: candidate.path.clone(),
                    });
                }
                Some(d) if d != canonical_digest => {
                    tracing::warn!(
                        canonical = %canonical.path,
                        candidate = %candidate.path,
                        "fingerprint collision, not merged"
                    );
                    res.warnings.push(MergeWarning::FingerprintCollision {
                        canonical: canonical.path.clone(),
                        candidate: candidate.path.clone(),
                    });
                }
                Some(_) => {
                    tracing::debug!(duplicate = %candidate.path, canonical = %canonical.path, "merge");
                    res.plan
                        .push(&candidate.path, &canonical.path, candidate.size);
                    duplicates.push(candidate.path.clone());
                }
            }
        }

        if !duplicates.is_empty() {
            res.groups.push(MergedGroup {
                canonical: canonical.path.clone(),
                duplicates,
            });
        }
    }

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArchiveEntry, StorageMethod};
    use crate::policy::FingerprintPolicy;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemorySource {
        files: HashMap<String, Vec<u8>>,
    }

    impl ContentSource for MemorySource {
        fn digest(&mut self, path: &str) -> Result<Option<crate::source::Digest>> {
            Ok(self.files.get(path).map(|b| blake3::hash(b)))
        }
    }

    fn entry(path: &str, crc32: u32, size: u64) -> ArchiveEntry {
        ArchiveEntry {
            path: path.to_string(),
            size,
            compressed_size: size,
            crc32,
            method: StorageMethod::Deflated,
            is_dir: false,
            modified: None,
            unix_mode: None,
        }
    }

    fn source(files: &[(&str, &[u8])]) -> MemorySource {
        MemorySource {
            files: files
                .iter()
                .map(|(p, b)| (p.to_string(), b.to_vec()))
                .collect(),
        }
    }

    fn run(entries: &[ArchiveEntry], src: &mut MemorySource) -> Resolution {
        let idx = FingerprintIndex::build(entries, FingerprintPolicy::ContentAndExtension, &[]);
        resolve(&idx, src).unwrap()
    }

    #[test]
    fn merges_confirmed_duplicates() {
        let x = vec![1u8; 2048];
        let y = vec![2u8; 512];
        let entries = [
            entry("img/a.png", 111, 2048),
            entry("img/b.png", 111, 2048),
            entry("img/c.png", 222, 512),
        ];
        let mut src = source(&[("img/a.png", &x), ("img/b.png", &x), ("img/c.png", &y)]);
        let res = run(&entries, &mut src);

        assert_eq!(res.plan.canonical_for("img/b.png"), Some("img/a.png"));
        assert_eq!(res.plan.canonical_for("img/a.png"), None);
        assert_eq!(res.plan.len(), 1);
        assert_eq!(res.plan.reclaimed_bytes(), 2048);
        assert_eq!(
            res.groups,
            vec![MergedGroup {
                canonical: "img/a.png".into(),
                duplicates: vec!["img/b.png".into()],
            }]
        );
        assert!(res.warnings.is_empty());
    }

    #[test]
    fn collision_is_reported_not_merged() {
        let entries = [entry("a.png", 7, 3), entry("b.png", 7, 3)];
        let mut src = source(&[("a.png", b"abc"), ("b.png", b"xyz")]);
        let res = run(&entries, &mut src);

        assert!(res.plan.is_empty());
        assert!(res.groups.is_empty());
        assert_eq!(
            res.warnings,
            vec![MergeWarning::FingerprintCollision {
                canonical: "a.png".into(),
                candidate: "b.png".into(),
            }]
        );
    }

    #[test]
    fn missing_candidate_is_skipped() {
        let entries = [
            entry("a.png", 7, 3),
            entry("B.png", 7, 3),
            entry("c.png", 7, 3),
        ];
        let mut src = source(&[("a.png", b"abc"), ("c.png", b"abc")]);
        let res = run(&entries, &mut src);

        assert_eq!(res.plan.canonical_for("c.png"), Some("a.png"));
        assert_eq!(res.plan.canonical_for("B.png"), None);
        assert_eq!(
            res.warnings,
            vec![MergeWarning::MissingExtractedFile {
                path: "B.png".into()
            }]
        );
    }

    #[test]
    fn missing_canonical_skips_group() {
        let entries = [entry("a.png", 7, 3), entry("b.png", 7, 3)];
        let mut src = source(&[("b.png", b"abc")]);
        let res = run(&entries, &mut src);
        assert!(res.plan.is_empty());
        assert_eq!(res.warnings.len(), 1);
    }

    #[test]
    fn canonical_is_never_a_duplicate() {
        let entries = [
            entry("a.png", 1, 3),
            entry("b.png", 1, 3),
            entry("c.png", 1, 3),
            entry("d.xml", 2, 3),
            entry("e.xml", 2, 3),
        ];
        let mut src = source(&[
            ("a.png", b"abc"),
            ("b.png", b"abc"),
            ("c.png", b"abc"),
            ("d.xml", b"xyz"),
            ("e.xml", b"xyz"),
        ]);
        let res = run(&entries, &mut src);
        for (dup, canon) in res.plan.substitutions() {
            assert_ne!(dup, canon);
            assert!(res.plan.canonical_for(canon).is_none());
        }
        assert_eq!(res.plan.len(), 3);
    }
}
