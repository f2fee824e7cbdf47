// resdedup_core/src/source.rs
use crate::error::Result;
use crate::read::extract::safe_join;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Strong content digest used to confirm fingerprint matches.
pub type Digest = blake3::Hash;

/// Lazily loads entry content by archive path.
pub trait ContentSource {
    /// Digest of the entry's bytes, `None` when the entry has no backing content.
    fn digest(&mut self, path: &str) -> Result<Option<Digest>>;
}

/// The unpacked file tree of one archive.
pub struct ExtractedTree {
    root: PathBuf,
}

impl ExtractedTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, rel: &str) -> Result<PathBuf> {
        safe_join(&self.root, rel)
    }
}

impl ContentSource for ExtractedTree {
    fn digest(&mut self, path: &str) -> Result<Option<Digest>> {
        let p = self.path_of(path)?;
        let f = match File::open(&p) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut hasher = blake3::Hasher::new();
        hasher.update_reader(f)?;
        Ok(Some(hasher.finalize()))
    }
}

/// Reads entries straight from the archive; used when nothing is unpacked.
pub struct ArchiveSource {
    zip: ZipArchive<File>,
}

impl ArchiveSource {
    pub fn open(archive: &Path) -> Result<Self> {
        Ok(Self {
            zip: ZipArchive::new(File::open(archive)?)?,
        })
    }
}

impl ContentSource for ArchiveSource {
    fn digest(&mut self, path: &str) -> Result<Option<Digest>> {
        let mut f = match self.zip.by_name(path) {
            Ok(f) => f,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut hasher = blake3::Hasher::new();
        io::copy(&mut f, &mut hasher)?;
        Ok(Some(hasher.finalize()))
    }
}
