use crate::domain::ArchiveEntry;
use crate::error::{DedupError, Result};
use crate::table::ResourceTable;

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

fn entry_from<R: Read>(f: &zip::read::ZipFile<'_, R>) -> ArchiveEntry {
    ArchiveEntry {
        path: f.name().to_string(),
        size: f.size(),
        compressed_size: f.compressed_size(),
        crc32: f.crc32(),
        method: f.compression().into(),
        is_dir: f.is_dir(),
        modified: f.last_modified(),
        unix_mode: f.unix_mode(),
    }
}

/// Central-directory listing, in archive order.
pub fn list_entries(archive: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut out = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let f = zip.by_index_raw(i)?;
        out.push(entry_from(&f));
    }
    Ok(out)
}

/// Unpacks every entry under `dest` and returns the listing, in archive order.
pub fn extract(archive: &Path, dest: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    fs::create_dir_all(dest)?;

    let mut entries = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut f = zip.by_index(i)?;
        let entry = entry_from(&f);
        let outp = safe_join(dest, &entry.path)?;
        if entry.is_dir {
            fs::create_dir_all(&outp)?;
        } else {
            if let Some(parent) = outp.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&outp)?;
            let n = io::copy(&mut f, &mut out)?;
            if n != entry.size {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("extracted size mismatch for {}", entry.path),
                )
                .into());
            }
        }
        entries.push(entry);
    }
    tracing::debug!(entries = entries.len(), dest = %dest.display(), "extracted archive");
    Ok(entries)
}

/// Reads one entry fully without unpacking the rest.
pub fn read_entry(archive: &Path, name: &str) -> Result<Vec<u8>> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut f = zip.by_name(name)?;
    let mut buf = Vec::with_capacity(f.size() as usize);
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Parses the resource table straight out of an archive.
pub fn read_table(archive: &Path, table_name: &str) -> Result<ResourceTable> {
    let bytes = read_entry(archive, table_name)?;
    ResourceTable::parse(&bytes)
}

/// Joins an archive-relative name under `root`, refusing anything that could escape it.
pub(crate) fn safe_join(root: &Path, rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);
    if rel.is_empty() || rel.contains('\\') {
        return Err(DedupError::UnsafePath(rel.to_string()));
    }
    for c in p.components() {
        match c {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(DedupError::UnsafePath(rel.to_string())),
        }
    }
    Ok(root.join(p))
}
