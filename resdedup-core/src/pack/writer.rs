use crate::domain::{ArchiveEntry, StorageMethod};
use crate::error::{DedupError, Result};
use crate::policy::{MergeOptions, StoragePolicy};
use crate::resolve::RewritePlan;
use crate::source::ExtractedTree;
use crate::util::crc_forward::CrcForward;

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{DateTime, ZipArchive, ZipWriter};

/// What went into the rebuilt archive for one file entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrittenEntry {
    pub path: String,
    pub method: StorageMethod,
    pub size: u64,
    pub crc32: u32,
}

/// A verified archive that has not replaced the original yet.
#[derive(Debug)]
pub struct StagedArchive {
    tmp: NamedTempFile,
    pub written: Vec<WrittenEntry>,
}

impl StagedArchive {
    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    pub fn persist(self, dest: &Path) -> Result<()> {
        self.tmp.persist(dest).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Removes every planned duplicate from the unpacked tree and returns the
/// bytes freed on disk. A duplicate that is already gone frees nothing; it
/// is still left out by [`repack`].
pub fn delete_duplicates(tree: &ExtractedTree, plan: &RewritePlan) -> Result<u64> {
    let mut freed = 0u64;
    for d in plan.deletions() {
        let p = tree.path_of(&d.path)?;
        match fs::remove_file(&p) {
            Ok(()) => freed += d.size,
            // already gone: both names mapped to one file on disk
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %d.path, "duplicate already absent from extracted tree");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(freed)
}

/// Overwrites the table file in the unpacked tree.
pub fn write_table(tree: &ExtractedTree, table_name: &str, bytes: &[u8]) -> Result<()> {
    let p = tree.path_of(table_name)?;
    fs::write(p, bytes)?;
    Ok(())
}

/// Packs the unpacked tree into a temporary archive next to `archive`.
///
/// Surviving entries keep the source order, timestamps and unix modes.
/// Files that only exist in the tree are appended in path order. The result
/// is re-read and checked before it is handed back.
pub fn repack(
    tree: &ExtractedTree,
    source: &[ArchiveEntry],
    plan: &RewritePlan,
    opts: &MergeOptions,
    archive: &Path,
) -> Result<StagedArchive> {
    let dir = match archive.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".resdedup-")
        .suffix(".tmp")
        .tempfile_in(&dir)?;

    let mut written = Vec::new();
    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let mut seen: HashSet<&str> = HashSet::new();

        for e in source {
            if !seen.insert(e.path.as_str()) {
                tracing::warn!(path = %e.path, "entry listed twice, keeping the first");
                continue;
            }
            if plan.canonical_for(&e.path).is_some() {
                continue;
            }
            let options = entry_options(e.modified, e.unix_mode);
            if e.is_dir {
                zip.add_directory(e.path.as_str(), options)?;
                continue;
            }
            let method = method_for(&e.path, Some(e.method), opts);
            let src = tree.path_of(&e.path)?;
            written.push(write_file(&mut zip, &e.path, &src, method, options)?);
        }

        for (rel, src) in extra_files(tree, &seen)? {
            let md = fs::metadata(&src)?;
            let options = entry_options(mtime_from(&md), Some(mode_from(&md)));
            let method = method_for(&rel, None, opts);
            written.push(write_file(&mut zip, &rel, &src, method, options)?);
        }

        zip.finish()?;
    }
    tmp.as_file().sync_all()?;

    verify_written(tmp.path(), &written)?;
    tracing::debug!(entries = written.len(), tmp = %tmp.path().display(), "archive rebuilt");
    Ok(StagedArchive { tmp, written })
}

fn method_for(path: &str, source: Option<StorageMethod>, opts: &MergeOptions) -> StorageMethod {
    if opts.is_store_verbatim(path) {
        return StorageMethod::Stored;
    }
    match (opts.compression, source) {
        (StoragePolicy::PreserveSource, Some(m)) => m,
        _ => StorageMethod::Deflated,
    }
}

fn entry_options(modified: Option<DateTime>, unix_mode: Option<u32>) -> SimpleFileOptions {
    let mut o = SimpleFileOptions::default();
    if let Some(dt) = modified {
        o = o.last_modified_time(dt);
    }
    if let Some(mode) = unix_mode {
        o = o.unix_permissions(mode);
    }
    o
}

fn write_file<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    rel: &str,
    src: &Path,
    method: StorageMethod,
    options: SimpleFileOptions,
) -> Result<WrittenEntry> {
    let len = fs::metadata(src)?.len();
    let options = options
        .compression_method(method.into())
        .large_file(len >= u32::MAX as u64);
    zip.start_file(rel, options)?;

    let mut input = File::open(src)?;
    let mut fwd = CrcForward::new(&mut *zip);
    io::copy(&mut input, &mut fwd)?;
    Ok(WrittenEntry {
        path: rel.to_string(),
        method,
        size: fwd.counted,
        crc32: fwd.crc32(),
    })
}

/// Files under the tree that the source listing does not name, sorted.
fn extra_files(tree: &ExtractedTree, known: &HashSet<&str>) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for e in WalkDir::new(tree.root()).follow_links(false) {
        let e = e.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        if !e.file_type().is_file() {
            continue;
        }
        let Ok(rel) = e.path().strip_prefix(tree.root()) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !known.contains(rel.as_str()) {
            out.push((rel, e.path().to_path_buf()));
        }
    }
    out.sort();
    Ok(out)
}

/// Re-opens a written archive and checks every file entry against what was
/// streamed into it. Stored entries are also read back in full.
pub fn verify_written(path: &Path, written: &[WrittenEntry]) -> Result<()> {
    let mut zip = ZipArchive::new(File::open(path)?)?;
    let mut expected = written.iter();

    for i in 0..zip.len() {
        let f = zip.by_index_raw(i)?;
        if f.is_dir() {
            continue;
        }
        let name = f.name().to_string();
        let Some(w) = expected.next() else {
            return Err(DedupError::Verify(format!("unexpected entry {name}")));
        };
        if name != w.path {
            return Err(DedupError::Verify(format!(
                "entry {i} is {name}, expected {}",
                w.path
            )));
        }
        if f.crc32() != w.crc32 || f.size() != w.size {
            return Err(DedupError::Verify(format!(
                "{name}: crc {:08x}/{} recorded, {:08x}/{} written",
                f.crc32(),
                f.size(),
                w.crc32,
                w.size
            )));
        }
        let method = StorageMethod::from(f.compression());
        if method != w.method {
            return Err(DedupError::Verify(format!(
                "{name}: stored as {method:?}, wanted {:?}",
                w.method
            )));
        }
        if method == StorageMethod::Stored && f.compressed_size() != f.size() {
            return Err(DedupError::Verify(format!(
                "{name}: stored entry has compressed size {} for {} bytes",
                f.compressed_size(),
                f.size()
            )));
        }
        drop(f);

        if method == StorageMethod::Stored {
            // reading to the end makes the zip reader check the CRC
            let mut f = zip.by_index(i)?;
            io::copy(&mut f, &mut io::sink())?;
        }
    }

    if let Some(w) = expected.next() {
        return Err(DedupError::Verify(format!("{} missing", w.path)));
    }
    Ok(())
}

fn mode_from(_md: &fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        _md.permissions().mode()
    }
    #[cfg(not(unix))]
    {
        0o100644
    }
}

fn mtime_from(md: &fs::Metadata) -> Option<DateTime> {
    let t = OffsetDateTime::from(md.modified().ok()?);
    DateTime::from_date_and_time(
        u16::try_from(t.year()).ok()?,
        u8::from(t.month()),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
    )
    .ok()
}
