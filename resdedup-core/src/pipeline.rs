use crate::edit::apply_plan;
use crate::error::Result;
use crate::index::fingerprint::FingerprintIndex;
use crate::pack::writer::{StagedArchive, delete_duplicates, repack, write_table};
use crate::policy::MergeOptions;
use crate::read::extract::{extract, list_entries};
use crate::report::{MergeReport, StagedReport};
use crate::resolve::resolve;
use crate::source::{ArchiveSource, ExtractedTree};
use crate::table::ResourceTable;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Removes the extraction directory when processing ends, however it ends.
struct ScratchDir<'a> {
    path: &'a Path,
}

impl<'a> ScratchDir<'a> {
    /// Starts from an empty directory, clearing leftovers of an earlier run.
    /// Refuses a directory that holds any of `keep`.
    fn create(path: &'a Path, keep: &[&Path]) -> Result<Self> {
        let root = resolved(path)?;
        for k in keep {
            if resolved(k)?.starts_with(&root) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "scratch dir {} would contain {}",
                        path.display(),
                        k.display()
                    ),
                )
                .into());
            }
        }
        match fs::remove_dir_all(path) {
            Ok(()) => tracing::debug!(dir = %path.display(), "cleared stale scratch dir"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(path)?;
        Ok(Self { path })
    }
}

impl Drop for ScratchDir<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(dir = %self.path.display(), error = %e, "could not remove scratch dir");
            }
        }
    }
}

/// Absolute form of `p` with every existing ancestor canonicalized, so a
/// path that does not exist yet still compares against real ones.
fn resolved(p: &Path) -> Result<PathBuf> {
    let abs = std::path::absolute(p)?;
    let mut base = abs.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(real) = base.canonicalize() {
            let mut out = real;
            out.extend(rest.iter().rev());
            return Ok(out);
        }
        match (base.parent(), base.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name);
                base = parent;
            }
            _ => return Ok(abs.clone()),
        }
    }
}

/// Renames the archive into place, then the report. A report only exists
/// for an archive that was actually replaced.
fn commit(staged: StagedArchive, archive: &Path, report: StagedReport) -> Result<()> {
    staged.persist(archive)?;
    report.persist()
}

/// Merges duplicate entries of `archive` in place and writes the report.
///
/// `store_verbatim` names entries (by path or file name) that must stay
/// stored; the resource table always does.
pub fn process_archive<I, S>(
    archive: &Path,
    extraction_root: &Path,
    report_path: &Path,
    store_verbatim: I,
) -> Result<MergeReport>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let opts = MergeOptions::with_store_verbatim(store_verbatim);
    process_archive_with(archive, extraction_root, report_path, &opts)
}

pub fn process_archive_with(
    archive: &Path,
    extraction_root: &Path,
    report_path: &Path,
    opts: &MergeOptions,
) -> Result<MergeReport> {
    let span = tracing::info_span!("archive", path = %archive.display());
    let _enter = span.enter();
    tracing::info!(policy = ?opts.fingerprint, "merging duplicated resources");

    let _scratch = ScratchDir::create(extraction_root, &[archive, report_path])?;
    let entries = extract(archive, extraction_root)?;
    let mut tree = ExtractedTree::new(extraction_root);

    let table_path = tree.path_of(&opts.table_name)?;
    let mut table = match fs::read(&table_path) {
        Ok(bytes) => ResourceTable::parse(&bytes)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found in {}", opts.table_name, archive.display()),
            )
            .into());
        }
        Err(e) => return Err(e.into()),
    };

    let index = FingerprintIndex::build(&entries, opts.fingerprint, &[opts.table_name.as_str()]);
    let resolution = resolve(&index, &mut tree)?;

    // serialize before touching the tree: an encoding failure must leave
    // every file in place
    let edit = apply_plan(&mut table, &resolution.plan)?;
    let table_bytes = table.to_bytes()?;

    let scratch_freed = delete_duplicates(&tree, &resolution.plan)?;
    if edit.strings_rewritten > 0 {
        write_table(&tree, &opts.table_name, &table_bytes)?;
    }
    let staged = repack(&tree, &entries, &resolution.plan, opts, archive)?;

    let report = MergeReport::from_resolution(&resolution);
    let report_file = report.stage(report_path)?;
    commit(staged, archive, report_file)?;

    tracing::info!(
        removed = report.removed_count,
        size = %report.removed_size(),
        scratch_freed,
        warnings = report.warnings.len(),
        "done"
    );
    Ok(report)
}

/// Fingerprints and confirms duplicates without extracting or writing
/// anything; content is read straight from the archive.
pub fn analyze_archive(archive: &Path, opts: &MergeOptions) -> Result<MergeReport> {
    let entries = list_entries(archive)?;
    let index = FingerprintIndex::build(&entries, opts.fingerprint, &[opts.table_name.as_str()]);
    let mut source = ArchiveSource::open(archive)?;
    let resolution = resolve(&index, &mut source)?;
    Ok(MergeReport::from_resolution(&resolution))
}
