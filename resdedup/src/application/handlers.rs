use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use resdedup_core::error::Result;
use resdedup_core::{
    FingerprintPolicy, MergeOptions, MergeReport, StoragePolicy, analyze_archive,
    process_archive_with, read_table,
};

fn other(msg: impl Into<String>) -> resdedup_core::DedupError {
    io::Error::new(io::ErrorKind::Other, msg.into()).into()
}

/// Scratch dir and report path for one archive.
fn artifact_paths(
    archive: &Path,
    scratch_dir: Option<&Path>,
    report_dir: Option<&Path>,
) -> (PathBuf, PathBuf) {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let parent = match archive.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let scratch = match scratch_dir {
        Some(d) => d.join(&stem),
        None => parent.join(format!("{stem}-unpacked")),
    };
    let report = report_dir
        .unwrap_or(parent)
        .join(format!("{stem}-duplicated.txt"));
    (scratch, report)
}

pub fn handle_merge(
    archives: Vec<PathBuf>,
    scratch_dir: Option<PathBuf>,
    report_dir: Option<PathBuf>,
    store: Vec<String>,
    policy: FingerprintPolicy,
    compression: StoragePolicy,
    json: bool,
) -> Result<()> {
    let mut opts = MergeOptions::with_store_verbatim(store);
    opts.fingerprint = policy;
    opts.compression = compression;

    let jobs: Vec<(PathBuf, PathBuf, PathBuf)> = archives
        .into_iter()
        .map(|a| {
            let (scratch, report) = artifact_paths(&a, scratch_dir.as_deref(), report_dir.as_deref());
            (a, scratch, report)
        })
        .collect();

    // parallel runs must not share a scratch dir or a report
    let mut taken = HashSet::new();
    for (archive, scratch, report) in &jobs {
        if !taken.insert(scratch) || !taken.insert(report) {
            return Err(other(format!(
                "{} clashes with another archive's scratch dir or report",
                archive.display()
            )));
        }
    }

    let results: Vec<(&PathBuf, Result<MergeReport>)> = jobs
        .par_iter()
        .map(|(archive, scratch, report)| {
            (archive, process_archive_with(archive, scratch, report, &opts))
        })
        .collect();

    let total = results.len();
    let mut failed = 0usize;
    let mut summaries = Vec::new();
    for (archive, outcome) in results {
        match outcome {
            Ok(report) if json => summaries.push(serde_json::json!({
                "archive": archive.display().to_string(),
                "removed_count": report.removed_count,
                "removed_bytes": report.removed_bytes,
                "removed_size": report.removed_size(),
                "groups": report.groups.len(),
                "warnings": report.warnings.len(),
            })),
            Ok(report) => println!(
                "{}: removed count:{} removed size:{}",
                archive.display(),
                report.removed_count,
                report.removed_size()
            ),
            Err(e) => {
                failed += 1;
                tracing::error!(archive = %archive.display(), error = %e, "merge failed");
            }
        }
    }

    if json {
        let out = serde_json::to_string_pretty(&summaries)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        println!("{out}");
    }

    if failed > 0 {
        return Err(other(format!("{failed} of {total} archives failed")));
    }
    Ok(())
}

pub fn handle_find(archive: PathBuf, policy: FingerprintPolicy) -> Result<()> {
    let opts = MergeOptions {
        fingerprint: policy,
        ..MergeOptions::default()
    };
    let report = analyze_archive(&archive, &opts)?;
    print!("{}", report.render());
    Ok(())
}

pub fn handle_inspect(archive: PathBuf, table: String, strings: bool) -> Result<()> {
    let table = read_table(&archive, &table)?;
    for line in table.describe()? {
        println!("{line}");
    }
    if strings {
        for (i, pool) in table.string_pools().into_iter().enumerate() {
            let enc = if pool.is_utf8() { "utf-8" } else { "utf-16" };
            println!("pool #{i}: {} strings ({enc})", pool.len());
            for (j, s) in pool.iter().enumerate() {
                println!("  {j:>5}  {s}");
            }
        }
    }
    Ok(())
}
