use crate::error::Result;
use crate::resolve::{MergeWarning, MergedGroup, Resolution};

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const SEPARATOR: &str = "----------------------------------------------";

/// Outcome of one archive: the merge trace plus aggregate savings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub groups: Vec<MergedGroup>,
    pub removed_count: usize,
    /// Sum of uncompressed sizes of every duplicate dropped from the
    /// archive, whether or not its extracted copy was still on disk.
    pub removed_bytes: u64,
    pub warnings: Vec<MergeWarning>,
}

impl MergeReport {
    pub fn from_resolution(res: &Resolution) -> Self {
        Self {
            groups: res.groups.clone(),
            removed_count: res.plan.len(),
            removed_bytes: res.plan.reclaimed_bytes(),
            warnings: res.warnings.clone(),
        }
    }

    pub fn removed_size(&self) -> String {
        human_bytes(self.removed_bytes)
    }

    /// Plain-text trace. Each group lists its canonical path, then one line
    /// per merged duplicate with the arrow aligned under the first one.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for g in &self.groups {
            let _ = writeln!(out, "{0} <--- {0}", g.canonical);
            let pad = " ".repeat(g.canonical.chars().count());
            for d in &g.duplicates {
                let _ = writeln!(out, "{pad} <--- {d}");
            }
            let _ = writeln!(out, "{SEPARATOR}");
        }
        if !self.warnings.is_empty() {
            let _ = writeln!(out, "skipped:");
            for w in &self.warnings {
                let _ = writeln!(out, "  {w}");
            }
            let _ = writeln!(out, "{SEPARATOR}");
        }
        let _ = writeln!(out, "removed count:{}", self.removed_count);
        let _ = writeln!(out, "removed size:{}", self.removed_size());
        out
    }

    /// Writes [`render`](Self::render) through a sibling temp file so a
    /// failed run never leaves a half-written report.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        self.stage(path)?.persist()
    }

    /// Renders into a temp file next to `path`; nothing appears at `path`
    /// until [`StagedReport::persist`].
    pub fn stage(&self, path: &Path) -> Result<StagedReport> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(self.render().as_bytes())?;
        tmp.as_file().sync_all()?;
        Ok(StagedReport {
            tmp,
            dest: path.to_path_buf(),
        })
    }
}

/// A rendered report waiting to be renamed into place. Dropping it
/// discards the temp file.
pub struct StagedReport {
    tmp: NamedTempFile,
    dest: PathBuf,
}

impl StagedReport {
    pub fn persist(self) -> Result<()> {
        self.tmp.persist(&self.dest).map_err(|e| e.error)?;
        Ok(())
    }
}

/// 1024-based size with one decimal, e.g. `2.0 KiB`. Values below 1024 are
/// printed as plain bytes. The unit steps up once the value would round to
/// 1024.0 in the current one; ties round half up.
pub fn human_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes;
    let mut larger = "MGTPE".chars();
    let mut unit = 'K';
    let mut shift: i32 = 40;
    while shift >= 0 && bytes > 0x0fff_cccc_cccc_cccc_u64 >> shift {
        value >>= 10;
        unit = larger.next().unwrap_or(unit);
        shift -= 10;
    }
    let tenths = (value * 10 + 512) / 1024;
    format!("{}.{} {unit}iB", tenths / 10, tenths % 10)
}
