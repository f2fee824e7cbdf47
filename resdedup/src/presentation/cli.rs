use clap::{Parser, Subcommand, ValueEnum};
use resdedup_core::{DEFAULT_TABLE_NAME, FingerprintPolicy, StoragePolicy};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Merge duplicated resources in Android resource archives", long_about = None)]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// CRC-32, size and extension; merges across directories
    Extension,
    /// parent directory and CRC-32
    Directory,
}

impl From<PolicyArg> for FingerprintPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Extension => FingerprintPolicy::ContentAndExtension,
            PolicyArg::Directory => FingerprintPolicy::SameDirectory,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CompressionArg {
    /// keep each entry's source method
    Preserve,
    /// deflate everything not forced to stored
    Deflate,
}

impl From<CompressionArg> for StoragePolicy {
    fn from(c: CompressionArg) -> Self {
        match c {
            CompressionArg::Preserve => StoragePolicy::PreserveSource,
            CompressionArg::Deflate => StoragePolicy::DeflateAll,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge duplicates in place and write one report per archive
    Merge {
        #[arg(required = true)]
        archives: Vec<PathBuf>,

        /// Parent of the per-archive extraction dirs (default: next to each archive)
        #[arg(long)]
        scratch_dir: Option<PathBuf>,

        /// Where `<stem>-duplicated.txt` goes (default: next to each archive)
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Entry path or file name to keep stored; repeatable
        #[arg(long = "store", value_name = "NAME")]
        store: Vec<String>,

        #[arg(long, value_enum, default_value_t = PolicyArg::Extension)]
        policy: PolicyArg,

        #[arg(long, value_enum, default_value_t = CompressionArg::Preserve)]
        compression: CompressionArg,

        /// Print summaries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report duplicates without touching the archive
    Find {
        archive: PathBuf,

        #[arg(long, value_enum, default_value_t = PolicyArg::Extension)]
        policy: PolicyArg,
    },

    /// Print the resource table's chunk tree
    Inspect {
        archive: PathBuf,

        #[arg(long, default_value = DEFAULT_TABLE_NAME)]
        table: String,

        /// Also dump every string pool
        #[arg(long)]
        strings: bool,
    },
}
