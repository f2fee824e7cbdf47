pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use resdedup_core::error::Result;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_filter.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .finish()
        .init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Merge {
            archives,
            scratch_dir,
            report_dir,
            store,
            policy,
            compression,
            json,
        } => handlers::handle_merge(
            archives,
            scratch_dir,
            report_dir,
            store,
            policy.into(),
            compression.into(),
            json,
        ),
        Commands::Find { archive, policy } => handlers::handle_find(archive, policy.into()),
        Commands::Inspect {
            archive,
            table,
            strings,
        } => handlers::handle_inspect(archive, table, strings),
    }
}
