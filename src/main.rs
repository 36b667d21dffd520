//! Ensures a Dgraph binary for the requested version exists in a directory.
//!
//! Reuses a cached build when one exists and otherwise builds the version
//! from source. Configuration is read from `DGRAPH_*` environment variables.
//! The binary exits with status code `0` on success and `1` on error.

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::eyre::eyre;
use tracing::Level;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "dgraph_test_binary", version, about)]
struct Cli {
    /// Branch, tag, or commit to provision.
    version: String,
    /// Directory that receives the `dgraph` binary.
    dest_dir: Utf8PathBuf,
}

fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let binary = dgraph_test_binary::ensure_binary(&cli.version, &cli.dest_dir)
        .map_err(|err| match err {
            dgraph_test_binary::Error::Provision(inner) => inner.into_report(),
            dgraph_test_binary::Error::Config(inner) => eyre!(inner),
        })?;
    tracing::info!(binary = %binary, "done");
    Ok(())
}
