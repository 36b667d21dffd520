//! Builds the Dgraph binary from the checked-out sources.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::cache::BINARY_NAME;
use crate::command::{CommandInvocation, CommandRunner, run_checked};
use crate::error::{ProvisionErrorKind, ProvisionResult};
use crate::observability::LOG_TARGET;

/// Program used to drive the build.
const MAKE: &str = "make";

/// Runs `make dgraph` inside `<repo_dir>/dgraph` and returns the path of the
/// produced binary.
///
/// The artifact's existence is not checked here; copying it into the cache
/// reports a missing artifact.
///
/// # Errors
///
/// Returns a [`ProvisionErrorKind::Build`] error carrying the build output
/// when make exits non-zero, times out, or cannot be started.
pub fn build_binary<R>(runner: &R, repo_dir: &Utf8Path) -> ProvisionResult<Utf8PathBuf>
where
    R: CommandRunner + ?Sized,
{
    let build_dir = repo_dir.join(BINARY_NAME);
    info!(
        target: LOG_TARGET,
        dir = %build_dir,
        "building dgraph binary"
    );

    let invocation = CommandInvocation::new(MAKE)
        .arg(BINARY_NAME)
        .current_dir(build_dir.as_path());
    run_checked(
        runner,
        &invocation,
        ProvisionErrorKind::Build,
        "error while building dgraph binary",
    )?;

    Ok(build_dir.join(BINARY_NAME))
}
