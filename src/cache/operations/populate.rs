//! Cache population after a successful build.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use super::copy::replace_file;
use super::digest::write_digest;
use super::lookup::entry_path;
use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::fs::ensure_dir_exists;
use crate::observability::CACHE_LOG_TARGET;

/// Stores a freshly built binary as the cache entry for `version`.
///
/// The artifact is staged in a temporary file inside `cache_dir` and renamed
/// into place, so concurrent readers either see no entry or a complete one.
/// A SHA-256 sidecar is written next to the entry. Returns the entry path.
///
/// # Errors
///
/// Returns a [`ProvisionErrorKind::Copy`] error if the cache directory cannot
/// be created, the artifact is not a regular file, or staging, renaming, or
/// hashing fails.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use dgraph_test_binary::cache::populate_cache;
///
/// let artifact = Utf8Path::new("/tmp/dgraph-test/repo/dgraph/dgraph");
/// let cache_dir = Utf8Path::new("/tmp/dgraph-test/binaries");
/// let entry = populate_cache(artifact, cache_dir, "v24.0.5")?;
/// assert!(entry.ends_with("dgraph_v24.0.5"));
/// # Ok::<(), dgraph_test_binary::ProvisionError>(())
/// ```
pub fn populate_cache(
    artifact: &Utf8Path,
    cache_dir: &Utf8Path,
    version: &str,
) -> ProvisionResult<Utf8PathBuf> {
    let entry = entry_path(cache_dir, version);
    debug!(
        target: CACHE_LOG_TARGET,
        source = %artifact,
        path = %entry,
        version = %version,
        "populating cache"
    );

    ensure_dir_exists(cache_dir).map_err(|report| {
        ProvisionError::new(
            ProvisionErrorKind::Copy,
            report.wrap_err(format!("failed to create cache directory {cache_dir}")),
        )
    })?;

    replace_file(artifact, &entry).map_err(|err| err.wrap_err("error while copying binary"))?;

    write_digest(&entry)?;

    info!(
        target: CACHE_LOG_TARGET,
        version = %version,
        path = %entry,
        "populated binary cache"
    );
    Ok(entry)
}
