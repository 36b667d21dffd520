//! Cache entry naming and hit/miss detection.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::ErrorKind;
use tracing::debug;

use crate::error::{ProvisionContext as _, ProvisionErrorKind, ProvisionResult};
use crate::observability::CACHE_LOG_TARGET;

/// File name of the binary in the destination directory and in the build
/// tree, regardless of version.
pub const BINARY_NAME: &str = "dgraph";

/// Result of a cache lookup operation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CacheLookupResult {
    /// Something exists at the entry path for the version.
    Hit {
        /// Path of the cached entry.
        entry: Utf8PathBuf,
    },
    /// Nothing is cached for the version yet.
    Miss,
}

/// Returns the cache file name for `version`, following the `dgraph_<version>`
/// template.
///
/// Path separators in the version (as in `release/v24.0`) become underscores
/// so every entry stays a direct child of the cache directory.
///
/// # Examples
///
/// ```
/// use dgraph_test_binary::cache::entry_name;
///
/// assert_eq!(entry_name("v24.0.5"), "dgraph_v24.0.5");
/// assert_eq!(entry_name("release/v24.0"), "dgraph_release_v24.0");
/// ```
#[must_use]
pub fn entry_name(version: &str) -> String {
    let key: String = version
        .chars()
        .map(|ch| if matches!(ch, '/' | '\\') { '_' } else { ch })
        .collect();
    format!("{BINARY_NAME}_{key}")
}

/// Returns the full path of the cache entry for `version`.
#[must_use]
pub fn entry_path(cache_dir: &Utf8Path, version: &str) -> Utf8PathBuf {
    cache_dir.join(entry_name(version))
}

/// Checks whether the cache holds an entry for the given version.
///
/// Presence is all that is checked; whatever exists at the entry path is
/// treated as the built binary. A directory at that path is reported as a hit
/// and rejected later when it is copied.
///
/// # Errors
///
/// Returns a [`ProvisionErrorKind::Lookup`] error when the entry cannot be
/// stat-ed for any reason other than not existing.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use dgraph_test_binary::cache::{check_cache, CacheLookupResult};
///
/// let cache_dir = Utf8Path::new("/home/user/.cache/dgraph-test/binaries");
/// match check_cache(cache_dir, "v24.0.5")? {
///     CacheLookupResult::Hit { entry } => println!("cached at {entry}"),
///     CacheLookupResult::Miss => println!("needs a build"),
/// }
/// # Ok::<(), dgraph_test_binary::ProvisionError>(())
/// ```
pub fn check_cache(cache_dir: &Utf8Path, version: &str) -> ProvisionResult<CacheLookupResult> {
    let entry = entry_path(cache_dir, version);
    match fs::metadata(&entry) {
        Ok(_) => {
            debug!(
                target: CACHE_LOG_TARGET,
                version = %version,
                path = %entry,
                "cache hit"
            );
            Ok(CacheLookupResult::Hit { entry })
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(
                target: CACHE_LOG_TARGET,
                version = %version,
                path = %entry,
                "cache miss"
            );
            Ok(CacheLookupResult::Miss)
        }
        Err(err) => Err(err).provision_context(ProvisionErrorKind::Lookup, || {
            format!("failed to look up cache entry {entry}")
        }),
    }
}
