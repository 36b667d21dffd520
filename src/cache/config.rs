//! Default locations for the binary cache and the source checkout.
//!
//! Resolves the cache root from XDG conventions with home and temporary
//! directory fallbacks.

use camino::Utf8PathBuf;
use std::path::PathBuf;

/// Subdirectory within the XDG cache home owned by this crate.
const CACHE_SUBDIR: &str = "dgraph-test";

/// Directory under the cache root holding built binaries.
const BINARIES_SUBDIR: &str = "binaries";

/// Directory under the cache root holding the source checkout.
const REPO_SUBDIR: &str = "repo";

/// Resolves the cache root from XDG conventions.
///
/// The resolution order is:
///
/// 1. `$XDG_CACHE_HOME/dgraph-test` if `XDG_CACHE_HOME` is set and valid UTF-8
/// 2. `~/.cache/dgraph-test`
/// 3. `/tmp/dgraph-test` as last resort
///
/// # Examples
///
/// ```
/// use dgraph_test_binary::cache::resolve_cache_root;
///
/// let root = resolve_cache_root();
/// assert!(root.as_str().ends_with("dgraph-test"));
/// ```
#[must_use]
pub fn resolve_cache_root() -> Utf8PathBuf {
    resolve_from_xdg_cache()
        .or_else(resolve_from_home)
        .unwrap_or_else(|| Utf8PathBuf::from("/tmp").join(CACHE_SUBDIR))
}

/// Default directory holding one cached binary per version.
#[must_use]
pub fn default_cache_dir() -> Utf8PathBuf {
    resolve_cache_root().join(BINARIES_SUBDIR)
}

/// Default location of the shared source checkout.
#[must_use]
pub fn default_repo_dir() -> Utf8PathBuf {
    resolve_cache_root().join(REPO_SUBDIR)
}

/// Attempts to resolve the cache root from `XDG_CACHE_HOME`.
fn resolve_from_xdg_cache() -> Option<Utf8PathBuf> {
    let raw = std::env::var("XDG_CACHE_HOME").ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let path = Utf8PathBuf::from_path_buf(PathBuf::from(trimmed)).ok()?;
    Some(path.join(CACHE_SUBDIR))
}

/// Attempts to resolve the cache root from the home directory.
fn resolve_from_home() -> Option<Utf8PathBuf> {
    let home = dirs::home_dir()?;
    let path = Utf8PathBuf::from_path_buf(home).ok()?;
    Some(path.join(".cache").join(CACHE_SUBDIR))
}
