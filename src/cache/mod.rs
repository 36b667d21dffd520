//! Shared binary cache for locally built Dgraph binaries.
//!
//! Every successful source build is stored as one file named after the
//! version it was built from, so later provisioning requests for that version
//! skip the clone and build entirely.
//!
//! # Cache Location
//!
//! The cache root is resolved in the following order, unless configuration
//! overrides the binary and checkout directories explicitly:
//!
//! 1. `$XDG_CACHE_HOME/dgraph-test` if `XDG_CACHE_HOME` is set
//! 2. `~/.cache/dgraph-test` as fallback
//! 3. `/tmp/dgraph-test` as last resort
//!
//! Binaries live under `binaries/` and the shared source checkout under
//! `repo/`.
//!
//! # Cross-Process Coordination
//!
//! Builds mutate the single shared checkout, so the miss path holds a
//! [`CheckoutLock`] for the whole sync, build, and populate sequence. Cache
//! hits never lock: entries are only ever created, and creation is atomic.

mod config;
mod lock;
mod operations;

pub use config::{default_cache_dir, default_repo_dir, resolve_cache_root};
pub use lock::CheckoutLock;
pub use operations::{
    BINARY_NAME, CacheLookupResult, check_cache, copy_binary, copy_to_destination, entry_name,
    entry_path, file_digest, populate_cache, verify_digest,
};
