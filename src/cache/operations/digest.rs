//! SHA-256 sidecars recorded next to cache entries.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, ErrorKind};
use tracing::{debug, warn};

use crate::error::{ProvisionContext as _, ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::observability::CACHE_LOG_TARGET;

/// Suffix appended to an entry path to form its digest sidecar.
const DIGEST_SUFFIX: &str = ".sha256";

/// Computes the lowercase hex SHA-256 of the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn file_digest(path: &Utf8Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

pub(super) fn digest_path(entry: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{entry}{DIGEST_SUFFIX}"))
}

/// Records the digest of `entry` in its sidecar.
pub(super) fn write_digest(entry: &Utf8Path) -> ProvisionResult<()> {
    let digest = file_digest(entry).provision_context(ProvisionErrorKind::Copy, || {
        format!("failed to hash cache entry {entry}")
    })?;
    let sidecar = digest_path(entry);
    fs::write(&sidecar, format!("{digest}\n")).provision_context(ProvisionErrorKind::Copy, || {
        format!("failed to write cache digest {sidecar}")
    })
}

/// Verifies `entry` against its recorded digest.
///
/// Entries without a sidecar, such as those written by older tooling, are
/// trusted as-is.
///
/// # Errors
///
/// Returns a [`ProvisionErrorKind::Lookup`] error when the sidecar or the
/// entry cannot be read, or when the contents no longer match.
pub fn verify_digest(entry: &Utf8Path) -> ProvisionResult<()> {
    let sidecar = digest_path(entry);
    let expected = match fs::read_to_string(&sidecar) {
        Ok(raw) => raw.trim().to_owned(),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(
                target: CACHE_LOG_TARGET,
                path = %entry,
                "no digest recorded for cache entry"
            );
            return Ok(());
        }
        Err(err) => {
            return Err(err).provision_context(ProvisionErrorKind::Lookup, || {
                format!("failed to read cache digest {sidecar}")
            });
        }
    };

    let actual = file_digest(entry).provision_context(ProvisionErrorKind::Lookup, || {
        format!("failed to hash cache entry {entry}")
    })?;

    if actual == expected {
        return Ok(());
    }

    warn!(
        target: CACHE_LOG_TARGET,
        path = %entry,
        expected = %expected,
        actual = %actual,
        "cache entry digest mismatch"
    );
    Err(ProvisionError::new(
        ProvisionErrorKind::Lookup,
        eyre!("cache entry digest mismatch for {entry}: expected {expected}, found {actual}"),
    ))
}
