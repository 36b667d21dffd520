//! Single-file copies that carry permission bits across.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use super::lookup::BINARY_NAME;
use crate::error::{ProvisionContext as _, ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::fs::ensure_dir_exists;
use crate::observability::CACHE_LOG_TARGET;

/// Copies the regular file at `src` to `dst`, giving `dst` the permission
/// bits of `src`.
///
/// `dst` is created or truncated. Symlinks at `src` are followed.
///
/// # Errors
///
/// Returns a [`ProvisionErrorKind::Copy`] error if `src` is missing or is
/// not a regular file, or if opening, permission setting, or the copy itself
/// fails.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use dgraph_test_binary::cache::copy_binary;
///
/// copy_binary(
///     Utf8Path::new("/tmp/dgraph-test/binaries/dgraph_v24.0.5"),
///     Utf8Path::new("/tmp/cluster/bin/dgraph"),
/// )?;
/// # Ok::<(), dgraph_test_binary::ProvisionError>(())
/// ```
pub fn copy_binary(src: &Utf8Path, dst: &Utf8Path) -> ProvisionResult<()> {
    copy_file(src.as_std_path(), dst.as_std_path())
}

fn copy_file(src: &Path, dst: &Path) -> ProvisionResult<()> {
    let metadata = fs::metadata(src).provision_context(ProvisionErrorKind::Copy, || {
        format!("failed to stat {}", src.display())
    })?;
    if !metadata.is_file() {
        return Err(ProvisionError::new(
            ProvisionErrorKind::Copy,
            eyre!("{} is not a regular file", src.display()),
        ));
    }

    let mut source = File::open(src).provision_context(ProvisionErrorKind::Copy, || {
        format!("error while opening file [{}]", src.display())
    })?;
    let mut destination = File::create(dst).provision_context(ProvisionErrorKind::Copy, || {
        format!("error while creating file [{}]", dst.display())
    })?;
    fs::set_permissions(dst, metadata.permissions()).provision_context(
        ProvisionErrorKind::Copy,
        || format!("failed to copy permissions onto {}", dst.display()),
    )?;
    io::copy(&mut source, &mut destination).provision_context(ProvisionErrorKind::Copy, || {
        format!("failed to copy {} to {}", src.display(), dst.display())
    })?;
    Ok(())
}

/// Copies `src` into a temporary file beside `dst` and renames it over `dst`.
///
/// `dst` is never opened for writing, so an existing file there may be
/// read-only or currently executing. Its parent directory must exist.
pub(super) fn replace_file(src: &Utf8Path, dst: &Utf8Path) -> ProvisionResult<()> {
    let dir = dst
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let staged = NamedTempFile::new_in(dir).provision_context(ProvisionErrorKind::Copy, || {
        format!("failed to stage a copy of {src} in {dir}")
    })?;
    copy_file(src.as_std_path(), staged.path())?;
    staged
        .persist(dst)
        .provision_context(ProvisionErrorKind::Copy, || {
            format!("failed to move staged binary into {dst}")
        })?;
    Ok(())
}

/// Copies a cache entry into `destination_dir` under the fixed binary name.
///
/// The destination directory is created when missing. An existing binary is
/// replaced by rename, so a cluster still running it is left undisturbed.
/// Returns the path of the copied binary.
///
/// # Errors
///
/// Returns a [`ProvisionErrorKind::Copy`] error when the directory cannot be
/// created or the copy fails.
pub fn copy_to_destination(
    entry: &Utf8Path,
    destination_dir: &Utf8Path,
) -> ProvisionResult<Utf8PathBuf> {
    ensure_dir_exists(destination_dir).map_err(|report| {
        ProvisionError::new(
            ProvisionErrorKind::Copy,
            report.wrap_err(format!("failed to create destination directory {destination_dir}")),
        )
    })?;

    let target = destination_dir.join(BINARY_NAME);
    debug!(
        target: CACHE_LOG_TARGET,
        source = %entry,
        destination = %target,
        "copying binary into destination"
    );
    replace_file(entry, &target)
        .map_err(|err| err.wrap_err(format!("error while copying binary into {destination_dir}")))?;
    Ok(target)
}
