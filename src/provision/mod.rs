//! Cache-first provisioning of a runnable Dgraph binary.
//!
//! [`BinaryProvisioner::ensure_binary`] walks a short state machine:
//!
//! ```text
//! CacheCheck ─ hit ──────────────────────────────────────────────▶ Copy ─▶ Done
//!            └ miss ─▶ RepoSync ─▶ Checkout ─▶ Build ─▶ CachePopulate ─▶ Copy ─▶ Done
//! ```
//!
//! Any step failing ends the call with that step's [`ProvisionError`]; nothing
//! is retried. The only recovery is inside `RepoSync`, which replaces a
//! checkout that fails `git status` with a fresh clone.
//!
//! The checkout is force-checked out on every build, so local modifications
//! in it are silently discarded.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use tracing::{debug, info, info_span};

use crate::build::build_binary;
use crate::cache::{
    CacheLookupResult, CheckoutLock, check_cache, copy_to_destination, populate_cache,
    verify_digest,
};
use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::{ProvisionerCfg, ProvisionerSettings};
use crate::error::{
    ProvisionContext as _, ProvisionError, ProvisionErrorKind, ProvisionResult, Result,
};
use crate::observability::LOG_TARGET;
use crate::repo::SourceRepository;

/// Guarantees a runnable Dgraph binary for a version at a destination path.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use dgraph_test_binary::{BinaryProvisioner, ProvisionerSettings};
///
/// let provisioner = BinaryProvisioner::new(ProvisionerSettings::default());
/// let binary = provisioner.ensure_binary("v24.0.5", Utf8Path::new("/tmp/cluster/bin"))?;
/// assert!(binary.ends_with("dgraph"));
/// # Ok::<(), dgraph_test_binary::ProvisionError>(())
/// ```
#[derive(Debug, Clone)]
pub struct BinaryProvisioner<R = SystemCommandRunner> {
    settings: ProvisionerSettings,
    runner: R,
}

impl BinaryProvisioner<SystemCommandRunner> {
    /// Creates a provisioner that runs git and make on the host.
    #[must_use]
    pub const fn new(settings: ProvisionerSettings) -> Self {
        let runner = SystemCommandRunner::with_timeout(settings.command_timeout);
        Self { settings, runner }
    }

    /// Creates a provisioner from `DGRAPH_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration cannot be loaded or resolved.
    pub fn from_env() -> Result<Self> {
        let settings = ProvisionerCfg::load()?.to_settings()?;
        Ok(Self::new(settings))
    }
}

impl<R: CommandRunner> BinaryProvisioner<R> {
    /// Creates a provisioner that routes every external command through
    /// `runner`.
    #[must_use]
    pub const fn with_runner(settings: ProvisionerSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    /// Settings this provisioner was built with.
    #[must_use]
    pub const fn settings(&self) -> &ProvisionerSettings {
        &self.settings
    }

    /// Command runner used for git and make.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Ensures `<destination_dir>/dgraph` is the binary built from `version`.
    ///
    /// A cached build is copied straight away. Otherwise the shared checkout
    /// is synchronised, `version` is force-checked out and built, and the
    /// result is cached before being copied. Returns the destination path.
    ///
    /// Concurrent callers sharing a checkout are serialised by an advisory
    /// lock held for the build; cache hits take no lock.
    ///
    /// # Errors
    ///
    /// Returns a [`ProvisionError`] whose [`kind`](ProvisionError::kind)
    /// names the failing step: `Lookup` for a blank version or cache stat
    /// failure, `Sync` for clone or fetch, `Checkout`, `Build` with the build
    /// output attached, or `Copy`.
    pub fn ensure_binary(
        &self,
        version: &str,
        destination_dir: &Utf8Path,
    ) -> ProvisionResult<Utf8PathBuf> {
        let span = info_span!(
            target: LOG_TARGET,
            "ensure_binary",
            version = %version,
            destination = %destination_dir
        );
        let _entered = span.enter();

        validate_version(version)?;

        let entry = match check_cache(&self.settings.cache_dir, version)? {
            CacheLookupResult::Hit { entry } => {
                self.trusted_entry(&entry)?;
                info!(target: LOG_TARGET, entry = %entry, "using cached binary");
                entry
            }
            CacheLookupResult::Miss => self.build_and_cache(version)?,
        };

        let binary = copy_to_destination(&entry, destination_dir)?;
        info!(target: LOG_TARGET, binary = %binary, "dgraph binary ready");
        Ok(binary)
    }

    fn build_and_cache(&self, version: &str) -> ProvisionResult<Utf8PathBuf> {
        let repo_dir = &self.settings.repo_dir;
        let _lock = CheckoutLock::acquire(repo_dir).provision_context(
            ProvisionErrorKind::Sync,
            || format!("failed to lock checkout {repo_dir}"),
        )?;

        // Another process may have built this version while we waited.
        if let CacheLookupResult::Hit { entry } = check_cache(&self.settings.cache_dir, version)? {
            debug!(
                target: LOG_TARGET,
                entry = %entry,
                "version cached by another provisioner"
            );
            self.trusted_entry(&entry)?;
            return Ok(entry);
        }

        let repo = SourceRepository::new(&self.runner, &self.settings.repo_url, repo_dir);
        repo.sync()?;
        repo.checkout(version)?;
        let artifact = build_binary(&self.runner, repo_dir)?;
        populate_cache(&artifact, &self.settings.cache_dir, version)
    }

    /// Checks a cached entry against its digest when verification is enabled.
    fn trusted_entry(&self, entry: &Utf8Path) -> ProvisionResult<()> {
        if self.settings.verify_cache_digest {
            verify_digest(entry)?;
        }
        Ok(())
    }
}

/// Provisions `version` into `destination_dir` using `DGRAPH_*` configuration.
///
/// # Errors
///
/// Returns an error when configuration is invalid or any provisioning step
/// fails.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
///
/// let binary = dgraph_test_binary::ensure_binary("main", Utf8Path::new("/tmp/cluster/bin"))?;
/// # Ok::<(), dgraph_test_binary::Error>(())
/// ```
pub fn ensure_binary(version: &str, destination_dir: &Utf8Path) -> Result<Utf8PathBuf> {
    let provisioner = BinaryProvisioner::from_env()?;
    Ok(provisioner.ensure_binary(version, destination_dir)?)
}

/// Rejects versions that cannot name a git reference or would be parsed as a
/// git option.
fn validate_version(version: &str) -> ProvisionResult<()> {
    if version.trim().is_empty() {
        return Err(ProvisionError::new(
            ProvisionErrorKind::Lookup,
            eyre!("version must not be empty"),
        ));
    }
    if version.starts_with('-') {
        return Err(ProvisionError::new(
            ProvisionErrorKind::Lookup,
            eyre!("version [{version}] must not start with '-'"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
