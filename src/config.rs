//! Environment-driven configuration for the provisioner.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use color_eyre::eyre::eyre;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::cache::{default_cache_dir, default_repo_dir};
use crate::error::{ConfigError, ConfigResult};

/// Repository cloned when no override is configured.
pub const DEFAULT_REPO_URL: &str = "https://github.com/dgraph-io/dgraph.git";

/// Captures provisioner settings supplied via `DGRAPH_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, OrthoConfig, Default)]
#[ortho_config(prefix = "DGRAPH")]
///
/// # Examples
/// ```
/// use dgraph_test_binary::ProvisionerCfg;
///
/// let cfg = ProvisionerCfg::default();
/// assert!(cfg.repo_url.is_none());
/// ```
pub struct ProvisionerCfg {
    /// Git URL of the source repository.
    pub repo_url: Option<String>,
    /// Directory holding the shared source checkout.
    pub repo_dir: Option<Utf8PathBuf>,
    /// Directory holding one cached binary per version.
    pub cache_dir: Option<Utf8PathBuf>,
    /// Upper bound, in seconds, on each git or make invocation.
    pub command_timeout_secs: Option<u64>,
    /// Verify cached binaries against their recorded SHA-256 on every hit.
    pub verify_cache_digest: Option<bool>,
}

impl ProvisionerCfg {
    /// Loads configuration from environment variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is present but cannot be parsed.
    pub fn load() -> ConfigResult<Self> {
        let args = [OsString::from("dgraph-test-binary")];
        Self::load_from_iter(args).map_err(|err| ConfigError::from(eyre!(err)))
    }

    /// Resolves the configuration into concrete settings, filling defaults.
    ///
    /// Blank strings count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error when `command_timeout_secs` is zero.
    pub fn to_settings(&self) -> ConfigResult<ProvisionerSettings> {
        let repo_url = non_blank(self.repo_url.as_deref())
            .map_or_else(|| DEFAULT_REPO_URL.to_owned(), str::to_owned);
        let repo_dir = self
            .repo_dir
            .clone()
            .filter(|dir| !dir.as_str().trim().is_empty())
            .unwrap_or_else(default_repo_dir);
        let cache_dir = self
            .cache_dir
            .clone()
            .filter(|dir| !dir.as_str().trim().is_empty())
            .unwrap_or_else(default_cache_dir);
        let command_timeout = self.command_timeout()?;

        Ok(ProvisionerSettings {
            repo_url,
            repo_dir,
            cache_dir,
            command_timeout,
            verify_cache_digest: self.verify_cache_digest.unwrap_or(false),
        })
    }

    fn command_timeout(&self) -> ConfigResult<Option<Duration>> {
        match self.command_timeout_secs {
            None => Ok(None),
            Some(0) => Err(ConfigError::from(eyre!(
                "DGRAPH_COMMAND_TIMEOUT_SECS must be greater than zero"
            ))),
            Some(secs) => Ok(Some(Duration::from_secs(secs))),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|trimmed| !trimmed.is_empty())
}

/// Resolved locations and behaviour switches for a
/// [`BinaryProvisioner`](crate::BinaryProvisioner).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProvisionerSettings {
    /// Git URL of the source repository.
    pub repo_url: String,
    /// Directory holding the shared source checkout.
    pub repo_dir: Utf8PathBuf,
    /// Directory holding one cached binary per version.
    pub cache_dir: Utf8PathBuf,
    /// Upper bound on each git or make invocation; `None` waits forever.
    pub command_timeout: Option<Duration>,
    /// Verify cached binaries against their recorded digest on every hit.
    pub verify_cache_digest: bool,
}

impl ProvisionerSettings {
    /// Settings using the default repository with explicit checkout and
    /// cache directories.
    ///
    /// # Examples
    /// ```
    /// use dgraph_test_binary::ProvisionerSettings;
    ///
    /// let settings = ProvisionerSettings::with_dirs("/tmp/t/repo".into(), "/tmp/t/bin".into());
    /// assert!(settings.command_timeout.is_none());
    /// ```
    #[must_use]
    pub fn with_dirs(repo_dir: Utf8PathBuf, cache_dir: Utf8PathBuf) -> Self {
        Self {
            repo_url: DEFAULT_REPO_URL.to_owned(),
            repo_dir,
            cache_dir,
            command_timeout: None,
            verify_cache_digest: false,
        }
    }
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self::with_dirs(default_repo_dir(), default_cache_dir())
    }
}
