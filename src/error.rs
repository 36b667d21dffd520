//! Domain error types for Dgraph binary provisioning.

use std::fmt::Display;

use color_eyre::Report;
use thiserror::Error;

/// Result alias for operations that may return a [`DgraphTestError`].
pub type Result<T> = std::result::Result<T, DgraphTestError>;

/// Result alias for provisioning steps.
pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;

/// Result alias for configuration fallible operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level error exposed by the crate.
#[derive(Debug, Error)]
pub enum DgraphTestError {
    /// Indicates a provisioning step failed.
    #[error("binary provisioning failed")]
    Provision(#[from] ProvisionError),
    /// Indicates configuration parsing failed.
    #[error("configuration parsing failed")]
    Config(#[from] ConfigError),
}

/// Names the provisioning step that failed so callers can branch on it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProvisionErrorKind {
    /// Stat of the cache entry failed, the version was unusable, or a cached
    /// digest did not match.
    Lookup,
    /// Cloning, fetching, or resetting the source checkout failed.
    Sync,
    /// `git checkout` rejected the requested reference.
    Checkout,
    /// The build tool failed or timed out.
    Build,
    /// Copying an artifact into the cache or the destination failed.
    Copy,
}

impl ProvisionErrorKind {
    /// Returns a short label suitable for structured log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Sync => "sync",
            Self::Checkout => "checkout",
            Self::Build => "build",
            Self::Copy => "copy",
        }
    }
}

/// Captures a failed provisioning step.
#[derive(Debug, Error)]
#[error("{report:#}")]
pub struct ProvisionError {
    kind: ProvisionErrorKind,
    #[source]
    report: Report,
}

impl ProvisionError {
    /// Constructs a new provisioning error with the provided kind and
    /// diagnostic report.
    #[must_use]
    pub const fn new(kind: ProvisionErrorKind, report: Report) -> Self {
        Self { kind, report }
    }

    /// Returns the step that failed.
    #[must_use]
    pub const fn kind(&self) -> ProvisionErrorKind {
        self.kind
    }

    /// Extracts the underlying diagnostic report.
    pub fn into_report(self) -> Report {
        self.report
    }

    /// Adds an outer context message while keeping the kind.
    #[must_use]
    pub(crate) fn wrap_err<C>(self, context: C) -> Self
    where
        C: Display + Send + Sync + 'static,
    {
        let Self { kind, report } = self;
        Self::new(kind, report.wrap_err(context))
    }
}

/// Captures configuration failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ConfigError(#[from] Report);

/// Attaches a provisioning kind and a context message to a fallible result.
pub(crate) trait ProvisionContext<T> {
    /// Wraps the error with `context` and tags it with `kind`.
    fn provision_context<C, F>(self, kind: ProvisionErrorKind, context: F) -> ProvisionResult<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ProvisionContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn provision_context<C, F>(self, kind: ProvisionErrorKind, context: F) -> ProvisionResult<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|err| ProvisionError::new(kind, Report::new(err).wrap_err(context())))
    }
}
