//! Provides a locally built Dgraph binary for integration tests.
//!
//! [`BinaryProvisioner::ensure_binary`] looks for a cached build of the
//! requested version first. On a miss it synchronises a shared clone of the
//! Dgraph repository, force-checks out the version, runs `make dgraph`, caches
//! the result, and copies it to the caller's directory as `dgraph`.
//!
//! Locations, the repository URL, and an optional command timeout come from
//! `DGRAPH_*` environment variables via [`ProvisionerCfg`], or can be passed
//! explicitly through [`ProvisionerSettings`].

mod build;
pub mod cache;
mod command;
mod config;
mod error;
mod fs;
mod observability;
mod provision;
mod repo;
#[doc(hidden)]
pub mod test_support;

pub use build::build_binary;
pub use command::{
    CommandInvocation, CommandOutput, CommandRunner, CommandStatus, SystemCommandRunner,
};
pub use config::{DEFAULT_REPO_URL, ProvisionerCfg, ProvisionerSettings};
pub use error::{
    ConfigError, ConfigResult, DgraphTestError as Error, ProvisionError, ProvisionErrorKind,
    ProvisionResult, Result,
};
pub use provision::{BinaryProvisioner, ensure_binary};
pub use repo::SourceRepository;

/// Image tag the test harness uses for locally built Dgraph images.
pub const LOCAL_IMAGE: &str = "dgraph/dgraph:local";

/// Returns the image tag used for locally built Dgraph images.
///
/// # Examples
/// ```
/// assert_eq!(dgraph_test_binary::local_image(), "dgraph/dgraph:local");
/// ```
#[must_use]
pub const fn local_image() -> &'static str {
    LOCAL_IMAGE
}
