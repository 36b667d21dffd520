//! Keeps the shared Dgraph source checkout cloned, fetched, and on the
//! requested reference.

use camino::Utf8Path;
use std::fs;
use tracing::{debug, info, warn};

use crate::command::{CommandInvocation, CommandRunner, run_checked};
use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::fs::{ensure_dir_exists, remove_path};
use crate::observability::REPO_LOG_TARGET;

const GIT: &str = "git";

/// Handle over the single on-disk checkout of the source repository.
///
/// All mutations go through `git`, invoked via the supplied
/// [`CommandRunner`].
#[derive(Debug)]
pub struct SourceRepository<'a, R: ?Sized> {
    runner: &'a R,
    url: &'a str,
    dir: &'a Utf8Path,
}

impl<'a, R: CommandRunner + ?Sized> SourceRepository<'a, R> {
    /// Describes the checkout of `url` living at `dir`.
    #[must_use]
    pub const fn new(runner: &'a R, url: &'a str, dir: &'a Utf8Path) -> Self {
        Self { runner, url, dir }
    }

    /// Makes sure a usable clone exists at the checkout directory.
    ///
    /// A missing checkout is cloned. An existing one is health-checked with
    /// `git status`; if that fails the whole directory is deleted and cloned
    /// afresh, otherwise `git fetch -p` brings it up to date.
    ///
    /// Any `git status` failure counts as corruption, including git missing
    /// from `PATH` or the command timing out. In those cases the checkout is
    /// still deleted before the clone is attempted.
    ///
    /// # Errors
    ///
    /// Returns a [`ProvisionErrorKind::Sync`] error when cloning, fetching,
    /// or deleting a corrupted checkout fails.
    pub fn sync(&self) -> ProvisionResult<()> {
        if fs::symlink_metadata(self.dir).is_err() {
            return self.clone_repo();
        }

        if let Err(err) = self.status() {
            warn!(
                target: REPO_LOG_TARGET,
                path = %self.dir,
                error = %err,
                "checkout failed its health check, re-cloning"
            );
            self.remove()?;
            return self.clone_repo();
        }

        self.fetch()
    }

    /// Force-checks out `git_ref`, discarding any local modifications.
    ///
    /// # Errors
    ///
    /// Returns a [`ProvisionErrorKind::Checkout`] error when git rejects the
    /// reference.
    pub fn checkout(&self, git_ref: &str) -> ProvisionResult<()> {
        info!(
            target: REPO_LOG_TARGET,
            git_ref = %git_ref,
            path = %self.dir,
            "checking out reference"
        );
        let invocation = self.git().arg("checkout").arg("-f").arg(git_ref);
        run_checked(
            self.runner,
            &invocation,
            ProvisionErrorKind::Checkout,
            &format!("error checking out gitRef [{git_ref}]"),
        )?;
        Ok(())
    }

    fn clone_repo(&self) -> ProvisionResult<()> {
        if let Some(parent) = self.dir.parent() {
            ensure_dir_exists(parent).map_err(|report| {
                ProvisionError::new(
                    ProvisionErrorKind::Sync,
                    report.wrap_err(format!("failed to create checkout parent {parent}")),
                )
            })?;
        }

        info!(
            target: REPO_LOG_TARGET,
            url = %self.url,
            path = %self.dir,
            "cloning dgraph repository"
        );
        let invocation = CommandInvocation::new(GIT)
            .arg("clone")
            .arg(self.url)
            .arg(self.dir.as_str());
        run_checked(
            self.runner,
            &invocation,
            ProvisionErrorKind::Sync,
            "error cloning dgraph repo",
        )?;
        Ok(())
    }

    fn status(&self) -> ProvisionResult<()> {
        run_checked(
            self.runner,
            &self.git().arg("status"),
            ProvisionErrorKind::Sync,
            "error running git status",
        )?;
        Ok(())
    }

    fn fetch(&self) -> ProvisionResult<()> {
        debug!(
            target: REPO_LOG_TARGET,
            path = %self.dir,
            "fetching latest changes"
        );
        run_checked(
            self.runner,
            &self.git().arg("fetch").arg("-p"),
            ProvisionErrorKind::Sync,
            "error fetching latest changes",
        )?;
        Ok(())
    }

    fn remove(&self) -> ProvisionResult<()> {
        remove_path(self.dir).map_err(|report| {
            ProvisionError::new(
                ProvisionErrorKind::Sync,
                report.wrap_err(format!("failed to remove corrupted checkout {}", self.dir)),
            )
        })
    }

    fn git(&self) -> CommandInvocation {
        CommandInvocation::new(GIT).current_dir(self.dir)
    }
}
