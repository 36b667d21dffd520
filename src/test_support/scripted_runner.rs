//! A [`CommandRunner`] that imitates git and make on the local filesystem.
//!
//! Behavioural suites use it to drive [`BinaryProvisioner`](crate::BinaryProvisioner)
//! end to end without network access or a Go toolchain. It understands the
//! handful of commands provisioning issues:
//!
//! - `git clone <url> <dir>` creates `<dir>/.git` and `<dir>/dgraph/`;
//! - `git status` succeeds only when `<dir>/.git` is a directory;
//! - `git fetch -p` succeeds unless configured to fail;
//! - `git checkout -f <ref>` records `<ref>` in `<dir>/.git/HEAD` unless the
//!   reference was declared unknown;
//! - `make dgraph` writes `dgraph` with content `dgraph built from <ref>`
//!   and mode `0o755`, unless a build failure was scripted.

use std::collections::HashSet;
use std::fs;
use std::io::{self, ErrorKind};
use std::sync::{Mutex, PoisonError};

use camino::Utf8Path;

use crate::command::{CommandInvocation, CommandOutput, CommandRunner};

/// Scripted stand-in for git and make.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    invocations: Mutex<Vec<CommandInvocation>>,
    unknown_refs: HashSet<String>,
    clone_failure: Option<String>,
    fetch_failure: Option<String>,
    build_failure: Option<String>,
}

impl ScriptedRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `git checkout` reject `git_ref`.
    #[must_use]
    pub fn with_unknown_ref(mut self, git_ref: &str) -> Self {
        self.unknown_refs.insert(git_ref.to_owned());
        self
    }

    /// Makes `git clone` exit 128 printing `output`.
    #[must_use]
    pub fn with_clone_failure(mut self, output: &str) -> Self {
        self.clone_failure = Some(output.to_owned());
        self
    }

    /// Makes `git fetch` exit 1 printing `output`.
    #[must_use]
    pub fn with_fetch_failure(mut self, output: &str) -> Self {
        self.fetch_failure = Some(output.to_owned());
        self
    }

    /// Makes `make` exit 2 printing `output`.
    #[must_use]
    pub fn with_build_failure(mut self, output: &str) -> Self {
        self.build_failure = Some(output.to_owned());
        self
    }

    /// Every invocation seen so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Invocations rendered as `program first-arg`, e.g. `git clone`.
    #[must_use]
    pub fn steps(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(|inv| match inv.args().first() {
                Some(first) => format!("{} {first}", inv.program()),
                None => inv.program().to_owned(),
            })
            .collect()
    }

    fn git(&self, invocation: &CommandInvocation) -> io::Result<CommandOutput> {
        let args = invocation.args();
        match args.first().map(String::as_str) {
            Some("clone") => self.clone_repo(args),
            Some("status") => Ok(status(working_dir(invocation)?)),
            Some("fetch") => Ok(self.fetch_failure.as_ref().map_or_else(
                || CommandOutput::success(""),
                |output| CommandOutput::failure(1, output.as_str()),
            )),
            Some("checkout") => self.checkout(working_dir(invocation)?, args.last()),
            _ => Ok(CommandOutput::failure(1, format!("unsupported: {invocation}"))),
        }
    }

    fn clone_repo(&self, args: &[String]) -> io::Result<CommandOutput> {
        if let Some(output) = &self.clone_failure {
            return Ok(CommandOutput::failure(128, output.as_str()));
        }
        let Some(raw_dir) = args.get(2) else {
            return Ok(CommandOutput::failure(129, "usage: git clone <repo> <dir>"));
        };
        let dir = Utf8Path::new(raw_dir);
        if dir.exists() {
            return Ok(CommandOutput::failure(
                128,
                format!("fatal: destination path '{dir}' already exists"),
            ));
        }
        fs::create_dir_all(dir.join(".git"))?;
        fs::create_dir_all(dir.join("dgraph"))?;
        Ok(CommandOutput::success(format!("Cloning into '{dir}'...")))
    }

    fn checkout(&self, dir: &Utf8Path, requested: Option<&String>) -> io::Result<CommandOutput> {
        let Some(git_ref) = requested else {
            return Ok(CommandOutput::failure(1, "missing reference"));
        };
        if self.unknown_refs.contains(git_ref) {
            return Ok(CommandOutput::failure(
                1,
                format!("error: pathspec '{git_ref}' did not match any file(s) known to git"),
            ));
        }
        fs::write(dir.join(".git/HEAD"), git_ref)?;
        Ok(CommandOutput::success(format!("HEAD is now at {git_ref}")))
    }

    fn make(&self, invocation: &CommandInvocation) -> io::Result<CommandOutput> {
        if let Some(output) = &self.build_failure {
            return Ok(CommandOutput::failure(2, output.as_str()));
        }
        let build_dir = working_dir(invocation)?;
        let head = build_dir
            .parent()
            .map(|repo| repo.join(".git/HEAD"))
            .map(fs::read_to_string)
            .transpose()?
            .unwrap_or_default();
        let artifact = build_dir.join("dgraph");
        fs::write(&artifact, format!("dgraph built from {head}"))?;
        set_executable(&artifact)?;
        Ok(CommandOutput::success("go build -o dgraph"))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &CommandInvocation) -> io::Result<CommandOutput> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());

        match invocation.program() {
            "git" => self.git(invocation),
            "make" => self.make(invocation),
            other => Err(io::Error::new(
                ErrorKind::NotFound,
                format!("{other}: command not found"),
            )),
        }
    }
}

fn working_dir(invocation: &CommandInvocation) -> io::Result<&Utf8Path> {
    invocation.working_dir().ok_or_else(|| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("`{invocation}` needs a working directory"),
        )
    })
}

fn status(dir: &Utf8Path) -> CommandOutput {
    if dir.join(".git").is_dir() {
        CommandOutput::success("nothing to commit, working tree clean")
    } else {
        CommandOutput::failure(
            128,
            "fatal: not a git repository (or any of the parent directories): .git",
        )
    }
}

#[cfg(unix)]
fn set_executable(path: &Utf8Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Utf8Path) -> io::Result<()> {
    Ok(())
}
