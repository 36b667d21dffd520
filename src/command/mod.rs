//! Narrow interface over the external programs used during provisioning.
//!
//! Provisioning only ever needs to run a program with arguments in a working
//! directory and inspect its exit status and output. [`CommandRunner`] captures
//! exactly that so the orchestration can be exercised without invoking git or
//! make.

mod output;

use std::fmt;
use std::io::{self, ErrorKind, Read as _, Seek as _, SeekFrom};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};
use wait_timeout::ChildExt;

use self::output::render_failure;
use crate::error::{ProvisionContext as _, ProvisionErrorKind, ProvisionResult};
use crate::observability::COMMAND_LOG_TARGET;

/// A single program invocation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommandInvocation {
    program: String,
    args: Vec<String>,
    working_dir: Option<Utf8PathBuf>,
}

impl CommandInvocation {
    /// Starts an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Runs the program from `dir` instead of the caller's working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Program name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments in order.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Working directory, when one was set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.working_dir.as_deref()
    }
}

impl fmt::Display for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a finished command ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CommandStatus {
    /// Exit status zero.
    Success,
    /// Non-zero exit, or termination by signal when `code` is `None`.
    Failed {
        /// Exit code reported by the operating system.
        code: Option<i32>,
    },
    /// The runner killed the command after its timeout elapsed.
    TimedOut {
        /// Timeout that was exceeded.
        after: Duration,
    },
}

/// Exit status plus interleaved stdout and stderr of a finished command.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommandOutput {
    status: CommandStatus,
    combined: Vec<u8>,
}

impl CommandOutput {
    /// Creates an output record.
    #[must_use]
    pub fn new(status: CommandStatus, combined: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            combined: combined.into(),
        }
    }

    /// Shorthand for a successful run that printed `combined`.
    #[must_use]
    pub fn success(combined: impl Into<Vec<u8>>) -> Self {
        Self::new(CommandStatus::Success, combined)
    }

    /// Shorthand for a run that exited with `code` after printing `combined`.
    #[must_use]
    pub fn failure(code: i32, combined: impl Into<Vec<u8>>) -> Self {
        Self::new(CommandStatus::Failed { code: Some(code) }, combined)
    }

    /// How the command ended.
    #[must_use]
    pub const fn status(&self) -> CommandStatus {
        self.status
    }

    /// Returns `true` when the command exited with status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, CommandStatus::Success)
    }

    /// Raw interleaved stdout and stderr bytes.
    #[must_use]
    pub fn combined(&self) -> &[u8] {
        &self.combined
    }
}

/// Runs external programs on behalf of the provisioner.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Runs `invocation` to completion and captures its output.
    ///
    /// # Errors
    ///
    /// Returns an error when the program cannot be spawned or waited on. A
    /// program that runs and exits non-zero is reported through
    /// [`CommandOutput::status`], not as an error.
    fn run(&self, invocation: &CommandInvocation) -> io::Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, invocation: &CommandInvocation) -> io::Result<CommandOutput> {
        (**self).run(invocation)
    }
}

/// [`CommandRunner`] backed by [`std::process::Command`].
///
/// Stdout and stderr share one anonymous temporary file so the captured text
/// keeps the order the program wrote it in and a chatty build cannot stall on
/// a full pipe.
///
/// With a timeout set, each command runs in its own process group on Unix and
/// the whole group is killed on expiry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner {
    timeout: Option<Duration>,
}

impl SystemCommandRunner {
    /// Creates a runner that waits for commands indefinitely.
    #[must_use]
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Creates a runner that kills commands still running after `timeout`.
    #[must_use]
    pub const fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn wait(&self, child: &mut Child) -> io::Result<CommandStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(status_from_exit(child.wait()?));
        };

        if let Some(status) = child.wait_timeout(timeout)? {
            return Ok(status_from_exit(status));
        }

        kill_tree(child)?;
        child.wait()?;
        Ok(CommandStatus::TimedOut { after: timeout })
    }
}

/// Kills the child's process group so helpers it spawned (the compilers
/// behind `make`) stop writing into the checkout too.
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(child.id())
        .map_err(|err| io::Error::new(ErrorKind::InvalidInput, err))?;
    // SAFETY: `killpg` only sends a signal; `pgid` is the group the child was
    // spawned into and it has not been reaped yet.
    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    // ESRCH: every member of the group has already exited.
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> io::Result<()> {
    match child.kill() {
        Ok(()) => Ok(()),
        // `InvalidInput` indicates the child has already exited; ignore it.
        Err(err) if err.kind() == ErrorKind::InvalidInput => Ok(()),
        Err(err) => Err(err),
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, invocation: &CommandInvocation) -> io::Result<CommandOutput> {
        let mut capture = tempfile::tempfile()?;
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::from(capture.try_clone()?))
            .stderr(Stdio::from(capture.try_clone()?));
        if let Some(dir) = invocation.working_dir() {
            command.current_dir(dir.as_std_path());
        }
        #[cfg(unix)]
        if self.timeout.is_some() {
            use std::os::unix::process::CommandExt as _;
            command.process_group(0);
        }

        let mut child = command.spawn()?;
        drop(command);
        let status = self.wait(&mut child)?;

        let mut combined = Vec::new();
        capture.seek(SeekFrom::Start(0))?;
        capture.read_to_end(&mut combined)?;
        Ok(CommandOutput::new(status, combined))
    }
}

fn status_from_exit(status: ExitStatus) -> CommandStatus {
    if status.success() {
        CommandStatus::Success
    } else {
        CommandStatus::Failed {
            code: status.code(),
        }
    }
}

/// Runs `invocation` and turns anything but a clean exit into a
/// [`ProvisionError`](crate::ProvisionError) of `kind`, prefixed with `context`.
pub(crate) fn run_checked<R>(
    runner: &R,
    invocation: &CommandInvocation,
    kind: ProvisionErrorKind,
    context: &str,
) -> ProvisionResult<CommandOutput>
where
    R: CommandRunner + ?Sized,
{
    debug!(
        target: COMMAND_LOG_TARGET,
        command = %invocation,
        working_dir = invocation.working_dir().map(Utf8Path::as_str),
        "running command"
    );

    let output = runner
        .run(invocation)
        .provision_context(kind, || format!("{context}: failed to run `{invocation}`"))?;

    match output.status() {
        CommandStatus::Success => Ok(output),
        CommandStatus::Failed { code } => {
            info!(
                target: COMMAND_LOG_TARGET,
                command = %invocation,
                code,
                kind = kind.as_str(),
                "command failed"
            );
            Err(render_failure(kind, context, &output))
        }
        CommandStatus::TimedOut { after } => {
            let secs = after.as_secs();
            info!(
                target: COMMAND_LOG_TARGET,
                command = %invocation,
                timeout_secs = secs,
                "command timed out"
            );
            Err(render_failure(
                kind,
                &format!("{context}: timed out after {secs}s"),
                &output,
            ))
        }
    }
}
