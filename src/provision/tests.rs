//! Tests for the provisioning state machine.

use super::*;
use crate::command::{CommandInvocation, CommandOutput, MockCommandRunner};
use camino::Utf8Path;
use mockall::Sequence;
use std::fs;
use tempfile::{TempDir, tempdir};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

struct Layout {
    _temp: TempDir,
    root: Utf8PathBuf,
}

impl Layout {
    fn new() -> Self {
        let temp = tempdir().expect("tempdir");
        let root = Utf8Path::from_path(temp.path()).expect("utf8 path").to_path_buf();
        Self { _temp: temp, root }
    }

    fn settings(&self) -> ProvisionerSettings {
        ProvisionerSettings::with_dirs(self.root.join("repo"), self.root.join("binaries"))
    }

    fn destination(&self) -> Utf8PathBuf {
        self.root.join("dest")
    }

    fn seed_cache(&self, version: &str, contents: &str) -> Utf8PathBuf {
        let cache_dir = self.root.join("binaries");
        fs::create_dir_all(&cache_dir).expect("create cache dir");
        let entry = cache_dir.join(format!("dgraph_{version}"));
        fs::write(&entry, contents).expect("write cache entry");
        entry
    }
}

fn args_of(invocation: &CommandInvocation) -> Vec<&str> {
    invocation.args().iter().map(String::as_str).collect()
}

fn is_git(invocation: &CommandInvocation, first_arg: &str) -> bool {
    invocation.program() == "git" && args_of(invocation).first() == Some(&first_arg)
}

#[cfg(unix)]
#[test]
fn cache_hit_copies_without_running_commands() {
    let layout = Layout::new();
    let entry = layout.seed_cache("v24.0.5", "cached build");
    fs::set_permissions(&entry, fs::Permissions::from_mode(0o750)).expect("chmod entry");

    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();

    let provisioner = BinaryProvisioner::with_runner(layout.settings(), runner);
    let binary = provisioner
        .ensure_binary("v24.0.5", &layout.destination())
        .expect("cache hit");

    assert_eq!(binary, layout.destination().join("dgraph"));
    assert_eq!(fs::read_to_string(&binary).expect("read binary"), "cached build");
    let mode = fs::metadata(&binary).expect("stat binary").permissions().mode() & 0o777;
    assert_eq!(mode, 0o750);
}

#[cfg(unix)]
#[test]
fn reprovisioning_succeeds_while_destination_binary_runs() {
    let layout = Layout::new();
    let sleep = ["/bin/sleep", "/usr/bin/sleep"]
        .into_iter()
        .map(std::path::Path::new)
        .find(|path| path.is_file())
        .expect("a sleep binary");
    let cache_dir = layout.root.join("binaries");
    fs::create_dir_all(&cache_dir).expect("create cache dir");
    fs::copy(sleep, cache_dir.join("dgraph_main")).expect("seed executable entry");

    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();
    let provisioner = BinaryProvisioner::with_runner(layout.settings(), runner);
    let binary = provisioner
        .ensure_binary("main", &layout.destination())
        .expect("first provision");

    let mut running = std::process::Command::new(binary.as_std_path())
        .arg("5")
        .spawn()
        .expect("run provisioned binary");
    let second = provisioner.ensure_binary("main", &layout.destination());
    running.kill().expect("stop running binary");
    running.wait().expect("reap running binary");

    assert_eq!(second.expect("second provision"), binary);
    assert_eq!(
        fs::read(&binary).expect("read binary"),
        fs::read(sleep).expect("read sleep")
    );
}

#[test]
fn cache_miss_clones_checks_out_and_builds_in_order() {
    let layout = Layout::new();
    let repo_dir = layout.root.join("repo");
    let artifact = repo_dir.join("dgraph/dgraph");

    let mut seq = Sequence::new();
    let mut runner = MockCommandRunner::new();
    runner
        .expect_run()
        .withf(|inv| is_git(inv, "clone"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(CommandOutput::success("")));
    runner
        .expect_run()
        .withf(|inv| args_of(inv) == ["checkout", "-f", "v24.0.5"])
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(CommandOutput::success("")));
    runner
        .expect_run()
        .withf(|inv| inv.program() == "make")
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_| {
            fs::create_dir_all(artifact.parent().expect("artifact parent"))?;
            fs::write(&artifact, "built v24.0.5")?;
            Ok(CommandOutput::success("go build"))
        });

    let provisioner = BinaryProvisioner::with_runner(layout.settings(), runner);
    let binary = provisioner
        .ensure_binary("v24.0.5", &layout.destination())
        .expect("build path");

    assert_eq!(fs::read_to_string(&binary).expect("read binary"), "built v24.0.5");
    let entry = layout.root.join("binaries/dgraph_v24.0.5");
    assert_eq!(fs::read_to_string(&entry).expect("read entry"), "built v24.0.5");
}

#[test]
fn build_failure_leaves_cache_and_destination_empty() {
    let layout = Layout::new();

    let mut runner = MockCommandRunner::new();
    runner
        .expect_run()
        .withf(|inv| inv.program() == "git")
        .returning(|_| Ok(CommandOutput::success("")));
    runner
        .expect_run()
        .withf(|inv| inv.program() == "make")
        .times(1)
        .returning(|_| Ok(CommandOutput::failure(2, "cannot find package raftwal")));

    let provisioner = BinaryProvisioner::with_runner(layout.settings(), runner);
    let err = provisioner
        .ensure_binary("v24.0.5", &layout.destination())
        .expect_err("build should fail");

    assert_eq!(err.kind(), ProvisionErrorKind::Build);
    assert!(err.to_string().contains("cannot find package raftwal"), "{err}");
    assert!(!layout.root.join("binaries/dgraph_v24.0.5").exists());
    assert!(!layout.destination().join("dgraph").exists());
}

#[test]
fn checkout_failure_stops_before_build() {
    let layout = Layout::new();

    let mut runner = MockCommandRunner::new();
    runner
        .expect_run()
        .withf(|inv| is_git(inv, "clone"))
        .returning(|_| Ok(CommandOutput::success("")));
    runner
        .expect_run()
        .withf(|inv| is_git(inv, "checkout"))
        .returning(|_| Ok(CommandOutput::failure(1, "error: pathspec 'v0.0.0' did not match")));
    runner
        .expect_run()
        .withf(|inv| inv.program() == "make")
        .never();

    let provisioner = BinaryProvisioner::with_runner(layout.settings(), runner);
    let err = provisioner
        .ensure_binary("v0.0.0", &layout.destination())
        .expect_err("checkout should fail");

    assert_eq!(err.kind(), ProvisionErrorKind::Checkout);
}

#[test]
fn clone_failure_is_a_sync_error() {
    let layout = Layout::new();

    let mut runner = MockCommandRunner::new();
    runner
        .expect_run()
        .withf(|inv| is_git(inv, "clone"))
        .times(1)
        .returning(|_| Ok(CommandOutput::failure(128, "fatal: unable to access")));

    let provisioner = BinaryProvisioner::with_runner(layout.settings(), runner);
    let err = provisioner
        .ensure_binary("main", &layout.destination())
        .expect_err("clone should fail");

    assert_eq!(err.kind(), ProvisionErrorKind::Sync);
    assert!(err.to_string().contains("error cloning dgraph repo"), "{err}");
}

#[test]
fn directory_cache_entry_fails_to_copy() {
    let layout = Layout::new();
    let entry = layout.root.join("binaries/dgraph_main");
    fs::create_dir_all(&entry).expect("create directory entry");

    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();

    let provisioner = BinaryProvisioner::with_runner(layout.settings(), runner);
    let err = provisioner
        .ensure_binary("main", &layout.destination())
        .expect_err("directory entry must not copy");

    assert_eq!(err.kind(), ProvisionErrorKind::Copy);
    assert!(err.to_string().contains("is not a regular file"), "{err}");
}

#[test]
fn digest_verification_rejects_tampered_entries_without_rebuilding() {
    let layout = Layout::new();
    let build_dir = layout.root.join("build");
    fs::create_dir_all(&build_dir).expect("create build dir");
    let artifact = build_dir.join("dgraph");
    fs::write(&artifact, "genuine").expect("write artifact");
    let entry = populate_cache(&artifact, &layout.root.join("binaries"), "main").expect("populate");
    fs::write(&entry, "corrupted").expect("corrupt entry");

    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();

    let mut settings = layout.settings();
    settings.verify_cache_digest = true;
    let provisioner = BinaryProvisioner::with_runner(settings, runner);
    let err = provisioner
        .ensure_binary("main", &layout.destination())
        .expect_err("digest mismatch");

    assert_eq!(err.kind(), ProvisionErrorKind::Lookup);
    assert!(!layout.destination().join("dgraph").exists());
}

#[test]
fn entry_cached_while_waiting_for_the_lock_skips_the_build() {
    let layout = Layout::new();
    let entry = layout.seed_cache("v24.0.5", "built by a concurrent provisioner");

    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();

    let provisioner = BinaryProvisioner::with_runner(layout.settings(), runner);
    let found = provisioner
        .build_and_cache("v24.0.5")
        .expect("re-check under the lock");

    assert_eq!(found, entry);
    assert!(!layout.root.join("repo").exists(), "checkout must stay untouched");
}

#[test]
fn entry_cached_while_waiting_for_the_lock_is_digest_checked() {
    let layout = Layout::new();
    let build_dir = layout.root.join("build");
    fs::create_dir_all(&build_dir).expect("create build dir");
    let artifact = build_dir.join("dgraph");
    fs::write(&artifact, "genuine").expect("write artifact");
    let entry =
        populate_cache(&artifact, &layout.root.join("binaries"), "v24.0.5").expect("populate");
    fs::write(&entry, "corrupted").expect("corrupt entry");

    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();

    let mut settings = layout.settings();
    settings.verify_cache_digest = true;
    let provisioner = BinaryProvisioner::with_runner(settings, runner);
    let err = provisioner
        .build_and_cache("v24.0.5")
        .expect_err("digest mismatch under the lock");

    assert_eq!(err.kind(), ProvisionErrorKind::Lookup);
}

#[test]
fn tampered_entries_are_trusted_when_verification_is_off() {
    let layout = Layout::new();
    layout.seed_cache("main", "whatever is there");

    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();

    let provisioner = BinaryProvisioner::with_runner(layout.settings(), runner);
    let binary = provisioner
        .ensure_binary("main", &layout.destination())
        .expect("presence is enough");
    assert_eq!(fs::read_to_string(binary).expect("read"), "whatever is there");
}

#[rstest::rstest]
#[case("")]
#[case("   ")]
#[case("--upload-pack=touch /tmp/pwned")]
fn unusable_versions_are_rejected_before_any_side_effect(#[case] version: &str) {
    let layout = Layout::new();
    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();

    let provisioner = BinaryProvisioner::with_runner(layout.settings(), runner);
    let err = provisioner
        .ensure_binary(version, &layout.destination())
        .expect_err("version should be rejected");

    assert_eq!(err.kind(), ProvisionErrorKind::Lookup);
    assert!(!layout.root.join("repo").exists());
    assert!(!layout.destination().exists());
}
