//! Behavioural coverage for end-to-end provisioning against a scripted
//! git and make.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Result, ensure};
use dgraph_test_binary::test_support::ScriptedRunner;
use dgraph_test_binary::{BinaryProvisioner, ProvisionErrorKind, ProvisionerSettings};
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

struct Sandbox {
    _temp: TempDir,
    root: Utf8PathBuf,
}

impl Sandbox {
    fn repo_dir(&self) -> Utf8PathBuf {
        self.root.join("repo")
    }

    fn cache_dir(&self) -> Utf8PathBuf {
        self.root.join("binaries")
    }

    fn destination(&self) -> Utf8PathBuf {
        self.root.join("cluster/bin")
    }

    fn settings(&self) -> ProvisionerSettings {
        ProvisionerSettings::with_dirs(self.repo_dir(), self.cache_dir())
    }

    fn provisioner(&self, runner: ScriptedRunner) -> BinaryProvisioner<ScriptedRunner> {
        BinaryProvisioner::with_runner(self.settings(), runner)
    }
}

#[fixture]
fn sandbox() -> Sandbox {
    let temp = TempDir::new().expect("create sandbox");
    let root = Utf8Path::from_path(temp.path())
        .expect("sandbox path is UTF-8")
        .to_path_buf();
    Sandbox { _temp: temp, root }
}

#[rstest]
fn fresh_machine_clones_checks_out_builds_and_caches(sandbox: Sandbox) -> Result<()> {
    let provisioner = sandbox.provisioner(ScriptedRunner::new());

    let binary = provisioner.ensure_binary("v24.0.5", &sandbox.destination())?;

    ensure!(
        provisioner.runner().steps() == ["git clone", "git checkout", "make dgraph"],
        "unexpected steps: {:?}",
        provisioner.runner().steps()
    );
    ensure!(binary == sandbox.destination().join("dgraph"));
    ensure!(fs::read_to_string(&binary)? == "dgraph built from v24.0.5");
    let entry = sandbox.cache_dir().join("dgraph_v24.0.5");
    ensure!(fs::read_to_string(&entry)? == "dgraph built from v24.0.5");
    Ok(())
}

#[rstest]
fn second_request_is_a_cache_hit_with_identical_content(sandbox: Sandbox) -> Result<()> {
    let provisioner = sandbox.provisioner(ScriptedRunner::new());

    let first = provisioner.ensure_binary("v24.0.5", &sandbox.destination())?;
    let first_content = fs::read(&first)?;
    let steps_after_first = provisioner.runner().invocations().len();

    let second = provisioner.ensure_binary("v24.0.5", &sandbox.destination())?;

    ensure!(first == second);
    ensure!(fs::read(&second)? == first_content);
    ensure!(
        provisioner.runner().invocations().len() == steps_after_first,
        "second call must not run git or make"
    );
    Ok(())
}

#[rstest]
fn existing_healthy_checkout_is_fetched_not_recloned(sandbox: Sandbox) -> Result<()> {
    let provisioner = sandbox.provisioner(ScriptedRunner::new());
    provisioner.ensure_binary("v24.0.5", &sandbox.destination())?;

    provisioner.ensure_binary("main", &sandbox.destination())?;

    let steps = provisioner.runner().steps();
    ensure!(
        steps
            == [
                "git clone",
                "git checkout",
                "make dgraph",
                "git status",
                "git fetch",
                "git checkout",
                "make dgraph",
            ],
        "unexpected steps: {steps:?}"
    );
    ensure!(
        fs::read_to_string(sandbox.destination().join("dgraph"))? == "dgraph built from main"
    );
    Ok(())
}

#[rstest]
fn corrupted_checkout_is_deleted_and_recloned(sandbox: Sandbox) -> Result<()> {
    let repo_dir = sandbox.repo_dir();
    fs::create_dir_all(&repo_dir)?;
    let sentinel = repo_dir.join("sentinel");
    fs::write(&sentinel, "left over from a crashed run")?;

    let provisioner = sandbox.provisioner(ScriptedRunner::new());
    provisioner.ensure_binary("v24.0.5", &sandbox.destination())?;

    let steps = provisioner.runner().steps();
    ensure!(
        steps == ["git status", "git clone", "git checkout", "make dgraph"],
        "unexpected steps: {steps:?}"
    );
    ensure!(!sentinel.exists(), "old checkout contents must be gone");
    ensure!(repo_dir.join(".git").is_dir(), "checkout must be re-cloned");
    Ok(())
}

#[rstest]
fn build_failure_surfaces_output_and_populates_nothing(sandbox: Sandbox) -> Result<()> {
    let runner = ScriptedRunner::new().with_build_failure("# github.com/dgraph-io/dgraph\nboom");
    let provisioner = sandbox.provisioner(runner);

    let Err(err) = provisioner.ensure_binary("v24.0.5", &sandbox.destination()) else {
        color_eyre::eyre::bail!("build failure must not succeed");
    };

    ensure!(err.kind() == ProvisionErrorKind::Build);
    ensure!(err.to_string().contains("boom"), "missing build output: {err}");
    ensure!(!sandbox.cache_dir().join("dgraph_v24.0.5").exists());
    ensure!(!sandbox.destination().join("dgraph").exists());
    Ok(())
}

#[rstest]
#[case::clone(ScriptedRunner::new().with_clone_failure("fatal: could not resolve host"), ProvisionErrorKind::Sync)]
#[case::checkout(ScriptedRunner::new().with_unknown_ref("v24.0.5"), ProvisionErrorKind::Checkout)]
fn step_failures_keep_their_kind(
    sandbox: Sandbox,
    #[case] runner: ScriptedRunner,
    #[case] expected: ProvisionErrorKind,
) -> Result<()> {
    let provisioner = sandbox.provisioner(runner);

    let Err(err) = provisioner.ensure_binary("v24.0.5", &sandbox.destination()) else {
        color_eyre::eyre::bail!("step failure must not succeed");
    };

    ensure!(err.kind() == expected, "got {:?}: {err}", err.kind());
    ensure!(
        !provisioner.runner().steps().contains(&"make dgraph".to_owned()),
        "build must not run after an earlier failure"
    );
    Ok(())
}

#[rstest]
fn fetch_failure_on_existing_checkout_is_a_sync_error(sandbox: Sandbox) -> Result<()> {
    fs::create_dir_all(sandbox.repo_dir().join(".git"))?;
    let provisioner =
        sandbox.provisioner(ScriptedRunner::new().with_fetch_failure("fatal: early EOF"));

    let Err(err) = provisioner.ensure_binary("main", &sandbox.destination()) else {
        color_eyre::eyre::bail!("fetch failure must not succeed");
    };

    ensure!(err.kind() == ProvisionErrorKind::Sync);
    ensure!(err.to_string().contains("early EOF"), "{err}");
    Ok(())
}

#[cfg(unix)]
#[rstest]
fn destination_keeps_cache_entry_permissions(sandbox: Sandbox) -> Result<()> {
    fs::create_dir_all(sandbox.cache_dir())?;
    let entry = sandbox.cache_dir().join("dgraph_main");
    fs::write(&entry, "prebuilt")?;
    fs::set_permissions(&entry, fs::Permissions::from_mode(0o700))?;

    let provisioner = sandbox.provisioner(ScriptedRunner::new());
    let binary = provisioner.ensure_binary("main", &sandbox.destination())?;

    ensure!(provisioner.runner().invocations().is_empty());
    let mode = fs::metadata(&binary)?.permissions().mode() & 0o777;
    ensure!(mode == 0o700, "unexpected mode {mode:o}");
    Ok(())
}

#[rstest]
fn directory_as_cache_entry_is_rejected(sandbox: Sandbox) -> Result<()> {
    fs::create_dir_all(sandbox.cache_dir().join("dgraph_main"))?;
    let provisioner = sandbox.provisioner(ScriptedRunner::new());

    let Err(err) = provisioner.ensure_binary("main", &sandbox.destination()) else {
        color_eyre::eyre::bail!("directory entry must not be copied");
    };

    ensure!(err.kind() == ProvisionErrorKind::Copy);
    ensure!(err.to_string().contains("is not a regular file"), "{err}");
    Ok(())
}

#[rstest]
fn branch_names_with_slashes_are_cached_flat(sandbox: Sandbox) -> Result<()> {
    let provisioner = sandbox.provisioner(ScriptedRunner::new());

    provisioner.ensure_binary("release/v24.0", &sandbox.destination())?;

    ensure!(sandbox.cache_dir().join("dgraph_release_v24.0").is_file());
    ensure!(
        fs::read_to_string(sandbox.destination().join("dgraph"))?
            == "dgraph built from release/v24.0"
    );
    Ok(())
}
