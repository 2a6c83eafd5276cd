//! Shared test helpers for test-bisect integration tests.
//!
//! Each test gets its own temp directory holding a `.test-bisect.toml` that
//! points the list and run commands at small shell scripts in that directory.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Create a temp project whose list command runs `list_script` and whose run
/// command runs `run_script` with the scratch file as `$1`.
pub fn setup_project(list_script: &str, run_script: &str) -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    std::fs::write(dir.path().join("list.sh"), list_script).unwrap();
    std::fs::write(dir.path().join("run.sh"), run_script).unwrap();
    std::fs::write(
        dir.path().join(".test-bisect.toml"),
        r#"
[commands]
list = ["sh", "list.sh"]
run = ["sh", "run.sh", "{matchfile}"]
"#,
    )
    .unwrap();
    dir
}

/// Run test-bisect with the given args in the given directory.
pub fn bisect_in(dir: &Path, args: &[&str]) -> Output {
    bisect_with_env(dir, args, &[])
}

/// Like [`bisect_in`], with extra environment variables set for the run.
pub fn bisect_with_env(dir: &Path, args: &[&str], envs: &[(&str, &Path)]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_test-bisect"))
        .args(args)
        .current_dir(dir)
        .env_remove("TEST_BISECT_CONFIG")
        .env_remove("TEST_BISECT_LOG")
        .envs(envs.iter().copied())
        .output()
        .expect("failed to execute test-bisect")
}

/// Run test-bisect and assert it succeeds. Returns stdout as string.
pub fn bisect_ok(dir: &Path, args: &[&str]) -> String {
    let out = bisect_in(dir, args);
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "test-bisect {} failed:\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" "),
    );
    stdout.to_string()
}

/// Run test-bisect and assert it fails. Returns the output.
pub fn bisect_fails(dir: &Path, args: &[&str]) -> Output {
    let out = bisect_in(dir, args);
    assert!(
        !out.status.success(),
        "Expected test-bisect {} to fail, but it succeeded.\nstdout: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
    );
    out
}

/// Read a file in the project directory.
pub fn read(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(name))
        .unwrap_or_else(|e| panic!("failed to read {name}: {e}"))
}
