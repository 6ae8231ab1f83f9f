//! Integration tests for the gitkv binary.
//!
//! Every test runs the real binary against a fresh bare repository, with
//! global config and logging isolated from the host.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use gitkv::git::Git;

// =============================================================================
// Test Fixtures
// =============================================================================

struct TestStore {
    dir: TempDir,
}

impl TestStore {
    /// A store created with `gitkv init`.
    fn new() -> Self {
        let store = Self::uninitialized();
        store.cmd().arg("init").assert().success();
        store
    }

    fn uninitialized() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The binary, pointed at this store, with an identity set.
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("gitkv").expect("binary not built");
        cmd.arg("--repo")
            .arg(self.path())
            .env("GITKV_AUTHOR", "Ada")
            .env("GITKV_EMAIL", "ada@example.com")
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path())
            .env_remove("GITKV_CONFIG")
            .env_remove("GITKV_LOG");
        cmd
    }

    /// Run quietly and return trimmed stdout.
    fn output(&self, args: &[&str]) -> String {
        let out = self.cmd().arg("-q").args(args).assert().success();
        String::from_utf8(out.get_output().stdout.clone())
            .unwrap()
            .trim()
            .to_string()
    }

    fn put(&self, key: &str, data: &str) -> String {
        self.output(&["put", key, "--data", data])
    }
}

// =============================================================================
// init
// =============================================================================

#[test]
fn init_creates_and_then_updates() {
    let store = TestStore::uninitialized();
    store
        .cmd()
        .args(["init", "--test-ref", "qa"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized gitkv store"));

    assert!(Git::open(store.path()).is_ok());
    let config = gitkv::core::config::Config::load_from(None, Some(store.path())).unwrap();
    assert_eq!(config.test_ref().as_deref(), Some("qa"));

    store
        .cmd()
        .args(["init", "--cache-capacity", "16"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated gitkv store"));
    let config = gitkv::core::config::Config::load_from(None, Some(store.path())).unwrap();
    assert_eq!(config.cache_capacity(), 16);
    assert_eq!(config.test_ref().as_deref(), Some("qa"));
}

#[test]
fn commands_need_a_repository() {
    let store = TestStore::uninitialized();
    store
        .cmd()
        .args(["get", "a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

// =============================================================================
// keys
// =============================================================================

#[test]
fn put_then_get() {
    let store = TestStore::new();
    let version = store.output(&["put", "greeting", "--data", "hello", "--content-type", "text/plain"]);
    assert_eq!(version.len(), 40);

    store
        .cmd()
        .args(["get", "greeting"])
        .assert()
        .success()
        .stdout("hello");

    store
        .cmd()
        .args(["get", "greeting", "--info"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("version: {version}")))
        .stdout(predicate::str::contains("content-type: text/plain"));
}

#[test]
fn put_reads_a_file() {
    let store = TestStore::new();
    let file = store.path().join("payload.bin");
    std::fs::write(&file, [0u8, 159, 146, 150]).unwrap();

    store
        .cmd()
        .args(["put", "blob", "--file"])
        .arg(&file)
        .assert()
        .success();
    store
        .cmd()
        .args(["get", "blob"])
        .assert()
        .success()
        .stdout(predicate::eq(&[0u8, 159, 146, 150][..]));
}

#[test]
fn update_needs_the_current_version() {
    let store = TestStore::new();
    let v1 = store.put("k", "1");
    let v2 = store.output(&["put", "k", "--data", "2", "--version", &v1]);
    assert_ne!(v1, v2);

    store
        .cmd()
        .args(["put", "k", "--data", "3", "--version", &v1])
        .assert()
        .failure()
        .stderr(predicate::str::contains("version mismatch"));

    store
        .cmd()
        .args(["put", "k", "--data", "again"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("key already exists"));
}

#[test]
fn content_type_is_only_for_new_keys() {
    let store = TestStore::new();
    let v1 = store.put("k", "1");
    store
        .cmd()
        .args(["put", "k", "--data", "2", "--version", &v1, "--content-type", "text/plain"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("gitkv meta"));
}

#[test]
fn delete_removes_the_key() {
    let store = TestStore::new();
    let version = store.put("k", "1");
    let commit = store.output(&["delete", "k", "--version", &version]);
    assert_ne!(commit, version);

    store
        .cmd()
        .args(["get", "k"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn list_shows_one_level_or_everything() {
    let store = TestStore::new();
    store.put("top", "1");
    store.put("dir/a", "2");
    store.put("dir/sub/b", "3");

    let shallow = store.output(&["list", "dir"]);
    assert_eq!(shallow.lines().collect::<Vec<_>>(), vec!["dir/a", "dir/sub/"]);

    let deep = store.output(&["list", "dir", "--recursive"]);
    assert_eq!(deep.lines().collect::<Vec<_>>(), vec!["dir/a", "dir/sub/b"]);

    let root = store.output(&["list"]);
    assert_eq!(root.lines().collect::<Vec<_>>(), vec!["dir/", "top"]);
}

#[test]
fn hidden_keys_disappear() {
    let store = TestStore::new();
    store.put("secret", "s3cr3t");
    store.output(&["meta", "secret", "--hidden", "true"]);

    store
        .cmd()
        .args(["get", "secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    assert!(store.output(&["list"]).is_empty());
}

#[test]
fn protected_keys_refuse_deletes() {
    let store = TestStore::new();
    let version = store.put("k", "1");
    store.output(&["meta", "k", "--protected", "true"]);

    store
        .cmd()
        .args(["delete", "k", "--version", &version])
        .assert()
        .failure()
        .stderr(predicate::str::contains("protected"));
}

#[test]
fn mutations_need_an_identity() {
    let store = TestStore::new();
    store
        .cmd()
        .env_remove("GITKV_AUTHOR")
        .args(["put", "k", "--data", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no author"));

    store
        .cmd()
        .env_remove("GITKV_AUTHOR")
        .args(["--author", "Grace", "put", "k", "--data", "1"])
        .assert()
        .success();
}

// =============================================================================
// refs
// =============================================================================

#[test]
fn branches_fork_from_their_base() {
    let store = TestStore::new();
    store.put("k", "main");
    store
        .cmd()
        .args(["branch", "create", "dev"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created branch dev"));

    store
        .cmd()
        .args(["--ref", "dev", "get", "k"])
        .assert()
        .success()
        .stdout("main");

    store.output(&["--ref", "dev", "put", "only-dev", "--data", "x"]);
    store
        .cmd()
        .args(["get", "only-dev"])
        .assert()
        .failure();

    store
        .cmd()
        .args(["branch", "delete", "dev", "ghost"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted dev"))
        .stdout(predicate::str::contains("1 ref(s) did not exist"));
}

#[test]
fn tags_are_read_only() {
    let store = TestStore::new();
    store.put("k", "v");
    let git = Git::open(store.path()).unwrap();
    let head = git.resolve_ref("refs/heads/main").unwrap();
    assert!(git.create_ref("refs/tags/v1", &head, "tag").unwrap());

    store
        .cmd()
        .args(["--ref", "refs/tags/v1", "get", "k"])
        .assert()
        .success()
        .stdout("v");
    store
        .cmd()
        .args(["--ref", "refs/tags/v1", "put", "x", "--data", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tags cannot be modified"));
}

// =============================================================================
// users
// =============================================================================

#[test]
fn user_lifecycle() {
    let store = TestStore::new();
    let v1 = store.output(&["user", "add", "bob", "--password", "pw", "--role", "reader"]);

    store
        .cmd()
        .args(["user", "get", "bob"])
        .assert()
        .success()
        .stdout(predicate::str::contains("roles: reader"))
        .stdout(predicate::str::contains(format!("version: {v1}")));

    let v2 = store.output(&["user", "update", "bob", "--role", "writer", "--version", &v1]);
    store
        .cmd()
        .args(["user", "get", "bob"])
        .assert()
        .success()
        .stdout(predicate::str::contains("roles: writer"));

    store
        .cmd()
        .args(["user", "delete", "bob", "--version", &v1])
        .assert()
        .failure()
        .stderr(predicate::str::contains("version mismatch"));
    store.output(&["user", "delete", "bob", "--version", &v2]);
    store
        .cmd()
        .args(["user", "get", "bob"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("user 'bob' not found"));
}

// =============================================================================
// check
// =============================================================================

#[test]
fn check_reports_clean_refs() {
    let store = TestStore::new();
    store.put("k", "v");
    store
        .cmd()
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("All 1 ref(s) ok"));
    store
        .cmd()
        .args(["check", "--all"])
        .assert()
        .success();
}

#[test]
fn check_test_needs_configuration() {
    let store = TestStore::new();
    store
        .cmd()
        .args(["check", "--test"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no test ref configured"));

    store.cmd().args(["init", "--test-ref", "main"]).assert().success();
    store.put("k", "v");
    store.cmd().args(["check", "--test"]).assert().success();
}
