//! Integration tests for repository checks.
//!
//! Stores are written through the engine, then damaged from outside with
//! raw git commits the way a careless external tool would.

use tempfile::TempDir;

use gitkv::core::config::{CheckSection, Config, ConfigFile};
use gitkv::core::metadata::{CommitMetaData, MetaData};
use gitkv::core::types::{RefName, StoreKey, UtcTimestamp};
use gitkv::git::{Git, Identity, IndexItem, FILE_MODE};
use gitkv::store::{BranchStatus, RefHolderPool, StoreError};

fn config(test_ref: Option<&str>) -> Config {
    Config {
        repo: Some(ConfigFile {
            check: Some(CheckSection {
                test_ref: test_ref.map(str::to_string),
            }),
            ..ConfigFile::default()
        }),
        ..Config::default()
    }
}

fn commit() -> CommitMetaData {
    CommitMetaData::new("Ada", "ada@example.com", "seed").unwrap()
}

fn key(k: &str) -> StoreKey {
    StoreKey::new(k).unwrap()
}

/// Commit `files` on top of the ref's current tree, bypassing the engine.
fn tamper(git_dir: &std::path::Path, refname: &str, files: &[(&str, &str)]) {
    let git = Git::open(git_dir).unwrap();
    let parent = git.resolve_ref(refname).unwrap();
    let tree = git.commit_tree(&parent).unwrap();

    let mut entries: Vec<IndexItem> = git
        .walk_tree(&tree)
        .unwrap()
        .into_iter()
        .filter(|item| !files.iter().any(|(path, _)| *path == item.path))
        .map(|item| IndexItem {
            path: item.path,
            oid: item.oid,
            mode: item.mode as u32,
            size: 0,
            mtime: 0,
        })
        .collect();
    for (path, text) in files {
        entries.push(IndexItem {
            path: path.to_string(),
            oid: git.write_blob(text.as_bytes()).unwrap(),
            mode: FILE_MODE,
            size: text.len() as u32,
            mtime: 0,
        });
    }

    let tree = git.write_tree_from_entries(&entries).unwrap();
    let who = Identity {
        name: "mallory".into(),
        email: "mallory@example.com".into(),
        time: UtcTimestamp::now(),
    };
    let new = git
        .write_commit(&tree, &[&parent], &who, &who, "hand edit")
        .unwrap();
    assert!(git
        .update_ref_cas(refname, &new, Some(&parent), "hand edit")
        .is_accepted());
}

async fn seed(pool: &RefHolderPool, branch: &str) {
    let holder = pool.holder(branch).unwrap();
    holder
        .add_key(
            &key("config"),
            b"{}".to_vec(),
            Some(MetaData::new("application/json").with_hidden(false)),
            commit(),
        )
        .await
        .unwrap()
        .done()
        .unwrap();
    holder
        .update_metadata(&key("conf/"), MetaData::new("text/plain"), None, commit())
        .await
        .unwrap()
        .done()
        .unwrap();
    holder
        .add_user("bob", "pw", ["admin".to_string()].into(), commit())
        .await
        .unwrap()
        .done()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn engine_writes_check_clean() {
    let dir = TempDir::new().unwrap();
    let pool = RefHolderPool::init(dir.path(), &config(None)).unwrap();
    seed(&pool, "main").await;

    let report = pool
        .checker()
        .unwrap()
        .check_ref(&RefName::parse("main").unwrap())
        .await
        .unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert!(report.warnings().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ref_comes_from_config() {
    let dir = TempDir::new().unwrap();
    let pool = RefHolderPool::init(dir.path(), &config(Some("qa"))).unwrap();
    seed(&pool, "qa").await;

    let checker = pool.checker().unwrap();
    assert_eq!(checker.test_ref().unwrap().as_str(), "refs/heads/qa");
    let report = checker.check_test_ref().await.unwrap();
    assert_eq!(report.refname.as_str(), "refs/heads/qa");
    assert!(report.is_clean());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_test_ref_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let pool = RefHolderPool::init(dir.path(), &config(None)).unwrap();
    let err = pool.checker().unwrap().check_test_ref().await.unwrap_err();
    assert!(matches!(err, StoreError::NoTestRef));
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_but_absent_test_ref_is_reported() {
    let dir = TempDir::new().unwrap();
    let pool = RefHolderPool::init(dir.path(), &config(Some("qa"))).unwrap();
    let report = pool.checker().unwrap().check_test_ref().await.unwrap();
    assert_eq!(report.status, BranchStatus::RefNotFound);
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_branch_is_isolated_in_the_report() {
    let dir = TempDir::new().unwrap();
    let pool = RefHolderPool::init(dir.path(), &config(None)).unwrap();
    seed(&pool, "main").await;
    seed(&pool, "staging").await;

    tamper(
        dir.path(),
        "refs/heads/staging",
        &[
            ("config.metadata", r#"{"content_type":""}"#),
            (".users/bob", "not a user"),
            ("stray.metadata", r#"{"content_type":"text/plain"}"#),
        ],
    );

    let report = pool.checker().unwrap().check_all_heads().await.unwrap();
    assert_eq!(report.branches.len(), 2);
    assert_eq!(report.error_count(), 2);
    assert_eq!(report.warning_count(), 1);
    assert!(!report.is_clean());

    let main = &report.branches[0];
    assert_eq!(main.refname.as_str(), "refs/heads/main");
    assert!(main.is_clean());

    let staging = &report.branches[1];
    let mut errors: Vec<_> = staging.errors().iter().map(|i| i.path.as_str()).collect();
    errors.sort_unstable();
    assert_eq!(errors, vec![".users/bob", "config.metadata"]);
    assert_eq!(staging.warnings()[0].path, "stray.metadata");
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_metadata_fails_reads_of_that_key_only() {
    let dir = TempDir::new().unwrap();
    let pool = RefHolderPool::init(dir.path(), &config(None)).unwrap();
    seed(&pool, "main").await;
    let holder = pool.holder("main").unwrap();
    holder
        .add_key(&key("other"), b"ok".to_vec(), None, commit())
        .await
        .unwrap()
        .done()
        .unwrap();

    tamper(dir.path(), "refs/heads/main", &[("config.metadata", "{oops")]);
    holder.reload().await.unwrap();

    let err = holder.read_key(&key("config")).await.unwrap_err();
    assert!(matches!(err, StoreError::Metadata { .. }), "{err:?}");
    assert!(holder.read_key(&key("other")).await.unwrap().is_some());
}
