//! Tests against a live SFTP server.
//!
//! Run with `--features integration` and point `STASH_TEST_SFTP_SERVER`,
//! `STASH_TEST_SFTP_USERNAME`, `STASH_TEST_SFTP_PASSWORD` (or
//! `STASH_TEST_SFTP_KEY`) and `STASH_TEST_SFTP_PATH` at a disposable
//! account.

#![cfg(feature = "integration")]

use stash_cache::{CacheConfig, Orchestrator};
use stash_core::{ByteStream, Storage};
use stash_sftp::{SftpConfig, SftpStorage};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn test_config() -> SftpConfig {
    let mut config = SftpConfig::new(env("STASH_TEST_SFTP_SERVER").unwrap_or("localhost:2222".into()))
        .with_username(env("STASH_TEST_SFTP_USERNAME").unwrap_or("stash".into()));
    if let Some(password) = env("STASH_TEST_SFTP_PASSWORD") {
        config = config.with_password(password);
    }
    if let Some(key) = env("STASH_TEST_SFTP_KEY") {
        config = config.with_private_key(key);
    }
    config
}

fn scratch_root() -> String {
    let base = env("STASH_TEST_SFTP_PATH").unwrap_or("/tmp".into());
    format!(
        "{}/stash-it-{}-{}",
        base.trim_end_matches('/'),
        std::process::id(),
        chrono::Utc::now().timestamp_micros()
    )
}

#[tokio::test]
async fn test_put_get_list_remove() {
    let storage = SftpStorage::connect(&test_config()).await.unwrap();
    let root = scratch_root();
    let object = format!("{}/a/b/c/object", root);

    let body: ByteStream = Box::pin(std::io::Cursor::new(b"remote bytes".to_vec()));
    storage.put(&object, None, body).await.unwrap();

    let mut read = vec![];
    storage
        .get(&object)
        .await
        .unwrap()
        .read_to_end(&mut read)
        .await
        .unwrap();
    assert_eq!(read, b"remote bytes");

    let entries = storage.list(&root).await.unwrap();
    assert_eq!(entries[0].name, root);
    assert!(entries.iter().any(|e| e.name == object && e.size == 12));

    storage.remove(&object).await.unwrap();
    assert!(storage.remove(&object).await.unwrap_err().is_not_found());
    assert!(storage.get(&object).await.err().unwrap().is_not_found());

    storage.close().await.unwrap();
    storage.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rebuild_and_restore_over_sftp() {
    let local = tempfile::tempdir().unwrap();
    let mount = local.path().join("target");
    std::fs::create_dir_all(mount.join("debug")).unwrap();
    std::fs::write(mount.join("debug/app"), b"binary").unwrap();
    let mount = mount.to_str().unwrap().to_string();

    let storage: Arc<dyn Storage> = Arc::new(SftpStorage::connect(&test_config()).await.unwrap());
    let config = CacheConfig::new(scratch_root(), "octocat/hello-world")
        .with_branch("main")
        .with_mounts([mount.clone()]);
    let orchestrator = Orchestrator::new(config.clone(), storage.clone());

    orchestrator.rebuild().await.unwrap();
    std::fs::remove_dir_all(&mount).unwrap();
    orchestrator.restore().await.unwrap();
    assert_eq!(
        std::fs::read(std::path::Path::new(&mount).join("debug/app")).unwrap(),
        b"binary"
    );

    storage.remove(config.path_for(&mount).as_str()).await.unwrap();
    storage.close().await.unwrap();
}

#[tokio::test]
async fn test_wrong_password_fails() {
    if env("STASH_TEST_SFTP_PASSWORD").is_none() {
        return;
    }
    let mut config = test_config().with_password("definitely-wrong");
    config.private_key = None;
    let err = SftpStorage::connect(&config).await.err().unwrap();
    assert!(!err.is_config(), "{}", err);
}
