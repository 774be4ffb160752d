//! CLI integration tests

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn receipts_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("receipts").expect("Failed to find receipts binary");
    cmd.env("RECEIPTS_CLI_DATA_DIR", dir.path())
        .env_remove("RECEIPTS_BACKUP_PASSPHRASE")
        .env_remove("RECEIPTS_LOG");
    cmd
}

fn seed(base: &Path) {
    let data = base.join("data");
    fs::create_dir_all(data.join("db")).unwrap();
    fs::create_dir_all(data.join("prefs")).unwrap();
    fs::create_dir_all(data.join("images/default")).unwrap();
    fs::write(data.join("db/receipts.db"), b"SQLite format 3\0rest of page").unwrap();
    fs::write(data.join("prefs/settings.xml"), b"<map/>").unwrap();
    fs::write(
        data.join("images/default/lunch.jpg"),
        [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
    )
    .unwrap();
}

fn backup_count(base: &Path) -> usize {
    fs::read_dir(base.join("backups"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    receipts_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn test_no_command_prints_hint() {
    let dir = TempDir::new().unwrap();
    receipts_cmd(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("receipts --help"));
}

#[test]
fn test_init_creates_layout() {
    let dir = TempDir::new().unwrap();
    receipts_cmd(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialization complete!"));

    assert!(dir.path().join("data/db").is_dir());
    assert!(dir.path().join("data/prefs").is_dir());
    assert!(dir.path().join("data/images").is_dir());
    assert!(dir.path().join("backups").is_dir());
    assert!(dir.path().join("config.json").is_file());
}

#[test]
fn test_config_shows_roots() {
    let dir = TempDir::new().unwrap();
    receipts_cmd(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Database directory:"))
        .stdout(predicate::str::contains("Retention: 30 daily, 12 monthly"));
}

#[test]
fn test_backup_list_empty() {
    let dir = TempDir::new().unwrap();
    receipts_cmd(&dir)
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups found."));
}

#[test]
fn test_backup_create_list_and_info() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());

    receipts_cmd(&dir)
        .args(["backup", "create"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup created: backup-"))
        .stdout(predicate::str::contains(
            "1 database, 1 preference and 1 image file(s)",
        ));
    assert_eq!(backup_count(dir.path()), 1);

    receipts_cmd(&dir)
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 1 backup(s)"));

    receipts_cmd(&dir)
        .args(["backup", "info", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Format version: 1"))
        .stdout(predicate::str::contains("Status: Complete"));
}

#[test]
fn test_backup_create_to_output() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    let out = TempDir::new().unwrap();
    let target = out.path().join("export.zip");

    receipts_cmd(&dir)
        .args(["backup", "create", "--output"])
        .arg(&target)
        .assert()
        .success();

    assert!(target.is_file());
    assert_eq!(backup_count(dir.path()), 0);
}

#[test]
fn test_restore_requires_force() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    receipts_cmd(&dir).args(["backup", "create"]).assert().success();

    let db = dir.path().join("data/db/receipts.db");
    fs::write(&db, b"SQLite format 3\0changed since").unwrap();

    receipts_cmd(&dir)
        .args(["backup", "restore", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("WARNING"));

    assert_eq!(fs::read(&db).unwrap(), b"SQLite format 3\0changed since");
}

#[test]
fn test_restore_force_replaces_data() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    receipts_cmd(&dir).args(["backup", "create"]).assert().success();

    let db = dir.path().join("data/db/receipts.db");
    let image = dir.path().join("data/images/default/lunch.jpg");
    fs::write(&db, b"SQLite format 3\0changed since").unwrap();
    fs::remove_file(&image).unwrap();

    receipts_cmd(&dir)
        .args(["backup", "restore", "latest", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restore complete!"))
        .stdout(predicate::str::contains("All data has been restored successfully."));

    assert_eq!(fs::read(&db).unwrap(), b"SQLite format 3\0rest of page");
    assert!(image.is_file());
    // The pre-restore safety copy sits next to the original
    assert_eq!(backup_count(dir.path()), 2);
}

#[test]
fn test_restore_force_seals_safety_backup_when_encrypting() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    fs::write(dir.path().join("config.json"), r#"{"backup": {"encrypt": true}}"#).unwrap();

    receipts_cmd(&dir)
        .env("RECEIPTS_BACKUP_PASSPHRASE", "correct horse battery staple")
        .args(["backup", "create"])
        .assert()
        .success();

    receipts_cmd(&dir)
        .env("RECEIPTS_BACKUP_PASSPHRASE", "correct horse battery staple")
        .args(["backup", "restore", "latest", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restore complete!"));

    let names: Vec<String> = fs::read_dir(dir.path().join("backups"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|name| name.ends_with(".rcpt")), "{:?}", names);
}

#[test]
fn test_restore_missing_backup_fails() {
    let dir = TempDir::new().unwrap();
    receipts_cmd(&dir)
        .args(["backup", "restore", "no-such-backup", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Backup not found"));
}

#[test]
fn test_prune_nothing_to_do() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    receipts_cmd(&dir).args(["backup", "create"]).assert().success();

    receipts_cmd(&dir)
        .args(["backup", "prune"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups to prune."));
}

#[test]
fn test_history_records_activity() {
    let dir = TempDir::new().unwrap();
    receipts_cmd(&dir)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No backup activity recorded yet."));

    seed(dir.path());
    receipts_cmd(&dir).args(["backup", "create"]).assert().success();

    receipts_cmd(&dir)
        .args(["history", "-n", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BACKUP"));
}
