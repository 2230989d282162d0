use liblzma::read::XzDecoder;
use rusqlite::Connection;
use site_backup::backup::backup_config::BackupConfig;
use site_backup::backup::runner::{BackupRunner, BackupStep, RunOutcome};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use tempfile::TempDir;

fn write_site(root: &Path) {
    let content = root.join("wp-content");
    std::fs::create_dir_all(content.join("uploads/2024/empty")).unwrap();
    std::fs::create_dir_all(content.join("cache")).unwrap();
    std::fs::write(content.join("index.php"), "<?php // Silence is golden.").unwrap();
    std::fs::write(content.join("uploads/2024/logo.png"), [0x89, b'P', b'N', b'G', 0, 1, 2]).unwrap();
    std::fs::write(content.join("cache/page.html"), "stale").unwrap();

    Connection::open(root.join("site.sqlite"))
        .unwrap()
        .execute_batch(
            "CREATE TABLE wp_options (option_id INTEGER PRIMARY KEY, option_name TEXT, option_value TEXT);
             INSERT INTO wp_options VALUES (1, 'siteurl', 'https://example.org');
             INSERT INTO wp_options VALUES (2, 'blogname', 'Bob''s blog');
             CREATE TABLE wp_posts (ID INTEGER PRIMARY KEY, post_title TEXT);",
        )
        .unwrap();
}

const TAR_XZ: &str = "archive:\n  format: tar\n  compressor:\n    compressor_type: xz\n    level: 1\n    thread: 1\n";

fn write_config(root: &Path, archive: &str) -> std::path::PathBuf {
    let yaml = format!(
        "backup_dir: {root}/wp-content/plugins/backup/backup\n\
         log_dir: {root}/wp-content/plugins/backup/logs\n\
         content_dir: {root}/wp-content\n\
         database: {root}/site.sqlite\n\
         exclude: [\"cache\"]\n\
         {archive}",
        root = root.display()
    );
    let path = root.join("config.yml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn read_zip<R: Read + std::io::Seek>(reader: R) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(reader).unwrap();
    let mut out = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let name = entry.name().trim_end_matches('/').to_string();
        let mut body = vec![];
        entry.read_to_end(&mut body).unwrap();
        out.insert(name, body);
    }
    out
}

fn read_tar_xz<R: Read>(reader: R) -> BTreeMap<String, Vec<u8>> {
    let mut archive = tar::Archive::new(XzDecoder::new(reader));
    let mut out = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_string();
        let mut body = vec![];
        entry.read_to_end(&mut body).unwrap();
        out.insert(name, body);
    }
    out
}

#[test]
fn full_tar_xz_backup_from_yaml_config() {
    let root = TempDir::new().unwrap();
    write_site(root.path());
    let config = BackupConfig::from_yaml_file(write_config(root.path(), TAR_XZ)).unwrap();
    let backup_dir = config.backup_dir().clone();
    let log_file = config.log_file();

    let run = BackupRunner::from_config(config).unwrap().run();

    assert_eq!(run.response().status, 200);
    assert_eq!(run.response().message, "Backup successful");
    let full = run.archive().unwrap().clone();

    let left: Vec<_> = std::fs::read_dir(&backup_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(left, vec![full.clone()]);
    let full_name = full.file_name().unwrap().to_string_lossy().to_string();
    assert!(full_name.starts_with("full-backup-"));
    assert!(full_name.ends_with(".tar.xz"));

    let outer = read_tar_xz(File::open(&full).unwrap());
    assert_eq!(outer.len(), 2);
    let (sql_name, sql) = outer.iter().find(|(n, _)| n.ends_with(".sql")).unwrap();
    let (content_name, content) = outer.iter().find(|(n, _)| n.ends_with(".tar.xz")).unwrap();
    let stamp = full_name
        .trim_start_matches("full-backup-")
        .trim_end_matches(".tar.xz");
    assert_eq!(sql_name, &format!("db-backup-{stamp}.sql"));
    assert_eq!(content_name, &format!("wp-content-backup-{stamp}.tar.xz"));

    let sql = String::from_utf8(sql.clone()).unwrap();
    assert!(sql.contains("CREATE TABLE wp_options"));
    assert!(sql.contains(r#"INSERT INTO "wp_options" ("option_id", "option_name", "option_value") VALUES (2, 'blogname', 'Bob''s blog');"#));
    assert!(sql.contains("CREATE TABLE wp_posts"));

    let files = read_tar_xz(content.as_slice());
    assert_eq!(
        files.keys().map(String::as_str).collect::<Vec<_>>(),
        vec![
            "index.php",
            "plugins",
            "plugins/backup",
            "uploads",
            "uploads/2024",
            "uploads/2024/empty",
            "uploads/2024/logo.png",
        ]
    );
    assert_eq!(files["index.php"], b"<?php // Silence is golden.");
    assert_eq!(files["uploads/2024/logo.png"], vec![0x89, b'P', b'N', b'G', 0, 1, 2]);

    let log = std::fs::read_to_string(log_file).unwrap();
    assert!(log.lines().all(|l| l.len() > 22 && &l[19..22] == " - "));
    assert!(log.lines().last().unwrap().contains("Backup successful"));
}

#[test]
fn zip_is_the_default_archive_format() {
    let root = TempDir::new().unwrap();
    write_site(root.path());
    let config = BackupConfig::from_yaml_file(write_config(root.path(), "")).unwrap();
    let backup_dir = config.backup_dir().clone();

    let run = BackupRunner::from_config(config).unwrap().run();

    assert!(run.response().is_success());
    let full = run.archive().unwrap().clone();
    assert_eq!(std::fs::read_dir(&backup_dir).unwrap().count(), 1);
    let full_name = full.file_name().unwrap().to_string_lossy().to_string();
    assert!(full_name.starts_with("full-backup-") && full_name.ends_with(".zip"));
    let stamp = full_name
        .trim_start_matches("full-backup-")
        .trim_end_matches(".zip");

    let outer = read_zip(File::open(&full).unwrap());
    assert_eq!(
        outer.keys().cloned().collect::<Vec<_>>(),
        vec![
            format!("db-backup-{stamp}.sql"),
            format!("wp-content-backup-{stamp}.zip"),
        ]
    );

    let files = read_zip(Cursor::new(outer[&format!("wp-content-backup-{stamp}.zip")].clone()));
    assert_eq!(
        files.keys().map(String::as_str).collect::<Vec<_>>(),
        vec![
            "index.php",
            "plugins",
            "plugins/backup",
            "uploads",
            "uploads/2024",
            "uploads/2024/empty",
            "uploads/2024/logo.png",
        ]
    );
    assert_eq!(files["uploads/2024/logo.png"], vec![0x89, b'P', b'N', b'G', 0, 1, 2]);
}

#[test]
fn empty_database_fails_without_leftovers() {
    let root = TempDir::new().unwrap();
    write_site(root.path());
    std::fs::remove_file(root.path().join("site.sqlite")).unwrap();
    Connection::open(root.path().join("site.sqlite"))
        .unwrap()
        .execute_batch("PRAGMA user_version = 1;")
        .unwrap();
    let config = BackupConfig::from_yaml_file(write_config(root.path(), "")).unwrap();
    let backup_dir = config.backup_dir().clone();
    let log_file = config.log_file();

    let run = BackupRunner::from_config(config).unwrap().run();

    assert_eq!(run.response().status, 500);
    assert_eq!(run.response().message, "Database backup failed");
    assert!(matches!(
        run.outcome(),
        RunOutcome::Failure { step: BackupStep::DbBackup, .. }
    ));
    assert_eq!(std::fs::read_dir(&backup_dir).unwrap().count(), 0);

    let log = std::fs::read_to_string(log_file).unwrap();
    assert!(log.contains("ERROR: Database backup failed"));
    assert!(log.contains("no tables found"));
}
