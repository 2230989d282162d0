use crate::backup::archive::walkdir_globset::{ContentTreeSource, CustomDeserializedGlob};
use crate::backup::container::ArchiveContainer;
use crate::backup::file_ext::FileExtProvider;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::validate::{
    validate_dir_exist, validate_file_name, validate_sqlite_file, validate_writable_dir,
};
use bon::Builder;
use chrono::{DateTime, TimeZone};
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Display;
use std::fs::File;
use std::path::{Path, PathBuf};
use validator::Validate;

static FILE_TIME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
static DUMP_BASE_NAME: &str = "db-backup";
static CONTENT_BASE_NAME: &str = "wp-content-backup";
static FULL_BASE_NAME: &str = "full-backup";

fn default_log_file_name() -> String {
    "backup-log.txt".to_string()
}

/// Where a backup reads from and writes to.
///
/// ```yaml
/// backup_dir: /var/backups/site
/// log_dir: /var/log/site-backup
/// content_dir: /srv/site/wp-content
/// database: /srv/site/site.sqlite
/// exclude: ["cache/**", "*.log"]
/// archive:
///   format: zip
/// ```
///
/// `archive` defaults to ZIP; `format: tar` takes an optional `compressor`.
#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    #[validate(custom(function = validate_writable_dir))]
    #[builder(into)]
    backup_dir: PathBuf,
    #[builder(into)]
    log_dir: PathBuf,
    #[serde(default = "default_log_file_name")]
    #[validate(custom(function = validate_file_name))]
    #[builder(default = default_log_file_name(), into)]
    log_file_name: String,
    #[validate(custom(function = validate_dir_exist))]
    #[builder(into)]
    content_dir: PathBuf,
    #[validate(custom(function = validate_sqlite_file))]
    #[builder(into)]
    database: PathBuf,
    #[serde(default)]
    #[builder(default, into)]
    exclude: Vec<CustomDeserializedGlob>,
    #[serde(default)]
    #[builder(default, into)]
    archive: ArchiveContainer,
}

impl BackupConfig {
    /// Reads and validates a YAML config file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        File::open(path)
            .map_err(Error::from)
            .with_msg(format!("Open config failed: {:?}", path))
            .and_then(|f| {
                serde_yml::from_reader::<_, BackupConfig>(f)
                    .map_err(Error::from)
                    .with_msg(format!("Parse YAML config failed: {:?}", path))
            })
            .and_then(|bc| {
                bc.validate()
                    .and_then(|_| bc.archive.validate())
                    .map_err(Error::from)
                    .map(|_| bc)
                    .with_msg(format!("Config validation failed: {:?}", path))
            })
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(&self.log_file_name)
    }

    pub fn container(&self) -> ArchiveContainer {
        self.archive.clone()
    }

    /// The content tree, minus the backup and log directories when they live inside it.
    pub fn content_source(&self) -> ContentTreeSource {
        ContentTreeSource::builder()
            .src_dir(self.content_dir.clone())
            .exclude(self.exclude.clone())
            .skip_dirs(vec![self.backup_dir.clone(), self.log_dir.clone()])
            .build()
    }

    pub fn dump_path<T: TimeZone>(&self, dt: &DateTime<T>) -> PathBuf
    where
        T::Offset: Display,
    {
        self.output_path(DUMP_BASE_NAME, dt, "sql")
    }

    pub fn content_archive_path<T: TimeZone, E: FileExtProvider>(
        &self,
        dt: &DateTime<T>,
        format: &E,
    ) -> PathBuf
    where
        T::Offset: Display,
    {
        let ext = format.file_ext().map(|e| e.to_string()).unwrap_or_default();
        self.output_path(CONTENT_BASE_NAME, dt, ext)
    }

    pub fn full_archive_path<T: TimeZone, E: FileExtProvider>(
        &self,
        dt: &DateTime<T>,
        format: &E,
    ) -> PathBuf
    where
        T::Offset: Display,
    {
        let ext = format.file_ext().map(|e| e.to_string()).unwrap_or_default();
        self.output_path(FULL_BASE_NAME, dt, ext)
    }

    fn output_path<T: TimeZone, S: AsRef<str>>(&self, base: &str, dt: &DateTime<T>, ext: S) -> PathBuf
    where
        T::Offset: Display,
    {
        let stamp = dt.format(FILE_TIME_FORMAT);
        let name = match ext.as_ref() {
            "" => format!("{base}-{stamp}"),
            ext => format!("{base}-{stamp}.{ext}"),
        };
        self.backup_dir.join(name)
    }
}
