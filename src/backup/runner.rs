//! One backup run, start to finish.
//!
//! `START -> DB_BACKUP -> FILE_BACKUP -> COMBINE -> VALIDATE -> SUCCESS | FAILURE`
//!
//! The first failing step ends the run. A run either leaves exactly one
//! validated `full-backup-*` archive with both intermediates removed, or no
//! final archive at all.

use crate::backup::archive::create_content_archive;
use crate::backup::backup_config::BackupConfig;
use crate::backup::combine::combine_archives;
use crate::backup::container::{ArchiveContainer, ContainerFormat};
use crate::backup::dump::sqlite::SqliteDatabase;
use crate::backup::dump::{dump_database, DatabaseSource};
use crate::backup::log_sink::{FileLogSink, LogSink};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::verify::verify_archive;
use chrono::{DateTime, Local};
use getset::Getters;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum BackupStep {
    #[display("database backup")]
    DbBackup,
    #[display("file backup")]
    FileBackup,
    #[display("combine")]
    Combine,
    #[display("validate")]
    Validate,
}

/// What one step produced: the path it wrote (or checked), or why it failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: BackupStep,
    pub result: std::result::Result<PathBuf, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Success(PathBuf),
    Failure { step: BackupStep, reason: String },
}

/// Status code and message handed back to whoever triggered the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackupResponse {
    pub status: u16,
    pub message: &'static str,
}

impl BackupResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Record of a finished run.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct BackupRun {
    started_at: DateTime<Local>,
    steps: Vec<StepOutcome>,
    outcome: RunOutcome,
}

impl BackupRun {
    pub fn response(&self) -> BackupResponse {
        match &self.outcome {
            RunOutcome::Success(_) => BackupResponse {
                status: 200,
                message: "Backup successful",
            },
            RunOutcome::Failure { step, .. } => BackupResponse {
                status: 500,
                message: match step {
                    BackupStep::DbBackup => "Database backup failed",
                    BackupStep::FileBackup => "File backup failed",
                    BackupStep::Combine | BackupStep::Validate => "Backup failed",
                },
            },
        }
    }

    pub fn archive(&self) -> Option<&PathBuf> {
        match &self.outcome {
            RunOutcome::Success(path) => Some(path),
            RunOutcome::Failure { .. } => None,
        }
    }
}

pub struct BackupRunner<D, C, L> {
    config: BackupConfig,
    database: D,
    container: C,
    log: L,
}

impl BackupRunner<SqliteDatabase, ArchiveContainer, FileLogSink> {
    /// Wires the SQLite database, container and log file named by `config`.
    pub fn from_config(config: BackupConfig) -> Result<Self> {
        let database = SqliteDatabase::open(config.database())
            .with_msg(format!("Open database failed: {:?}", config.database()))?;
        let container = config.container();
        let log = FileLogSink::new(config.log_file());
        Ok(Self::new(config, database, container, log))
    }
}

impl<D: DatabaseSource, C: ContainerFormat, L: LogSink> BackupRunner<D, C, L> {
    pub fn new(config: BackupConfig, database: D, container: C, log: L) -> Self {
        Self {
            config,
            database,
            container,
            log,
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn run(&self) -> BackupRun {
        self.run_at(Local::now())
    }

    /// Runs every step, naming the outputs after `started_at`.
    pub fn run_at(&self, started_at: DateTime<Local>) -> BackupRun {
        tracing::info!("Starting backup run at {}", started_at);
        self.log.info("Backup started");

        let mut steps = vec![];
        let outcome = match self.run_steps(&started_at, &mut steps) {
            Ok(path) => RunOutcome::Success(path),
            Err(failure) => failure,
        };

        let run = BackupRun {
            started_at,
            steps,
            outcome,
        };
        let response = run.response();
        match run.outcome() {
            RunOutcome::Success(path) => {
                tracing::info!("{}: {:?}", response.message, path);
                self.log.info(format!("{}: {:?}", response.message, path));
            }
            RunOutcome::Failure { step, reason } => {
                tracing::error!("{} ({} step): {}", response.message, step, reason);
                self.log
                    .error(format!("{} ({} step): {}", response.message, step, reason));
            }
        }
        run
    }

    fn run_steps(
        &self,
        started_at: &DateTime<Local>,
        steps: &mut Vec<StepOutcome>,
    ) -> std::result::Result<PathBuf, RunOutcome> {
        let dump = self.step(BackupStep::DbBackup, steps, || {
            let path = self.config.dump_path(started_at);
            std::fs::create_dir_all(self.config.backup_dir()).map_err(|source| {
                Error::WriteError {
                    path: path.clone(),
                    source,
                }
            })?;
            dump_database(&self.database, &path)
        })?;

        let content = self.step(BackupStep::FileBackup, steps, || {
            let path = self.config.content_archive_path(started_at, &self.container);
            let archive = create_content_archive(
                &self.config.content_source(),
                &self.container,
                &path,
                &self.log,
            )?;
            if let Some(e) = &archive.non_fatal_error {
                tracing::warn!("Received non fatal error: {e}");
            }
            self.log.info(format!(
                "Archived {} entries, {} skipped",
                archive.added, archive.skipped
            ));
            Ok(archive.path)
        })?;

        let full = self.step(BackupStep::Combine, steps, || {
            let path = self.config.full_archive_path(started_at, &self.container);
            combine_archives(&dump, &content, &self.container, &path, &self.log)
        })?;

        self.step(BackupStep::Validate, steps, || {
            if verify_archive(&self.container, &full) {
                return Ok(full.clone());
            }
            if let Err(e) = std::fs::remove_file(&full) {
                tracing::warn!("Cannot remove invalid archive {:?}: {}", full, e);
            }
            Err(Error::InvalidArchive(full.clone()))
        })
    }

    fn step<F>(
        &self,
        step: BackupStep,
        steps: &mut Vec<StepOutcome>,
        f: F,
    ) -> std::result::Result<PathBuf, RunOutcome>
    where
        F: FnOnce() -> Result<PathBuf>,
    {
        tracing::info!("Starting {step}");
        self.log.info(format!("Starting {step}"));
        match f() {
            Ok(path) => {
                tracing::info!("Finished {step}: {:?}", path);
                self.log.info(format!("Finished {step}: {path:?}"));
                steps.push(StepOutcome {
                    step,
                    result: Ok(path.clone()),
                });
                Ok(path)
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!("Failed {step}: {reason}");
                self.log.error(format!("Failed {step}: {reason}"));
                steps.push(StepOutcome {
                    step,
                    result: Err(reason.clone()),
                });
                Err(RunOutcome::Failure { step, reason })
            }
        }
    }
}
