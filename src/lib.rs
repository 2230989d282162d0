//! # site-backup
//!
//! On-demand backup of a content site: the database is dumped to a SQL
//! script, the content directory is archived, both are merged into a single
//! compressed archive which is then validated.
//!
//! ## Pipeline
//!
//! - **Dump**: every table as its `CREATE` statement plus one `INSERT` per row
//! - **Archive**: the content tree with relative paths, empty directories kept
//! - **Combine**: dump and content archive bundled into `full-backup-<ts>`,
//!   intermediates removed
//! - **Validate**: the final archive must open and hold at least one entry
//! - **Log**: every step appended to a plain text log file
//!
//! ## Quick Start
//!
//! ```no_run
//! use site_backup::backup::backup_config::BackupConfig;
//! use site_backup::backup::runner::BackupRunner;
//!
//! let config = BackupConfig::from_yaml_file("config.yml")?;
//! let run = BackupRunner::from_config(config)?.run();
//! println!("{}", run.response().message);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
