use clap::Parser;
use site_backup::backup::backup_config::BackupConfig;
use site_backup::backup::runner::BackupRunner;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Dump the database and content directory into one validated backup archive
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let res = BackupConfig::from_yaml_file(&args.config).and_then(BackupRunner::from_config);

    match res {
        Ok(runner) => {
            let run = runner.run();
            let response = run.response();
            println!("{} {}", response.status, response.message);
            if response.is_success() {
                info!("Backup written to {:?}", run.archive());
                exit(0);
            }
            exit(1);
        }
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
