//! CLI mode for mirror - one full sync of the configured remote root.

mod progress;

use std::path::Path;
use std::process::ExitCode;

use crate::{Config, Error, HttpApi, Mirror, SyncStats};

use progress::{CliProgress, print_summary};

/// Exit status for a configuration file that does not exist.
const EXIT_NO_CONFIG: u8 = 2;
/// Conventional exit status after SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

fn print_missing_config(path: &Path) {
    eprintln!("Configuration file not found: {}", path.display());
    eprintln!();
    eprintln!("Copy config.example.json to config.json and fill in the server");
    eprintln!("URL, password and save directory, or point MIRROR_CONFIG at an");
    eprintln!("existing file.");
}

async fn sync(config: &Config, progress: &CliProgress) -> crate::Result<SyncStats> {
    tokio::fs::create_dir_all(&config.save_dir).await?;

    let api = HttpApi::new(config)?;
    let mirror = Mirror::new(api, config);
    println!(
        "Mirroring {}{} into {}",
        config.base_url,
        config.base_path,
        mirror.save_root().display()
    );
    mirror.sync_directory("", progress).await
}

/// Runs the sync and maps its outcome to a process exit code.
pub async fn run() -> ExitCode {
    let path = Config::default_path();
    let config = match Config::load(&path) {
        Ok(config) => config,
        Err(Error::ConfigNotFound(path)) => {
            print_missing_config(&path);
            return ExitCode::from(EXIT_NO_CONFIG);
        }
        Err(e) => {
            log::error!("Could not load {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let progress = CliProgress::new();
    let outcome = tokio::select! {
        result = sync(&config, &progress) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    progress.finish();

    match outcome {
        Some(Ok(stats)) => {
            print_summary(&stats);
            ExitCode::SUCCESS
        }
        Some(Err(e)) => {
            log::error!("Sync aborted: {e}");
            ExitCode::FAILURE
        }
        None => {
            log::warn!("Interrupted; partially downloaded files keep their temporary suffix");
            eprintln!("\nInterrupted by user.");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}
