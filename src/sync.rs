//! Reconciliation of the remote tree against the local mirror.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::RemoteApi;
use crate::config::Config;
use crate::download::{DownloadOutcome, DownloadProgress, Downloader};
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::local::LocalFileSet;
use crate::stats::{SyncStats, SyncStatsBuilder};
use crate::walker::RemoteWalker;

/// Everything one sync run needs: the API session, the walker and the
/// downloader, built once from the configuration.
pub struct Mirror<A, F: FileSystem = TokioFileSystem> {
    walker: RemoteWalker<A>,
    downloader: Downloader<A, F>,
    save_root: PathBuf,
}

impl<A: RemoteApi> Mirror<A, TokioFileSystem> {
    /// Creates a mirror writing to the real file system.
    pub fn new(api: A, config: &Config) -> Self {
        Self::with_fs(api, config, TokioFileSystem)
    }
}

impl<A: RemoteApi, F: FileSystem> Mirror<A, F> {
    /// Creates a mirror with a custom file system implementation.
    pub fn with_fs(api: A, config: &Config, fs: F) -> Self {
        let api = Arc::new(api);
        Self {
            walker: RemoteWalker::new(Arc::clone(&api), config.base_path.clone())
                .with_probe_letter(config.sync.probe_letter),
            downloader: Downloader::with_fs(api, &config.save_dir, config.sync.clone(), fs),
            save_root: config.save_dir.clone(),
        }
    }

    /// Local mirror root.
    #[must_use]
    pub fn save_root(&self) -> &Path {
        &self.save_root
    }

    /// Scans the local mirror off the async runtime.
    ///
    /// # Errors
    ///
    /// Returns an error only if the scanning task panics.
    pub async fn scan_local(&self) -> Result<LocalFileSet> {
        let root = self.save_root.clone();
        let suffix = self.downloader.options().temp_suffix.clone();
        tokio::task::spawn_blocking(move || LocalFileSet::scan(&root, &suffix))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))
    }

    /// Mirrors the remote directory `dir_path` (relative to the configured
    /// base path) into the save root.
    ///
    /// Files already present locally with the right size are skipped; every
    /// other file goes through the downloader. A failure affects only its
    /// own file and is counted in [`SyncStats::failed`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the local scan cannot run.
    pub async fn sync_directory(
        &self,
        dir_path: &str,
        progress: &dyn DownloadProgress,
    ) -> Result<SyncStats> {
        let mut builder = SyncStatsBuilder::new();
        log::info!(
            "Syncing {} into {}",
            if dir_path.is_empty() { "<root>" } else { dir_path },
            self.save_root.display()
        );

        let local = self.scan_local().await?;
        log::info!("{} file(s) already in the local mirror", local.len());

        let files = self.walker.list_files(dir_path).await;
        builder.set_total(files.len());
        if files.is_empty() {
            log::info!("No remote files found");
            return Ok(builder.build());
        }
        log::info!("{} remote file(s) found", files.len());
        progress.on_files_found(files.len(), files.iter().map(|f| f.size).sum());

        for file in &files {
            let relative = file.relative_path();
            if local.is_present(&relative, file.size) {
                log::info!("Skipping {relative}: already present");
                progress.on_skipped(&file.name);
                builder.add_skipped();
                continue;
            }

            match self.downloader.download_file(file, progress).await {
                Ok(DownloadOutcome::Downloaded(stats)) => builder.add_download(&stats),
                Ok(DownloadOutcome::AlreadyPresent | DownloadOutcome::VariantPresent(_)) => {
                    builder.add_present();
                }
                Err(e) => {
                    log::error!("Download failed for {relative}: {e}");
                    builder.add_failure();
                }
            }
        }

        let stats = builder.build();
        log::info!(
            "Sync finished: {} succeeded, {} skipped, {} failed, {} total",
            stats.succeeded,
            stats.skipped,
            stats.failed,
            stats.total
        );
        Ok(stats)
    }
}
