//! Core download logic and abstractions.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::api::RemoteApi;
use crate::config::SyncOptions;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::stats::{DownloadStatsTracker, FileStats};
use crate::walker::FileDescriptor;

/// Classification of a file's current state on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FileStatus {
    /// File exists with the expected size.
    Complete,
    /// A sibling with an interchangeable extension has the expected size.
    VariantComplete(PathBuf),
    /// File exists with a different size and will be replaced.
    SizeDiffers(u64),
    /// Nothing usable on disk.
    Missing,
}

/// How [`Downloader::download_file`] satisfied a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The file was already at its save path with the right size.
    AlreadyPresent,
    /// An extension variant of the file was already present.
    VariantPresent(PathBuf),
    /// The file was downloaded, verified and promoted.
    Downloaded(FileStats),
}

/// Trait for receiving download progress updates.
///
/// All methods have default no-op implementations for convenience.
pub trait DownloadProgress: Send + Sync {
    /// Called once the remote walk is done, before any file is handled.
    fn on_files_found(&self, _count: usize, _total_bytes: u64) {}

    /// Called when a file transfer starts.
    fn on_file_start(&self, _name: &str, _size: u64) {}

    /// Called with the number of bytes written since the last call.
    fn on_progress(&self, _name: &str, _bytes_delta: u64) {}

    /// Called when a file has been verified and promoted.
    fn on_file_complete(&self, _name: &str, _stats: &FileStats) {}

    /// Called when a file transfer fails.
    fn on_error(&self, _name: &str, _error: &str) {}

    /// Called when a file needs no transfer.
    fn on_skipped(&self, _name: &str) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// Returns the in-flight path for a final path: `{path}{suffix}`.
#[must_use]
pub fn temp_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Downloads single files into the mirror with `.tmp`-then-rename semantics.
pub struct Downloader<A, F: FileSystem = TokioFileSystem> {
    api: Arc<A>,
    fs: F,
    save_root: PathBuf,
    options: SyncOptions,
}

impl<A: RemoteApi> Downloader<A, TokioFileSystem> {
    /// Creates a downloader writing under `save_root`.
    pub fn new(api: Arc<A>, save_root: impl Into<PathBuf>, options: SyncOptions) -> Self {
        Self::with_fs(api, save_root, options, TokioFileSystem)
    }
}

impl<A: RemoteApi, F: FileSystem> Downloader<A, F> {
    /// Creates a downloader with a custom file system implementation.
    pub fn with_fs(
        api: Arc<A>,
        save_root: impl Into<PathBuf>,
        options: SyncOptions,
        fs: F,
    ) -> Self {
        Self {
            api,
            fs,
            save_root: save_root.into(),
            options,
        }
    }

    /// Returns a reference to the sync options.
    #[must_use]
    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Local path for `file`: `save_root/parent_dir/name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsafePath`] unless every component of the relative
    /// path is a plain name, so nothing is written outside the save root.
    pub fn save_path(&self, file: &FileDescriptor) -> Result<PathBuf> {
        let relative: PathBuf = file
            .parent_dir
            .split('/')
            .filter(|s| !s.is_empty())
            .chain(std::iter::once(file.name.as_str()))
            .collect();
        let is_plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        let bad_name = matches!(file.name.as_str(), "" | "." | "..");
        if bad_name || !is_plain || relative.to_string_lossy().contains('\\') {
            return Err(Error::UnsafePath(file.relative_path()));
        }
        Ok(self.save_root.join(relative))
    }

    /// Classifies a file's current status on disk.
    async fn classify_file(&self, path: &Path, expected_size: u64) -> FileStatus {
        let existing = self.fs.file_size(path).await;
        if existing == Some(expected_size) {
            return FileStatus::Complete;
        }

        for ext in &self.options.extension_variants {
            let candidate = path.with_extension(ext.trim_start_matches('.'));
            if self.fs.file_size(&candidate).await == Some(expected_size) {
                return FileStatus::VariantComplete(candidate);
            }
        }

        existing.map_or(FileStatus::Missing, FileStatus::SizeDiffers)
    }

    /// Ensures the parent directory exists for a file path.
    async fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Downloads `file` unless it is already present.
    ///
    /// The body is streamed to `{save_path}{temp_suffix}`; once its size
    /// matches the descriptor it replaces whatever is at the save path. The
    /// save path is never written directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be resolved, the transfer fails,
    /// the size does not match, or the file system refuses a write. The
    /// temporary file is removed in every error case.
    pub async fn download_file(
        &self,
        file: &FileDescriptor,
        progress: &dyn DownloadProgress,
    ) -> Result<DownloadOutcome> {
        let save_path = match self.save_path(file) {
            Ok(path) => path,
            Err(e) => {
                progress.on_error(&file.name, &e.to_string());
                return Err(e);
            }
        };
        self.ensure_parent_dir(&save_path).await?;

        match self.classify_file(&save_path, file.size).await {
            FileStatus::Complete => {
                log::info!("Already present: {}", save_path.display());
                progress.on_skipped(&file.name);
                return Ok(DownloadOutcome::AlreadyPresent);
            }
            FileStatus::VariantComplete(variant) => {
                log::info!("Already present as {}", variant.display());
                progress.on_skipped(&file.name);
                return Ok(DownloadOutcome::VariantPresent(variant));
            }
            FileStatus::SizeDiffers(actual) => {
                log::warn!(
                    "{} is {actual} bytes, expected {}; downloading again",
                    save_path.display(),
                    file.size
                );
            }
            FileStatus::Missing => {}
        }

        let tmp = temp_path(&save_path, &self.options.temp_suffix);
        progress.on_file_start(&file.name, file.size);
        log::info!("Downloading {} ({} bytes)", file.remote_path, file.size);

        match self.transfer(file, &tmp, &save_path, progress).await {
            Ok(stats) => {
                log::info!("Saved {}", save_path.display());
                progress.on_file_complete(&file.name, &stats);
                Ok(DownloadOutcome::Downloaded(stats))
            }
            Err(e) => {
                if self.fs.file_exists(&tmp).await {
                    if let Err(cleanup) = self.fs.remove_file(&tmp).await {
                        log::warn!("Could not remove {}: {cleanup}", tmp.display());
                    }
                }
                progress.on_error(&file.name, &e.to_string());
                Err(e)
            }
        }
    }

    /// Resolves, streams, verifies and promotes. Leaves cleanup to the caller.
    async fn transfer(
        &self,
        file: &FileDescriptor,
        tmp: &Path,
        save_path: &Path,
        progress: &dyn DownloadProgress,
    ) -> Result<FileStats> {
        let url = self.api.resolve_download_url(&file.remote_path).await?;
        let mut body = self.api.open_download(&url).await?;

        let handle = self.fs.create_file(tmp).await?;
        let mut writer = BufWriter::with_capacity(self.options.buffer_size, handle);
        let mut tracker = DownloadStatsTracker::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            let delta = chunk.len() as u64;
            tracker.record_bytes(delta);
            progress.on_progress(&file.name, delta);
        }
        writer.flush().await?;
        drop(writer);

        let actual = self.fs.file_size(tmp).await.unwrap_or(0);
        if actual != file.size {
            log::error!(
                "Size mismatch for {}: expected {} bytes, got {actual}",
                file.name,
                file.size
            );
            return Err(Error::SizeMismatch {
                expected: file.size,
                actual,
            });
        }

        if self.fs.file_exists(save_path).await {
            self.fs.remove_file(save_path).await?;
        }
        self.fs.rename_file(tmp, save_path).await?;

        Ok(tracker.into_file_stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn descriptor(parent: &str, name: &str, size: u64) -> FileDescriptor {
        let remote_dir = if parent.is_empty() {
            "/share".to_string()
        } else {
            format!("/share/{parent}")
        };
        FileDescriptor {
            name: name.to_string(),
            remote_path: format!("{remote_dir}/{name}"),
            size,
            parent_dir: parent.to_string(),
        }
    }

    fn downloader(api: MockApi, root: &Path) -> (Arc<MockApi>, Downloader<MockApi>) {
        let api = Arc::new(api);
        let dl = Downloader::new(Arc::clone(&api), root, SyncOptions::default());
        (api, dl)
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl DownloadProgress for RecordingProgress {
        fn on_file_start(&self, name: &str, size: u64) {
            self.events.lock().unwrap().push(format!("start {name} {size}"));
        }

        fn on_progress(&self, _name: &str, bytes_delta: u64) {
            self.events.lock().unwrap().push(format!("+{bytes_delta}"));
        }

        fn on_file_complete(&self, name: &str, stats: &FileStats) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {name} {}", stats.size));
        }

        fn on_error(&self, name: &str, _error: &str) {
            self.events.lock().unwrap().push(format!("error {name}"));
        }

        fn on_skipped(&self, name: &str) {
            self.events.lock().unwrap().push(format!("skip {name}"));
        }
    }

    #[test]
    fn no_progress_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoProgress>();
    }

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_path(Path::new("foo/bar.mp4"), ".tmp"),
            PathBuf::from("foo/bar.mp4.tmp")
        );
        assert_eq!(
            temp_path(Path::new("file"), ".part"),
            PathBuf::from("file.part")
        );
    }

    #[test]
    fn save_path_nests_parent_dir() {
        let (_, dl) = downloader(MockApi::new(), Path::new("/mirror"));
        assert_eq!(
            dl.save_path(&descriptor("S1/extras", "bts.mkv", 1)).unwrap(),
            PathBuf::from("/mirror/S1/extras/bts.mkv")
        );
        assert_eq!(
            dl.save_path(&descriptor("", "root.txt", 1)).unwrap(),
            PathBuf::from("/mirror/root.txt")
        );
    }

    #[test]
    fn save_path_rejects_names_leaving_the_root() {
        let (_, dl) = downloader(MockApi::new(), Path::new("/mirror"));
        for (parent, name) in [
            ("", "../escaped.txt"),
            ("", ".."),
            ("", "."),
            ("S1", "."),
            ("", ""),
            ("", "/etc/passwd"),
            ("..", "x.bin"),
            ("S1/../..", "x.bin"),
            ("", "a\\..\\b.bin"),
        ] {
            assert!(
                matches!(
                    dl.save_path(&descriptor(parent, name, 1)),
                    Err(Error::UnsafePath(_))
                ),
                "{parent:?} / {name:?} was accepted"
            );
        }
    }

    #[tokio::test]
    async fn unsafe_name_fails_without_network() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("mirror");
        let (api, dl) = downloader(
            MockApi::new().with_file("/share/../escaped.txt", b"abc"),
            &root,
        );

        let err = dl
            .download_file(&descriptor("", "../escaped.txt", 3), &NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsafePath(_)));
        assert!(api.link_calls().is_empty());
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[tokio::test]
    async fn downloads_verifies_and_promotes() {
        let dir = TempDir::new().unwrap();
        let (api, dl) = downloader(
            MockApi::new().with_file("/share/S1/a.mp4", b"hello world"),
            dir.path(),
        );
        let progress = RecordingProgress::default();

        let outcome = dl
            .download_file(&descriptor("S1", "a.mp4", 11), &progress)
            .await
            .unwrap();

        assert!(matches!(outcome, DownloadOutcome::Downloaded(ref s) if s.size == 11));
        let saved = dir.path().join("S1/a.mp4");
        assert_eq!(std::fs::read(&saved).unwrap(), b"hello world");
        assert!(!dir.path().join("S1/a.mp4.tmp").exists());
        assert_eq!(api.link_calls(), ["/share/S1/a.mp4"]);

        let events = progress.events.lock().unwrap().clone();
        assert_eq!(events.first().unwrap(), "start a.mp4 11");
        assert_eq!(events.last().unwrap(), "done a.mp4 11");
        assert_eq!(events.iter().filter(|e| e.starts_with('+')).count(), 3);
    }

    #[tokio::test]
    async fn size_mismatch_discards_download() {
        let dir = TempDir::new().unwrap();
        let (_, dl) = downloader(
            MockApi::new().with_file("/share/a.mp4", b"short"),
            dir.path(),
        );

        let err = dl
            .download_file(&descriptor("", "a.mp4", 99), &NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::SizeMismatch {
                expected: 99,
                actual: 5
            }
        ));
        assert!(!dir.path().join("a.mp4").exists());
        assert!(!dir.path().join("a.mp4.tmp").exists());
    }

    #[tokio::test]
    async fn present_file_skips_network() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"12345").unwrap();
        let (api, dl) = downloader(MockApi::new(), dir.path());
        let progress = RecordingProgress::default();

        let outcome = dl
            .download_file(&descriptor("", "a.mp4", 5), &progress)
            .await
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::AlreadyPresent);
        assert!(api.link_calls().is_empty());
        assert_eq!(*progress.events.lock().unwrap(), ["skip a.mp4"]);
    }

    #[tokio::test]
    async fn differently_sized_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"old").unwrap();
        let (_, dl) = downloader(
            MockApi::new().with_file("/share/a.mp4", b"new content"),
            dir.path(),
        );

        let outcome = dl
            .download_file(&descriptor("", "a.mp4", 11), &NoProgress)
            .await
            .unwrap();

        assert!(matches!(outcome, DownloadOutcome::Downloaded(_)));
        assert_eq!(
            std::fs::read(dir.path().join("a.mp4")).unwrap(),
            b"new content"
        );
    }

    #[tokio::test]
    async fn extension_variant_counts_as_present() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("S1")).unwrap();
        std::fs::write(dir.path().join("S1/clip.MP4"), b"abcd").unwrap();
        let (api, dl) = downloader(MockApi::new(), dir.path());

        let outcome = dl
            .download_file(&descriptor("S1", "clip.mp4", 4), &NoProgress)
            .await
            .unwrap();

        assert!(matches!(outcome, DownloadOutcome::VariantPresent(_) | DownloadOutcome::AlreadyPresent));
        assert!(api.link_calls().is_empty());
    }

    #[tokio::test]
    async fn extension_variant_with_wrong_size_is_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("clip.Mp4"), b"ab").unwrap();
        let (api, dl) = downloader(
            MockApi::new().with_file("/share/clip.mp4", b"abcd"),
            dir.path(),
        );

        let outcome = dl
            .download_file(&descriptor("", "clip.mp4", 4), &NoProgress)
            .await
            .unwrap();

        assert!(matches!(outcome, DownloadOutcome::Downloaded(_)));
        assert_eq!(api.link_calls().len(), 1);
    }

    #[tokio::test]
    async fn interrupted_transfer_leaves_previous_file_untouched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"old").unwrap();
        let (_, dl) = downloader(
            MockApi::new().with_interrupted_file("/share/a.mp4", b"new content"),
            dir.path(),
        );
        let progress = RecordingProgress::default();

        let err = dl
            .download_file(&descriptor("", "a.mp4", 11), &progress)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert_eq!(std::fs::read(dir.path().join("a.mp4")).unwrap(), b"old");
        assert!(!dir.path().join("a.mp4.tmp").exists());
        assert_eq!(
            progress.events.lock().unwrap().last().unwrap(),
            "error a.mp4"
        );
    }

    #[tokio::test]
    async fn stale_temp_file_is_overwritten() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mp4.tmp"), b"junk from last run").unwrap();
        let (_, dl) = downloader(
            MockApi::new().with_file("/share/a.mp4", b"fresh"),
            dir.path(),
        );

        dl.download_file(&descriptor("", "a.mp4", 5), &NoProgress)
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("a.mp4")).unwrap(), b"fresh");
        assert!(!dir.path().join("a.mp4.tmp").exists());
    }

    #[tokio::test]
    async fn unresolvable_link_fails_without_files() {
        let dir = TempDir::new().unwrap();
        let (_, dl) = downloader(MockApi::new(), dir.path());

        let err = dl
            .download_file(&descriptor("S1", "gone.mp4", 5), &NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api { code: 500, .. }));
        assert!(!dir.path().join("S1/gone.mp4").exists());
        assert!(!dir.path().join("S1/gone.mp4.tmp").exists());
    }

    // =========================================================================
    // Mock-based classify_file tests
    // =========================================================================

    /// A mock file system for testing `classify_file` behavior.
    struct MockFileSystem {
        /// Maps path → file size (if the file exists).
        files: Mutex<HashMap<PathBuf, u64>>,
    }

    impl MockFileSystem {
        fn new() -> Self {
            Self {
                files: Mutex::new(HashMap::new()),
            }
        }

        fn add_file(&self, path: impl Into<PathBuf>, size: u64) {
            self.files.lock().unwrap().insert(path.into(), size);
        }
    }

    #[async_trait::async_trait]
    impl FileSystem for MockFileSystem {
        async fn file_exists(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }

        async fn file_size(&self, path: &Path) -> Option<u64> {
            self.files.lock().unwrap().get(path).copied()
        }

        async fn create_dir_all(&self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }

        async fn create_file(&self, _path: &Path) -> std::io::Result<tokio::fs::File> {
            Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "mock"))
        }

        async fn rename_file(&self, _from: &Path, _to: &Path) -> std::io::Result<()> {
            Ok(())
        }

        async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }
    }

    fn mock_downloader(fs: MockFileSystem) -> Downloader<MockApi, MockFileSystem> {
        Downloader::with_fs(
            Arc::new(MockApi::new()),
            "/mirror",
            SyncOptions::default(),
            fs,
        )
    }

    #[tokio::test]
    async fn classify_file_complete() {
        let fs = MockFileSystem::new();
        fs.add_file("/mirror/movie.mp4", 1_000_000);
        let dl = mock_downloader(fs);
        assert_eq!(
            dl.classify_file(Path::new("/mirror/movie.mp4"), 1_000_000).await,
            FileStatus::Complete
        );
    }

    #[tokio::test]
    async fn classify_file_size_differs() {
        let fs = MockFileSystem::new();
        fs.add_file("/mirror/movie.mp4", 500);
        let dl = mock_downloader(fs);
        assert_eq!(
            dl.classify_file(Path::new("/mirror/movie.mp4"), 1_000_000).await,
            FileStatus::SizeDiffers(500)
        );
    }

    #[tokio::test]
    async fn classify_file_each_extension_variant() {
        for ext in ["mp4", "MP4", "Mp4", "mP4"] {
            let fs = MockFileSystem::new();
            fs.add_file(format!("/mirror/movie.{ext}"), 42);
            let dl = mock_downloader(fs);
            let status = dl.classify_file(Path::new("/mirror/movie.mkv"), 42).await;
            assert_eq!(
                status,
                FileStatus::VariantComplete(PathBuf::from(format!("/mirror/movie.{ext}")))
            );
        }
    }

    #[tokio::test]
    async fn classify_file_ignores_temp_file() {
        let fs = MockFileSystem::new();
        fs.add_file("/mirror/movie.mp4.tmp", 42);
        let dl = mock_downloader(fs);
        assert_eq!(
            dl.classify_file(Path::new("/mirror/movie.mp4"), 42).await,
            FileStatus::Missing
        );
    }

    #[tokio::test]
    async fn failed_create_reports_io_error() {
        let fs = MockFileSystem::new();
        let api = Arc::new(MockApi::new().with_file("/share/a.mp4", b"data"));
        let dl = Downloader::with_fs(api, "/mirror", SyncOptions::default(), fs);

        let err = dl
            .download_file(&descriptor("", "a.mp4", 4), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == std::io::ErrorKind::Unsupported));
    }
}
