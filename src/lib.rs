//! mirror-dl - Mirrors a remote file-listing server into a local directory.
//!
//! The remote tree is walked through the server's list endpoint, compared
//! against what is already on disk, and every missing file is streamed to a
//! temporary file, verified against its listed size and then moved into
//! place. Running it again downloads nothing new.
//!
//! # Example
//!
//! ```no_run
//! use mirror_dl::{Config, HttpApi, Mirror, NoProgress};
//!
//! # async fn example() -> mirror_dl::Result<()> {
//! let config = Config::load(&Config::default_path())?;
//! let api = HttpApi::new(&config)?;
//! let mirror = Mirror::new(api, &config);
//!
//! let stats = mirror.sync_directory("", &NoProgress).await?;
//! println!("{} of {} files synced", stats.succeeded + stats.skipped, stats.total);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod api;
pub mod config;
pub mod download;
pub mod error;
pub mod format;
pub mod fs;
pub mod local;
pub mod stats;
pub mod sync;
pub mod walker;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use api::{HttpApi, RemoteApi, RemoteEntry};
pub use config::{Config, RetryConfig, SyncOptions};
pub use download::{DownloadOutcome, DownloadProgress, Downloader, NoProgress};
pub use error::{Error, Result};
pub use fs::{FileSystem, TokioFileSystem};
pub use local::LocalFileSet;
pub use stats::{FileStats, SyncStats};
pub use sync::Mirror;
pub use walker::{FileDescriptor, RemoteWalker};
