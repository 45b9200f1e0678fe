//! Inspection of the local mirror.

use std::collections::HashMap;
use std::path::Path;

use walkdir::WalkDir;

/// Relative paths (`/`-separated) of the files already present locally,
/// with their sizes.
///
/// Rebuilt from disk on every run; never updated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalFileSet {
    paths: HashMap<String, u64>,
}

impl LocalFileSet {
    /// Walks `root` and records every regular file whose name does not end
    /// with `temp_suffix`. A missing root is an empty mirror.
    #[must_use]
    pub fn scan(root: &Path, temp_suffix: &str) -> Self {
        let paths = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    if e.depth() > 0 {
                        log::warn!("Skipping unreadable entry while scanning: {e}");
                    }
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| !entry.file_name().to_string_lossy().ends_with(temp_suffix))
            .filter_map(|entry| {
                let size = entry.metadata().ok()?.len();
                relative_key(root, entry.path()).map(|key| (key, size))
            })
            .collect();
        Self { paths }
    }

    /// Whether `relative_path` (as produced by
    /// [`FileDescriptor::relative_path`](crate::walker::FileDescriptor::relative_path))
    /// is present with exactly `size` bytes.
    #[must_use]
    pub fn is_present(&self, relative_path: &str, size: u64) -> bool {
        self.paths.get(relative_path) == Some(&size)
    }

    /// Number of files found.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns true if the mirror holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}
