//! Recursive walk of the remote directory tree.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::api::RemoteApi;
use crate::error::Result;

/// A remote file discovered by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Base name as reported by the listing.
    pub name: String,
    /// Fully-qualified remote path, used to resolve the download link.
    pub remote_path: String,
    /// Expected size in bytes.
    pub size: u64,
    /// Directory the file was found under, relative to the mirrored root
    /// (empty for the root itself).
    pub parent_dir: String,
}

impl FileDescriptor {
    /// Path of the file relative to the mirror root, `/`-separated.
    #[must_use]
    pub fn relative_path(&self) -> String {
        if self.parent_dir.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.parent_dir, self.name)
        }
    }
}

/// Joins `base` and `dir` and collapses doubled separators.
fn join_remote(base: &str, dir: &str) -> String {
    let joined = if dir.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{dir}")
    };
    joined.replace("//", "/")
}

/// Whether a listed name can be used as a single path component.
fn is_plain_name(name: &str) -> bool {
    !matches!(name, "" | "." | "..")
        && !name.contains(['/', '\\'])
        && !std::path::Path::new(name).is_absolute()
}

/// Candidate spellings of `sub_path` to try, original first.
///
/// When `letter` is set and the path contains `/` followed by that letter in
/// either case, every such occurrence is rewritten once to upper case and
/// once to lower case. Duplicates are dropped.
#[must_use]
pub fn case_variants(sub_path: &str, letter: Option<char>) -> Vec<String> {
    let mut candidates = vec![sub_path.to_string()];
    let Some(letter) = letter else {
        return candidates;
    };

    let lower = format!("/{}", letter.to_ascii_lowercase());
    let upper = format!("/{}", letter.to_ascii_uppercase());
    if !sub_path.to_lowercase().contains(&lower) {
        return candidates;
    }

    for candidate in [sub_path.replace(&lower, &upper), sub_path.replace(&upper, &lower)] {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Lists a remote tree into a flat, depth-first list of files.
///
/// A directory that cannot be listed contributes no files; the rest of the
/// walk carries on.
pub struct RemoteWalker<A> {
    api: Arc<A>,
    base_path: String,
    probe_letter: Option<char>,
}

impl<A: RemoteApi> RemoteWalker<A> {
    /// Creates a walker rooted at `base_path`, probing `p` case variants.
    pub fn new(api: Arc<A>, base_path: impl Into<String>) -> Self {
        Self {
            api,
            base_path: base_path.into(),
            probe_letter: Some('p'),
        }
    }

    /// Sets the probed letter, or disables probing with `None`.
    #[must_use]
    pub fn with_probe_letter(mut self, letter: Option<char>) -> Self {
        self.probe_letter = letter;
        self
    }

    /// Returns every file under `dir_path` (relative to the base path).
    pub fn list_files<'a>(&'a self, dir_path: &'a str) -> BoxFuture<'a, Vec<FileDescriptor>> {
        async move {
            match self.list_level(dir_path).await {
                Ok(files) => files,
                Err(e) => {
                    log::warn!("Could not list {:?}: {e}", join_remote(&self.base_path, dir_path));
                    Vec::new()
                }
            }
        }
        .boxed()
    }

    async fn list_level(&self, dir_path: &str) -> Result<Vec<FileDescriptor>> {
        let full_path = join_remote(&self.base_path, dir_path);
        log::info!("Listing {full_path}");

        let entries = self.api.list_dir(&full_path).await?;
        log::info!("{} item(s) in {full_path}", entries.len());

        let mut files = Vec::new();
        for entry in entries {
            if !is_plain_name(&entry.name) {
                log::warn!("Ignoring entry {:?} in {full_path}: not a plain name", entry.name);
                continue;
            }
            if entry.is_dir {
                let sub_path = if dir_path.is_empty() {
                    entry.name
                } else {
                    format!("{dir_path}/{}", entry.name)
                };
                files.extend(self.list_subdirectory(&sub_path).await);
            } else {
                log::debug!("Found {} ({} bytes)", entry.name, entry.size);
                files.push(FileDescriptor {
                    remote_path: join_remote(&full_path, &entry.name),
                    size: entry.size,
                    parent_dir: dir_path.to_string(),
                    name: entry.name,
                });
            }
        }
        Ok(files)
    }

    /// Lists the first case variant of `sub_path` that yields any files.
    async fn list_subdirectory(&self, sub_path: &str) -> Vec<FileDescriptor> {
        for candidate in case_variants(sub_path, self.probe_letter) {
            let files = self.list_files(&candidate).await;
            if !files.is_empty() {
                return files;
            }
            log::debug!("No files under {candidate}");
        }
        Vec::new()
    }
}
