//! In-memory [`RemoteApi`] with canned listings and file bodies.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;

use super::{ByteStream, RemoteApi, RemoteEntry};
use crate::error::{Error, Result};

const URL_PREFIX: &str = "mock://";

#[derive(Default)]
pub(crate) struct MockApi {
    listings: HashMap<String, Vec<RemoteEntry>>,
    failing_dirs: HashSet<String>,
    files: HashMap<String, Vec<u8>>,
    interrupted: HashSet<String>,
    list_calls: Mutex<Vec<String>>,
    link_calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a directory listing under its full remote path.
    pub(crate) fn with_dir(mut self, full_path: &str, entries: Vec<RemoteEntry>) -> Self {
        self.listings.insert(full_path.to_string(), entries);
        self
    }

    /// Makes listing `full_path` fail with a transport-style error.
    pub(crate) fn with_failing_dir(mut self, full_path: &str) -> Self {
        self.failing_dirs.insert(full_path.to_string());
        self
    }

    /// Registers the body served for `remote_path`.
    pub(crate) fn with_file(mut self, remote_path: &str, body: &[u8]) -> Self {
        self.files.insert(remote_path.to_string(), body.to_vec());
        self
    }

    /// Serves the first chunk of `remote_path`, then fails the stream.
    pub(crate) fn with_interrupted_file(mut self, remote_path: &str, body: &[u8]) -> Self {
        self.interrupted.insert(remote_path.to_string());
        self.with_file(remote_path, body)
    }

    pub(crate) fn list_calls(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }

    pub(crate) fn link_calls(&self) -> Vec<String> {
        self.link_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn list_dir(&self, full_path: &str) -> Result<Vec<RemoteEntry>> {
        self.list_calls.lock().unwrap().push(full_path.to_string());
        if self.failing_dirs.contains(full_path) {
            return Err(Error::Status {
                status: 503,
                url: full_path.to_string(),
            });
        }
        self.listings
            .get(full_path)
            .cloned()
            .ok_or_else(|| Error::Api {
                code: 500,
                message: "object not found".to_string(),
            })
    }

    async fn resolve_download_url(&self, remote_path: &str) -> Result<String> {
        self.link_calls.lock().unwrap().push(remote_path.to_string());
        if self.files.contains_key(remote_path) {
            Ok(format!("{URL_PREFIX}{remote_path}"))
        } else {
            Err(Error::Api {
                code: 500,
                message: "object not found".to_string(),
            })
        }
    }

    async fn open_download(&self, url: &str) -> Result<ByteStream> {
        let path = url.strip_prefix(URL_PREFIX).unwrap_or(url);
        let body = self.files.get(path).cloned().ok_or_else(|| Error::Status {
            status: 404,
            url: url.to_string(),
        })?;

        let mut chunks: Vec<Result<Bytes>> = body
            .chunks(4)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if self.interrupted.contains(path) {
            chunks.truncate(1);
            chunks.push(Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))));
        }
        Ok(stream::iter(chunks).boxed())
    }
}
