//! Where asset bytes come from.

use crate::errors::AssetError;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Asynchronous byte source for descriptions and meshes.
///
/// Fetches are never aborted once started; a superseded load simply ignores the result.
pub trait AssetSource: Send + Sync + 'static {
    fn fetch(&self, location: &str) -> impl Future<Output = Result<Vec<u8>, AssetError>> + Send;
}

/// Reads locations relative to a root directory
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSource { root: root.into() }
    }
}

impl AssetSource for FileSource {
    fn fetch(&self, location: &str) -> impl Future<Output = Result<Vec<u8>, AssetError>> + Send {
        let path = self.root.join(location);
        let location = location.to_string();
        async move {
            debug!(path = %path.display(), "reading");
            tokio::fs::read(&path).await.map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => AssetError::NotFound(location),
                _ => AssetError::Fetch { location, source },
            })
        }
    }
}

/// In-memory assets with optional per-location latency.
///
/// With a paused tokio clock the delays make completion order deterministic.
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: HashMap<String, Vec<u8>>,
    delays: HashMap<String, Duration>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.insert(location.into(), bytes.into());
        self
    }

    /// Delays every fetch of `location` (whether it exists or not)
    pub fn delay(&mut self, location: impl Into<String>, delay: Duration) -> &mut Self {
        self.delays.insert(location.into(), delay);
        self
    }

    /// Number of fetches started so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl AssetSource for MemorySource {
    fn fetch(&self, location: &str) -> impl Future<Output = Result<Vec<u8>, AssetError>> + Send {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let bytes = self.entries.get(location).cloned();
        let delay = self.delays.get(location).copied();
        let location = location.to_string();
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            bytes.ok_or(AssetError::NotFound(location))
        }
    }
}
