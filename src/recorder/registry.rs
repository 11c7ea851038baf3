use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::RecorderError;

/// Source URLs of tracks that were already committed
///
/// Append-only and shared by every session of the process. Cloning yields
/// another handle to the same set. Optionally mirrored to an index file
/// (one URL per line) so the set survives restarts.
#[derive(Debug, Clone, Default)]
pub struct SeenTrackRegistry {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    urls: HashSet<String>,
    index_file: Option<PathBuf>,
}

impl SeenTrackRegistry {
    /// Empty in-memory registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry backed by an index file; existing entries are loaded
    pub fn with_index_file(path: impl Into<PathBuf>) -> Result<Self, RecorderError> {
        let path = path.into();
        let urls = load_index(&path)?;

        info!("Loaded {} known track(s) from {}", urls.len(), path.display());

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                urls,
                index_file: Some(path),
            })),
        })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.inner.lock().urls.contains(url.trim())
    }

    /// Record a committed URL. Returns false if it was already present.
    pub fn insert(&self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }

        let mut inner = self.inner.lock();
        if !inner.urls.insert(url.to_string()) {
            return false;
        }

        if let Some(path) = &inner.index_file {
            if let Err(e) = append_index(path, url) {
                warn!("Could not write index file {}: {}", path.display(), e);
            }
        }

        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_index(path: &Path) -> Result<HashSet<String>, RecorderError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(e) => Err(RecorderError::io(path, e)),
    }
}

fn append_index(path: &Path, url: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", url)
}
