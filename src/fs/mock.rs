// src/fs/mock.rs

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use anyhow::{Result, anyhow};

use super::{ArtifactStatus, ArtifactStatusProvider};

/// In-memory artifact store with explicit modification times.
///
/// Clones share state, so a test can keep one handle and give another to
/// the coordinator, then "write" artifacts while steps run.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, SystemTime>>>,
    failing: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or touch `path` with a modification time of `secs` seconds
    /// after the Unix epoch.
    pub fn set_file(&self, path: impl AsRef<Path>, secs: u64) {
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.as_ref().to_path_buf(), modified);
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path.as_ref());
    }

    /// Make every later `stat` of `path` fail.
    pub fn fail_on(&self, path: impl AsRef<Path>) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.as_ref().to_path_buf());
    }
}

impl ArtifactStatusProvider for MockFileSystem {
    fn stat(&self, path: &Path) -> Result<ArtifactStatus> {
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
        {
            return Err(anyhow!("stat failed for {:?}", path));
        }

        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(match files.get(path) {
            Some(modified) => ArtifactStatus::present(*modified),
            None => ArtifactStatus::missing(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let fs = MockFileSystem::new();
        let other = fs.clone();
        fs.set_file("a.csv", 10);

        let status = other.stat(Path::new("a.csv")).unwrap();
        assert!(status.exists);

        other.remove_file("a.csv");
        assert!(!fs.stat(Path::new("a.csv")).unwrap().exists);

        fs.fail_on("b.csv");
        assert!(other.stat(Path::new("b.csv")).is_err());
    }
}
