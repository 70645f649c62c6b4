// src/fs/mod.rs

//! Artifact status probing.
//!
//! The freshness evaluator never touches the filesystem directly; it asks an
//! [`ArtifactStatusProvider`]. Production uses [`RealFileSystem`], tests use
//! [`mock::MockFileSystem`].

use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};

pub mod mock;

/// Result of probing one artifact path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactStatus {
    pub exists: bool,
    /// Last modification time, when the platform reports one.
    pub modified_at: Option<SystemTime>,
}

impl ArtifactStatus {
    pub fn missing() -> Self {
        Self {
            exists: false,
            modified_at: None,
        }
    }

    pub fn present(modified_at: SystemTime) -> Self {
        Self {
            exists: true,
            modified_at: Some(modified_at),
        }
    }
}

/// Abstract artifact status lookup.
///
/// Results may be stale between calls; callers re-query after every
/// execution completes.
pub trait ArtifactStatusProvider: Send + Sync + Debug {
    /// Probe `path`. A path that does not exist is `Ok` with
    /// `exists = false`; only genuine probe failures are errors.
    fn stat(&self, path: &Path) -> Result<ArtifactStatus>;
}

/// Implementation that uses `std::fs` metadata.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl ArtifactStatusProvider for RealFileSystem {
    fn stat(&self, path: &Path) -> Result<ArtifactStatus> {
        match fs::metadata(path) {
            Ok(meta) => Ok(ArtifactStatus {
                exists: true,
                modified_at: meta.modified().ok(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ArtifactStatus::missing()),
            Err(e) => Err(e).with_context(|| format!("reading metadata of {:?}", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_fs_reports_existing_and_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.csv");
        std::fs::write(&file, b"a,b\n").unwrap();

        let status = RealFileSystem.stat(&file).unwrap();
        assert!(status.exists);
        assert!(status.modified_at.is_some());

        let missing = RealFileSystem.stat(&dir.path().join("nope.csv")).unwrap();
        assert_eq!(missing, ArtifactStatus::missing());
    }
}
