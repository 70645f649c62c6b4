// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a pipeline file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a pipeline file and validate it.
///
/// Relative artifact paths are resolved against the file's directory, made
/// absolute so step processes see the same paths whatever their workdir.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let base_dir = std::path::absolute(config_root_dir(path))?;
    let config = ConfigFile::try_from(raw_config)?.with_base_dir(base_dir);
    debug!(path = %path.display(), nodes = config.node.len(), "pipeline loaded");
    Ok(config)
}

/// Directory a config file lives in; `.` for a bare file name.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
