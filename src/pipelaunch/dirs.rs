use std::path::{Path, PathBuf};

use directories_next::ProjectDirs;

use super::error::{Error, Result};

const CONFIG_FILE: &str = "config.yaml";

/// The platform config directory for pipelaunch; the global layer lives here.
pub fn config_root() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("", "", "pipelaunch").ok_or(Error::MissingDirectory)?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Directory holding the global layer, or a profile's layer when one is named.
pub fn get_config_dir(root: &Path, profile: Option<&str>) -> PathBuf {
    match profile {
        Some(p) => root.join("profiles").join(p),
        None => root.to_path_buf(),
    }
}

pub fn config_file(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}
