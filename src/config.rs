use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Optional user settings kept under `~/.securezip/config.json`. A missing
/// file means defaults; unknown fields are preserved-by-ignore so older
/// builds can read newer configs.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Where outputs land when no `--output`/`--out-dir` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Override for the history database location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_db: Option<PathBuf>,
}

pub fn state_dir() -> Result<PathBuf> {
    let mut path = dirs::home_dir().context("could not find home directory")?;
    path.push(".securezip");
    if !path.exists() {
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
    }
    Ok(path)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("config.json"))
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("malformed config at {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn history_db_path(&self) -> Result<PathBuf> {
        match &self.history_db {
            Some(path) => Ok(path.clone()),
            None => Ok(state_dir()?.join("history.db")),
        }
    }
}
