//! Compiler options: `bcpl64.toml` parsing and CLI override merging.
//!
//! The file is optional; unknown fields are tolerated and a parse error
//! falls back to defaults so a broken config never blocks a compile. CLI
//! flags always win over file values.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
pub struct OptimizerConfig {
    /// Maximum peephole passes; the optimizer stops early at a fixpoint.
    #[serde(default = "OptimizerConfig::default_peephole_passes")]
    pub peephole_passes: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            peephole_passes: Self::default_peephole_passes(),
        }
    }
}

impl OptimizerConfig {
    const fn default_peephole_passes() -> u32 {
        5
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct TraceConfig {
    /// Dump the printed tree after each AST pass.
    #[serde(default)]
    pub passes: bool,
    /// Emit an assembly listing after linking.
    #[serde(default)]
    pub listing: bool,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: ConfigFile,
}

/// Prefer a local `bcpl64.toml`, then the platform config directory; a
/// missing file reads as defaults.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("bcpl64.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("bcpl64").join("bcpl64.toml");
    }
    local
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "config", path = %path.display(), "config_loaded");
                Ok(Config { file })
            }
            Err(_e) => Ok(Config::default()),
        }
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing() {
        let cfg = load_from(Some(PathBuf::from("__no_such_config__.toml"))).unwrap();
        assert_eq!(cfg.file.optimizer.peephole_passes, 5);
        assert!(!cfg.file.trace.listing);
    }

    #[test]
    fn parses_optimizer_and_trace_sections() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[optimizer]\npeephole_passes = 9\n[trace]\nlisting = true\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.optimizer.peephole_passes, 9);
        assert!(cfg.file.trace.listing);
        assert!(!cfg.file.trace.passes);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not [valid toml").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.optimizer.peephole_passes, 5);
    }
}
