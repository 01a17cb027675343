use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::export::ExportFormat;
use crate::graph::BuildOptions;
use crate::query::Filters;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite store (relation records, cache, graph snapshot).
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// Default log filter; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub build: BuildOptions,

    /// Defaults for the recommendation filters.
    #[serde(default)]
    pub filters: Filters,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output file; the extension follows the format when unset.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub format: ExportFormat,
}

// ── defaults ──

fn default_store_path() -> String {
    "ffo.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            log_level: default_log_level(),
            build: BuildOptions::default(),
            filters: Filters::default(),
            server: ServerConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl ExportConfig {
    pub fn output_path(&self, format: ExportFormat) -> PathBuf {
        match &self.path {
            Some(p) => PathBuf::from(p),
            None => PathBuf::from(format!("ffo_graph.{}", format.extension())),
        }
    }
}

impl Config {
    /// Default config file path: `~/.ffo/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ffo")
            .join("config.toml")
    }

    /// Load config from an explicit path (falls back to defaults when missing).
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let cfg: Config =
                toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
            Ok(cfg)
        } else {
            Ok(Config::default())
        }
    }

    /// Write the default config to `path`, creating the directory if needed.
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(&Config::default()).context("serialising default config")?;
        std::fs::write(path, &text).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}
