//! Configuration loading and parsing

use anyhow::{Context, Result};
use radar_fusion::{BusConfig, CapabilityFlags, FusionConfig, RateConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from fusion.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub capabilities: CapabilityFlags,
    #[serde(default)]
    pub buses: BusConfig,
    #[serde(default)]
    pub rates: RateConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    pub dbc_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplayConfig {
    /// Frames whose timestamps fall in one window are fed as one tick
    #[serde(default = "default_batch_period")]
    pub batch_period_ms: u64,
}

fn default_batch_period() -> u64 {
    10
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            batch_period_ms: default_batch_period(),
        }
    }
}

impl AppConfig {
    /// Fusion settings for the library
    pub fn fusion_config(&self) -> FusionConfig {
        FusionConfig {
            capabilities: self.capabilities,
            buses: self.buses,
            rates: self.rates,
        }
    }
}

/// Load configuration from a TOML file
///
/// Relative DBC paths are resolved against the config file's directory.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.replay.batch_period_ms == 0 {
        anyhow::bail!("replay.batch_period_ms must be greater than zero");
    }

    if let Some(base) = path.parent() {
        for dbc in &mut config.input.dbc_files {
            if dbc.is_relative() {
                *dbc = base.join(&*dbc);
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [input]
            dbc_files = ["hyundai_radar.dbc", "hyundai_pt.dbc"]

            [capabilities]
            radar_tracks = true
            can_fd = true

            [buses]
            track = 1
            forward = 0

            [replay]
            batch_period_ms = 20
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.input.dbc_files.len(), 2);
        assert!(config.capabilities.radar_tracks);
        assert!(!config.capabilities.enhanced_scc);
        assert_eq!(config.replay.batch_period_ms, 20);

        let fusion = config.fusion_config();
        assert!(fusion.capabilities.can_fd);
        assert_eq!(fusion.buses.track, 1);
        assert_eq!(fusion.rates, RateConfig::default());
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("[input]\ndbc_files = []\n").unwrap();
        assert_eq!(config.replay.batch_period_ms, 10);
        assert_eq!(config.capabilities, CapabilityFlags::default());
        assert_eq!(config.buses, BusConfig::default());
    }

    #[test]
    fn test_load_config_resolves_paths() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[input]\ndbc_files = [\"radar.dbc\", \"/abs/pt.dbc\"]").unwrap();
        file.flush().unwrap();

        let config = load_config(file.path()).unwrap();
        let base = file.path().parent().unwrap();
        assert_eq!(config.input.dbc_files[0], base.join("radar.dbc"));
        assert_eq!(config.input.dbc_files[1], PathBuf::from("/abs/pt.dbc"));
    }

    #[test]
    fn test_zero_batch_period_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[input]\ndbc_files = []\n[replay]\nbatch_period_ms = 0").unwrap();
        file.flush().unwrap();

        assert!(load_config(file.path()).is_err());
    }
}
