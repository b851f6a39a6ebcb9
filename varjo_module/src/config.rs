use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "varjo_module.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// Read gaze from the companion process over shared memory.
    #[default]
    Companion,
    /// Load VarjoLib in-process.
    Native,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub executable: PathBuf,
    pub map_name: String,
    pub open_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("nml_mods").join("VarjoCompanion.exe"),
            map_name: "VarjoEyeTracking".to_string(),
            open_attempts: 5,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    pub library: PathBuf,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            library: PathBuf::from("TrackingLibs").join("VarjoLib.dll"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarjoConfig {
    pub mode: BridgeMode,
    pub companion: CompanionConfig,
    pub native: NativeConfig,
}

/// Reads the config, or writes the defaults out if there is none yet.
pub fn load_config(path: &Path) -> Result<VarjoConfig> {
    if path.exists() {
        let file = fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config = serde_json::from_reader(reader)?;
        Ok(config)
    } else {
        let config = VarjoConfig::default();
        let file = fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &config)?;
        Ok(config)
    }
}

/// Directory of the host executable. Companion and library paths are
/// relative to it.
pub fn install_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("varjo_cfg_{}_{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(CONFIG_FILE_NAME)
    }

    #[test]
    fn test_missing_config_writes_defaults() {
        let path = scratch("missing");
        let _ = fs::remove_file(&path);

        let config = load_config(&path).unwrap();
        assert_eq!(config, VarjoConfig::default());
        assert!(path.exists());

        let reloaded = load_config(&path).unwrap();
        assert_eq!(reloaded, config);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let path = scratch("partial");
        fs::write(&path, r#"{ "mode": "native", "companion": { "open_attempts": 8 } }"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.mode, BridgeMode::Native);
        assert_eq!(config.companion.open_attempts, 8);
        assert_eq!(config.companion.retry_delay_ms, 500);
        assert_eq!(config.companion.map_name, "VarjoEyeTracking");
        assert_eq!(config.native, NativeConfig::default());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let path = scratch("malformed");
        fs::write(&path, "{ mode: ").unwrap();
        assert!(load_config(&path).is_err());
        fs::remove_file(&path).unwrap();
    }
}
