//! Engine configuration, loaded from TOML.

use serde::Deserialize;
use std::path::Path;

use crate::error::{CoreError, Result};

const MAX_CONFIG_FILE_BYTES: u64 = 65_536;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Name of the sheet a new document starts with.
    pub default_sheet: String,
    /// Ranges with more cells evaluate to `#REF!` and add no dependency edges.
    pub max_range_cells: usize,
    /// Sheet files larger than this are refused.
    pub max_file_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_sheet: "Sheet1".to_string(),
            max_range_cells: tabula_engine::engine::DEFAULT_MAX_RANGE_CELLS,
            max_file_bytes: 16 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config file. Oversized files are refused.
    pub fn load(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        if meta.len() > MAX_CONFIG_FILE_BYTES {
            return Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Refusing to read {}: config file too large ({} bytes, max {})",
                    path.display(),
                    meta.len(),
                    MAX_CONFIG_FILE_BYTES
                ),
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config = EngineConfig::from_toml(&content)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }
}
