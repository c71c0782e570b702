//! Run configuration. One immutable value per extraction run; an optional
//! `xef2mat.config` JSON file in the working directory supplies defaults,
//! command-line flags win over it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::extractor::StreamKind;
use crate::shared::constants;
use crate::utils::logger;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub depth: bool,
    #[serde(default)]
    pub color: bool,
    #[serde(default)]
    pub infrared: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub throttle_ms: Option<u64>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(constants::DEFAULT_OUTPUT_DIR)
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            depth: false,
            color: false,
            infrared: false,
            output_dir: default_output_dir(),
            throttle_ms: None,
        }
    }
}

impl RunConfig {
    pub fn enabled(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Depth => self.depth,
            StreamKind::Infrared => self.infrared,
            StreamKind::Color => self.color,
        }
    }

    pub fn any_enabled(&self) -> bool {
        self.depth || self.color || self.infrared
    }
}

/// Reads defaults from `xef2mat.config` next to the working directory.
/// A missing file is normal; a malformed one is logged and ignored.
pub fn load_defaults() -> Option<RunConfig> {
    let path = Path::new(constants::CONFIG_FILE);
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            logger::error(&format!("Ignoring malformed {}: {}", constants::CONFIG_FILE, e));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_extract_nothing() {
        let config = RunConfig::default();
        assert!(!config.any_enabled());
        assert_eq!(config.output_dir, PathBuf::from("Xef2Mat_Output"));
        assert_eq!(config.throttle_ms, None);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: RunConfig = serde_json::from_str(r#"{"depth": true}"#).unwrap();
        assert!(config.depth);
        assert!(!config.color);
        assert!(!config.infrared);
        assert_eq!(config.output_dir, PathBuf::from("Xef2Mat_Output"));
    }

    #[test]
    fn test_enabled_maps_kinds_to_flags() {
        let config = RunConfig {
            color: true,
            ..Default::default()
        };
        assert!(config.enabled(StreamKind::Color));
        assert!(!config.enabled(StreamKind::Depth));
        assert!(!config.enabled(StreamKind::Infrared));
    }
}
