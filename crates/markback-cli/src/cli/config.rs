use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use markback_core::CoreConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration that can be loaded from a JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Directory holding the bookmark stores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the core configuration. `data_dir` overrides the file's value.
    ///
    /// Highlight timing only matters to a page runtime, so the CLI keeps the
    /// core defaults for it.
    pub fn into_core(self, data_dir: Option<PathBuf>) -> CoreConfig {
        let data_dir = data_dir
            .or(self.data_dir)
            .unwrap_or_else(CoreConfig::default_data_dir);
        CoreConfig::new(data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_with_data_dir() {
        let json = r#"{"dataDir": "/tmp/test/marks"}"#;
        let config: CliConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/test/marks")));
        let core = config.into_core(None);
        assert_eq!(core.data_dir, PathBuf::from("/tmp/test/marks"));
        assert_eq!(core.highlight, markback_core::HighlightConfig::default());
    }

    #[test]
    fn test_parse_config_minimal() {
        let config: CliConfig = serde_json::from_str("{}").unwrap();
        assert!(config.data_dir.is_none());
        let core = config.into_core(None);
        assert_eq!(core.data_dir, CoreConfig::default_data_dir());
    }

    #[test]
    fn test_flag_overrides_file() {
        let config = CliConfig {
            data_dir: Some(PathBuf::from("/from/file")),
            ..Default::default()
        };
        let core = config.into_core(Some(PathBuf::from("/from/flag")));
        assert_eq!(core.data_dir, PathBuf::from("/from/flag"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{broken").unwrap();
        let err = CliConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));

        let missing = CliConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read config file"));
    }
}
