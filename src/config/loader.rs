use crate::config::types::{Config, DEFAULT_CONFIG_PATH};
use crate::utils::validation::is_empty_or_whitespace;
use anyhow::{Context, Result};
use log::{debug, trace, warn};
use std::path::Path;

impl Config {
    /// Resolve the config path from a command line argument
    pub fn resolve_config_path(arg: Option<String>) -> String {
        #[allow(clippy::collapsible_if)]
        if let Some(s) = arg {
            if !is_empty_or_whitespace(&s) {
                return s;
            }
        }
        DEFAULT_CONFIG_PATH.to_string()
    }

    /// Load configuration from a file.
    ///
    /// A missing file is replaced by the default configuration, which is also
    /// written to disk so it can be edited. A file that fails to parse is an error.
    pub async fn try_load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());
        let config = if path.exists() {
            let content = tokio::fs::read_to_string(path).await.with_context(|| format!("Failed to read {}", path.display()))?;
            let mut cfg =
                serde_json::from_str::<Config>(&content).with_context(|| format!("Failed to parse config file {}", path.display()))?;
            cfg.path = path.to_owned();
            cfg
        } else {
            warn!("Config file not found, using default config");
            Self::save_default(path).await?;
            let mut cfg = Self::new(path);
            cfg.path = path.to_owned();
            cfg
        };
        trace!("Loaded config: {}", config);
        Ok(config)
    }

    /// Save the current configuration to its file
    pub async fn save(&self) -> Result<()> {
        debug!("Saving config to: {}", self.path.display());
        #[allow(clippy::collapsible_if)]
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Save a default configuration to the specified path
    pub async fn save_default(path: impl AsRef<Path>) -> Result<()> {
        debug!("Saving default config to: {}", path.as_ref().display());
        let mut config = Self::new(path.as_ref());
        config.path = path.as_ref().to_owned();
        config.save().await
    }
}

#[cfg(test)]
mod tests {
    use crate::config::types::{Config, Rewrite};

    #[test]
    fn test_resolve_config_path() {
        assert_eq!(Config::resolve_config_path(Some("./custom.json".to_string())), "./custom.json");
        assert_eq!(Config::resolve_config_path(Some("   ".to_string())), "./devpx.json");
        assert_eq!(Config::resolve_config_path(None), "./devpx.json");
    }

    #[tokio::test]
    async fn test_missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devpx.json");

        let config = Config::try_load(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.get_path(), &path);
        assert_eq!(config.get_rules().len(), 3);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("${NAVER_CLIENT_ID}"));
    }

    #[tokio::test]
    async fn test_load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devpx.json");
        std::fs::write(
            &path,
            r#"{
                "listen": "0.0.0.0:3000",
                "static_dir": "./public",
                "rules": [
                    {"prefix": "/api", "target": "https://apis.data.go.kr", "secure": false},
                    {"prefix": "/v1", "target": "http://localhost:8080", "rewrite": {"replace_prefix": "/v2"}}
                ]
            }"#,
        )
        .unwrap();

        let config = Config::try_load(&path).await.unwrap();
        assert_eq!(config.get_listen(), "0.0.0.0:3000");
        assert_eq!(config.get_static_dir(), "./public");
        assert_eq!(config.get_index_file(), "index.html");
        assert_eq!(config.get_rules().len(), 2);
        assert!(!config.get_rules()[0].is_secure());
        assert_eq!(config.get_rules()[1].get_rewrite(), &Rewrite::ReplacePrefix("/v2".to_string()));
    }

    #[tokio::test]
    async fn test_load_corrupted_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devpx.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::try_load(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
        // The broken file is left for the user to fix
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn test_save_round_trip_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("devpx.json");
        Config::save_default(&path).await.unwrap();

        let config = Config::try_load(&path).await.unwrap();
        let prefixes: Vec<&str> = config.get_rules().iter().map(|r| r.get_prefix()).collect();
        assert_eq!(prefixes, vec!["/api", "/kepco", "/naver-api"]);
    }
}
