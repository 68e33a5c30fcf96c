use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub obs: ObsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Optional directory served at `/` (a browser UI, for instance).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

/// Where OBS listens and which input receives previewed clips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsConfig {
    #[serde(default = "default_obs_address")]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_input_kind")]
    pub input_kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSON record holding the watched folder, rewritten on every change.
    #[serde(default = "default_folder_file")]
    pub folder_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            static_dir: None,
        }
    }
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            address: default_obs_address(),
            password: None,
            input_name: default_input_name(),
            input_kind: default_input_kind(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            folder_file: default_folder_file(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_HTTP_PORT
}

fn default_obs_address() -> String {
    "ws://127.0.0.1:4455".to_string()
}

fn default_input_name() -> String {
    "ReplaySource".to_string()
}

fn default_input_kind() -> String {
    "ffmpeg_source".to_string()
}

fn default_folder_file() -> PathBuf {
    platform::data_dir().join("folder.json")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Base URL of the daemon's HTTP API as seen from this machine.
    pub fn daemon_url(&self) -> String {
        let host = match self.server.bind_address.as_str() {
            "0.0.0.0" | "" => "127.0.0.1",
            other => other,
        };
        format!("http://{}:{}", host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.obs.address, "ws://127.0.0.1:4455");
        assert_eq!(config.obs.input_name, "ReplaySource");
        assert_eq!(config.obs.input_kind, "ffmpeg_source");
        assert!(config.paths.folder_file.ends_with("clipcast/folder.json"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [obs]
            password = "hunter2"

            [server]
            port = 4000
            "#,
        )
        .unwrap();
        assert_eq!(config.obs.password.as_deref(), Some("hunter2"));
        assert_eq!(config.obs.address, "ws://127.0.0.1:4455");
        assert_eq!(config.server.port, 4000);
        assert!(config.server.static_dir.is_none());
    }

    #[test]
    fn test_daemon_url_rewrites_wildcard_bind() {
        let mut config = Config::default();
        config.server.bind_address = "0.0.0.0".to_string();
        config.server.port = 3100;
        assert_eq!(config.daemon_url(), "http://127.0.0.1:3100");
    }
}
