use log::info;
use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::{ Path, PathBuf };
use url::Url;

use crate::error::{ Error, Result };
use crate::ollama::{ DEFAULT_BASE_URL, DEFAULT_PORT };

const SETTINGS_FILE: &str = "settings.json";
const MIN_PORT: u16 = 1024;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub web_search: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            default_model: None,
            verbose: false,
            web_search: false,
        }
    }
}

impl Settings {
    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join(SETTINGS_FILE)
    }

    /// Missing file means defaults.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = Self::path_in(data_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        fs::create_dir_all(data_dir)?;
        let path = Self::path_in(data_dir);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Base URL of the local server on the configured port.
    pub fn base_url(&self) -> Result<String> {
        with_port(DEFAULT_BASE_URL, self.port)
    }
}

/// Validates user input for the server port.
pub fn parse_port(input: &str) -> Result<u16> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidSetting("Port cannot be empty".to_string()));
    }
    match trimmed.parse::<u16>() {
        Ok(port) if port >= MIN_PORT => Ok(port),
        _ => Err(Error::InvalidSetting("Port must be a number between 1024 and 65535".to_string())),
    }
}

/// Replaces the port of `base_url`, keeping scheme, host and path.
pub fn with_port(base_url: &str, port: u16) -> Result<String> {
    let mut url = Url::parse(base_url).map_err(|e|
        Error::InvalidSetting(format!("Invalid base URL '{}': {}", base_url, e))
    )?;
    url.set_port(Some(port)).map_err(|_|
        Error::InvalidSetting(format!("Base URL '{}' cannot carry a port", base_url))
    )?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_validation_messages() {
        assert_eq!(parse_port(" 11434 ").unwrap(), 11434);
        assert_eq!(parse_port("65535").unwrap(), 65535);
        assert_eq!(parse_port("").unwrap_err().to_string(), "Port cannot be empty");
        for bad in ["80", "1023", "65536", "abc", "-1"] {
            assert_eq!(
                parse_port(bad).unwrap_err().to_string(),
                "Port must be a number between 1024 and 65535"
            );
        }
    }

    #[test]
    fn base_url_port_is_replaced() {
        assert_eq!(with_port("http://localhost:11434", 12000).unwrap(), "http://localhost:12000");
        assert_eq!(with_port("http://10.0.0.2/", 8081).unwrap(), "http://10.0.0.2:8081");
        assert!(with_port("not a url", 8081).is_err());
    }

    #[test]
    fn settings_persist_with_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Settings::load(dir.path()).unwrap(), Settings::default());

        let settings = Settings {
            port: 12001,
            default_model: Some("mistral".into()),
            verbose: true,
            web_search: false,
        };
        settings.save(dir.path()).unwrap();
        assert_eq!(Settings::load(dir.path()).unwrap(), settings);

        std::fs::write(Settings::path_in(dir.path()), "{\"verbose\":true}").unwrap();
        let partial = Settings::load(dir.path()).unwrap();
        assert_eq!(partial.port, DEFAULT_PORT);
        assert!(partial.verbose);
        assert_eq!(partial.base_url().unwrap(), "http://localhost:11434");
        assert_eq!(settings.base_url().unwrap(), "http://localhost:12001");
    }
}
