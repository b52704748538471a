use serde::{ Deserialize, Serialize };
use std::fmt;

/// Derived on demand from the server probe and `ollama --version`; never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaStatus {
    pub is_installed: bool,
    pub is_running: bool,
    pub version: Option<String>,
}

impl fmt::Display for OllamaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let installed = if self.is_installed { "installed" } else { "not installed" };
        let running = if self.is_running { "running" } else { "not running" };
        write!(f, "Ollama {}, {}", installed, running)?;
        if let Some(version) = &self.version {
            write!(f, " ({})", version)?;
        }
        Ok(())
    }
}
