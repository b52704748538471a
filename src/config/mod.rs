pub mod settings;

use std::path::PathBuf;

const APP_DIR: &str = "ollama-desk";

/// `explicit` if given, otherwise the platform data directory, falling back
/// to `./.ollama-desk`.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR)))
    })
}
