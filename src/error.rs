use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ollama API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command '{command}' failed: {message}")]
    Command { command: String, message: String },

    #[error("{0}")]
    Unsupported(String),

    #[error("Model '{0}' is not available on the Ollama server")]
    UnknownModel(String),

    #[error("No model selected")]
    NoModelSelected,

    #[error("Ollama is not running")]
    ServerNotRunning,

    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Conversation '{0}' not found")]
    ConversationNotFound(String),

    #[error("{0}")]
    InvalidSetting(String),

    #[error("Update check failed: {0}")]
    Update(String),
}

pub type Result<T> = std::result::Result<T, Error>;
