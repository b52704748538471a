use clap::{ Parser, Subcommand };
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Ollama Args ---
    /// Base URL of the Ollama server. Defaults to localhost on the port from settings.
    #[arg(long, env = "OLLAMA_URL", global = true)]
    pub ollama_url: Option<String>,

    /// Model to select on startup if the server has it.
    #[arg(long, short = 'm', env = "OLLAMA_MODEL", global = true)]
    pub model: Option<String>,

    // --- History Store Args ---
    /// Directory holding settings and chat history.
    #[arg(long, env = "OLLAMA_DESK_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// History chat store type (file, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "file", global = true)]
    pub history_type: String,

    // --- Chat Args ---
    /// Attach generation statistics to each reply.
    #[arg(long, env = "VERBOSE_STATS", global = true)]
    pub verbose_stats: bool,

    /// Augment prompts with web search results.
    #[arg(long, env = "WEB_SEARCH", global = true)]
    pub web_search: bool,

    // --- General App Args ---
    /// GitHub repository (owner/name) checked for new releases.
    #[arg(long, env = "RELEASE_REPO", default_value = crate::update::DEFAULT_RELEASE_REPO, global = true)]
    pub release_repo: String,

    /// Print the commands run by manager subcommands (setup, start, stop, pull, ...).
    #[arg(long, env = "SHOW_LOG", global = true)]
    pub show_log: bool,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Interactive chat (the default).
    Chat,
    /// Send one prompt and print the streamed reply.
    Ask {
        prompt: String,
        /// Image files to attach.
        #[arg(long = "image", short = 'i')]
        images: Vec<PathBuf>,
    },
    /// List models served by Ollama.
    Models,
    /// Show whether Ollama is installed and running.
    Status,
    /// Guided install, start and first model download.
    Setup {
        /// Models to download; defaults to the first recommended one.
        #[arg(long = "pull")]
        models: Vec<String>,
        /// Do not ask before installing.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Start the Ollama service in the background.
    Start,
    /// Stop the Ollama service.
    Stop,
    /// Download a model.
    Pull { model: String },
    /// Remove a model.
    Rm { model: String },
    /// Load a model into memory.
    Load { model: String },
    /// Evict a model from memory.
    Unload { model: String },
    /// List models via `ollama list`, falling back to the model directories.
    Scan,
    /// List saved conversations.
    Conversations,
    /// Delete one conversation by id.
    Delete { id: String },
    /// Delete every conversation.
    Clear,
    /// Show or change persisted settings.
    Settings {
        #[arg(long)]
        port: Option<String>,
        #[arg(long)]
        default_model: Option<String>,
        #[arg(long)]
        verbose: Option<bool>,
        #[arg(long)]
        web_search: Option<bool>,
    },
    /// Check GitHub for a newer release.
    Update {
        /// Download the release asset for this platform.
        #[arg(long)]
        download: bool,
    },
}
