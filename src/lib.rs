pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod ollama;
pub mod repl;
pub mod search;
pub mod session;
pub mod setup;
pub mod thinking;
pub mod update;

use cli::{ Args, Command };
use config::resolve_data_dir;
use config::settings::{ parse_port, Settings };
use history::initialize_conversation_store;
use log::{ info, warn };
use ollama::{ encode_image, OllamaClient };
use session::{ ChatSession, SessionOptions };
use setup::wizard::{ SetupStep, RECOMMENDED_MODELS };
use setup::{ OllamaManager, SetupWizard };
use std::error::Error;
use std::io::Write;
use std::path::Path;
use tokio::io::{ AsyncBufReadExt, BufReader };
use update::{ default_download_dir, ReleaseChecker };

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let data_dir = resolve_data_dir(args.data_dir.clone());
    let settings = Settings::load(&data_dir)?;
    let base_url = match &args.ollama_url {
        Some(url) => url.clone(),
        None => settings.base_url()?,
    };

    info!("--- Core Configuration ---");
    info!("Ollama URL: {}", base_url);
    info!("Data Directory: {}", data_dir.display());
    info!("History Store Type: {}", args.history_type);
    info!("Verbose Stats: {}", args.verbose_stats || settings.verbose);
    info!("Web Search: {}", args.web_search || settings.web_search);
    info!("-------------------------");

    let client = OllamaClient::new(Some(base_url));
    let command = args.command.clone().unwrap_or(Command::Chat);

    match command {
        Command::Chat => {
            let mut session = initialize_session(&args, &settings, &data_dir, client).await?;
            repl::run_repl(&mut session).await?;
        }
        Command::Ask { prompt, images } => {
            let mut session = initialize_session(&args, &settings, &data_dir, client).await?;
            let mut encoded = Vec::with_capacity(images.len());
            for path in &images {
                encoded.push(encode_image(path).await?);
            }
            let reply = session.submit(&prompt, encoded, |fragment| {
                print!("{}", fragment);
                let _ = std::io::stdout().flush();
            }).await?;
            println!();
            if reply.content.starts_with("Error: ") {
                return Err(reply.content.into());
            }
            if let Some(sources) = &reply.sources {
                for (i, source) in sources.iter().enumerate() {
                    println!("[{}] {} - {}", i + 1, source.title, source.url);
                }
            }
            if let Some(stats) = &reply.verbose_stats {
                println!("{}", stats);
            }
        }
        Command::Models => {
            for model in client.list_models().await? {
                println!("{}", model);
            }
        }
        Command::Status => {
            let manager = OllamaManager::new(client);
            println!("{} at {}", manager.status().await, manager.client().base_url());
        }
        Command::Setup { .. } |
        Command::Start |
        Command::Stop |
        Command::Pull { .. } |
        Command::Rm { .. } |
        Command::Load { .. } |
        Command::Unload { .. } |
        Command::Scan => {
            let manager = OllamaManager::new(client);
            let result = run_manager_command(&manager, command).await;
            print_command_log(&manager, args.show_log || args.debug);
            result?;
        }
        Command::Conversations => {
            let store = initialize_conversation_store(&args.history_type, &data_dir).await?;
            if store.is_empty() {
                println!("No conversations yet.");
            }
            for c in store.conversations() {
                let marker = if store.current_id() == Some(c.id.as_str()) { "*" } else { " " };
                println!("{} {}  {}  ({} messages)", marker, c.id, c.title, c.messages.len());
            }
        }
        Command::Delete { id } => {
            let mut store = initialize_conversation_store(&args.history_type, &data_dir).await?;
            store.delete(&id).await?;
            println!("Conversation {} deleted", id);
        }
        Command::Clear => {
            let mut store = initialize_conversation_store(&args.history_type, &data_dir).await?;
            store.clear_all().await?;
            println!("All conversations cleared");
        }
        Command::Settings { port, default_model, verbose, web_search } => {
            let mut settings = settings;
            let changed = port.is_some() || default_model.is_some() || verbose.is_some() || web_search.is_some();
            if let Some(port) = port {
                settings.port = parse_port(&port)?;
            }
            if let Some(model) = default_model {
                settings.default_model = Some(model).filter(|m| !m.trim().is_empty());
            }
            if let Some(verbose) = verbose {
                settings.verbose = verbose;
            }
            if let Some(web_search) = web_search {
                settings.web_search = web_search;
            }
            if changed {
                settings.save(&data_dir)?;
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Update { download } => {
            let checker = ReleaseChecker::new(args.release_repo.clone())?;
            let info = checker.check().await?;
            if !info.available {
                println!("ollama-desk {} is up to date", info.current_version);
                return Ok(());
            }
            println!("Update available: {} -> {}", info.current_version, info.latest_version);
            if let Some(url) = &info.release_url {
                println!("{}", url);
            }
            if let Some(notes) = &info.release_notes {
                println!("\n{}\n", notes.trim());
            }
            match (download, info.download_url.as_deref()) {
                (true, Some(url)) => {
                    let path = checker.download(url, &default_download_dir()).await?;
                    println!("Downloaded to {}", path.display());
                }
                (true, None) => println!("No release asset matches this platform."),
                (false, _) => {}
            }
        }
    }

    Ok(())
}

async fn run_manager_command(manager: &OllamaManager, command: Command) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        Command::Setup { models, yes } => run_setup(manager, models, yes).await?,
        Command::Start => println!("{}", manager.start_service().await?),
        Command::Stop => println!("{}", manager.stop_service().await?),
        Command::Pull { model } => println!("{}", manager.pull_model(&model).await?),
        Command::Rm { model } => println!("{}", manager.remove_model(&model).await?),
        Command::Load { model } => println!("{}", manager.load_model(&model).await?),
        Command::Unload { model } => println!("{}", manager.unload_model(&model).await?),
        Command::Scan => {
            let models = manager.scan_for_models().await;
            if models.is_empty() {
                println!("No models found.");
            }
            for model in models {
                println!("{}", model);
            }
        }
        other => warn!("{:?} is not a manager command", other),
    }
    Ok(())
}

/// Dumps the commands the manager ran to stderr, then empties the log.
fn print_command_log(manager: &OllamaManager, show: bool) {
    let entries = manager.command_log();
    if show && !entries.is_empty() {
        eprintln!("--- Command Log ---");
        for entry in &entries {
            eprintln!("{}", entry);
        }
    }
    manager.clear_command_log();
}

async fn initialize_session(
    args: &Args,
    settings: &Settings,
    data_dir: &Path,
    client: OllamaClient
) -> Result<ChatSession, Box<dyn Error + Send + Sync>> {
    let store = initialize_conversation_store(&args.history_type, data_dir).await?;
    let options = SessionOptions {
        verbose: args.verbose_stats || settings.verbose,
        web_search: args.web_search || settings.web_search,
        preferred_model: args.model.clone().or_else(|| settings.default_model.clone()),
    };
    let mut session = ChatSession::new(client, store, options);
    session.refresh().await;
    if let Some(wanted) = args.model.as_deref() {
        if session.is_running() && session.selected_model() != Some(wanted) {
            warn!("Model '{}' is not available, using {:?}", wanted, session.selected_model());
        }
    }
    Ok(session)
}

async fn confirm(question: &str) -> std::io::Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn run_setup(manager: &OllamaManager, models: Vec<String>, yes: bool) -> Result<(), Box<dyn Error + Send + Sync>> {
    let wizard = SetupWizard::new(manager);
    let state = wizard.initialize().await;
    println!("Platform: {}", state.platform);
    println!("{}", state.status);
    let mut progress = |message: &str| println!("{}", message);

    match state.step {
        SetupStep::AskInstall => {
            if !yes && !confirm("Ollama is not installed. Install it now?").await? {
                if let Some(url) = state.platform.download_url() {
                    println!("You can install it manually from {}", url);
                }
                return Ok(());
            }
            if !wizard.install(&mut progress).await? {
                return Ok(());
            }
        }
        SetupStep::Confirm => {
            if !wizard.ensure_running(&mut progress).await {
                return Ok(());
            }
        }
        SetupStep::Models | SetupStep::Manage => {}
    }

    if state.step == SetupStep::Manage && models.is_empty() {
        println!("Installed models:");
        for model in &state.installed_models {
            println!("  {}", model);
        }
        return Ok(());
    }

    let models = if models.is_empty() {
        println!("Recommended models:");
        for m in RECOMMENDED_MODELS {
            println!("  {:<10} {:>6}  {}", m.name, m.size, m.description);
        }
        vec![RECOMMENDED_MODELS[0].name.to_string()]
    } else {
        models
    };

    let outcomes = wizard.download_models(&models, &mut progress).await;
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        return Err(format!("{} of {} model download(s) failed", failed, outcomes.len()).into());
    }
    println!("Setup complete.");
    Ok(())
}
