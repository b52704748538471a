use log::{ info, warn };
use std::path::Path;
use std::sync::Arc;

use super::{ extended_path, CommandOutput, CommandRunner, Platform, SystemRunner };
use crate::error::{ Error, Result };
use crate::models::command_log::{ CommandLog, CommandLogBook };
use crate::models::status::OllamaStatus;
use crate::ollama::OllamaClient;

const OLLAMA_BIN: &str = "ollama";

/// Installs, starts, stops and manages a local Ollama through OS commands.
/// Every command issued is recorded in the command log.
pub struct OllamaManager {
    runner: Arc<dyn CommandRunner>,
    client: OllamaClient,
    platform: Platform,
    log: CommandLogBook,
}

impl OllamaManager {
    pub fn new(client: OllamaClient) -> Self {
        Self::with_runner(client, Arc::new(SystemRunner), Platform::current())
    }

    pub fn with_runner(client: OllamaClient, runner: Arc<dyn CommandRunner>, platform: Platform) -> Self {
        Self {
            runner,
            client,
            platform,
            log: CommandLogBook::new(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    pub fn command_log(&self) -> Vec<CommandLog> {
        self.log.entries()
    }

    pub fn clear_command_log(&self) {
        self.log.clear();
    }

    fn search_path(&self) -> Option<String> {
        if self.platform == Platform::Windows { None } else { Some(extended_path()) }
    }

    /// Runs a command, logging it, and turns a non-zero exit into an error
    /// carrying stderr.
    async fn run_logged(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let display = std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
        let log_id = self.log.start(&display);
        let path = self.search_path();
        match self.runner.output(program, args, path.as_deref()).await {
            Ok(out) if out.success => {
                self.log.succeed(&log_id, Some(out.stdout.trim().to_string()));
                Ok(out)
            }
            Ok(out) => {
                let message = out.stderr.trim().to_string();
                self.log.fail(&log_id, &message);
                Err(Error::Command { command: display, message })
            }
            Err(e) => {
                self.log.fail(&log_id, e.to_string());
                Err(Error::Command { command: display, message: e.to_string() })
            }
        }
    }

    /// Whether any of the platform's usual install locations exists.
    pub fn installation_found(&self) -> bool {
        self.platform
            .installation_paths()
            .iter()
            .any(|p| p.exists())
    }

    /// `ollama --version`, trimmed.
    pub async fn version(&self) -> Result<String> {
        let out = self.run_logged(OLLAMA_BIN, &["--version"]).await?;
        Ok(out.stdout.trim().to_string())
    }

    /// Probes the HTTP API first; when the request itself fails, falls back
    /// to looking for the process.
    pub async fn service_running(&self) -> bool {
        match self.client.probe().await {
            Ok(running) => running,
            Err(e) => {
                info!("Ollama API probe failed ({}), checking for a running process", e);
                self.process_running().await
            }
        }
    }

    async fn process_running(&self) -> bool {
        let result = if self.platform == Platform::Windows {
            self.runner
                .output("tasklist", &["/FI", "IMAGENAME eq ollama.exe"], None).await
                .map(|out| out.stdout.contains("ollama.exe"))
        } else {
            self.runner.output("pgrep", &["-x", OLLAMA_BIN], None).await.map(|out| out.success)
        };
        result.unwrap_or(false)
    }

    pub async fn status(&self) -> OllamaStatus {
        let is_running = self.client.is_running().await;
        let version = self.version().await.ok();
        OllamaStatus {
            is_installed: is_running || version.is_some() || self.installation_found(),
            is_running,
            version,
        }
    }

    /// Installs through Homebrew where available. Other platforms get an
    /// error pointing at the manual download.
    pub async fn install(&self) -> Result<String> {
        match self.platform {
            Platform::MacOs | Platform::Linux => {}
            Platform::Windows => {
                return Err(
                    Error::Unsupported(
                        "Please download the Ollama installer from https://ollama.com/download and run it manually.".to_string()
                    )
                );
            }
            Platform::Unknown => {
                return Err(Error::Unsupported(format!("Unsupported platform: {}", self.platform)));
            }
        }

        let brew = self.find_brew().await.ok_or_else(||
            Error::Unsupported(
                "Homebrew not found in any common locations. Install Homebrew from https://brew.sh or download Ollama manually from https://ollama.com/download".to_string()
            )
        )?;
        info!("Installing Ollama with {}", brew);
        if let Ok(out) = self.run_logged(&brew, &["--version"]).await {
            info!("Homebrew version: {}", out.stdout.lines().next().unwrap_or_default());
        }
        let out = self.run_logged(&brew, &["install", OLLAMA_BIN]).await?;
        Ok(format!("Ollama installed successfully via Homebrew at {}. {}", brew, out.stdout.trim()))
    }

    async fn find_brew(&self) -> Option<String> {
        let path = self.search_path();
        if let Ok(out) = self.runner.output("which", &["brew"], path.as_deref()).await {
            let found = out.stdout.trim();
            if out.success && !found.is_empty() {
                return Some(found.to_string());
            }
        }
        self.platform
            .homebrew_paths()
            .iter()
            .find(|p| Path::new(p).exists())
            .map(|p| p.to_string())
    }

    /// Starts `ollama serve` in the background, trying progressively more
    /// direct ways of launching it.
    pub async fn start_service(&self) -> Result<String> {
        let log_id = self.log.start("ollama serve");
        let result = if self.platform == Platform::Windows {
            self.start_windows().await
        } else {
            self.start_unix()
        };
        match &result {
            Ok(message) => self.log.succeed(&log_id, Some(message.clone())),
            Err(e) => self.log.fail(&log_id, e.to_string()),
        }
        result
    }

    async fn start_windows(&self) -> Result<String> {
        let primary = self.runner.output("cmd", &["/C", "start", "/B", OLLAMA_BIN, "serve"], None).await;
        let primary_error = match primary {
            Ok(out) if out.success => {
                return Ok("Ollama service started with 'cmd /C start /B ollama serve'".to_string());
            }
            Ok(out) => out.stderr.trim().to_string(),
            Err(e) => e.to_string(),
        };
        match self.runner.spawn_detached(OLLAMA_BIN, &["serve"], None) {
            Ok(()) => Ok("Ollama service started with a direct spawn".to_string()),
            Err(e) =>
                Err(Error::Command {
                    command: "ollama serve".to_string(),
                    message: format!("Primary error: {}. Fallback error: {}", primary_error, e),
                }),
        }
    }

    fn start_unix(&self) -> Result<String> {
        let path = extended_path();
        if self.runner.spawn_detached("nohup", &[OLLAMA_BIN, "serve"], Some(&path)).is_ok() {
            return Ok("Ollama service started with 'nohup ollama serve'".to_string());
        }
        let direct_error = match self.runner.spawn_detached(OLLAMA_BIN, &["serve"], Some(&path)) {
            Ok(()) => {
                return Ok("Ollama service started with 'ollama serve'".to_string());
            }
            Err(e) => e,
        };
        for candidate in ["/opt/homebrew/bin/ollama", "/usr/local/bin/ollama"] {
            if Path::new(candidate).exists() && self.runner.spawn_detached(candidate, &["serve"], None).is_ok() {
                return Ok(format!("Ollama service started from {}", candidate));
            }
        }
        Err(Error::Command {
            command: "ollama serve".to_string(),
            message: format!("{}. No ollama executable found in common paths.", direct_error),
        })
    }

    pub async fn stop_service(&self) -> Result<String> {
        if self.platform == Platform::Windows {
            self.run_logged("taskkill", &["/F", "/IM", "ollama.exe"]).await?;
        } else {
            self.run_logged("pkill", &["-x", OLLAMA_BIN]).await?;
        }
        Ok("Ollama service stopped successfully".to_string())
    }

    /// Polls until the API answers or the attempts run out.
    pub async fn wait_until_running(&self, attempts: usize, delay: std::time::Duration) -> bool {
        for attempt in 0..attempts {
            if attempt > 0 || !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.service_running().await {
                return true;
            }
        }
        false
    }

    pub async fn pull_model(&self, model: &str) -> Result<String> {
        let model = validate_model_name(model)?;
        let out = self.run_logged(OLLAMA_BIN, &["pull", model]).await?;
        Ok(format!("Model '{}' downloaded successfully. {}", model, out.stdout.trim()))
    }

    pub async fn remove_model(&self, model: &str) -> Result<String> {
        let model = validate_model_name(model)?;
        self.run_logged(OLLAMA_BIN, &["rm", model]).await?;
        Ok(format!("Model '{}' uninstalled successfully", model))
    }

    /// Models reported by `ollama list`.
    pub async fn list_installed(&self) -> Result<Vec<String>> {
        let out = self.run_logged(OLLAMA_BIN, &["list"]).await?;
        Ok(parse_model_list(&out.stdout))
    }

    /// `ollama list`, or the model directories on disk when it exits with an
    /// error. A missing binary yields an empty list.
    pub async fn scan_for_models(&self) -> Vec<String> {
        let log_id = self.log.start("ollama list");
        let path = self.search_path();
        match self.runner.output(OLLAMA_BIN, &["list"], path.as_deref()).await {
            Ok(out) if out.success => {
                self.log.succeed(&log_id, Some(out.stdout.trim().to_string()));
                parse_model_list(&out.stdout)
            }
            Ok(out) => {
                self.log.fail(&log_id, out.stderr.trim());
                info!("ollama list failed, scanning model directories");
                self.scan_model_directories()
            }
            Err(e) => {
                self.log.fail(&log_id, e.to_string());
                warn!("Failed to run ollama list: {}", e);
                Vec::new()
            }
        }
    }

    fn scan_model_directories(&self) -> Vec<String> {
        let mut found = Vec::new();
        for dir in self.platform.model_directories() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                if entry.file_type().map_or(false, |ft| ft.is_dir()) {
                    if let Some(name) = entry.file_name().to_str() {
                        found.push(name.to_string());
                    }
                }
            }
        }
        found
    }

    pub async fn load_model(&self, model: &str) -> Result<String> {
        let model = validate_model_name(model)?;
        let log_id = self.log.start(format!("POST {}/api/generate (load {})", self.client.base_url(), model));
        match self.client.load_model(model).await {
            Ok(()) => {
                let message = format!("Model '{}' loaded successfully", model);
                self.log.succeed(&log_id, Some(message.clone()));
                Ok(message)
            }
            Err(e) => {
                self.log.fail(&log_id, e.to_string());
                Err(e)
            }
        }
    }

    pub async fn unload_model(&self, model: &str) -> Result<String> {
        let model = validate_model_name(model)?;
        let log_id = self.log.start(format!("POST {}/api/generate (unload {})", self.client.base_url(), model));
        match self.client.unload_model(model).await {
            Ok(()) => {
                let message = format!("Model '{}' unloaded successfully", model);
                self.log.succeed(&log_id, Some(message.clone()));
                Ok(message)
            }
            Err(e) => {
                self.log.fail(&log_id, e.to_string());
                Err(e)
            }
        }
    }
}

fn validate_model_name(model: &str) -> Result<&str> {
    let model = model.trim();
    if model.is_empty() || model.starts_with('-') || model.chars().any(char::is_whitespace) {
        return Err(Error::InvalidSetting(format!("Invalid model name: '{}'", model)));
    }
    Ok(model)
}

/// First column of every row after the header of `ollama list`.
pub fn parse_model_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::command_log::CommandStatus;
    use crate::setup::testing::FakeRunner;

    const LIST_OUTPUT: &str = "NAME               ID              SIZE      MODIFIED\n\
llama3.2:latest    a80c4f17acd5    2.0 GB    2 days ago\n\
mistral:7b         f974a74358d6    4.1 GB    3 weeks ago\n\
\n";

    // nothing listens on port 9
    fn offline_client() -> OllamaClient {
        OllamaClient::new(Some("http://127.0.0.1:9".into()))
    }

    fn manager(runner: FakeRunner, platform: Platform) -> (OllamaManager, Arc<FakeRunner>) {
        let runner = Arc::new(runner);
        (OllamaManager::with_runner(offline_client(), runner.clone(), platform), runner)
    }

    #[test]
    fn model_list_skips_header_and_blank_lines() {
        assert_eq!(parse_model_list(LIST_OUTPUT), vec!["llama3.2:latest", "mistral:7b"]);
        assert!(parse_model_list("NAME ID SIZE MODIFIED\n").is_empty());
        assert!(parse_model_list("").is_empty());
    }

    #[tokio::test]
    async fn list_installed_parses_ollama_list() {
        let (mgr, _) = manager(FakeRunner::new().respond("ollama list", CommandOutput::ok(LIST_OUTPUT)), Platform::Linux);
        assert_eq!(mgr.list_installed().await.unwrap(), vec!["llama3.2:latest", "mistral:7b"]);
        let log = mgr.command_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].command, "ollama list");
        assert_eq!(log[0].status, CommandStatus::Success);
    }

    #[tokio::test]
    async fn scan_without_binary_is_empty() {
        let (mgr, _) = manager(FakeRunner::new(), Platform::Linux);
        assert!(mgr.scan_for_models().await.is_empty());
        assert_eq!(mgr.command_log()[0].status, CommandStatus::Error);
    }

    #[tokio::test]
    async fn failed_pull_carries_stderr() {
        let runner = FakeRunner::new().respond("ollama pull nosuch", CommandOutput::failed("pull model manifest: file does not exist\n"));
        let (mgr, _) = manager(runner, Platform::MacOs);
        let err = mgr.pull_model("nosuch").await.unwrap_err();
        assert_eq!(err.to_string(), "Command 'ollama pull nosuch' failed: pull model manifest: file does not exist");
        assert_eq!(mgr.command_log()[0].status, CommandStatus::Error);
    }

    #[tokio::test]
    async fn bad_model_names_never_reach_the_shell() {
        let (mgr, runner) = manager(FakeRunner::new(), Platform::Linux);
        for bad in ["", "  ", "--help", "two words"] {
            assert!(matches!(mgr.remove_model(bad).await, Err(Error::InvalidSetting(_))));
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn windows_install_is_manual() {
        let (mgr, runner) = manager(FakeRunner::new(), Platform::Windows);
        let err = mgr.install().await.unwrap_err();
        assert!(err.to_string().contains("ollama.com/download"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn install_uses_brew_found_on_path() {
        let runner = FakeRunner::new()
            .respond("which brew", CommandOutput::ok("/opt/homebrew/bin/brew\n"))
            .respond("/opt/homebrew/bin/brew --version", CommandOutput::ok("Homebrew 4.3.0\n"))
            .respond("/opt/homebrew/bin/brew install ollama", CommandOutput::ok("==> Pouring ollama\n"));
        let (mgr, runner) = manager(runner, Platform::MacOs);
        let message = mgr.install().await.unwrap();
        assert!(message.contains("/opt/homebrew/bin/brew"));
        assert_eq!(runner.calls().last().unwrap(), "/opt/homebrew/bin/brew install ollama");
    }

    #[tokio::test]
    async fn stop_uses_platform_command() {
        let (mgr, runner) = manager(FakeRunner::new().respond("pkill -x ollama", CommandOutput::ok("")), Platform::Linux);
        mgr.stop_service().await.unwrap();
        assert_eq!(runner.calls(), vec!["pkill -x ollama"]);

        let (mgr, runner) = manager(
            FakeRunner::new().respond("taskkill /F /IM ollama.exe", CommandOutput::ok("SUCCESS")),
            Platform::Windows
        );
        mgr.stop_service().await.unwrap();
        assert_eq!(runner.calls(), vec!["taskkill /F /IM ollama.exe"]);
    }

    #[tokio::test]
    async fn unix_start_falls_back_to_direct_spawn() {
        let runner = FakeRunner::new().allow_spawn("ollama serve");
        let (mgr, runner) = manager(runner, Platform::Linux);
        let message = mgr.start_service().await.unwrap();
        assert_eq!(message, "Ollama service started with 'ollama serve'");
        assert_eq!(runner.calls()[..2], ["spawn nohup ollama serve".to_string(), "spawn ollama serve".to_string()]);
        assert_eq!(mgr.command_log()[0].status, CommandStatus::Success);
    }

    #[tokio::test]
    async fn windows_start_falls_back_when_cmd_fails() {
        let runner = FakeRunner::new()
            .respond("cmd /C start /B ollama serve", CommandOutput::failed("denied"))
            .allow_spawn("ollama serve");
        let (mgr, _) = manager(runner, Platform::Windows);
        assert_eq!(mgr.start_service().await.unwrap(), "Ollama service started with a direct spawn");
    }

    #[tokio::test]
    async fn process_check_backs_up_an_unreachable_api() {
        let (mgr, _) = manager(FakeRunner::new().respond("pgrep -x ollama", CommandOutput::ok("4242\n")), Platform::Linux);
        assert!(mgr.service_running().await);

        let (mgr, _) = manager(FakeRunner::new(), Platform::Linux);
        assert!(!mgr.service_running().await);
    }

    // the test binary's own command line contains "ollama"
    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn process_check_does_not_match_this_client() {
        let mgr = OllamaManager::with_runner(offline_client(), Arc::new(SystemRunner), Platform::Linux);
        let own_exe = std::env::current_exe().unwrap();
        assert!(own_exe.to_string_lossy().contains("ollama"));
        let ollama_alive = std::process::Command::new("pgrep")
            .args(["-x", "ollama"])
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false);
        assert_eq!(mgr.service_running().await, ollama_alive);
    }

    #[tokio::test]
    async fn process_commands_match_the_exact_name() {
        let runner = FakeRunner::new().respond("pgrep -x ollama", CommandOutput::failed(""));
        let (mgr, runner) = manager(runner, Platform::MacOs);
        assert!(!mgr.service_running().await);
        assert_eq!(runner.calls(), vec!["pgrep -x ollama"]);
    }

    #[tokio::test]
    async fn status_reports_version_when_server_is_down() {
        let runner = FakeRunner::new().respond("ollama --version", CommandOutput::ok("ollama version is 0.5.7\n"));
        let (mgr, _) = manager(runner, Platform::Unknown);
        let status = mgr.status().await;
        assert!(status.is_installed);
        assert!(!status.is_running);
        assert_eq!(status.version.as_deref(), Some("ollama version is 0.5.7"));
    }
}
