use log::{ info, warn };
use serde::Serialize;
use std::time::Duration;

use super::{ OllamaManager, Platform };
use crate::error::Result;
use crate::models::status::OllamaStatus;

const VERIFY_DELAY: Duration = Duration::from_secs(3);
const VERIFY_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SetupStep {
    /// Ollama is not installed.
    AskInstall,
    /// Installed but not running and no models known.
    Confirm,
    /// Running with nothing pulled yet.
    Models,
    /// Models are installed.
    Manage,
}

pub fn resolve_step(installed: bool, running: bool, installed_models: &[String]) -> SetupStep {
    if !installed {
        SetupStep::AskInstall
    } else if !installed_models.is_empty() {
        SetupStep::Manage
    } else if running {
        SetupStep::Models
    } else {
        SetupStep::Confirm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecommendedModel {
    pub name: &'static str,
    pub size: &'static str,
    pub description: &'static str,
}

pub const RECOMMENDED_MODELS: &[RecommendedModel] = &[
    RecommendedModel { name: "llama3.2", size: "2.0GB", description: "Latest Llama model, great for general tasks" },
    RecommendedModel { name: "llama2", size: "3.8GB", description: "Stable and reliable for most use cases" },
    RecommendedModel { name: "codellama", size: "3.8GB", description: "Specialized for code generation and programming" },
    RecommendedModel { name: "mistral", size: "4.1GB", description: "Fast and efficient for various tasks" },
    RecommendedModel { name: "phi3", size: "2.2GB", description: "Lightweight model from Microsoft" },
    RecommendedModel { name: "gemma", size: "5.0GB", description: "Google's open-source model" },
];

#[derive(Debug, Clone)]
pub struct SetupState {
    pub platform: Platform,
    pub step: SetupStep,
    pub status: OllamaStatus,
    pub installed_models: Vec<String>,
}

#[derive(Debug)]
pub struct ModelOutcome {
    pub model: String,
    pub result: Result<String>,
}

/// Drives install, start and model download as sequential steps, reporting
/// human-readable progress through a callback.
pub struct SetupWizard<'a> {
    manager: &'a OllamaManager,
    verify_delay: Duration,
    verify_attempts: usize,
}

impl<'a> SetupWizard<'a> {
    pub fn new(manager: &'a OllamaManager) -> Self {
        Self {
            manager,
            verify_delay: VERIFY_DELAY,
            verify_attempts: VERIFY_ATTEMPTS,
        }
    }

    pub fn with_verification(mut self, delay: Duration, attempts: usize) -> Self {
        self.verify_delay = delay;
        self.verify_attempts = attempts.max(1);
        self
    }

    /// Inspects the machine and picks the step the user should start at.
    pub async fn initialize(&self) -> SetupState {
        let platform = self.manager.platform();
        let mut status = self.manager.status().await;
        status.is_installed = status.is_installed || self.manager.installation_found();
        let installed_models = if status.is_installed {
            self.manager.list_installed().await.unwrap_or_default()
        } else {
            Vec::new()
        };
        let step = resolve_step(status.is_installed, status.is_running, &installed_models);
        info!("Setup on {}: {:?} ({})", platform, step, status);
        SetupState {
            platform,
            step,
            status,
            installed_models,
        }
    }

    /// Installs Ollama, then starts and verifies the service. The install
    /// error is returned; a failed start only degrades to `Ok(false)`.
    pub async fn install(&self, progress: &mut dyn FnMut(&str)) -> Result<bool> {
        progress(&format!("Installing Ollama on {}...", self.manager.platform()));
        let message = self.manager.install().await?;
        info!("{}", message);
        progress("Installation completed! Starting Ollama service...");
        Ok(self.start_and_verify(progress).await)
    }

    /// Starts the service if it is not already answering.
    pub async fn ensure_running(&self, progress: &mut dyn FnMut(&str)) -> bool {
        if self.manager.service_running().await {
            return true;
        }
        progress("Starting Ollama service...");
        self.start_and_verify(progress).await
    }

    async fn start_and_verify(&self, progress: &mut dyn FnMut(&str)) -> bool {
        if let Err(e) = self.manager.start_service().await {
            warn!("Failed to auto-start Ollama service: {}", e);
            progress("Please start Ollama manually with 'ollama serve'.");
            return false;
        }
        progress("Verifying Ollama service startup...");
        let running = self.manager.wait_until_running(self.verify_attempts, self.verify_delay).await;
        if running {
            progress("Ollama service started!");
        } else {
            progress("Service start command executed but service is not responding.");
        }
        running
    }

    /// Pulls each model in order. One failure does not stop the rest.
    pub async fn download_models(&self, models: &[String], progress: &mut dyn FnMut(&str)) -> Vec<ModelOutcome> {
        if !self.ensure_running(progress).await {
            progress("Ollama is not running; downloads may fail.");
        }
        let total = models.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, model) in models.iter().enumerate() {
            progress(&format!("Downloading {} ({}/{})...", model, i + 1, total));
            let result = self.manager.pull_model(model).await;
            match &result {
                Ok(_) => progress(&format!("Downloaded {}", model)),
                Err(e) => progress(&format!("Failed to download {}: {}", model, e)),
            }
            outcomes.push(ModelOutcome { model: model.clone(), result });
        }
        outcomes
    }
}
