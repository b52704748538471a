use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::sync::{ Mutex, MutexGuard };
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Running,
    Success,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandLog {
    pub id: String,
    pub command: String,
    pub timestamp: DateTime<Utc>,
    pub status: CommandStatus,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            CommandStatus::Running => "running",
            CommandStatus::Success => "success",
            CommandStatus::Error => "error",
        })
    }
}

/// One line per entry, then its output or error indented beneath it.
impl fmt::Display for CommandLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:<7} $ {}", self.timestamp.format("%H:%M:%S"), self.status, self.command)?;
        let detail = match self.status {
            CommandStatus::Error => self.error.as_deref(),
            _ => self.output.as_deref(),
        };
        for line in detail.unwrap_or_default().lines().filter(|l| !l.trim().is_empty()) {
            write!(f, "\n    {}", line)?;
        }
        Ok(())
    }
}

/// Record of every process/HTTP command the manager issued, in order.
#[derive(Debug, Default)]
pub struct CommandLogBook {
    entries: Mutex<Vec<CommandLog>>,
}

impl CommandLogBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CommandLog>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a `running` entry and returns its id.
    pub fn start(&self, command: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.lock().push(CommandLog {
            id: id.clone(),
            command: command.into(),
            timestamp: Utc::now(),
            status: CommandStatus::Running,
            output: None,
            error: None,
        });
        id
    }

    pub fn succeed(&self, id: &str, output: Option<String>) {
        if let Some(entry) = self.lock().iter_mut().find(|e| e.id == id) {
            entry.status = CommandStatus::Success;
            entry.output = output;
        }
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) {
        if let Some(entry) = self.lock().iter_mut().find(|e| e.id == id) {
            entry.status = CommandStatus::Error;
            entry.error = Some(error.into());
        }
    }

    pub fn entries(&self) -> Vec<CommandLog> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
