pub mod manager;
pub mod platform;
pub mod wizard;

pub use manager::OllamaManager;
pub use platform::Platform;
pub use wizard::{ SetupStep, SetupWizard };

use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use tokio::process::Command;

/// Directories appended to PATH so Homebrew-installed binaries resolve even
/// when the client was launched without a login shell.
pub const EXTRA_PATH_DIRS: &str = "/opt/homebrew/bin:/usr/local/bin";

pub fn extended_path() -> String {
    let current = std::env::var("PATH").unwrap_or_default();
    if current.is_empty() { EXTRA_PATH_DIRS.to_string() } else { format!("{}:{}", current, EXTRA_PATH_DIRS) }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { success: true, stdout: stdout.into(), stderr: String::new() }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self { success: false, stdout: String::new(), stderr: stderr.into() }
    }
}

/// Seam between the manager and the operating system.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs to completion and captures output.
    async fn output(&self, program: &str, args: &[&str], path: Option<&str>) -> std::io::Result<CommandOutput>;

    /// Starts a background process with discarded stdio and does not wait.
    fn spawn_detached(&self, program: &str, args: &[&str], path: Option<&str>) -> std::io::Result<()>;
}

pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, program: &str, args: &[&str], path: Option<&str>) -> std::io::Result<CommandOutput> {
        debug!("exec: {} {}", program, args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());
        if let Some(path) = path {
            cmd.env("PATH", path);
        }
        let output = cmd.output().await?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn spawn_detached(&self, program: &str, args: &[&str], path: Option<&str>) -> std::io::Result<()> {
        debug!("spawn: {} {}", program, args.join(" "));
        let mut cmd = std::process::Command::new(program);
        cmd.args(args).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        if let Some(path) = path {
            cmd.env("PATH", path);
        }
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
        cmd.spawn()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{ HashMap, VecDeque };
    use std::sync::Mutex;

    /// Scripted runner: responses are keyed by the full command line.
    /// Unscripted commands fail with `NotFound`, like a missing binary.
    #[derive(Default)]
    pub struct FakeRunner {
        responses: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
        spawnable: Mutex<Vec<String>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, command: &str, output: CommandOutput) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(command.to_string())
                .or_default()
                .push_back(output);
            self
        }

        pub fn allow_spawn(self, command: &str) -> Self {
            self.spawnable.lock().unwrap().push(command.to_string());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn line(program: &str, args: &[&str]) -> String {
        std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ")
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn output(&self, program: &str, args: &[&str], _path: Option<&str>) -> std::io::Result<CommandOutput> {
            let key = line(program, args);
            self.calls.lock().unwrap().push(key.clone());
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(&key).and_then(|q| q.pop_front()) {
                Some(out) => Ok(out),
                None => Err(std::io::Error::new(std::io::ErrorKind::NotFound, format!("{}: not found", program))),
            }
        }

        fn spawn_detached(&self, program: &str, args: &[&str], _path: Option<&str>) -> std::io::Result<()> {
            let key = line(program, args);
            self.calls.lock().unwrap().push(format!("spawn {}", key));
            if self.spawnable.lock().unwrap().contains(&key) {
                Ok(())
            } else {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, format!("{}: not found", program)))
            }
        }
    }
}
