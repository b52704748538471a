use serde::{ Deserialize, Serialize };
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
    Unknown,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Unknown => "unknown",
        }
    }

    /// Where an installed Ollama usually lives.
    pub fn installation_paths(&self) -> Vec<PathBuf> {
        match self {
            Platform::MacOs =>
                vec![
                    "/opt/homebrew/bin/ollama".into(),
                    "/usr/local/bin/ollama".into(),
                    "/Applications/Ollama.app".into()
                ],
            Platform::Windows => {
                let mut paths: Vec<PathBuf> = vec![
                    r"C:\Program Files\Ollama\ollama.exe".into(),
                    r"C:\Program Files (x86)\Ollama\ollama.exe".into()
                ];
                if let Ok(profile) = std::env::var("USERPROFILE") {
                    paths.push(
                        PathBuf::from(profile).join(r"AppData\Local\Programs\Ollama\ollama.exe")
                    );
                }
                paths
            }
            Platform::Linux =>
                vec![
                    "/usr/local/bin/ollama".into(),
                    "/usr/bin/ollama".into(),
                    "/home/linuxbrew/.linuxbrew/bin/ollama".into()
                ],
            Platform::Unknown => Vec::new(),
        }
    }

    /// Directories the server keeps pulled models in.
    pub fn model_directories(&self) -> Vec<PathBuf> {
        let home = dirs::home_dir();
        match self {
            Platform::MacOs | Platform::Linux => {
                let mut paths = Vec::new();
                if let Some(home) = home {
                    paths.push(home.join(".ollama/models"));
                }
                paths.push("/usr/local/share/ollama/models".into());
                paths.push("/opt/homebrew/share/ollama/models".into());
                if *self == Platform::Linux {
                    paths.push("/usr/share/ollama/.ollama/models".into());
                }
                paths
            }
            Platform::Windows => {
                let mut paths = Vec::new();
                if let Some(home) = home {
                    paths.push(home.join(r"AppData\Local\Ollama\models"));
                }
                paths.push(r"C:\Program Files\Ollama\models".into());
                paths.push(r"C:\Program Files (x86)\Ollama\models".into());
                paths
            }
            Platform::Unknown => Vec::new(),
        }
    }

    /// Where `brew` is looked for when it is not on PATH.
    pub fn homebrew_paths(&self) -> &'static [&'static str] {
        match self {
            Platform::MacOs | Platform::Linux =>
                &["/opt/homebrew/bin/brew", "/usr/local/bin/brew", "/home/linuxbrew/.linuxbrew/bin/brew"],
            _ => &[],
        }
    }

    /// Installer download for platforms without a package-manager install.
    pub fn download_url(&self) -> Option<&'static str> {
        match self {
            Platform::MacOs => Some("https://ollama.com/download/Ollama-darwin.zip"),
            Platform::Windows => Some("https://ollama.com/download/OllamaSetup.exe"),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
