use futures::StreamExt;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use semver::Version;
use serde::{ Deserialize, Serialize };
use std::path::{ Path, PathBuf };
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::{ Error, Result };
use crate::setup::Platform;

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_RELEASE_REPO: &str = "falkon2/BeautifyOllama";
const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("ollama-desk/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub available: bool,
    pub current_version: String,
    pub latest_version: String,
    pub download_url: Option<String>,
    pub release_notes: Option<String>,
    pub release_url: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Deserialize, Debug)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
}

/// Checks a GitHub repository's latest release against the running version.
pub struct ReleaseChecker {
    http: HttpClient,
    api_base: String,
    repo: String,
    current_version: String,
    platform: Platform,
}

impl ReleaseChecker {
    pub fn new(repo: impl Into<String>) -> Result<Self> {
        Self::with_api_base(GITHUB_API, repo, CURRENT_VERSION, Platform::current())
    }

    pub fn with_api_base(
        api_base: impl Into<String>,
        repo: impl Into<String>,
        current_version: impl Into<String>,
        platform: Platform
    ) -> Result<Self> {
        let http = HttpClient::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            repo: repo.into(),
            current_version: current_version.into(),
            platform,
        })
    }

    pub async fn check(&self) -> Result<UpdateInfo> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base, self.repo);
        debug!("GET {}", url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Update(format!("GitHub returned {} for {}", resp.status(), self.repo)));
        }
        let release = resp.json::<GitHubRelease>().await?;
        let info = self.compare(release)?;
        info!("Current version {}, latest {} (update available: {})", info.current_version, info.latest_version, info.available);
        Ok(info)
    }

    fn compare(&self, release: GitHubRelease) -> Result<UpdateInfo> {
        let latest = parse_version(&release.tag_name)?;
        let current = parse_version(&self.current_version)?;
        Ok(UpdateInfo {
            available: latest > current,
            current_version: current.to_string(),
            latest_version: latest.to_string(),
            download_url: pick_asset(&release.assets, self.platform).map(|a| a.browser_download_url.clone()),
            release_notes: release.body.filter(|b| !b.trim().is_empty()),
            release_url: release.html_url,
        })
    }

    /// Streams the asset at `download_url` into `dest_dir` and returns the
    /// written path.
    pub async fn download(&self, download_url: &str, dest_dir: &Path) -> Result<PathBuf> {
        let file_name = asset_file_name(download_url)?;
        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(file_name);

        let resp = self.http.get(download_url).send().await?.error_for_status()?;
        let mut file = tokio::fs::File::create(&path).await?;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        info!("Update downloaded to {}", path.display());
        Ok(path)
    }
}

/// Where downloads go: the user's downloads folder, else the current directory.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn parse_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix('v').or_else(|| trimmed.strip_prefix('V')).unwrap_or(trimmed);
    Version::parse(bare).map_err(|e| Error::Update(format!("Invalid version '{}': {}", raw, e)))
}

fn asset_extensions(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::MacOs => &[".dmg", ".app.tar.gz"],
        Platform::Windows => &[".msi", ".exe"],
        Platform::Linux => &[".appimage", ".deb", ".tar.gz"],
        Platform::Unknown => &[],
    }
}

fn pick_asset(assets: &[GitHubAsset], platform: Platform) -> Option<&GitHubAsset> {
    asset_extensions(platform)
        .iter()
        .find_map(|ext| assets.iter().find(|a| a.name.to_lowercase().ends_with(ext)))
}

fn asset_file_name(download_url: &str) -> Result<String> {
    let url = Url::parse(download_url).map_err(|e| Error::Update(format!("Invalid download URL: {}", e)))?;
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Update(format!("No file name in {}", download_url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(tag: &str, assets: &[&str]) -> GitHubRelease {
        GitHubRelease {
            tag_name: tag.to_string(),
            body: Some("Bug fixes".to_string()),
            html_url: Some("https://github.com/ollama-desk/ollama-desk/releases/tag/v0.5.0".to_string()),
            assets: assets
                .iter()
                .map(|name| GitHubAsset {
                    name: name.to_string(),
                    browser_download_url: format!("https://example.com/dl/{}", name),
                })
                .collect(),
        }
    }

    fn checker(current: &str, platform: Platform) -> ReleaseChecker {
        ReleaseChecker::with_api_base("http://127.0.0.1:9", "o/r", current, platform).unwrap()
    }

    #[test]
    fn newer_tag_is_an_update() {
        let info = checker("0.4.1", Platform::MacOs)
            .compare(release("v0.5.0", &["ollama-desk_0.5.0_aarch64.dmg", "ollama-desk_0.5.0_x64-setup.exe"]))
            .unwrap();
        assert!(info.available);
        assert_eq!(info.latest_version, "0.5.0");
        assert_eq!(info.download_url.as_deref(), Some("https://example.com/dl/ollama-desk_0.5.0_aarch64.dmg"));
        assert_eq!(info.release_notes.as_deref(), Some("Bug fixes"));
    }

    #[test]
    fn same_or_older_tag_is_not_an_update() {
        assert!(!checker("0.5.0", Platform::Linux).compare(release("v0.5.0", &[])).unwrap().available);
        assert!(!checker("v1.0.0", Platform::Linux).compare(release("0.9.9", &[])).unwrap().available);
        assert!(checker("0.5.0-beta.1", Platform::Linux).compare(release("0.5.0", &[])).unwrap().available);
    }

    #[test]
    fn malformed_tag_is_an_error() {
        assert!(matches!(checker("0.4.1", Platform::Linux).compare(release("latest", &[])), Err(Error::Update(_))));
    }

    #[test]
    fn assets_are_matched_by_platform_preference() {
        let assets = release("v1.0.0", &["app.deb", "app.AppImage", "app.msi"]).assets;
        assert_eq!(pick_asset(&assets, Platform::Linux).unwrap().name, "app.AppImage");
        assert_eq!(pick_asset(&assets, Platform::Windows).unwrap().name, "app.msi");
        assert!(pick_asset(&assets, Platform::MacOs).is_none());
        assert!(pick_asset(&assets, Platform::Unknown).is_none());
    }

    #[test]
    fn download_name_comes_from_the_url_path() {
        assert_eq!(asset_file_name("https://example.com/dl/app_1.0.dmg?x=1").unwrap(), "app_1.0.dmg");
        assert!(asset_file_name("https://example.com/").is_err());
    }
}
