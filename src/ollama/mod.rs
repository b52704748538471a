pub mod stats;
pub mod stream;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{ debug, info, warn };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::path::Path;
use std::time::Duration;

use crate::error::{ Error, Result };
use self::stream::{ ingest, GenerateChunk, Ingested };

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_PORT: u16 = 11434;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const MODEL_LIST_ATTEMPTS: usize = 3;
const MODEL_LIST_RETRY_DELAY: Duration = Duration::from_millis(500);
const WARMUP_PROMPT: &str = "hello";

#[derive(Serialize, Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<u64>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: true,
            images: None,
            keep_alive: None,
        }
    }

    /// Attaches base64-encoded images; an empty list leaves the field out.
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = if images.is_empty() { None } else { Some(images) };
        self
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            http: HttpClient::new(),
            base_url: url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let resp = self.http.get(self.endpoint("/api/tags")).send().await?.error_for_status()?;
        let tags = resp.json::<TagsResponse>().await?;
        Ok(
            tags.models
                .into_iter()
                .map(|m| m.name)
                .collect()
        )
    }

    /// Lists models with a short bounded retry. Every failure collapses to an
    /// empty list.
    pub async fn list_models_with_retry(&self) -> Vec<String> {
        for attempt in 1..=MODEL_LIST_ATTEMPTS {
            match self.list_models().await {
                Ok(models) => {
                    return models;
                }
                Err(e) => {
                    warn!("Listing models failed (attempt {}/{}): {}", attempt, MODEL_LIST_ATTEMPTS, e);
                    if attempt < MODEL_LIST_ATTEMPTS {
                        tokio::time::sleep(MODEL_LIST_RETRY_DELAY).await;
                    }
                }
            }
        }
        Vec::new()
    }

    /// Whether the server answers `/api/tags` within the probe timeout.
    pub async fn is_running(&self) -> bool {
        self.probe().await.unwrap_or(false)
    }

    /// `Ok(true)` when the server answered, `Ok(false)` on a non-success
    /// status, `Err` when the request itself failed.
    pub async fn probe(&self) -> Result<bool> {
        let resp = self.http.get(self.endpoint("/api/tags")).timeout(PROBE_TIMEOUT).send().await?;
        Ok(resp.status().is_success())
    }

    /// Single-object generation (`stream: false`).
    pub async fn generate(&self, mut request: GenerateRequest) -> Result<GenerateChunk> {
        request.stream = false;
        let resp = self.http
            .post(self.endpoint("/api/generate"))
            .json(&request)
            .send().await?;
        let status = resp.status();
        let chunk = resp.json::<GenerateChunk>().await?;
        if let Some(err) = chunk.error.clone() {
            return Err(Error::Api(err));
        }
        if !status.is_success() {
            return Err(Error::Api(format!("HTTP error: {}", status)));
        }
        Ok(chunk)
    }

    /// Streaming generation. Each `response` fragment is passed to `sink` as
    /// it arrives; the returned value holds the full concatenation.
    pub async fn generate_stream<F>(&self, mut request: GenerateRequest, sink: F) -> Result<Ingested>
        where F: FnMut(&str)
    {
        request.stream = true;
        debug!("POST /api/generate model={} images={}", request.model, request.images.as_ref().map_or(0, Vec::len));
        let resp = self.http
            .post(self.endpoint("/api/generate"))
            .json(&request)
            .send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json
                ::from_str::<GenerateChunk>(&body)
                .ok()
                .and_then(|c| c.error)
                .unwrap_or_else(|| format!("HTTP error: {}", status));
            return Err(Error::Api(message));
        }
        let out = ingest(resp.bytes_stream(), sink).await?;
        Ok(out)
    }

    /// Forces the model into memory with a throwaway prompt.
    pub async fn load_model(&self, model: &str) -> Result<()> {
        info!("Loading model '{}'", model);
        self.generate(GenerateRequest::new(model, WARMUP_PROMPT)).await?;
        Ok(())
    }

    /// Evicts the model from memory (`keep_alive: 0`).
    pub async fn unload_model(&self, model: &str) -> Result<()> {
        info!("Unloading model '{}'", model);
        let mut req = GenerateRequest::new(model, "");
        req.keep_alive = Some(0);
        self.generate(req).await?;
        Ok(())
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Reads an image file and encodes it for the `images` field.
pub async fn encode_image(path: impl AsRef<Path>) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(BASE64.encode(bytes))
}
