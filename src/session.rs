use log::{ error, info, warn };
use std::sync::Arc;

use crate::error::{ Error, Result };
use crate::history::ConversationStore;
use crate::models::chat::{ ChatMessage, SearchSource };
use crate::ollama::{ GenerateRequest, OllamaClient };
use crate::search::{ build_augmented_prompt, DuckDuckGoSearch, WebSearch };

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub verbose: bool,
    pub web_search: bool,
    /// Selected on refresh when the server has it and nothing else is selected.
    pub preferred_model: Option<String>,
}

/// One chat window: server state, the model list, the selected model and the
/// conversation history.
pub struct ChatSession {
    client: OllamaClient,
    store: ConversationStore,
    search: Arc<dyn WebSearch>,
    options: SessionOptions,
    models: Vec<String>,
    selected_model: Option<String>,
    running: bool,
}

impl ChatSession {
    pub fn new(client: OllamaClient, store: ConversationStore, options: SessionOptions) -> Self {
        Self {
            client,
            store,
            search: Arc::new(DuckDuckGoSearch::default()),
            options,
            models: Vec::new(),
            selected_model: None,
            running: false,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = search;
        self
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.options.verbose = verbose;
    }

    pub fn set_web_search(&mut self, enabled: bool) {
        self.options.web_search = enabled;
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Re-checks the server and reloads the model list.
    pub async fn refresh(&mut self) {
        self.running = self.client.is_running().await;
        if !self.running {
            info!("Ollama is not reachable at {}", self.client.base_url());
            self.models.clear();
            self.selected_model = None;
            return;
        }
        self.models = self.client.list_models_with_retry().await;
        self.selected_model = pick_model(&self.models, self.selected_model.take(), self.options.preferred_model.as_deref());
        info!("{} model(s) available, selected: {:?}", self.models.len(), self.selected_model);
    }

    pub fn select_model(&mut self, model: &str) -> Result<()> {
        if !self.models.iter().any(|m| m == model) {
            return Err(Error::UnknownModel(model.to_string()));
        }
        self.selected_model = Some(model.to_string());
        Ok(())
    }

    /// Sends `input` to the selected model and streams the reply into a new
    /// assistant message, passing each fragment to `sink` as well.
    ///
    /// Validation failures are returned as errors and leave history untouched.
    /// Generation failures are recorded as the assistant's content.
    pub async fn submit<F>(&mut self, input: &str, images: Vec<String>, mut sink: F) -> Result<ChatMessage>
        where F: FnMut(&str)
    {
        let prompt = input.trim();
        if prompt.is_empty() {
            return Err(Error::EmptyPrompt);
        }
        let model = self.selected_model.clone().ok_or(Error::NoModelSelected)?;
        if !self.running {
            return Err(Error::ServerNotRunning);
        }

        let conversation_id = match self.store.current_id() {
            Some(id) => id.to_string(),
            None => self.store.create().await?,
        };
        self.store.append_message(&conversation_id, ChatMessage::user(prompt)).await?;
        let reply = ChatMessage::assistant_placeholder();
        let reply_id = reply.id.clone();
        self.store.append_message(&conversation_id, reply).await?;

        let sources = if self.options.web_search { self.fetch_sources(prompt).await } else { Vec::new() };
        let request = GenerateRequest::new(model, build_augmented_prompt(prompt, &sources)).with_images(images);

        let client = &self.client;
        let store = &mut self.store;
        let result = client.generate_stream(request, |fragment| {
            if let Err(e) = store.append_fragment(&conversation_id, &reply_id, fragment) {
                warn!("Dropping fragment: {}", e);
            }
            sink(fragment);
        }).await;

        let verbose = self.options.verbose;
        self.store.update_message(&conversation_id, &reply_id, |message| {
            match result {
                Ok(out) => {
                    if verbose {
                        message.verbose_stats = out.stats.as_ref().filter(|s| !s.is_empty()).map(|s| s.summary());
                    }
                    if out.text.is_empty() {
                        message.content = match out.error.clone() {
                            Some(err) => format!("Error: {}", err),
                            None => out.into_display_text(),
                        };
                    } else if let Some(err) = &out.error {
                        warn!("Generation stopped after partial output: {}", err);
                        message.content.push_str(&format!("\n\nError: {}", err));
                    }
                }
                Err(e) => {
                    error!("Generation failed: {}", e);
                    message.content = format!("Error: {}", e);
                }
            }
            if !sources.is_empty() {
                message.sources = Some(sources);
            }
        }).await?;

        self.store
            .get(&conversation_id)
            .and_then(|c| c.message(&reply_id))
            .cloned()
            .ok_or_else(|| Error::ConversationNotFound(conversation_id.clone()))
    }

    async fn fetch_sources(&self, query: &str) -> Vec<SearchSource> {
        match self.search.search(query).await {
            Ok(sources) => {
                info!("Web search returned {} source(s)", sources.len());
                sources
            }
            Err(e) => {
                warn!("Web search failed, answering without sources: {}", e);
                Vec::new()
            }
        }
    }
}

/// Keeps the current choice if the server still has it, then tries the
/// preferred model, then falls back to the first listed.
fn pick_model(models: &[String], current: Option<String>, preferred: Option<&str>) -> Option<String> {
    let has = |name: &str| models.iter().any(|m| m == name);
    current
        .filter(|m| has(m))
        .or_else(|| preferred.filter(|m| has(m)).map(str::to_string))
        .or_else(|| models.first().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryStore;

    async fn offline_session() -> ChatSession {
        let store = ConversationStore::load(Arc::new(MemoryStore::new())).await.unwrap();
        ChatSession::new(OllamaClient::new(Some("http://127.0.0.1:9".into())), store, SessionOptions::default())
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn selection_survives_refresh_when_still_listed() {
        let models = names(&["llama3.2:latest", "mistral:7b"]);
        assert_eq!(pick_model(&models, Some("mistral:7b".into()), None).as_deref(), Some("mistral:7b"));
        assert_eq!(pick_model(&models, Some("gone".into()), None).as_deref(), Some("llama3.2:latest"));
        assert_eq!(pick_model(&models, None, Some("mistral:7b")).as_deref(), Some("mistral:7b"));
        assert_eq!(pick_model(&[], Some("gone".into()), Some("x")), None);
    }

    #[tokio::test]
    async fn unknown_model_is_rejected() {
        let mut session = offline_session().await;
        session.models = names(&["llama3.2:latest"]);
        assert!(matches!(session.select_model("phi3"), Err(Error::UnknownModel(_))));
        session.select_model("llama3.2:latest").unwrap();
        assert_eq!(session.selected_model(), Some("llama3.2:latest"));
    }

    #[tokio::test]
    async fn invalid_submissions_leave_history_alone() {
        let mut session = offline_session().await;
        assert!(matches!(session.submit("   ", vec![], |_| {}).await, Err(Error::EmptyPrompt)));
        assert!(matches!(session.submit("hi", vec![], |_| {}).await, Err(Error::NoModelSelected)));

        session.models = names(&["llama3.2:latest"]);
        session.select_model("llama3.2:latest").unwrap();
        assert!(matches!(session.submit("hi", vec![], |_| {}).await, Err(Error::ServerNotRunning)));
        assert!(session.store().is_empty());
    }

    #[tokio::test]
    async fn refresh_against_a_dead_server_clears_models() {
        let mut session = offline_session().await;
        session.models = names(&["llama3.2:latest"]);
        session.selected_model = Some("llama3.2:latest".into());
        session.refresh().await;
        assert!(!session.is_running());
        assert!(session.models().is_empty());
        assert_eq!(session.selected_model(), None);
    }
}
