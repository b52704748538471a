use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;

use crate::error::Result;
use crate::models::chat::SearchSource;

const DUCKDUCKGO_API: &str = "https://api.duckduckgo.com/";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RESULTS: usize = 5;

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchSource>>;
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RelatedTopic {
    Topic {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

/// DuckDuckGo instant-answer API. Needs no key.
pub struct DuckDuckGoSearch {
    http: HttpClient,
    endpoint: String,
    max_results: usize,
}

impl DuckDuckGoSearch {
    pub fn new(max_results: usize) -> Self {
        Self::with_endpoint(DUCKDUCKGO_API, max_results)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, max_results: usize) -> Self {
        Self {
            http: HttpClient::new(),
            endpoint: endpoint.into(),
            max_results,
        }
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RESULTS)
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchSource>> {
        info!("Web search: {}", query);
        let answer = self.http
            .get(&self.endpoint)
            .query(
                &[
                    ("q", query),
                    ("format", "json"),
                    ("no_html", "1"),
                    ("skip_disambig", "1"),
                ]
            )
            .timeout(SEARCH_TIMEOUT)
            .send().await?
            .error_for_status()?
            .json::<InstantAnswer>().await?;
        let sources = collect_sources(answer, self.max_results);
        debug!("Web search returned {} source(s)", sources.len());
        Ok(sources)
    }
}

fn collect_sources(answer: InstantAnswer, max_results: usize) -> Vec<SearchSource> {
    let mut sources = Vec::new();
    if !answer.abstract_text.is_empty() && !answer.abstract_url.is_empty() {
        sources.push(SearchSource {
            title: answer.heading.clone(),
            url: answer.abstract_url,
            snippet: answer.abstract_text,
        });
    }
    flatten_topics(answer.related_topics, &mut sources);
    sources.truncate(max_results);
    sources
}

fn flatten_topics(topics: Vec<RelatedTopic>, out: &mut Vec<SearchSource>) {
    for topic in topics {
        match topic {
            RelatedTopic::Topic { text, first_url } => {
                if first_url.is_empty() {
                    continue;
                }
                // DDG topic text is "Title - description"
                let title = text.split(" - ").next().unwrap_or(&text).to_string();
                out.push(SearchSource { title, url: first_url, snippet: text });
            }
            RelatedTopic::Group { topics } => flatten_topics(topics, out),
        }
    }
}

/// Prefixes the question with numbered sources so the model can cite them.
pub fn build_augmented_prompt(question: &str, sources: &[SearchSource]) -> String {
    if sources.is_empty() {
        return question.to_string();
    }
    let mut prompt = String::from(
        "Use the following web search results to answer the question. Cite sources as [n] where relevant.\n\n"
    );
    for (i, source) in sources.iter().enumerate() {
        prompt.push_str(&format!("[{}] {} ({})\n{}\n\n", i + 1, source.title, source.url, source.snippet));
    }
    prompt.push_str(&format!("Question: {}", question));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InstantAnswer {
        serde_json
            ::from_value(
                serde_json::json!({
                "Heading": "Rust (programming language)",
                "AbstractText": "Rust is a general-purpose programming language.",
                "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
                "RelatedTopics": [
                    { "Text": "Cargo - Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo" },
                    { "Name": "See also", "Topics": [
                        { "Text": "Ferris - Rust mascot", "FirstURL": "https://duckduckgo.com/Ferris" }
                    ]},
                    { "Text": "No link", "FirstURL": "" }
                ]
            })
            )
            .unwrap()
    }

    #[test]
    fn abstract_and_nested_topics_become_sources() {
        let sources = collect_sources(sample(), 10);
        let urls: Vec<&str> = sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec![
            "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "https://duckduckgo.com/Cargo",
            "https://duckduckgo.com/Ferris"
        ]);
        assert_eq!(sources[1].title, "Cargo");
    }

    #[test]
    fn results_are_capped() {
        assert_eq!(collect_sources(sample(), 2).len(), 2);
    }

    #[test]
    fn prompt_without_sources_is_unchanged() {
        assert_eq!(build_augmented_prompt("why?", &[]), "why?");
    }

    #[test]
    fn prompt_numbers_sources() {
        let sources = collect_sources(sample(), 2);
        let prompt = build_augmented_prompt("What is Rust?", &sources);
        assert!(prompt.contains("[1] Rust (programming language)"));
        assert!(prompt.contains("[2] Cargo (https://duckduckgo.com/Cargo)"));
        assert!(prompt.ends_with("Question: What is Rust?"));
    }
}
