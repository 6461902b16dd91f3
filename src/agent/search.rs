//! Search sub-flow: query rewriting, result ranking, page fetching and
//! summarization, with optional ingestion into a vector store.
//!
//! Everything here is best-effort with respect to the outer task: a fetch or
//! ingestion failure degrades the search context but never fails the step.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pagepilot_doc_store::{chunk_text, Document, DocumentStore, Embedder, DEFAULT_CHUNK_CHARS, DEFAULT_CHUNK_OVERLAP};
use pagepilot_llm::{invoke_structured, ChatMessage, ChatModel, LlmError};

use crate::agent::prompts;

const TOP_RESULTS: usize = 4;
const MAX_FETCHED_CHARS: usize = 8_000;

/// One web search hit.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    /// Snippet returned by the search backend.
    pub content: String,
    pub publisher: String,
    pub score: f32,
    /// Full page text, populated after fetching.
    pub raw_content: Option<String>,
}

/// The outcome of one search pass.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    /// Direct answer synthesized from the fetched pages, when available.
    pub answer: Option<String>,
    pub results: Vec<SearchResult>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearcherOutput {
    pub query: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct RankEntry {
    /// Zero-based index into the candidate result list.
    pub index: usize,
    /// Relevance from 0 to 10.
    pub score: f32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RankerOutput {
    #[serde(default)]
    pub entries: Vec<RankEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct SummaryEntry {
    pub url: String,
    pub summary: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SummarizerOutput {
    #[serde(default)]
    pub entries: Vec<SummaryEntry>,
    #[serde(default)]
    pub answer: Option<String>,
}

/// Produces candidate results for a query, typically a search API.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, String>;
}

/// Scripted backend for tests: returns the same candidates for any query.
#[derive(Default)]
pub struct ScriptedSearchBackend {
    results: Vec<SearchResult>,
}

impl ScriptedSearchBackend {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self { results }
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearchBackend {
    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, String> {
        Ok(self.results.clone())
    }
}

/// Fetches page text for ranking and summarization.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Plain-text content of `url`. The error is a display string because
    /// fetch failures are absorbed, never propagated.
    async fn fetch_text(&self, url: &str) -> Result<String, String>;
}

/// HTTP fetcher used in real runs.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body = response.text().await.map_err(|e| e.to_string())?;
        let mut text = strip_tags(&body);
        if text.chars().count() > MAX_FETCHED_CHARS {
            text = text.chars().take(MAX_FETCHED_CHARS).collect();
        }
        Ok(text)
    }
}

/// Scripted fetcher for tests: url -> content, anything else errors.
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: std::collections::HashMap<String, String>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.pages.insert(url.into(), text.into());
        self
    }
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| format!("no scripted page for {url}"))
    }
}

/// Coordinates the searcher, ranker and summarizer models around a fetcher.
pub struct SearchRunner {
    searcher: Arc<dyn ChatModel>,
    ranker: Arc<dyn ChatModel>,
    summarizer: Arc<dyn ChatModel>,
    fetcher: Arc<dyn ContentFetcher>,
    ingestion: Option<(Arc<dyn DocumentStore>, Arc<dyn Embedder>)>,
}

impl SearchRunner {
    pub fn new(
        searcher: Arc<dyn ChatModel>,
        ranker: Arc<dyn ChatModel>,
        summarizer: Arc<dyn ChatModel>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        Self {
            searcher,
            ranker,
            summarizer,
            fetcher,
            ingestion: None,
        }
    }

    /// Chunk and embed fetched pages into `store` as a side effect of search.
    pub fn with_ingestion(
        mut self,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        self.ingestion = Some((store, embedder));
        self
    }

    /// Rewrite an intent into a search query.
    pub async fn rewrite_query(&self, intent: &str) -> Result<String, LlmError> {
        let messages = [
            ChatMessage::system(prompts::SEARCHER_SYSTEM_PROMPT),
            ChatMessage::human(prompts::searcher_request(intent)),
        ];
        let output: SearcherOutput =
            invoke_structured(self.searcher.as_ref(), &messages, "search_query").await?;
        Ok(output.query)
    }

    /// Rank candidates, fetch the top hits and fill in `raw_content`.
    ///
    /// Fetches run concurrently and are isolated per result: a failed fetch
    /// leaves that result's `raw_content` empty.
    pub async fn rank_and_fetch(
        &self,
        objective: &str,
        query: &str,
        candidates: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>, LlmError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let block = candidates
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{i}. {} ({})\n   {}", r.title, r.url, r.content))
            .collect::<Vec<_>>()
            .join("\n");
        let messages = [
            ChatMessage::system(prompts::RANKER_SYSTEM_PROMPT),
            ChatMessage::human(prompts::ranker_request(objective, query, &block)),
        ];
        let ranking: RankerOutput =
            invoke_structured(self.ranker.as_ref(), &messages, "ranking").await?;

        let mut entries: Vec<RankEntry> = ranking
            .entries
            .into_iter()
            .filter(|e| e.index < candidates.len())
            .collect();
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        entries.truncate(TOP_RESULTS);

        let mut selected: Vec<SearchResult> = entries
            .iter()
            .map(|e| {
                let mut result = candidates[e.index].clone();
                result.score = e.score;
                result
            })
            .collect();

        let fetches = selected
            .iter()
            .map(|r| self.fetcher.fetch_text(&r.url))
            .collect::<Vec<_>>();
        let bodies = join_all(fetches).await;
        for (result, body) in selected.iter_mut().zip(bodies) {
            match body {
                Ok(text) => result.raw_content = Some(text),
                Err(err) => {
                    warn!(url = %result.url, error = %err, "page fetch failed");
                }
            }
        }

        self.ingest(&selected).await;
        Ok(selected)
    }

    /// Summarize fetched pages against the objective.
    pub async fn summarize(
        &self,
        objective: &str,
        results: &[SearchResult],
    ) -> Result<SummarizerOutput, LlmError> {
        let pages: Vec<&SearchResult> =
            results.iter().filter(|r| r.raw_content.is_some()).collect();
        if pages.is_empty() {
            return Ok(SummarizerOutput::default());
        }
        let block = pages
            .iter()
            .map(|r| {
                format!(
                    "URL: {}\nTitle: {}\n{}",
                    r.url,
                    r.title,
                    r.raw_content.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n");
        let messages = [
            ChatMessage::system(prompts::SUMMARIZER_SYSTEM_PROMPT),
            ChatMessage::human(prompts::summarizer_request(objective, &block)),
        ];
        invoke_structured(self.summarizer.as_ref(), &messages, "summaries").await
    }

    /// Full pass: rewrite the intent into a query, search, rank, fetch and
    /// summarize.
    pub async fn run(
        &self,
        backend: &dyn SearchBackend,
        objective: &str,
        intent: &str,
    ) -> Result<SearchResponse, LlmError> {
        let query = self.rewrite_query(intent).await?;
        let candidates = backend
            .search(&query)
            .await
            .map_err(LlmError::Provider)?;
        if candidates.is_empty() {
            return Ok(SearchResponse {
                query,
                ..SearchResponse::default()
            });
        }
        let mut results = self.rank_and_fetch(objective, &query, candidates).await?;
        let summary = self.summarize(objective, &results).await?;

        for entry in &summary.entries {
            if let Some(result) = results.iter_mut().find(|r| r.url == entry.url) {
                result.content = entry.summary.clone();
            }
        }

        Ok(SearchResponse {
            query,
            answer: summary.answer,
            results,
        })
    }

    /// Retrieve previously ingested chunks relevant to `query`.
    pub async fn retrieve_context(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<(Document, f32)>, LlmError> {
        let Some((store, embedder)) = &self.ingestion else {
            return Ok(Vec::new());
        };
        let vectors = embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| LlmError::Provider(e.to_string()))?;
        let Some(vector) = vectors.into_iter().next() else {
            return Ok(Vec::new());
        };
        store
            .similarity_search_with_score(&vector, k)
            .await
            .map_err(|e| LlmError::Provider(e.to_string()))
    }

    async fn ingest(&self, results: &[SearchResult]) {
        let Some((store, embedder)) = &self.ingestion else {
            return;
        };
        for result in results {
            let Some(text) = &result.raw_content else {
                continue;
            };
            let chunks = chunk_text(text, DEFAULT_CHUNK_CHARS, DEFAULT_CHUNK_OVERLAP);
            if chunks.is_empty() {
                continue;
            }
            let vectors = match embedder.embed(&chunks).await {
                Ok(v) => v,
                Err(err) => {
                    warn!(url = %result.url, error = %err, "embedding failed");
                    continue;
                }
            };
            let docs = chunks
                .into_iter()
                .map(|chunk| {
                    Document::new(
                        chunk,
                        serde_json::json!({"url": result.url, "title": result.title}),
                    )
                })
                .collect();
            if let Err(err) = store.add_vectors(vectors, docs).await {
                warn!(url = %result.url, error = %err, "ingestion failed");
            } else {
                debug!(url = %result.url, "ingested page into vector store");
            }
        }
    }
}

/// Crude HTML to text conversion good enough for relevance judgment.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut in_tag = false;
    let mut in_script = false;
    let lower = html.to_ascii_lowercase();
    let lower = lower.as_bytes();
    for (i, c) in html.char_indices() {
        if !in_tag && lower[i..].starts_with(b"<script") {
            in_script = true;
        }
        if in_script && lower[i..].starts_with(b"</script") {
            in_script = false;
        }
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            c if !in_tag && !in_script => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
