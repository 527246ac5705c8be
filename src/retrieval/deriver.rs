use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

const API_KEY_ENV: &str = "KBSEARCH_LLM_API_KEY";
const FALLBACK_API_KEY_ENV: &str = "OPENAI_API_KEY";

const CORE_QUERY_PROMPT: &str = "You are a search query extractor. \
Your task is to extract the MAIN topic, entity, or concept from the user's input. \
Remove conversational filler, stopwords, and generic descriptors like 'article', 'paper', 'news', 'info', 'introduction', 'about'.\n\n\
Constraint: Do NOT add new words. Do NOT expand. Do NOT change the meaning. \
Output ONLY the extracted core subject.\n\n\
Example 1:\nUser: 'Show me articles about supply chain management'\nOutput: supply chain management\n\n\
Example 2:\nUser: 'Any news on artificial intelligence?'\nOutput: artificial intelligence\n\n\
Example 3:\nUser: '我想找一下那个机器人的文章'\nOutput: 机器人\n\n\
User Input: {input}\n\nOutput:";

const EXPANSION_PROMPT: &str = "You are a precise search query optimizer. \
Generate 3-4 strictly synonymous or highly specific keywords for the user's query \
to improve vector retrieval accuracy.\n\n\
Constraint: Do NOT generate broad topics, parent categories, or loosely related concepts. \
For example, if the query is 'Robot', do NOT output 'AI' or 'Technology'. Output 'Robotics', 'Automaton', 'Bot'.\n\n\
User Query: {query}\n\n\
Output ONLY a comma-separated list of keywords.";

#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("deriver configuration error: {0}")]
    Config(String),

    #[error("llm request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("llm returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("llm response contained no text")]
    EmptyResponse,
}

/// Query rewriting collaborator. Both operations may fail; callers degrade
/// instead of propagating.
pub trait QueryDeriver: Sync {
    fn derive(&self, text: &str) -> Result<String, DeriveError>;

    fn expand(&self, text: &str) -> Result<Vec<String>, DeriveError>;
}

/// Outcome of a fail-soft derivation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Derived<T> {
    Fresh(T),
    Degraded(T),
}

impl<T> Derived<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Fresh(value) | Self::Degraded(value) => value,
        }
    }
}

/// Core topic of `user_query`, or the raw query when derivation fails or
/// comes back empty.
pub fn derive_core_query<D: QueryDeriver + ?Sized>(deriver: &D, user_query: &str) -> Derived<String> {
    match deriver.derive(user_query) {
        Ok(core) => {
            let core = core.trim();
            if core.is_empty() {
                warn!(input = %user_query, "core query extraction returned nothing; using raw input");
                Derived::Degraded(user_query.to_string())
            } else {
                debug!(input = %user_query, core = %core, "core query extracted");
                Derived::Fresh(core.to_string())
            }
        }
        Err(err) => {
            warn!(input = %user_query, error = %err, "core query extraction failed; using raw input");
            Derived::Degraded(user_query.to_string())
        }
    }
}

/// At most `max_expansions` non-empty variants of `core_query`; empty on failure.
pub fn derive_expansions<D: QueryDeriver + ?Sized>(
    deriver: &D,
    core_query: &str,
    max_expansions: usize,
) -> Derived<Vec<String>> {
    match deriver.expand(core_query) {
        Ok(raw) => {
            let mut expansions = raw
                .into_iter()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect::<Vec<String>>();
            expansions.truncate(max_expansions);
            debug!(core = %core_query, expansions = ?expansions, "query expanded");
            Derived::Fresh(expansions)
        }
        Err(err) => {
            warn!(core = %core_query, error = %err, "query expansion failed; searching core query only");
            Derived::Degraded(Vec::new())
        }
    }
}

/// Splits a comma-separated keyword list; accepts full-width commas and
/// strips quoting.
pub fn parse_keyword_list(response: &str) -> Vec<String> {
    response
        .split(|ch: char| matches!(ch, ',' | '，' | '、' | '\n'))
        .map(|value| value.trim().trim_matches(|ch: char| ch == '"' || ch == '\'').trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Deriver used when no language model is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDeriver;

impl QueryDeriver for PassthroughDeriver {
    fn derive(&self, text: &str) -> Result<String, DeriveError> {
        Ok(text.trim().to_string())
    }

    fn expand(&self, _text: &str) -> Result<Vec<String>, DeriveError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone)]
pub struct HttpDeriverConfig {
    /// OpenAI-compatible chat completions URL.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl HttpDeriverConfig {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            model: model.into(),
            temperature: 0.3,
            timeout_secs,
        }
    }
}

/// Chat-completions backed deriver; every call is bounded by the client timeout.
#[derive(Debug)]
pub struct HttpDeriver {
    client: Client,
    config: HttpDeriverConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpDeriver {
    pub fn new(config: HttpDeriverConfig) -> Result<Self, DeriveError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .or_else(|| std::env::var(FALLBACK_API_KEY_ENV).ok());
        match &api_key {
            Some(key) => {
                let value = HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|err| DeriveError::Config(format!("invalid api key: {err}")))?;
                headers.insert(AUTHORIZATION, value);
            }
            None => warn!(endpoint = %config.endpoint, "no llm api key configured"),
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|err| DeriveError::Config(format!("failed to build http client: {err}")))?;

        info!(
            endpoint = %config.endpoint,
            model = %config.model,
            timeout_secs = config.timeout_secs,
            "llm query deriver initialized"
        );

        Ok(Self { client, config })
    }

    fn complete(&self, prompt: &str) -> Result<String, DeriveError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
        };

        let response = self.client.post(&self.config.endpoint).json(&request).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(DeriveError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json()?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(DeriveError::EmptyResponse)
    }
}

impl QueryDeriver for HttpDeriver {
    fn derive(&self, text: &str) -> Result<String, DeriveError> {
        self.complete(&CORE_QUERY_PROMPT.replace("{input}", text))
    }

    fn expand(&self, text: &str) -> Result<Vec<String>, DeriveError> {
        let response = self.complete(&EXPANSION_PROMPT.replace("{query}", text))?;
        Ok(parse_keyword_list(&response))
    }
}
