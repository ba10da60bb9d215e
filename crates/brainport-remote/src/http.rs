//! Blocking HTTP implementation of [`GraphClient`].

use crate::{GraphClient, NewLink, NewThought, NoteBody, RemoteError};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How resource paths are laid out under the base URL.
///
/// `Nested` is `/brains/{brain}/thoughts`, `/brains/{brain}/links`,
/// `/brains/{brain}/thoughts/{id}/notes`. `Flat` is the older
/// `/thoughts/{brain}`, `/links/{brain}`, `/notes/{brain}/{id}/update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointLayout {
    #[default]
    Nested,
    Flat,
}

impl FromStr for EndpointLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nested" => Ok(Self::Nested),
            "flat" => Ok(Self::Flat),
            other => Err(format!("unknown endpoint layout `{other}` (expected nested|flat)")),
        }
    }
}

impl fmt::Display for EndpointLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nested => f.write_str("nested"),
            Self::Flat => f.write_str("flat"),
        }
    }
}

#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub brain_id: String,
    pub api_key: String,
    pub layout: EndpointLayout,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        brain_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            brain_id: brain_id.into(),
            api_key: api_key.into(),
            layout: EndpointLayout::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_layout(mut self, layout: EndpointLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("brain_id", &self.brain_id)
            .field("api_key", &"<redacted>")
            .field("layout", &self.layout)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// What `GET /brains/{brain}` reports about the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BrainInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpGraphClient {
    http: Client,
    base: Url,
    config: ClientConfig,
}

impl HttpGraphClient {
    pub fn new(config: ClientConfig) -> Result<Self, RemoteError> {
        if config.api_key.trim().is_empty() {
            return Err(RemoteError::Config("api key is empty".to_string()));
        }
        if config.brain_id.trim().is_empty() {
            return Err(RemoteError::Config("brain id is empty".to_string()));
        }
        let base = Url::parse(config.base_url.trim())
            .map_err(|e| RemoteError::Config(format!("invalid base url `{}`: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::Config(format!(
                "base url `{}` cannot carry a path",
                config.base_url
            )));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("brainport/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { http, base, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Reads the destination brain; used as a connectivity and credential check.
    pub fn fetch_brain(&self) -> Result<BrainInfo, RemoteError> {
        let url = self.endpoint(&["brains", &self.config.brain_id])?;
        tracing::debug!(%url, "fetching brain");
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.config.api_key)
            .send()
            .map_err(network)?;
        let text = check_status(resp)?.text().map_err(network)?;
        serde_json::from_str(&text)
            .map_err(|e| RemoteError::InvalidResponse(format!("brain response is not valid JSON: {e}")))
    }

    fn thoughts_url(&self) -> Result<Url, RemoteError> {
        let brain = self.config.brain_id.as_str();
        match self.config.layout {
            EndpointLayout::Nested => self.endpoint(&["brains", brain, "thoughts"]),
            EndpointLayout::Flat => self.endpoint(&["thoughts", brain]),
        }
    }

    fn links_url(&self) -> Result<Url, RemoteError> {
        let brain = self.config.brain_id.as_str();
        match self.config.layout {
            EndpointLayout::Nested => self.endpoint(&["brains", brain, "links"]),
            EndpointLayout::Flat => self.endpoint(&["links", brain]),
        }
    }

    fn notes_url(&self, thought_id: &str) -> Result<Url, RemoteError> {
        let brain = self.config.brain_id.as_str();
        match self.config.layout {
            EndpointLayout::Nested => {
                self.endpoint(&["brains", brain, "thoughts", thought_id, "notes"])
            }
            EndpointLayout::Flat => self.endpoint(&["notes", brain, thought_id, "update"]),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Config(format!("base url `{}` cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn post_for_id<T: Serialize + ?Sized>(&self, url: Url, body: &T) -> Result<String, RemoteError> {
        let resp = self.post(url, body)?;
        let text = resp.text().map_err(network)?;
        parse_created_id(&text)
    }

    fn post<T: Serialize + ?Sized>(&self, url: Url, body: &T) -> Result<Response, RemoteError> {
        tracing::trace!(%url, "POST");
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .map_err(network)?;
        check_status(resp)
    }
}

impl GraphClient for HttpGraphClient {
    fn create_thought(&self, thought: &NewThought) -> Result<String, RemoteError> {
        let url = self.thoughts_url()?;
        self.post_for_id(url, thought)
    }

    fn create_link(&self, link: &NewLink) -> Result<String, RemoteError> {
        let url = self.links_url()?;
        self.post_for_id(url, link)
    }

    fn attach_note(&self, thought_id: &str, markdown: &str) -> Result<(), RemoteError> {
        let url = self.notes_url(thought_id)?;
        let text = self.post(url, &NoteBody { markdown })?.text().map_err(network)?;
        check_note_ack(&text)
    }
}

fn network(err: reqwest::Error) -> RemoteError {
    RemoteError::Network(err.to_string())
}

fn check_status(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body: truncate(body.trim(), 512),
    })
}

/// Pulls `id` out of a create response. Numeric ids are accepted as text.
pub(crate) fn parse_created_id(text: &str) -> Result<String, RemoteError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| RemoteError::InvalidResponse(format!("create response is not valid JSON: {e}")))?;
    match value.get("id") {
        Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
        _ => Err(RemoteError::InvalidResponse(format!(
            "create response has no `id`: {}",
            truncate(text.trim(), 200)
        ))),
    }
}

/// The note endpoint answers with a success flag, either bare or as
/// `{"success": bool}`. An empty or non-JSON body counts as success.
pub(crate) fn check_note_ack(text: &str) -> Result<(), RemoteError> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return Ok(());
    };
    let flag = match &value {
        serde_json::Value::Bool(ok) => Some(*ok),
        serde_json::Value::Object(obj) => obj.get("success").and_then(serde_json::Value::as_bool),
        _ => None,
    };
    match flag {
        Some(false) => Err(RemoteError::InvalidResponse(format!(
            "note update was not accepted: {}",
            truncate(text.trim(), 200)
        ))),
        _ => Ok(()),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
