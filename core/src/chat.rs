//! Relay for a blocking chat-completion endpoint.
//!
//! Forwards a single user query and extracts the `answer` field of the
//! reply. `ask` reports failures as `ApiError`; `ask_or_explain` is for
//! tool integrations that must always hand back text.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Transport, UreqTransport};

pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(500);
pub const NO_ANSWER: &str = "No answer returned from service.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub endpoint: String,
    pub token: String,
    pub user: String,
    pub timeout: Duration,
}

impl ChatConfig {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            user: user.into(),
            timeout: DEFAULT_CHAT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub inputs: Map<String, Value>,
    pub query: String,
    pub response_mode: String,
    pub conversation_id: String,
    pub user: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatReply {
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatRelay<T = UreqTransport> {
    config: ChatConfig,
    transport: T,
}

impl ChatRelay<UreqTransport> {
    pub fn new(config: ChatConfig) -> Self {
        let transport = UreqTransport::new(config.timeout);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> ChatRelay<T> {
    pub fn with_transport(config: ChatConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn build_request(&self, query: &str) -> Result<HttpRequest, ApiError> {
        let message = ChatMessage {
            inputs: Map::new(),
            query: query.to_string(),
            response_mode: "blocking".to_string(),
            conversation_id: String::new(),
            user: self.config.user.clone(),
        };
        let body = serde_json::to_vec(&message).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.config.endpoint.clone(),
            headers: vec![
                ("authorization".to_string(), format!("Bearer {}", self.config.token)),
                ("content-type".to_string(), "application/json".to_string()),
            ],
            body: Some(body),
        })
    }

    pub fn parse_answer(&self, response: HttpResponse) -> Result<String, ApiError> {
        if !response.is_success() {
            return Err(ApiError::HttpError {
                status: response.status,
                body: response.body,
            });
        }
        let reply: ChatReply = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
        Ok(reply.answer.unwrap_or_else(|| NO_ANSWER.to_string()))
    }

    pub fn ask(&self, query: &str) -> Result<String, ApiError> {
        let request = self.build_request(query)?;
        tracing::debug!(endpoint = %self.config.endpoint, "forwarding chat query");
        let response = self.transport.execute(request)?;
        self.parse_answer(response)
    }

    /// Like `ask`, but renders failures as a message instead of an error.
    pub fn ask_or_explain(&self, query: &str) -> String {
        match self.ask(query) {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(error = %err, "chat relay failed");
                explain(&err)
            }
        }
    }
}

fn explain(err: &ApiError) -> String {
    match err {
        ApiError::Timeout => "Error: Request to your service timed out.".to_string(),
        ApiError::Connection(_) => "Error: Failed to connect to your service.".to_string(),
        ApiError::HttpError { status, body } => {
            format!("HTTP error from your service: {status} - {body}")
        }
        ApiError::MalformedResponse(_) => "Error: Invalid JSON response from your service.".to_string(),
        other => format!("Unexpected error: {other}"),
    }
}
