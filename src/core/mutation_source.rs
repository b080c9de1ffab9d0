//! External source of mutation proposals (the AI backend)

use crate::core::actions::MutationProposal;
use crate::core::schema::Table;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Path of the generation endpoint relative to the backend base URL
pub const GENERATE_PATH: &str = "/api/ai/generateTables";

/// Body sent to the mutation source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRequest {
    pub prompt: String,
    pub current_tables: Vec<Table>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub allow_destructive: bool,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl ProposalRequest {
    pub fn new(
        prompt: impl Into<String>,
        current_tables: Vec<Table>,
        session_id: Option<String>,
        allow_destructive: bool,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            current_tables,
            session_id,
            allow_destructive,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("AI backend is not configured")]
    NotConfigured,
    #[error("Request to AI backend failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("Malformed AI response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Anything that can turn a prompt and the current schema into a proposal
pub trait MutationSource: Send + Sync {
    fn propose(
        &self,
        request: &ProposalRequest,
    ) -> impl Future<Output = Result<MutationProposal, SourceError>> + Send;
}

/// Mutation source reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpMutationSource {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpMutationSource {
    /// `base_url` of `None` yields a source that always reports `NotConfigured`
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: base_url
                .map(|base| format!("{}{GENERATE_PATH}", base.trim_end_matches('/'))),
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

impl MutationSource for HttpMutationSource {
    async fn propose(&self, request: &ProposalRequest) -> Result<MutationProposal, SourceError> {
        let endpoint = self.endpoint.as_deref().ok_or(SourceError::NotConfigured)?;

        tracing::info!(
            tables = request.current_tables.len(),
            session = ?request.session_id,
            "requesting schema mutations"
        );

        let response = self.client.post(endpoint).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = extract_error_message(status.as_u16(), &body);
            tracing::warn!(status = status.as_u16(), %message, "AI backend returned an error");
            return Err(SourceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Error text for a failed reply: JSON `message` or `error`, else the raw body,
/// else a generic status line
pub fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(body) {
        for key in ["message", "error"] {
            if let Some(text) = fields.get(key).and_then(|v| v.as_str())
                && !text.is_empty()
            {
                return text.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("API Error: {status}")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_base_url() {
        let source = HttpMutationSource::new(Some("http://localhost:8080/"));
        assert_eq!(
            source.endpoint(),
            Some("http://localhost:8080/api/ai/generateTables")
        );
        assert_eq!(HttpMutationSource::new(None).endpoint(), None);
    }

    #[tokio::test]
    async fn test_unconfigured_source_fails() {
        let source = HttpMutationSource::new(None);
        let request = ProposalRequest::new("add users", vec![], None, false);
        let result = source.propose(&request).await;
        assert!(matches!(result, Err(SourceError::NotConfigured)));
    }

    #[test]
    fn test_request_wire_format() {
        let request = ProposalRequest::new("add tags", vec![Table::new("users")], Some("s-1".into()), true);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["prompt"], "add tags");
        assert_eq!(json["currentTables"][0]["name"], "users");
        assert_eq!(json["sessionId"], "s-1");
        assert_eq!(json["allowDestructive"], true);
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(400, r#"{"message":"Prompt too long"}"#),
            "Prompt too long"
        );
        assert_eq!(
            extract_error_message(500, r#"{"error":"Model overloaded"}"#),
            "Model overloaded"
        );
        assert_eq!(extract_error_message(502, "Bad gateway"), "Bad gateway");
        assert_eq!(extract_error_message(503, "  "), "API Error: 503");
    }

    #[test]
    fn test_status_error_display() {
        let error = SourceError::Status {
            status: 429,
            message: "Rate limited".into(),
        };
        assert_eq!(error.to_string(), "Rate limited");
    }
}
