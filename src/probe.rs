use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::endpoints::{HttpMethod, SchemaKind};
use crate::error::{preview, AttemptFailure, Result};
use crate::schema::extract::{block_notes, error_message, extract, BlockNote, Extraction};
use crate::schema::request::{build_request, Attempt, ProbeRequest};

/// Longest slice of an error body kept in a failure.
pub const ERROR_PREVIEW_CHARS: usize = 200;

/// Response body as received: JSON when it parses, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Empty,
}

/// Outcome of exactly one attempt.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub label: String,
    pub method: HttpMethod,
    pub url: String,
    pub schema: SchemaKind,
    /// `None` when the request never got a response.
    pub status: Option<u16>,
    pub body: ResponseBody,
    pub outcome: std::result::Result<Extraction, AttemptFailure>,
    pub elapsed: Duration,
}

impl ProbeResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn text(&self) -> Option<&str> {
        self.outcome.as_ref().ok().map(|e| e.text.as_str())
    }

    pub fn json(&self) -> Option<&Value> {
        match self.body {
            ResponseBody::Json(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn is_2xx(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }

    pub fn failure(&self) -> Option<&AttemptFailure> {
        self.outcome.as_ref().err()
    }

    /// Tool calls and search hits in the body, whether or not text was extracted.
    pub fn notes(&self) -> Vec<BlockNote> {
        match (&self.outcome, self.json()) {
            (Ok(extraction), _) => extraction.notes.clone(),
            (Err(_), Some(body)) if self.is_2xx() => block_notes(self.schema, body),
            _ => Vec::new(),
        }
    }

    /// A 2xx answer that called a tool instead of writing text. Tool support works,
    /// even though there is nothing to extract.
    pub fn answered_with_tools(&self) -> bool {
        matches!(self.outcome, Err(AttemptFailure::Extraction(_)))
            && self
                .notes()
                .iter()
                .any(|n| matches!(n, BlockNote::ToolCall { .. }))
    }
}

/// Sends built requests and turns responses into probe results. One call at a time.
pub struct Prober {
    client: reqwest::Client,
    config: ProbeConfig,
}

impl Prober {
    /// Fails when the config has no API key or the HTTP client cannot be built.
    pub fn new(config: ProbeConfig) -> Result<Self> {
        config.api_key()?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Build and send one attempt.
    pub async fn probe(&self, attempt: &Attempt) -> ProbeResult {
        match build_request(&self.config, attempt) {
            Ok(req) => self.execute(&req).await,
            Err(e) => ProbeResult {
                label: attempt.label.clone(),
                method: attempt.endpoint.method,
                url: self.config.url(attempt.endpoint.path),
                schema: attempt.endpoint.schema,
                status: None,
                body: ResponseBody::Empty,
                outcome: Err(AttemptFailure::Transport(format!("request not built: {e}"))),
                elapsed: Duration::ZERO,
            },
        }
    }

    /// Send a built request and classify the response.
    pub async fn execute(&self, req: &ProbeRequest) -> ProbeResult {
        let started = Instant::now();

        match req.payload {
            Some(ref payload) => info!(
                label = %req.label,
                "{} {} model={}",
                req.method,
                req.url,
                payload.model()
            ),
            None => info!(label = %req.label, "{} {}", req.method, req.url),
        }

        let (status, body, outcome) = match self.send(req).await {
            Ok((status, raw)) => {
                let body = parse_body(&raw);
                let outcome = classify(req.schema, status, &raw, &body);
                (Some(status), body, outcome)
            }
            Err(failure) => (None, ResponseBody::Empty, Err(failure)),
        };

        let elapsed = started.elapsed();
        match outcome {
            Ok(ref ex) => info!(
                label = %req.label,
                status = status.unwrap_or_default(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Extracted {} chars",
                ex.text.chars().count()
            ),
            Err(ref failure) => warn!(
                label = %req.label,
                elapsed_ms = elapsed.as_millis() as u64,
                "Attempt failed: {}",
                failure
            ),
        }

        ProbeResult {
            label: req.label.clone(),
            method: req.method,
            url: req.url.clone(),
            schema: req.schema,
            status,
            body,
            outcome,
            elapsed,
        }
    }

    async fn send(&self, req: &ProbeRequest) -> std::result::Result<(u16, String), AttemptFailure> {
        let mut builder = match req.method {
            HttpMethod::Get => self.client.get(&req.url),
            HttpMethod::Post => self.client.post(&req.url),
        }
        .timeout(req.timeout);

        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref payload) = req.payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AttemptFailure::Transport(format!("timed out after {}s", req.timeout.as_secs()))
            } else {
                AttemptFailure::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let raw = response
            .text()
            .await
            .map_err(|e| AttemptFailure::Transport(format!("failed to read body: {e}")))?;

        debug!(status, body_len = raw.len(), "Response received");
        Ok((status, raw))
    }
}

fn parse_body(raw: &str) -> ResponseBody {
    if raw.trim().is_empty() {
        return ResponseBody::Empty;
    }
    match serde_json::from_str(raw) {
        Ok(v) => ResponseBody::Json(v),
        Err(_) => ResponseBody::Text(raw.to_string()),
    }
}

fn classify(
    schema: SchemaKind,
    status: u16,
    raw: &str,
    body: &ResponseBody,
) -> std::result::Result<Extraction, AttemptFailure> {
    if !(200..300).contains(&status) {
        let detail = error_message(raw)
            .unwrap_or_else(|| preview(raw.trim(), ERROR_PREVIEW_CHARS).to_string());
        return Err(AttemptFailure::Status {
            status,
            preview: preview(&detail, ERROR_PREVIEW_CHARS).to_string(),
        });
    }

    match body {
        ResponseBody::Json(v) => extract(schema, v),
        ResponseBody::Text(t) => Err(AttemptFailure::Parse(
            preview(t.trim(), ERROR_PREVIEW_CHARS).to_string(),
        )),
        ResponseBody::Empty => Err(AttemptFailure::Parse("empty body".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body("  "), ResponseBody::Empty);
        assert_eq!(parse_body(r#"{"a":1}"#), ResponseBody::Json(json!({"a": 1})));
        assert_eq!(
            parse_body("<html>Bad Gateway</html>"),
            ResponseBody::Text("<html>Bad Gateway</html>".to_string())
        );
    }

    #[test]
    fn test_classify_status_uses_error_message() {
        let raw = r#"{"error": {"message": "no such model", "type": "invalid_request_error"}}"#;
        let outcome = classify(SchemaKind::ChatCompletions, 404, raw, &parse_body(raw));
        assert_eq!(
            outcome.unwrap_err(),
            AttemptFailure::Status {
                status: 404,
                preview: "no such model".to_string()
            }
        );
    }

    #[test]
    fn test_classify_status_truncates_raw_body() {
        let raw = "x".repeat(1000);
        let outcome = classify(SchemaKind::Messages, 500, &raw, &parse_body(&raw));
        match outcome.unwrap_err() {
            AttemptFailure::Status { status, preview } => {
                assert_eq!(status, 500);
                assert_eq!(preview.len(), ERROR_PREVIEW_CHARS);
            }
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[test]
    fn test_classify_non_json_success_is_parse_failure() {
        let raw = "OK";
        let outcome = classify(SchemaKind::Messages, 200, raw, &parse_body(raw));
        assert!(matches!(outcome, Err(AttemptFailure::Parse(_))));
    }

    #[test]
    fn test_classify_extracts_on_2xx() {
        let raw = r#"{"content": [{"type": "text", "text": "hello"}]}"#;
        let outcome = classify(SchemaKind::Messages, 200, raw, &parse_body(raw));
        assert_eq!(outcome.unwrap().text, "hello");
    }

    #[test]
    fn test_tool_only_answer_keeps_notes() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": null,
            "tool_calls": [{"id": "c1", "type": "function",
                            "function": {"name": "web_search", "arguments": "{\"query\":\"Ukraine\"}"}}]}}]}"#;
        let body = parse_body(raw);
        let result = ProbeResult {
            label: "chat-function-tool".to_string(),
            method: HttpMethod::Post,
            url: "http://relay/v1/chat/completions".to_string(),
            schema: SchemaKind::ChatCompletions,
            status: Some(200),
            outcome: classify(SchemaKind::ChatCompletions, 200, raw, &body),
            body,
            elapsed: Duration::ZERO,
        };

        assert!(!result.succeeded());
        assert!(result.answered_with_tools());
        assert_eq!(
            result.notes(),
            vec![BlockNote::ToolCall {
                name: "web_search".to_string(),
                query: Some("Ukraine".to_string()),
                server_side: false,
            }]
        );
    }

    #[test]
    fn test_prober_requires_key() {
        assert!(Prober::new(ProbeConfig::default()).is_err());
        assert!(Prober::new(ProbeConfig::new("http://localhost:1", "k")).is_ok());
    }
}
