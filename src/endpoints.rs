//! Endpoint descriptors and header schemes.
//!
//! Each descriptor pairs a path with the request/response schema it speaks and the
//! header scheme that server family normally expects. The set is fixed; nothing is
//! discovered at runtime.

use crate::config::ProbeConfig;
use crate::error::Result;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// Wire schema of a request body and its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaKind {
    ModelList,
    ChatCompletions,
    Completions,
    Messages,
}

/// Named set of authentication headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `x-api-key` plus `anthropic-version`
    Anthropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub method: HttpMethod,
    pub schema: SchemaKind,
    pub default_scheme: HeaderScheme,
}

pub const MODELS: Endpoint = Endpoint {
    path: "/v1/models",
    method: HttpMethod::Get,
    schema: SchemaKind::ModelList,
    default_scheme: HeaderScheme::Bearer,
};

pub const CHAT_COMPLETIONS: Endpoint = Endpoint {
    path: "/v1/chat/completions",
    method: HttpMethod::Post,
    schema: SchemaKind::ChatCompletions,
    default_scheme: HeaderScheme::Bearer,
};

pub const COMPLETIONS: Endpoint = Endpoint {
    path: "/v1/completions",
    method: HttpMethod::Post,
    schema: SchemaKind::Completions,
    default_scheme: HeaderScheme::Bearer,
};

pub const MESSAGES: Endpoint = Endpoint {
    path: "/v1/messages",
    method: HttpMethod::Post,
    schema: SchemaKind::Messages,
    default_scheme: HeaderScheme::Anthropic,
};

/// Endpoints that accept a generation request.
pub const GENERATION_ENDPOINTS: &[Endpoint] = &[CHAT_COMPLETIONS, COMPLETIONS, MESSAGES];

/// Every path the discovery survey issues a GET against.
pub const DISCOVERY_PATHS: &[&str] = &[
    "/v1/models",
    "/v1/chat/completions",
    "/v1/completions",
    "/v1/messages",
    "/v1/engines",
    "/v1/embeddings",
    "/v1/audio",
];

impl HeaderScheme {
    pub const ALL: [HeaderScheme; 2] = [HeaderScheme::Bearer, HeaderScheme::Anthropic];

    /// Headers for this scheme, in the order they are sent.
    pub fn headers(self, config: &ProbeConfig) -> Result<Vec<(String, String)>> {
        let key = config.api_key()?;
        let headers = match self {
            HeaderScheme::Bearer => vec![
                ("Authorization".to_string(), format!("Bearer {key}")),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            HeaderScheme::Anthropic => vec![
                ("x-api-key".to_string(), key.to_string()),
                (
                    "anthropic-version".to_string(),
                    config.anthropic_version.clone(),
                ),
                ("content-type".to_string(), "application/json".to_string()),
            ],
        };
        Ok(headers)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            HeaderScheme::Bearer => "OpenAI",
            HeaderScheme::Anthropic => "Anthropic",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        })
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchemaKind::ModelList => "model-list",
            SchemaKind::ChatCompletions => "chat-completions",
            SchemaKind::Completions => "completions",
            SchemaKind::Messages => "messages",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_endpoints_are_post() {
        for endpoint in GENERATION_ENDPOINTS {
            assert_eq!(endpoint.method, HttpMethod::Post, "{}", endpoint.path);
            assert!(DISCOVERY_PATHS.contains(&endpoint.path));
        }
    }

    #[test]
    fn test_bearer_headers() {
        let config = ProbeConfig::new("http://x", "sk-abc");
        let headers = HeaderScheme::Bearer.headers(&config).unwrap();
        assert_eq!(headers[0], ("Authorization".to_string(), "Bearer sk-abc".to_string()));
    }

    #[test]
    fn test_anthropic_headers() {
        let config = ProbeConfig::new("http://x", "sk-abc");
        let headers = HeaderScheme::Anthropic.headers(&config).unwrap();
        assert!(headers.contains(&("x-api-key".to_string(), "sk-abc".to_string())));
        assert!(headers.contains(&("anthropic-version".to_string(), "2023-06-01".to_string())));
        assert!(!headers.iter().any(|(k, _)| k == "Authorization"));
    }
}
