//! Survey which paths a server answers and which header schemes it accepts.

use serde_json::Value;

use crate::endpoints::{
    Endpoint, HeaderScheme, HttpMethod, SchemaKind, DISCOVERY_PATHS, GENERATION_ENDPOINTS,
};
use crate::probe::{ProbeResult, Prober};
use crate::schema::request::{Attempt, Prompt};

const HELLO_MAX_TOKENS: u64 = 50;

/// Everything learned about one path.
#[derive(Debug)]
pub struct PathReport {
    pub path: &'static str,
    pub get: ProbeResult,
    /// Only filled for paths that take a generation request.
    pub posts: Vec<(HeaderScheme, ProbeResult)>,
}

impl PathReport {
    pub fn all_results(&self) -> impl Iterator<Item = &ProbeResult> {
        std::iter::once(&self.get).chain(self.posts.iter().map(|(_, r)| r))
    }
}

/// GET every discovery path with the bearer scheme, then POST a minimal
/// "Hello" to each generation path once per header scheme.
pub async fn survey(prober: &Prober) -> Vec<PathReport> {
    let mut reports = Vec::with_capacity(DISCOVERY_PATHS.len());

    for &path in DISCOVERY_PATHS {
        let get = prober.probe(&get_attempt(path)).await;

        let mut posts = Vec::new();
        if let Some(endpoint) = GENERATION_ENDPOINTS.iter().find(|e| e.path == path) {
            for scheme in HeaderScheme::ALL {
                let attempt = hello_attempt(prober, *endpoint, scheme);
                posts.push((scheme, prober.probe(&attempt).await));
            }
        }

        reports.push(PathReport { path, get, posts });
    }

    reports
}

fn get_attempt(path: &'static str) -> Attempt {
    let endpoint = Endpoint {
        path,
        method: HttpMethod::Get,
        schema: SchemaKind::ModelList,
        default_scheme: HeaderScheme::Bearer,
    };
    Attempt::new(format!("GET {path}"), endpoint, Prompt::user(""))
}

fn hello_attempt(prober: &Prober, endpoint: Endpoint, scheme: HeaderScheme) -> Attempt {
    let config = prober.config();
    Attempt::new(
        format!("POST {} ({})", endpoint.path, scheme.label()),
        endpoint,
        Prompt::user("Hello"),
    )
    .with_scheme(scheme)
    .with_model(config.default_model.clone())
    .with_max_tokens(HELLO_MAX_TOKENS)
    .with_timeout(config.timeouts.chat())
}

/// Number of entries under `data`, when the body has such an array.
pub fn data_len(result: &ProbeResult) -> Option<usize> {
    result
        .json()
        .and_then(|v| v.get("data"))
        .and_then(Value::as_array)
        .map(Vec::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ResponseBody;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_get_attempt_is_bearer() {
        let attempt = get_attempt("/v1/engines");
        assert_eq!(attempt.endpoint.method, HttpMethod::Get);
        assert_eq!(attempt.scheme, HeaderScheme::Bearer);
        assert_eq!(attempt.label, "GET /v1/engines");
    }

    #[test]
    fn test_data_len() {
        let mut result = ProbeResult {
            label: "GET /v1/models".to_string(),
            method: HttpMethod::Get,
            url: "http://relay/v1/models".to_string(),
            schema: SchemaKind::ModelList,
            status: Some(200),
            body: ResponseBody::Json(json!({"data": [{"id": "a"}, {"id": "b"}]})),
            outcome: Err(crate::error::AttemptFailure::extraction("unused")),
            elapsed: Duration::ZERO,
        };
        assert_eq!(data_len(&result), Some(2));

        result.body = ResponseBody::Json(json!({"object": "list"}));
        assert_eq!(data_len(&result), None);

        result.body = ResponseBody::Text("nope".to_string());
        assert_eq!(data_len(&result), None);
    }
}
