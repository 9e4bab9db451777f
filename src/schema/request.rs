//! Build concrete HTTP requests from probe attempts.
//!
//! An `Attempt` says *what* to try (endpoint, header scheme, prompt, tools); the
//! builder turns it into URL, ordered headers, a schema-tagged payload and a timeout.
//! Nothing is validated here: a malformed combination surfaces as an HTTP error
//! from the remote server, which is exactly what a probe wants to observe.

use std::time::Duration;

use serde::Serialize;

use super::anthropic_types::{
    CustomTool, Message, MessagesRequest, Role, Tool, ToolChoice, WebSearchTool,
};
use super::openai_types::{
    ChatCompletionRequest, ChatFunction, ChatMessage, ChatTool, ChatToolChoice,
    ChatToolChoiceFunction, ChatToolChoiceSpecific, CompletionRequest, FunctionTool,
};
use crate::config::ProbeConfig;
use crate::endpoints::{Endpoint, HeaderScheme, HttpMethod, SchemaKind};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            system: None,
            user: text.into(),
        }
    }

    #[must_use]
    pub fn with_system(mut self, text: impl Into<String>) -> Self {
        self.system = Some(text.into());
        self
    }
}

/// Schema-independent tool declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolDecl {
    WebSearch {
        max_uses: Option<u32>,
    },
    Function {
        name: String,
        description: Option<String>,
        parameters: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolSelection {
    Auto,
    /// Force the named tool.
    Tool(String),
}

/// One probe attempt: everything needed to build one request.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub label: String,
    pub endpoint: Endpoint,
    pub scheme: HeaderScheme,
    pub prompt: Prompt,
    pub model: Option<String>,
    pub max_tokens: u64,
    pub temperature: Option<f64>,
    pub tools: Vec<ToolDecl>,
    pub tool_choice: Option<ToolSelection>,
    pub extra_headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl Attempt {
    pub fn new(label: impl Into<String>, endpoint: Endpoint, prompt: Prompt) -> Self {
        Self {
            label: label.into(),
            endpoint,
            scheme: endpoint.default_scheme,
            prompt,
            model: None,
            max_tokens: 1024,
            temperature: None,
            tools: Vec::new(),
            tool_choice: None,
            extra_headers: Vec::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: HeaderScheme) -> Self {
        self.scheme = scheme;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_tool(mut self, tool: ToolDecl) -> Self {
        self.tools.push(tool);
        self
    }

    #[must_use]
    pub fn with_tool_choice(mut self, choice: ToolSelection) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn uses_web_search(&self) -> bool {
        self.tools
            .iter()
            .any(|t| matches!(t, ToolDecl::WebSearch { .. }))
    }
}

/// Request body, tagged by schema.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    ChatCompletions(ChatCompletionRequest),
    Completions(CompletionRequest),
    Messages(MessagesRequest),
}

impl Payload {
    pub fn model(&self) -> &str {
        match self {
            Payload::ChatCompletions(r) => &r.model,
            Payload::Completions(r) => &r.model,
            Payload::Messages(r) => &r.model,
        }
    }
}

/// A fully formed request, ready for the transport.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub label: String,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub schema: SchemaKind,
    pub payload: Option<Payload>,
    pub timeout: Duration,
}

/// Build the request for one attempt against the configured server.
pub fn build_request(config: &ProbeConfig, attempt: &Attempt) -> Result<ProbeRequest> {
    let mut headers = attempt.scheme.headers(config)?;
    for (name, value) in &attempt.extra_headers {
        match headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value.clone(),
            None => headers.push((name.clone(), value.clone())),
        }
    }

    let endpoint = attempt.endpoint;
    let payload = match endpoint.method {
        HttpMethod::Get => None,
        HttpMethod::Post => build_payload(config, attempt),
    };

    Ok(ProbeRequest {
        label: attempt.label.clone(),
        method: endpoint.method,
        url: config.url(endpoint.path),
        headers,
        schema: endpoint.schema,
        payload,
        timeout: attempt.timeout.unwrap_or_else(|| default_timeout(config, attempt)),
    })
}

fn default_timeout(config: &ProbeConfig, attempt: &Attempt) -> Duration {
    if attempt.uses_web_search() {
        return config.timeouts.web_search();
    }
    match (attempt.endpoint.method, attempt.endpoint.schema) {
        (HttpMethod::Get, _) | (_, SchemaKind::ModelList) => config.timeouts.discovery(),
        (_, SchemaKind::ChatCompletions | SchemaKind::Completions) => config.timeouts.chat(),
        (_, SchemaKind::Messages) => config.timeouts.messages(),
    }
}

fn build_payload(config: &ProbeConfig, attempt: &Attempt) -> Option<Payload> {
    let prompt = &attempt.prompt;
    match attempt.endpoint.schema {
        SchemaKind::ModelList => None,
        SchemaKind::ChatCompletions => {
            let mut messages = Vec::with_capacity(2);
            if let Some(ref system) = prompt.system {
                messages.push(ChatMessage::new("system", system.clone()));
            }
            messages.push(ChatMessage::new("user", prompt.user.clone()));

            Some(Payload::ChatCompletions(ChatCompletionRequest {
                model: model_for(attempt, &config.chat_model),
                messages,
                max_tokens: Some(attempt.max_tokens),
                temperature: attempt.temperature,
                tools: non_empty(attempt.tools.iter().map(chat_tool).collect()),
                tool_choice: attempt.tool_choice.as_ref().map(chat_tool_choice),
            }))
        }
        SchemaKind::Completions => {
            if !attempt.tools.is_empty() {
                tracing::warn!(
                    label = %attempt.label,
                    "Completions endpoint takes no tools; dropping {} declaration(s)",
                    attempt.tools.len()
                );
            }
            let text = match prompt.system {
                Some(ref system) => format!("{}\n\n{}", system, prompt.user),
                None => prompt.user.clone(),
            };
            Some(Payload::Completions(CompletionRequest {
                model: model_for(attempt, &config.chat_model),
                prompt: text,
                max_tokens: Some(attempt.max_tokens),
                temperature: attempt.temperature,
            }))
        }
        SchemaKind::Messages => Some(Payload::Messages(MessagesRequest {
            model: model_for(attempt, &config.default_model),
            max_tokens: attempt.max_tokens,
            messages: vec![Message {
                role: Role::User,
                content: prompt.user.clone(),
            }],
            system: prompt.system.clone(),
            temperature: attempt.temperature,
            tools: non_empty(attempt.tools.iter().map(messages_tool).collect()),
            tool_choice: attempt.tool_choice.as_ref().map(messages_tool_choice),
        })),
    }
}

fn model_for(attempt: &Attempt, fallback: &str) -> String {
    attempt
        .model
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn chat_tool(tool: &ToolDecl) -> ChatTool {
    match tool {
        ToolDecl::WebSearch { max_uses } => ChatTool::Hosted(WebSearchTool::new(*max_uses)),
        ToolDecl::Function {
            name,
            description,
            parameters,
        } => ChatTool::Function(FunctionTool {
            tool_type: "function".to_string(),
            function: ChatFunction {
                name: name.clone(),
                description: description.clone(),
                parameters: parameters.clone(),
            },
        }),
    }
}

fn chat_tool_choice(choice: &ToolSelection) -> ChatToolChoice {
    match choice {
        ToolSelection::Auto => ChatToolChoice::Mode("auto".to_string()),
        ToolSelection::Tool(name) => ChatToolChoice::Specific(ChatToolChoiceSpecific {
            choice_type: "function".to_string(),
            function: ChatToolChoiceFunction { name: name.clone() },
        }),
    }
}

fn messages_tool(tool: &ToolDecl) -> Tool {
    match tool {
        ToolDecl::WebSearch { max_uses } => Tool::WebSearch(WebSearchTool::new(*max_uses)),
        ToolDecl::Function {
            name,
            description,
            parameters,
        } => Tool::Custom(CustomTool {
            name: name.clone(),
            description: description.clone(),
            input_schema: parameters.clone(),
        }),
    }
}

fn messages_tool_choice(choice: &ToolSelection) -> ToolChoice {
    match choice {
        ToolSelection::Auto => ToolChoice::Auto,
        ToolSelection::Tool(name) => ToolChoice::Tool { name: name.clone() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::{CHAT_COMPLETIONS, COMPLETIONS, MESSAGES, MODELS};
    use serde_json::json;

    fn config() -> ProbeConfig {
        ProbeConfig::new("https://relay.example.com/", "sk-test")
    }

    fn search_fn() -> ToolDecl {
        ToolDecl::Function {
            name: "web_search".to_string(),
            description: Some("Search the web for information".to_string()),
            parameters: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        }
    }

    #[test]
    fn test_chat_request() {
        let attempt = Attempt::new(
            "chat",
            CHAT_COMPLETIONS,
            Prompt::user("Hello").with_system("You are terse."),
        )
        .with_temperature(0.7)
        .with_max_tokens(2000);

        let req = build_request(&config(), &attempt).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "https://relay.example.com/v1/chat/completions");
        assert_eq!(req.timeout, Duration::from_secs(30));

        let body = serde_json::to_value(req.payload.unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [
                    {"role": "system", "content": "You are terse."},
                    {"role": "user", "content": "Hello"}
                ],
                "max_tokens": 2000,
                "temperature": 0.7
            })
        );
    }

    #[test]
    fn test_messages_request_with_web_search() {
        let attempt = Attempt::new("search", MESSAGES, Prompt::user("news"))
            .with_max_tokens(2048)
            .with_tool(ToolDecl::WebSearch { max_uses: Some(5) })
            .with_tool_choice(ToolSelection::Tool("web_search".to_string()));

        let req = build_request(&config(), &attempt).unwrap();
        assert_eq!(req.schema, SchemaKind::Messages);
        assert_eq!(req.timeout, Duration::from_secs(90));
        assert!(req.headers.iter().any(|(k, v)| k == "x-api-key" && v == "sk-test"));

        let body = serde_json::to_value(req.payload.unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "claude-sonnet-4-5-20250929",
                "max_tokens": 2048,
                "messages": [{"role": "user", "content": "news"}],
                "tools": [{"type": "web_search_20250305", "name": "web_search", "max_uses": 5}],
                "tool_choice": {"type": "tool", "name": "web_search"}
            })
        );
    }

    #[test]
    fn test_system_prompt_goes_top_level_on_messages() {
        let attempt = Attempt::new("m", MESSAGES, Prompt::user("hi").with_system("sys"));
        let req = build_request(&config(), &attempt).unwrap();
        let body = serde_json::to_value(req.payload.unwrap()).unwrap();
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_function_tool_per_schema() {
        let chat = Attempt::new("c", CHAT_COMPLETIONS, Prompt::user("q")).with_tool(search_fn());
        let body = serde_json::to_value(build_request(&config(), &chat).unwrap().payload).unwrap();
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "web_search");

        let messages = Attempt::new("m", MESSAGES, Prompt::user("q")).with_tool(search_fn());
        let body =
            serde_json::to_value(build_request(&config(), &messages).unwrap().payload).unwrap();
        assert_eq!(body["tools"][0]["name"], "web_search");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_anthropic_web_search_on_chat_endpoint() {
        let attempt = Attempt::new("c", CHAT_COMPLETIONS, Prompt::user("q"))
            .with_tool(ToolDecl::WebSearch { max_uses: Some(3) });
        let body = serde_json::to_value(build_request(&config(), &attempt).unwrap().payload)
            .unwrap();
        assert_eq!(
            body["tools"],
            json!([{"type": "web_search_20250305", "name": "web_search", "max_uses": 3}])
        );
    }

    #[test]
    fn test_completions_drops_tools_and_folds_system() {
        let attempt = Attempt::new("legacy", COMPLETIONS, Prompt::user("Hello").with_system("S"))
            .with_model("claude-sonnet-4-5-20250929")
            .with_max_tokens(50)
            .with_tool(search_fn());
        let body = serde_json::to_value(build_request(&config(), &attempt).unwrap().payload)
            .unwrap();
        assert_eq!(
            body,
            json!({"model": "claude-sonnet-4-5-20250929", "prompt": "S\n\nHello", "max_tokens": 50})
        );
    }

    #[test]
    fn test_get_has_no_payload() {
        let attempt = Attempt::new("models", MODELS, Prompt::user(""));
        let req = build_request(&config(), &attempt).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.payload.is_none());
        assert_eq!(req.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_extra_headers_replace_case_insensitively() {
        let attempt = Attempt::new("m", MESSAGES, Prompt::user("q"))
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_header("User-Agent", "curl/7.68.0");
        let req = build_request(&config(), &attempt).unwrap();

        let content_types: Vec<_> = req
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .collect();
        assert_eq!(content_types.len(), 1);
        assert_eq!(content_types[0].1, "application/json; charset=utf-8");
        assert_eq!(req.headers.last().unwrap().0, "User-Agent");
    }

    #[test]
    fn test_scheme_override() {
        let attempt =
            Attempt::new("m", MESSAGES, Prompt::user("q")).with_scheme(HeaderScheme::Bearer);
        let req = build_request(&config(), &attempt).unwrap();
        assert_eq!(req.headers[0].0, "Authorization");
    }

    #[test]
    fn test_missing_key_is_error() {
        let attempt = Attempt::new("m", MESSAGES, Prompt::user("q"));
        assert!(build_request(&ProbeConfig::default(), &attempt).is_err());
    }
}
