//! Pull the human-readable text out of a schema-specific response body.
//!
//! Dispatch is by `SchemaKind`, never by sniffing which keys happen to be present.

use serde_json::Value;

use super::anthropic_types::{MessagesResponse, ResponseContentBlock, WebSearchResultContent};
use super::openai_types::{
    ApiErrorResponse, ChatCompletionResponse, ChoiceMessage, CompletionResponse, ModelsResponse,
};
use crate::endpoints::SchemaKind;
use crate::error::AttemptFailure;

/// Text pulled from a successful response, plus what else the response carried.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub notes: Vec<BlockNote>,
}

/// Non-text content seen while extracting; reported, never extracted.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockNote {
    ToolCall {
        name: String,
        query: Option<String>,
        server_side: bool,
    },
    SearchResult {
        title: String,
        url: String,
    },
    SearchError(String),
}

pub fn extract(kind: SchemaKind, body: &Value) -> Result<Extraction, AttemptFailure> {
    match kind {
        SchemaKind::ChatCompletions => extract_chat(body),
        SchemaKind::Completions => extract_completion(body),
        SchemaKind::Messages => extract_messages(body),
        SchemaKind::ModelList => extract_model_ids(body),
    }
}

/// `data[].id`, one per line.
fn extract_model_ids(body: &Value) -> Result<Extraction, AttemptFailure> {
    let resp: ModelsResponse = serde_json::from_value(body.clone())
        .map_err(|e| AttemptFailure::extraction(format!("not a model listing: {e}")))?;

    if resp.data.is_empty() {
        return Err(AttemptFailure::extraction("model listing is empty"));
    }

    let ids: Vec<&str> = resp.data.iter().map(|m| m.id.as_str()).collect();
    Ok(Extraction {
        text: ids.join("\n"),
        notes: Vec::new(),
    })
}

/// `choices[0].message.content`
fn extract_chat(body: &Value) -> Result<Extraction, AttemptFailure> {
    let resp: ChatCompletionResponse = serde_json::from_value(body.clone())
        .map_err(|e| AttemptFailure::extraction(format!("not a chat completion: {e}")))?;

    let choice = resp
        .choices
        .first()
        .ok_or_else(|| AttemptFailure::extraction("empty choices"))?;

    let notes = chat_tool_notes(&choice.message);

    match choice.message.content.as_deref() {
        Some(text) if !text.is_empty() => Ok(Extraction {
            text: text.to_string(),
            notes,
        }),
        _ if !notes.is_empty() => Err(AttemptFailure::extraction(format!(
            "model answered with {} tool call(s) and no text",
            notes.len()
        ))),
        _ => Err(AttemptFailure::extraction("choices[0].message.content is empty")),
    }
}

fn chat_tool_notes(message: &ChoiceMessage) -> Vec<BlockNote> {
    message
        .tool_calls
        .iter()
        .flatten()
        .map(|tc| BlockNote::ToolCall {
            name: tc.function.name.clone(),
            query: query_from_arguments(&tc.function.arguments),
            server_side: false,
        })
        .collect()
}

/// `choices[0].text`
fn extract_completion(body: &Value) -> Result<Extraction, AttemptFailure> {
    let resp: CompletionResponse = serde_json::from_value(body.clone())
        .map_err(|e| AttemptFailure::extraction(format!("not a completion: {e}")))?;

    resp.choices
        .first()
        .and_then(|c| c.text.as_deref())
        .filter(|t| !t.is_empty())
        .map(|text| Extraction {
            text: text.to_string(),
            notes: Vec::new(),
        })
        .ok_or_else(|| AttemptFailure::extraction("choices[0].text is empty"))
}

/// First `text` block of `content`. When the server ran a search, the answer is
/// spread over the text blocks around the tool blocks, so all of them are joined.
fn extract_messages(body: &Value) -> Result<Extraction, AttemptFailure> {
    let resp: MessagesResponse = serde_json::from_value(body.clone())
        .map_err(|e| AttemptFailure::extraction(format!("not a messages response: {e}")))?;

    let notes = inspect_blocks(&resp);
    let texts: Vec<&str> = resp
        .content
        .iter()
        .filter_map(|block| match block {
            ResponseContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    if texts.is_empty() {
        let kinds: Vec<&str> = resp
            .content
            .iter()
            .map(ResponseContentBlock::type_name)
            .collect();
        return Err(AttemptFailure::extraction(format!(
            "no text block among {} content block(s) [{}]",
            kinds.len(),
            kinds.join(", ")
        )));
    }

    let text = if searched(&resp) {
        texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        texts[0].to_string()
    };

    if text.is_empty() {
        return Err(AttemptFailure::extraction("text blocks are empty"));
    }
    Ok(Extraction { text, notes })
}

fn searched(resp: &MessagesResponse) -> bool {
    resp.content.iter().any(|block| {
        matches!(
            block,
            ResponseContentBlock::ServerToolUse { .. } | ResponseContentBlock::WebSearchToolResult { .. }
        )
    })
}

/// Tool and search notes for any body of the given schema; empty when there are none
/// or the body does not parse.
pub fn block_notes(kind: SchemaKind, body: &Value) -> Vec<BlockNote> {
    match kind {
        SchemaKind::ChatCompletions => serde_json::from_value::<ChatCompletionResponse>(body.clone())
            .ok()
            .and_then(|resp| resp.choices.into_iter().next())
            .map(|choice| chat_tool_notes(&choice.message))
            .unwrap_or_default(),
        SchemaKind::Messages => serde_json::from_value::<MessagesResponse>(body.clone())
            .map(|resp| inspect_blocks(&resp))
            .unwrap_or_default(),
        SchemaKind::Completions | SchemaKind::ModelList => Vec::new(),
    }
}

impl Extraction {
    /// Search hits in answer order, each URL once.
    pub fn sources(&self) -> Vec<(&str, &str)> {
        let mut sources: Vec<(&str, &str)> = Vec::new();
        for note in &self.notes {
            if let BlockNote::SearchResult { title, url } = note {
                if !sources.iter().any(|(_, seen)| *seen == url.as_str()) {
                    sources.push((title.as_str(), url.as_str()));
                }
            }
        }
        sources
    }
}

/// Describe tool calls and search results in a Messages response.
pub fn inspect_blocks(resp: &MessagesResponse) -> Vec<BlockNote> {
    let mut notes = Vec::new();
    for block in &resp.content {
        match block {
            ResponseContentBlock::ToolUse { name, input, .. } => notes.push(BlockNote::ToolCall {
                name: name.clone(),
                query: query_field(input),
                server_side: false,
            }),
            ResponseContentBlock::ServerToolUse { name, input, .. } => {
                notes.push(BlockNote::ToolCall {
                    name: name.clone(),
                    query: query_field(input),
                    server_side: true,
                });
            }
            ResponseContentBlock::WebSearchToolResult { content, .. } => match content {
                WebSearchResultContent::Results(results) => notes.extend(
                    results
                        .iter()
                        .filter(|r| r.result_type == "web_search_result")
                        .map(|r| BlockNote::SearchResult {
                            title: r.title.clone(),
                            url: r.url.clone(),
                        }),
                ),
                WebSearchResultContent::Error(err) => {
                    let code = err
                        .get("error_code")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    notes.push(BlockNote::SearchError(code.to_string()));
                }
            },
            ResponseContentBlock::Text { .. } | ResponseContentBlock::Unknown => {}
        }
    }
    notes
}

fn query_field(input: &Value) -> Option<String> {
    input.get("query").and_then(Value::as_str).map(str::to_string)
}

fn query_from_arguments(arguments: &str) -> Option<String> {
    serde_json::from_str::<Value>(arguments)
        .ok()
        .as_ref()
        .and_then(query_field)
}

/// The `error.message` of an OpenAI- or Anthropic-style error body.
pub fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .map(|e| e.error.message)
}
