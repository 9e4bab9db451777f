//! Named, ordered attempt lists.
//!
//! A plan only describes requests. Whether it runs as a fallback chain or as a
//! survey is the caller's choice.

use std::fmt;
use std::str::FromStr;

use serde_json::json;

use crate::endpoints::{CHAT_COMPLETIONS, MESSAGES};
use crate::schema::anthropic_types::WEB_SEARCH_TOOL_NAME;
use crate::schema::request::{Attempt, Prompt, ToolDecl, ToolSelection};

pub const DEFAULT_QUERY: &str = "5 important international news events";
pub const DEFAULT_LANGUAGE: &str = "Chinese";

const NEWS_SYSTEM_PROMPT: &str = "You are an international news expert.";
const SOURCING_SYSTEM_PROMPT: &str = "You are a news assistant. For every item, name its source \
     (site and publication time). If the source cannot be determined, say the item comes from \
     your own knowledge.";

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Which endpoint family the news plan may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NewsMethod {
    Chat,
    Messages,
    #[default]
    Both,
}

impl FromStr for NewsMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chat" => Ok(NewsMethod::Chat),
            "messages" => Ok(NewsMethod::Messages),
            "both" => Ok(NewsMethod::Both),
            other => Err(format!(
                "unknown method '{other}', expected chat, messages or both"
            )),
        }
    }
}

impl fmt::Display for NewsMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NewsMethod::Chat => "chat",
            NewsMethod::Messages => "messages",
            NewsMethod::Both => "both",
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewsRequest {
    pub method: NewsMethod,
    pub query: String,
    pub language: String,
    pub web_search: bool,
}

impl Default for NewsRequest {
    fn default() -> Self {
        Self {
            method: NewsMethod::default(),
            query: DEFAULT_QUERY.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            web_search: false,
        }
    }
}

impl NewsRequest {
    fn instruction(&self) -> String {
        format!(
            "Please provide {}. For each item include: 1) a headline 2) a short summary \
             (2-3 sentences) 3) the countries or regions involved. Answer in {}, clearly formatted.",
            self.query, self.language
        )
    }
}

/// Build the news chain.
///
/// Plain runs try chat before messages. With web search a tool-enabled messages
/// attempt leads, then plain messages, then chat. Both lists are filtered by `method`.
pub fn news_plan(request: &NewsRequest) -> Vec<Attempt> {
    let instruction = request.instruction();
    let wants_chat = matches!(request.method, NewsMethod::Chat | NewsMethod::Both);
    let wants_messages = matches!(request.method, NewsMethod::Messages | NewsMethod::Both);

    let mut plan = Vec::with_capacity(3);

    if request.web_search && wants_messages {
        plan.push(
            Attempt::new(
                "web-search",
                MESSAGES,
                Prompt::user(format!(
                    "Search the web for {}. For each item include a headline, a short summary \
                     and the source. Answer in {}.",
                    request.query, request.language
                )),
            )
            .with_max_tokens(2048)
            .with_tool(ToolDecl::WebSearch { max_uses: Some(5) })
            .with_header("User-Agent", BROWSER_USER_AGENT)
            .with_header("Accept", "application/json")
            .with_header("Accept-Language", "zh-CN,zh;q=0.9"),
        );
    }

    let chat = Attempt::new(
        "chat",
        CHAT_COMPLETIONS,
        Prompt::user(instruction.clone()).with_system(NEWS_SYSTEM_PROMPT),
    )
    .with_temperature(0.7)
    .with_max_tokens(2000);
    let messages = Attempt::new("messages", MESSAGES, Prompt::user(instruction)).with_max_tokens(1024);

    let ordered = if request.web_search {
        [(wants_messages, messages), (wants_chat, chat)]
    } else {
        [(wants_chat, chat), (wants_messages, messages)]
    };
    plan.extend(ordered.into_iter().filter(|(wanted, _)| *wanted).map(|(_, a)| a));

    plan
}

/// Tool-calling behaviours worth surveying on a relay. Every attempt runs.
pub fn tools_plan() -> Vec<Attempt> {
    let function_tool = ToolDecl::Function {
        name: WEB_SEARCH_TOOL_NAME.to_string(),
        description: Some("Search the web for current information".to_string()),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"}
            },
            "required": ["query"]
        }),
    };

    vec![
        Attempt::new(
            "chat-function-tool",
            CHAT_COMPLETIONS,
            Prompt::user("Search for the latest news about Ukraine"),
        )
        .with_tool(function_tool)
        .with_tool_choice(ToolSelection::Auto),
        Attempt::new(
            "chat-sourced",
            CHAT_COMPLETIONS,
            Prompt::user(
                "Give 3 recent international news items. Each must include: 1) headline \
                 2) content 3) source, with site name and link where available.",
            )
            .with_system(SOURCING_SYSTEM_PROMPT),
        )
        .with_max_tokens(2000),
        Attempt::new(
            "chat-web-search",
            CHAT_COMPLETIONS,
            Prompt::user("What's the weather in NYC?"),
        )
        .with_tool(ToolDecl::WebSearch { max_uses: Some(3) }),
        Attempt::new(
            "messages-forced-web-search",
            MESSAGES,
            Prompt::user("Search for the latest international news and list the top 3 stories."),
        )
        .with_max_tokens(2048)
        .with_tool(ToolDecl::WebSearch { max_uses: Some(3) })
        .with_tool_choice(ToolSelection::Tool(WEB_SEARCH_TOOL_NAME.to_string())),
    ]
}
