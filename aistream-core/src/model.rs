use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Shared finish vocabulary every dialect maps onto.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    None,
    EndTurn,
    StopSequence,
    MaxTokens,
    ToolUse,
    ContentFilter,
    Error,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::EndTurn => "end_turn",
            Self::StopSequence => "stop_sequence",
            Self::MaxTokens => "max_tokens",
            Self::ToolUse => "tool_use",
            Self::ContentFilter => "content_filter",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// A function the model may call. `parameters` is a JSON schema.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_schema")]
    pub parameters: serde_json::Value,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    pub request_id: Option<String>,
}

impl ChatRequest {
    pub fn user(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: prompt.into(),
            }],
            ..Default::default()
        }
    }

    /// System prompts joined with a newline, or `None` when there are none.
    pub fn joined_system(&self) -> Option<String> {
        let system: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if system.is_empty() {
            None
        } else {
            Some(system.join("\n"))
        }
    }
}

/// Token counters. Each one is the latest value the provider reported.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A tool call whose arguments were fully received and parsed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse(ToolInvocation),
}

/// The finalized result of one streamed request.
///
/// Content order: the text block (when any text arrived) first, then tool
/// calls in the order their keys were first seen.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct AggregatedResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
}

impl AggregatedResponse {
    pub fn text(&self) -> &str {
        self.content
            .iter()
            .find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolUse(_) => None,
            })
            .unwrap_or("")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse(call) => Some(call),
            ContentBlock::Text { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_json_roundtrip_lowercase() {
        let json = r#"{"role":"assistant","content":"ok"}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        let back = serde_json::to_string(&msg).unwrap();
        assert!(back.contains("\"assistant\""));
    }

    #[test]
    fn joined_system_prompts() {
        let mut req = ChatRequest::user("m", "hi");
        assert_eq!(req.joined_system(), None);
        req.messages.insert(0, ChatMessage { role: Role::System, content: "A".into() });
        req.messages.insert(1, ChatMessage { role: Role::System, content: "B".into() });
        assert_eq!(req.joined_system().as_deref(), Some("A\nB"));
    }

    #[test]
    fn response_accessors() {
        let resp = AggregatedResponse {
            id: "r1".into(),
            model: "m".into(),
            content: vec![
                ContentBlock::Text { text: "Hello".into() },
                ContentBlock::ToolUse(ToolInvocation {
                    id: "call_0".into(),
                    name: "lookup".into(),
                    arguments: json!({"q": 1}),
                }),
            ],
            finish_reason: FinishReason::ToolUse,
            usage: Some(Usage { prompt_tokens: 3, completion_tokens: 4 }),
        };
        assert_eq!(resp.text(), "Hello");
        assert_eq!(resp.tool_calls().count(), 1);
        assert_eq!(resp.usage.unwrap().total(), 7);

        let as_json = serde_json::to_value(&resp).unwrap();
        assert_eq!(as_json["finish_reason"], json!("tool_use"));
        assert_eq!(as_json["content"][1]["type"], json!("tool_use"));
        assert_eq!(as_json["content"][1]["name"], json!("lookup"));
    }

    #[test]
    fn tool_spec_defaults_schema() {
        let spec: ToolSpec = serde_json::from_str(r#"{"name":"now"}"#).unwrap();
        assert_eq!(spec.parameters["type"], json!("object"));
        assert_eq!(spec.description, "");
    }
}
