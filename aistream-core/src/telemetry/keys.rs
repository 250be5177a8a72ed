/// Span field names recorded on `aistream.session`.
/// Keep these stable; dashboards key on them.
pub const KEY_PROVIDER: &str = "llm.provider";
pub const KEY_DIALECT: &str = "llm.dialect";
pub const KEY_MODEL: &str = "llm.model";
pub const KEY_RESPONSE_ID: &str = "llm.response_id";

pub const KEY_FINISH_REASON: &str = "finish.reason";
pub const KEY_TOKENS_PROMPT: &str = "tokens.prompt";
pub const KEY_TOKENS_COMPLETION: &str = "tokens.completion";
pub const KEY_TOOL_CALLS: &str = "tool.calls";
pub const KEY_SKIPPED_LINES: &str = "stream.skipped";

pub const KEY_ERROR_KIND: &str = "error.kind";

/// Every key above, in the order the session span declares them.
pub const SESSION_FIELDS: [&str; 10] = [
    KEY_PROVIDER,
    KEY_DIALECT,
    KEY_MODEL,
    KEY_RESPONSE_ID,
    KEY_FINISH_REASON,
    KEY_TOKENS_PROMPT,
    KEY_TOKENS_COMPLETION,
    KEY_TOOL_CALLS,
    KEY_SKIPPED_LINES,
    KEY_ERROR_KIND,
];
