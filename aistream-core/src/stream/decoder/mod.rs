//! Provider decoders: one JSON document in, zero or more `StreamEvent`s out.
//!
//! Each dialect module owns its wire structs and its stop-vocabulary mapping.
//! The only state carried between documents is tool-call keying
//! (`DecoderState`), which lets dialects that deliver complete calls, or omit
//! indexes, still produce stable positions.

mod anthropic;
mod cli;
mod gemini;
mod ollama;
mod openai;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AiStreamError;
use crate::model::FinishReason;
use crate::stream::classifier::Framing;
use crate::stream::event::StreamEvent;

/// Closed set of supported wire dialects, fixed once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    OpenAiSse,
    AnthropicSse,
    GeminiSse,
    OllamaNdjson,
    CliNdjson,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Self::OpenAiSse,
        Self::AnthropicSse,
        Self::GeminiSse,
        Self::OllamaNdjson,
        Self::CliNdjson,
    ];

    pub fn framing(self) -> Framing {
        match self {
            Self::OpenAiSse | Self::AnthropicSse | Self::GeminiSse => Framing::EventStream,
            Self::OllamaNdjson | Self::CliNdjson => Framing::Ndjson,
        }
    }

    /// True when the dialect has no terminator and EOF is its normal end.
    pub fn ends_at_eof(self) -> bool {
        matches!(self, Self::GeminiSse)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAiSse => "openai_sse",
            Self::AnthropicSse => "anthropic_sse",
            Self::GeminiSse => "gemini_sse",
            Self::OllamaNdjson => "ollama_ndjson",
            Self::CliNdjson => "cli_ndjson",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = AiStreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == wanted)
            .ok_or_else(|| AiStreamError::Validation(format!("unknown dialect '{s}'")))
    }
}

/// Per-session keying state shared by the dialect modules.
#[derive(Debug, Default)]
pub(crate) struct DecoderState {
    next_position: usize,
    current: Option<usize>,
    by_id: HashMap<String, usize>,
    /// Offset added to per-message block indexes (several messages may share
    /// one stream).
    block_base: usize,
    saw_tool_call: bool,
    saw_partial_events: bool,
    last_stop: Option<FinishReason>,
}

impl DecoderState {
    /// A position no earlier fragment used. `None` once positions are exhausted.
    fn fresh_position(&mut self) -> Option<usize> {
        let pos = self.next_position;
        self.next_position = pos.checked_add(1)?;
        self.current = Some(pos);
        self.saw_tool_call = true;
        Some(pos)
    }

    /// Claim an explicit provider index. Indexes come off the wire, so one
    /// with no successor position is refused rather than wrapped.
    fn explicit_position(&mut self, pos: usize) -> Option<usize> {
        self.next_position = self.next_position.max(pos.checked_add(1)?);
        self.current = Some(pos);
        self.saw_tool_call = true;
        Some(pos)
    }

    fn remember_id(&mut self, id: &str, pos: usize) {
        self.by_id.entry(id.to_string()).or_insert(pos);
    }

    /// Resolve a fragment that may carry an index, an id, both, or neither.
    fn resolve(&mut self, index: Option<usize>, id: Option<&str>) -> Option<usize> {
        let pos = match (index, id) {
            (Some(i), _) => self.explicit_position(i)?,
            (None, Some(id)) => match self.by_id.get(id) {
                Some(&p) => {
                    self.current = Some(p);
                    p
                }
                None => self.fresh_position()?,
            },
            (None, None) => match self.current {
                Some(p) => p,
                None => self.fresh_position()?,
            },
        };
        if let Some(id) = id {
            self.remember_id(id, pos);
        }
        Some(pos)
    }
}

/// Stateful decoder for one session.
#[derive(Debug)]
pub struct Decoder {
    dialect: Dialect,
    state: DecoderState,
}

impl Decoder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: DecoderState::default(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Decode one JSON document. Malformed JSON yields a single `DecodeSkipped`.
    pub fn decode(&mut self, doc: &str) -> Vec<StreamEvent> {
        let state = &mut self.state;
        match self.dialect {
            Dialect::OpenAiSse => openai::decode(doc, state),
            Dialect::AnthropicSse => anthropic::decode(doc, state),
            Dialect::GeminiSse => gemini::decode(doc, state),
            Dialect::OllamaNdjson => ollama::decode(doc, state),
            Dialect::CliNdjson => cli::decode(doc, state),
        }
    }
}

fn skipped(err: serde_json::Error) -> Vec<StreamEvent> {
    vec![StreamEvent::DecodeSkipped(err.to_string())]
}

fn position_out_of_range() -> StreamEvent {
    StreamEvent::DecodeSkipped("tool call index out of range".into())
}

/// Serialize an already-complete argument value back to JSON text, so complete
/// calls flow through the same assembler path as fragmented ones.
fn argument_text(args: Option<&serde_json::Value>) -> String {
    match args {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(raw)) => raw.clone(),
        Some(v) => v.to_string(),
    }
}

/// Best-effort message from an `error` field that may be a string or object.
fn error_message(err: &serde_json::Value) -> String {
    match err {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string()),
        other => other.to_string(),
    }
}
