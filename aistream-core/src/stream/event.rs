//! Normalized events produced by the dialect decoders.
//!
//! Contract:
//! - A single decoded document may yield several events (text, finish, usage).
//! - `StreamDone` is emitted at most once per session; the aggregator ignores
//!   anything after it.
//! - `DecodeSkipped` never advances the session out of `Idle`.

use crate::model::FinishReason;

/// Identifies one tool call across its fragments.
///
/// This is the call's position for its whole lifetime. Provider ids are
/// recorded on the accumulator, never used to re-key it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingKey(pub usize);

/// One piece of a tool call. Arguments are raw JSON text, possibly partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub key: PendingKey,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

impl ToolCallFragment {
    pub fn new(position: usize) -> Self {
        Self {
            key: PendingKey(position),
            id: None,
            name: None,
            arguments: String::new(),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn arguments(mut self, args: impl Into<String>) -> Self {
        self.arguments = args.into();
        self
    }
}

/// Usage counters as reported by one chunk. Absent counters leave the
/// previously reported value untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageReport {
    pub prompt: Option<u64>,
    pub completion: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Response identity, possibly revealed mid-stream.
    Metadata {
        id: Option<String>,
        model: Option<String>,
    },
    TextDelta(String),
    ToolCallFragment(ToolCallFragment),
    FinishReason(FinishReason),
    UsageReport(UsageReport),
    /// The provider reported an error inside the stream body.
    UpstreamError(String),
    StreamDone,
    /// A candidate line that could not be decoded. Non-fatal.
    DecodeSkipped(String),
}

impl StreamEvent {
    pub(crate) fn usage(prompt: Option<u64>, completion: Option<u64>) -> Option<Self> {
        if prompt.is_none() && completion.is_none() {
            None
        } else {
            Some(Self::UsageReport(UsageReport { prompt, completion }))
        }
    }

    pub(crate) fn metadata(id: Option<&str>, model: Option<&str>) -> Option<Self> {
        let id = id.filter(|s| !s.is_empty()).map(str::to_string);
        let model = model.filter(|s| !s.is_empty()).map(str::to_string);
        if id.is_none() && model.is_none() {
            None
        } else {
            Some(Self::Metadata { id, model })
        }
    }
}
