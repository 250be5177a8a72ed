//! Tool-call assembler: accumulates fragmented arguments per `PendingKey` and
//! parses each buffer exactly once, at finalize.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::ToolInvocation;
use crate::stream::event::{PendingKey, ToolCallFragment};

/// What to do with a call whose arguments never became valid JSON.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolArgumentPolicy {
    /// Omit the call and keep the rest of the response.
    #[default]
    Drop,
    /// Fail the whole request.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    pub key: PendingKey,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// A call that could not be finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedToolCall {
    pub id: String,
    pub name: Option<String>,
    pub raw_arguments: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Finalized {
    /// In first-seen key order.
    pub completed: Vec<ToolInvocation>,
    pub rejected: Vec<RejectedToolCall>,
}

#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    pending: HashMap<PendingKey, PendingToolCall>,
    order: Vec<PendingKey>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }

    #[cfg(test)]
    fn get(&self, key: PendingKey) -> Option<&PendingToolCall> {
        self.pending.get(&key)
    }

    /// Fold one fragment into its accumulator. Argument text is appended
    /// verbatim in arrival order; name and id are write-once.
    pub fn apply(&mut self, fragment: ToolCallFragment) {
        let ToolCallFragment { key, id, name, arguments } = fragment;
        let call = self.pending.entry(key).or_insert_with(|| {
            self.order.push(key);
            PendingToolCall {
                key,
                id: None,
                name: None,
                arguments: String::new(),
            }
        });

        if let Some(name) = name {
            match &call.name {
                None => call.name = Some(name),
                Some(existing) if *existing != name => {
                    tracing::debug!(position = key.0, %existing, ignored = %name, "tool call name already set");
                }
                Some(_) => {}
            }
        }
        if let Some(id) = id {
            match &call.id {
                None => call.id = Some(id),
                Some(existing) if *existing != id => {
                    tracing::warn!(position = key.0, %existing, ignored = %id, "conflicting tool call id for one position");
                }
                Some(_) => {}
            }
        }
        call.arguments.push_str(&arguments);
    }

    /// Parse every accumulated buffer. Failures are scoped to their own call.
    pub fn finalize(self) -> Finalized {
        let Self { mut pending, order } = self;
        let mut out = Finalized::default();
        for key in order {
            let Some(call) = pending.remove(&key) else {
                continue;
            };
            let id = call.id.clone().unwrap_or_else(|| format!("call_{}", key.0));
            let Some(name) = call.name.clone() else {
                out.rejected.push(RejectedToolCall {
                    id,
                    name: None,
                    raw_arguments: call.arguments,
                    reason: "tool call never received a name".into(),
                });
                continue;
            };
            let raw = call.arguments.trim();
            let parsed = if raw.is_empty() {
                Ok(serde_json::Value::Object(Default::default()))
            } else {
                serde_json::from_str::<serde_json::Value>(raw)
            };
            match parsed {
                Ok(arguments) => out.completed.push(ToolInvocation { id, name, arguments }),
                Err(e) => out.rejected.push(RejectedToolCall {
                    id,
                    name: Some(name),
                    raw_arguments: call.arguments,
                    reason: e.to_string(),
                }),
            }
        }
        out
    }
}
