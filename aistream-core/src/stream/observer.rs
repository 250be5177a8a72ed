//! Lifecycle notifications for one streamed request.
//!
//! Ordering guarantees:
//! - `on_start` fires exactly once, before any delta.
//! - Deltas are notified in chunk order.
//! - `on_tool_use` fires once per successfully parsed call, at finalize, before `on_end`.
//! - Exactly one of `on_end` / `on_error` fires, except on cancellation, which is silent.

use tokio::sync::mpsc;

use crate::error::ErrorKind;
use crate::model::{AggregatedResponse, ToolInvocation};

pub trait StreamObserver: Send {
    fn on_start(&mut self) {}
    fn on_delta(&mut self, _text: &str) {}
    fn on_tool_use(&mut self, _call: &ToolInvocation) {}
    fn on_end(&mut self, _response: &AggregatedResponse) {}
    fn on_error(&mut self, _kind: ErrorKind, _message: &str) {}
}

/// Observer that ignores everything. Used by `await_result`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

/// Owned form of each notification, for channel delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Start,
    Delta(String),
    ToolUse(ToolInvocation),
    End(AggregatedResponse),
    Error { kind: ErrorKind, message: String },
}

/// Push-based observer: forwards every notification into an unbounded channel.
/// A dropped receiver is not an error; notifications are then discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, ev: LifecycleEvent) {
        let _ = self.tx.send(ev);
    }
}

impl StreamObserver for ChannelObserver {
    fn on_start(&mut self) {
        self.send(LifecycleEvent::Start);
    }
    fn on_delta(&mut self, text: &str) {
        self.send(LifecycleEvent::Delta(text.to_string()));
    }
    fn on_tool_use(&mut self, call: &ToolInvocation) {
        self.send(LifecycleEvent::ToolUse(call.clone()));
    }
    fn on_end(&mut self, response: &AggregatedResponse) {
        self.send(LifecycleEvent::End(response.clone()));
    }
    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        self.send(LifecycleEvent::Error {
            kind,
            message: message.to_string(),
        });
    }
}

/// Test helper that records notifications in order.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub events: Vec<LifecycleEvent>,
}

#[cfg(test)]
impl StreamObserver for Recorder {
    fn on_start(&mut self) {
        self.events.push(LifecycleEvent::Start);
    }
    fn on_delta(&mut self, text: &str) {
        self.events.push(LifecycleEvent::Delta(text.to_string()));
    }
    fn on_tool_use(&mut self, call: &ToolInvocation) {
        self.events.push(LifecycleEvent::ToolUse(call.clone()));
    }
    fn on_end(&mut self, response: &AggregatedResponse) {
        self.events.push(LifecycleEvent::End(response.clone()));
    }
    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        self.events.push(LifecycleEvent::Error {
            kind,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_observer_forwards_in_order() {
        let (mut obs, mut rx) = ChannelObserver::channel();
        obs.on_start();
        obs.on_delta("a");
        obs.on_error(ErrorKind::TransportError, "reset");
        assert_eq!(rx.recv().await, Some(LifecycleEvent::Start));
        assert_eq!(rx.recv().await, Some(LifecycleEvent::Delta("a".into())));
        assert_eq!(
            rx.recv().await,
            Some(LifecycleEvent::Error { kind: ErrorKind::TransportError, message: "reset".into() })
        );
    }

    #[test]
    fn dropped_receiver_is_harmless() {
        let (mut obs, rx) = ChannelObserver::channel();
        drop(rx);
        obs.on_delta("ignored");
    }
}
