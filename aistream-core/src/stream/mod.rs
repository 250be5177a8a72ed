//! The streaming aggregation engine.
//!
//! bytes → [`framer`] → [`classifier`] → [`decoder`] → [`event::StreamEvent`]
//! → [`aggregator`] (tool fragments via [`assembler`]) → `AggregatedResponse`.

pub mod aggregator;
pub mod assembler;
pub mod classifier;
pub mod decoder;
pub mod event;
pub mod framer;
pub mod observer;
pub mod session;

pub use aggregator::{Phase, ResponseAggregator};
pub use assembler::ToolArgumentPolicy;
pub use decoder::Dialect;
pub use event::{PendingKey, StreamEvent, ToolCallFragment, UsageReport};
pub use observer::{ChannelObserver, LifecycleEvent, NoopObserver, StreamObserver};
pub use session::{await_result, start, EofPolicy, StreamHandle, StreamSession};
