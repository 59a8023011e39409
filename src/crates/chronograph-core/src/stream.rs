//! Streaming execution events
//!
//! [`CompiledGraph::stream`](crate::CompiledGraph::stream) runs the superstep
//! loop on a spawned task and hands events to the caller through a bounded
//! channel. One [`StreamEvent::Checkpoint`] is emitted per committed
//! checkpoint, in commit order, including the checkpoint that records the
//! input. A paused run ends with [`StreamEvent::Interrupted`]; a failed run
//! ends with an `Err` item.
//!
//! ```text
//!   PregelLoop ──commit──> StreamEvent ──mpsc(stream_buffer)──> consumer
//!        ↑                                                        │
//!        └──── stops between supersteps when the consumer drops ──┘
//! ```
//!
//! The producer waits when the buffer is full, so a slow consumer slows the
//! run down instead of growing memory.

use crate::compiled::StateSnapshot;
use crate::interrupt::InterruptState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A checkpoint was committed
    Checkpoint(StateSnapshot),

    /// The run paused; `snapshot` is the resumable checkpoint
    Interrupted {
        interrupt: InterruptState,
        snapshot: StateSnapshot,
    },
}

impl StreamEvent {
    pub fn snapshot(&self) -> &StateSnapshot {
        match self {
            StreamEvent::Checkpoint(snapshot) => snapshot,
            StreamEvent::Interrupted { snapshot, .. } => snapshot,
        }
    }

    pub fn into_snapshot(self) -> StateSnapshot {
        match self {
            StreamEvent::Checkpoint(snapshot) => snapshot,
            StreamEvent::Interrupted { snapshot, .. } => snapshot,
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, StreamEvent::Interrupted { .. })
    }
}
