//! CompiledGraph execution engine
//!
//! Once a graph is built with [`StateGraph`](crate::StateGraph) and compiled
//! it becomes a [`CompiledGraph`] that can advance any number of lineages.
//! Each lineage is an independent tree of checkpoints in the configured
//! checkpoint saver.
//!
//! # Key Types
//!
//! - [`CompiledGraph`] - The executable graph runtime
//! - [`RunConfig`] - Which lineage to advance, from where, with which cancel token
//! - [`StateSnapshot`] - Point-in-time view of a checkpoint
//! - [`EventStream`] - Async stream of execution events
//!
//! # Operations
//!
//! | Method | Writes | Takes lineage lock |
//! |---|---|---|
//! | `invoke` / `resume` / `stream` | checkpoints per superstep | yes |
//! | `update_state` | one forked checkpoint | yes |
//! | `get_state` / `get_state_at` / `get_state_history*` / `replay` | nothing | no |

mod execution;
mod graph;
mod state;
mod streaming;
mod types;

pub use graph::CompiledGraph;
pub use types::{EventStream, RunConfig, StateSnapshot, StateSnapshotStream};
