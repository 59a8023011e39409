//! Superstep execution engine
//!
//! Execution proceeds in **supersteps**. Every superstep runs the current
//! frontier of nodes concurrently against one read-only snapshot, folds their
//! writes through the channel reducers, routes to the next frontier and
//! persists the result as a new checkpoint before anything else happens.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Superstep lifecycle                     │
//! │                                                             │
//! │  head checkpoint (values, versions, next)                   │
//! │     │                                                       │
//! │     ├─ interrupt-before hit? ──────────────> SUSPENDED      │
//! │     ├─ cancelled? ─────────────────────────> Cancelled      │
//! │     ├─ recursion limit hit? ───────────────> RecursionLimit │
//! │     ↓                                                       │
//! │  run frontier (parallel, same snapshot)                     │
//! │     ├─ any node failed? ───────────────────> NodeExecution  │
//! │     ↓                                                       │
//! │  fold writes (node name order) ──> route ──> persist        │
//! │     │                                                       │
//! │     ├─ interrupt-after hit? ───────────────> SUSPENDED      │
//! │     ├─ next frontier empty? ───────────────> COMPLETED      │
//! │     ↓                                                       │
//! │  next superstep                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed superstep commits nothing: the head checkpoint stays the last
//! committed state and is always a valid point to resume or fork from.
//!
//! The interrupt-before check comes first, so a run stopped by cancellation
//! or the recursion limit never leaves behind a frontier that should have
//! paused but did not.
//!
//! # Module Organization
//!
//! - [`algo`] - frontier routing and input commits, pure functions
//! - [`executor`] - concurrent node execution with retries
//! - [`loop_impl`] - the superstep loop

pub mod algo;
pub mod executor;
pub mod loop_impl;

pub use algo::{next_frontier, INPUT, UPDATE};
pub use executor::{SuperstepOutcome, TaskExecutor};
pub use loop_impl::{LoopOutcome, PregelLoop};
