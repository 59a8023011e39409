//! # chronograph-checkpoint - State Persistence for Graph Execution
//!
//! **Checkpoint model and storage abstraction** for the chronograph engine.
//! After every superstep the engine writes one immutable [`Checkpoint`] to a
//! [`CheckpointSaver`]. Checkpoints of one lineage form a tree through their
//! parent pointers; that tree is what makes time travel, resume and replay
//! possible.
//!
//! ## Core Concepts
//!
//! ### 1. CheckpointSaver Trait
//!
//! The [`CheckpointSaver`] trait is the storage interface:
//!
//! - **`put()`** - Store a checkpoint under a lineage, naming its parent
//! - **`get_tuple()`** - Load a checkpoint by id, or the latest of a lineage
//! - **`list()`** - Query history newest first with `before` / `limit` / metadata filters
//!
//! ### 2. Checkpoint Structure
//!
//! A [`Checkpoint`] holds the full channel map, per-channel versions and the
//! `next` frontier. Its [`CheckpointMetadata`] records the source
//! (`input` / `loop` / `update`), the superstep index, which nodes ran and the
//! exact ordered writes that produced it from its parent.
//!
//! ### 3. Identifiers
//!
//! Checkpoint ids come from [`new_checkpoint_id`]: UUID-shaped, time-ordered
//! and strictly increasing within a process, so string order is creation order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chronograph_checkpoint::{
//!     InMemoryCheckpointSaver, CheckpointSaver, CheckpointConfig,
//!     Checkpoint, CheckpointMetadata,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = InMemoryCheckpointSaver::new();
//!
//!     let config = CheckpointConfig::for_lineage("lineage-123");
//!     let saved = saver
//!         .put(&config, Checkpoint::empty(), CheckpointMetadata::default())
//!         .await?;
//!     println!("Checkpoint saved with ID: {:?}", saved.checkpoint_id);
//!
//!     if let Some(tuple) = saver.get_tuple(&saved).await? {
//!         println!("Retrieved checkpoint: {:?}", tuple.checkpoint.id);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`checkpoint`] - [`Checkpoint`], [`CheckpointConfig`], [`CheckpointMetadata`], [`Write`]
//! - [`traits`] - [`CheckpointSaver`] trait and [`CheckpointStream`]
//! - [`memory`] - [`InMemoryCheckpointSaver`] reference implementation
//! - [`serializer`] - Serialization protocol used by stores
//! - [`id`] - Time-ordered checkpoint ids
//! - [`error`] - [`CheckpointError`] types

pub mod checkpoint;
pub mod error;
pub mod id;
pub mod memory;
pub mod serializer;
pub mod traits;

// Re-export main types
pub use checkpoint::{
    ChannelValues, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointMetadata,
    CheckpointSource, CheckpointTuple, Write,
};
pub use error::{CheckpointError, Result};
pub use id::{new_checkpoint_id, CheckpointId};
pub use memory::InMemoryCheckpointSaver;
pub use serializer::{JsonSerializer, SerializerProtocol};
pub use traits::{metadata_matches, CheckpointSaver, CheckpointStream, MetadataFilter};
