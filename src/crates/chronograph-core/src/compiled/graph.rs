//! CompiledGraph struct and builder methods

use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::interrupt::InterruptConfig;
use chronograph_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

/// Compiled graph ready for execution
///
/// Cloning is cheap. Only one invocation at a time may advance a given
/// lineage of a given checkpoint saver, across clones and compilations.
#[derive(Clone)]
pub struct CompiledGraph {
    pub(crate) graph: Arc<Graph>,
    pub(crate) checkpoint_saver: Arc<dyn CheckpointSaver>,
    pub(crate) config: EngineConfig,
}

impl CompiledGraph {
    pub(crate) fn new(graph: Graph, config: EngineConfig) -> Self {
        Self {
            graph: Arc::new(graph),
            checkpoint_saver: Arc::new(InMemoryCheckpointSaver::new()),
            config,
        }
    }

    /// Set the checkpoint saver
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpoint_saver = saver;
        self
    }

    /// Replace the interrupt configuration.
    ///
    /// Fails when an interrupt names a node that does not exist.
    pub fn with_interrupt_config(mut self, interrupt: InterruptConfig) -> Result<Self> {
        interrupt.validate_nodes(&self.graph)?;
        self.config.interrupt = interrupt;
        Ok(self)
    }

    /// Get a reference to the underlying graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the interrupt configuration
    pub fn interrupt_config(&self) -> &InterruptConfig {
        &self.config.interrupt
    }

    pub fn checkpointer(&self) -> Arc<dyn CheckpointSaver> {
        self.checkpoint_saver.clone()
    }

    pub(crate) fn locks(&self) -> LineageLocks {
        LineageLocks::new(self.checkpoint_saver.clone())
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("graph", &self.graph)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Lineages currently being advanced, keyed by checkpoint saver address
fn active_lineages() -> &'static Mutex<HashSet<(usize, String)>> {
    static ACTIVE: OnceLock<Mutex<HashSet<(usize, String)>>> = OnceLock::new();
    ACTIVE.get_or_init(Default::default)
}

/// Single-writer registry for the lineages of one checkpoint saver.
///
/// Every graph that persists into the same saver shares the same set of
/// claimed lineages, whether it is a clone or a separate compilation.
#[derive(Clone)]
pub(crate) struct LineageLocks {
    saver: Arc<dyn CheckpointSaver>,
}

impl LineageLocks {
    pub(crate) fn new(saver: Arc<dyn CheckpointSaver>) -> Self {
        Self { saver }
    }

    fn key(&self, lineage_id: &str) -> (usize, String) {
        (
            Arc::as_ptr(&self.saver) as *const () as usize,
            lineage_id.to_string(),
        )
    }

    /// Claim `lineage_id` until the guard drops
    pub(crate) fn acquire(&self, lineage_id: &str) -> Result<LineageGuard> {
        let key = self.key(lineage_id);
        if !active_lineages().lock().insert(key.clone()) {
            return Err(GraphError::ConcurrentLineage {
                lineage_id: lineage_id.to_string(),
            });
        }
        Ok(LineageGuard {
            _saver: self.saver.clone(),
            key,
        })
    }
}
