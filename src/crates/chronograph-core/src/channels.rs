//! Channel store
//!
//! Folds batches of writes into a channel map through each channel's reducer.
//! The store never mutates its input: every commit produces a new map and a
//! new version table, which become part of the next checkpoint.
//!
//! Fold order is fixed: writers in ascending name order, each writer's writes
//! in emission order. Channel versions increase by one for every channel that
//! received at least one write in the batch.

use crate::error::CommitError;
use crate::graph::{ChannelSpec, NodeId};
use chronograph_checkpoint::{ChannelValues, ChannelVersions, Write};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Result of folding one batch of writes
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub values: ChannelValues,
    pub versions: ChannelVersions,
    /// Channels that received writes, ascending
    pub updated: Vec<String>,
}

/// Read and fold access to the declared channels of a graph
#[derive(Debug, Clone, Copy)]
pub struct ChannelStore<'g> {
    channels: &'g HashMap<String, ChannelSpec>,
}

impl<'g> ChannelStore<'g> {
    pub fn new(channels: &'g HashMap<String, ChannelSpec>) -> Self {
        Self { channels }
    }

    pub fn get<'v>(&self, values: &'v ChannelValues, name: &str) -> Option<&'v Value> {
        values.get(name)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Fold `writes` (writer name -> ordered writes) into `values`.
    ///
    /// Every write is checked against the declared channels before anything
    /// is folded, so a batch with one bad write changes nothing.
    pub fn apply(
        &self,
        values: &ChannelValues,
        versions: &ChannelVersions,
        writes: &BTreeMap<NodeId, Vec<Write>>,
    ) -> Result<Applied, CommitError> {
        for (node, batch) in writes {
            if let Some(bad) = batch.iter().find(|w| !self.is_declared(&w.channel)) {
                return Err(CommitError::UnknownChannel {
                    node: node.clone(),
                    channel: bad.channel.clone(),
                });
            }
        }

        let mut next_values = values.clone();
        let mut updated = BTreeSet::new();

        for (node, batch) in writes {
            for write in batch {
                let Some(spec) = self.channels.get(&write.channel) else {
                    continue;
                };
                let merged = spec
                    .reducer
                    .reduce(next_values.get(&write.channel), write.value.clone())
                    .map_err(|source| CommitError::Reducer {
                        node: node.clone(),
                        channel: write.channel.clone(),
                        source,
                    })?;
                next_values.insert(write.channel.clone(), merged);
                updated.insert(write.channel.clone());
            }
        }

        let mut next_versions = versions.clone();
        for channel in &updated {
            *next_versions.entry(channel.clone()).or_insert(0) += 1;
        }

        Ok(Applied {
            values: next_values,
            versions: next_versions,
            updated: updated.into_iter().collect(),
        })
    }
}
