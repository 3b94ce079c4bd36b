//! # Commit State Module
//!
//! This module collects the processed edits of finished chunk jobs and writes
//! them to the live world once every job of the edit has completed.
//!
//! ## Architecture
//!
//! Chunk jobs never write to the world themselves. Their results hand a
//! [`ChunkWriteCommand`] to the `CommitState`, which holds it until
//! [`CommitState::apply`] is called after the barrier. Until then every job sees
//! the same pre-edit world, regardless of which chunks finished first.
//!
//! The state also keeps per-chunk write analytics, so callers can tell how much of
//! an edit actually reached the world.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use crate::engine_state::voxels::{
    chunk::{ChunkPos, ChunkSet},
    host::LiveExtent,
};
use crate::error::EngineError;

/// Analytics data for one chunk column.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWriteAnalytics {
    /// Layers handed to the world.
    pub layers_written: u64,
    /// Cells the world reported as written.
    pub cells_written: u64,
    /// Number of times the chunk has been committed.
    pub times_written: u64,
}

/// The processed edit of one chunk column, ready to be written.
pub struct ChunkWriteCommand {
    pub position: ChunkPos,
    pub set: ChunkSet,
}

impl ChunkWriteCommand {
    pub fn new(position: ChunkPos, set: ChunkSet) -> Self {
        ChunkWriteCommand { position, set }
    }
}

impl Debug for ChunkWriteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkWriteCommand")
            .field("position", &self.position)
            .field("layers", &self.set.layer_keys())
            .field("edited_cells", &self.set.edited_cell_count())
            .finish()
    }
}

/// Pending chunk writes of an edit and the analytics of past writes.
pub struct CommitState {
    extent: Arc<dyn LiveExtent>,
    pending: BTreeMap<ChunkPos, ChunkSet>,
    last_applied: Vec<ChunkPos>,
    analytics: HashMap<ChunkPos, ChunkWriteAnalytics>,
}

impl CommitState {
    pub fn new(extent: Arc<dyn LiveExtent>) -> Self {
        CommitState {
            extent,
            pending: BTreeMap::new(),
            last_applied: Vec::new(),
            analytics: HashMap::new(),
        }
    }

    /// Queues a command. Commands for the same chunk merge, later cells winning.
    pub fn write(&mut self, command: ChunkWriteCommand) {
        log::trace!("Queued {:?}", command);
        if command.set.is_empty() {
            return;
        }
        match self.pending.get_mut(&command.position) {
            Some(existing) => existing.merge(command.set),
            None => {
                self.pending.insert(command.position, command.set);
            }
        }
    }

    pub fn pending_chunk_count(&self) -> usize {
        self.pending.len()
    }

    /// Writes every queued command to the world through
    /// [`LiveExtent::write_layer`].
    ///
    /// A failing layer does not stop the others; the first error is returned once
    /// everything else has been written.
    ///
    /// # Returns
    /// The number of cells written.
    pub fn apply(&mut self) -> Result<usize, EngineError> {
        let mut written = 0;
        let mut first_error = None;
        self.last_applied.clear();

        for (position, set) in std::mem::take(&mut self.pending) {
            let analytics = self.analytics.entry(position).or_default();
            analytics.times_written += 1;
            for (layer, cells) in set.layers() {
                match self.extent.write_layer(position, layer, cells) {
                    Ok(count) => {
                        analytics.layers_written += 1;
                        analytics.cells_written += count as u64;
                        written += count;
                    }
                    Err(err) => {
                        log::error!("Writing layer {} of {:?} failed: {}", layer, position, err);
                        first_error.get_or_insert(err);
                    }
                }
            }
            self.last_applied.push(position);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }

    /// The chunks written by the last [`CommitState::apply`].
    pub fn last_applied(&self) -> &[ChunkPos] {
        &self.last_applied
    }

    pub fn analytics(&self, position: ChunkPos) -> Option<ChunkWriteAnalytics> {
        self.analytics.get(&position).copied()
    }

    /// Gets the total number of cells written across all chunks.
    pub fn get_total_cells_written(&self) -> u64 {
        self.analytics
            .values()
            .fold(0, |acc, analytics| acc + analytics.cells_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::{host::LiveExtent, world::MemoryWorld};

    #[test]
    fn writes_wait_for_apply_and_merge_per_chunk() {
        let world = Arc::new(MemoryWorld::new(0..=3));
        let mut commit_state = CommitState::new(world.clone());

        let mut first = ChunkSet::new();
        first.set_block(0, 0, 0, 5);
        first.set_block(1, 0, 0, 5);
        let mut second = ChunkSet::new();
        second.set_block(1, 0, 0, 6);
        commit_state.write(ChunkWriteCommand::new(ChunkPos::new(0, 0), first));
        commit_state.write(ChunkWriteCommand::new(ChunkPos::new(0, 0), second));
        commit_state.write(ChunkWriteCommand::new(ChunkPos::new(1, 0), ChunkSet::new()));

        assert_eq!(commit_state.pending_chunk_count(), 1);
        assert_eq!(world.read_live_block(1, 0, 0).unwrap(), 1);

        assert_eq!(commit_state.apply().unwrap(), 2);
        assert_eq!(world.read_live_block(0, 0, 0).unwrap(), 5);
        assert_eq!(world.read_live_block(1, 0, 0).unwrap(), 6);
        assert_eq!(commit_state.last_applied(), &[ChunkPos::new(0, 0)]);
        assert_eq!(
            commit_state.analytics(ChunkPos::new(0, 0)),
            Some(ChunkWriteAnalytics {
                layers_written: 1,
                cells_written: 2,
                times_written: 1,
            })
        );
        assert_eq!(commit_state.get_total_cells_written(), 2);
    }

    #[test]
    fn failed_layers_do_not_block_the_rest() {
        let world = Arc::new(MemoryWorld::new(0..=0));
        let mut commit_state = CommitState::new(world.clone());
        let mut set = ChunkSet::new();
        set.set_block(0, 0, 0, 5);
        set.set_block(0, 40, 0, 5);
        commit_state.write(ChunkWriteCommand::new(ChunkPos::new(0, 0), set));

        assert!(matches!(commit_state.apply(), Err(EngineError::LayerOutOfRange { layer: 2, .. })));
        assert_eq!(world.read_live_block(0, 0, 0).unwrap(), 5);
        assert_eq!(commit_state.pending_chunk_count(), 0);
    }
}
