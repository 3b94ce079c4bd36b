//! # Chunk Processing Task
//!
//! This module defines the `ChunkProcessingTask`, the job that runs a chunk
//! column's pending edit through the processor chain and filter on a worker.

use std::sync::Arc;

use crate::engine_state::{
    commit_state::ChunkWriteCommand,
    processing::{
        filter::{apply_filter_to_chunk, Filter},
        BatchProcessorChain, ProcessorPhase,
    },
    task_management::task::{Task, TaskResult},
    voxels::{
        chunk::{ChunkGet, ChunkPos, ChunkSet},
        host::{LiveExtent, LiveReader, WorldSnapshot},
    },
};

/// A task that processes one chunk column of an edit.
///
/// This task is responsible for:
/// 1. Building the chunk's Get buffer over the world snapshot
/// 2. Running the processors of its phase over the pending edit
/// 3. Running the per-voxel filter, if any
/// 4. Handing the result back as a write command
pub struct ChunkProcessingTask {
    position: ChunkPos,
    set: ChunkSet,
    phase: ProcessorPhase,
    chain: BatchProcessorChain,
    filter: Option<Box<dyn Filter>>,
    snapshot: Arc<dyn WorldSnapshot>,
    extent: Arc<dyn LiveExtent>,
}

impl ChunkProcessingTask {
    /// Creates a new chunk processing task.
    ///
    /// `chain` and `filter` should be forks private to this task.
    pub fn new(
        position: ChunkPos,
        set: ChunkSet,
        phase: ProcessorPhase,
        chain: BatchProcessorChain,
        filter: Option<Box<dyn Filter>>,
        snapshot: Arc<dyn WorldSnapshot>,
        extent: Arc<dyn LiveExtent>,
    ) -> Self {
        ChunkProcessingTask {
            position,
            set,
            phase,
            chain,
            filter,
            snapshot,
            extent,
        }
    }
}

impl Task for ChunkProcessingTask {
    fn process(self: Box<Self>) -> Box<dyn TaskResult + Send> {
        let ChunkProcessingTask {
            position,
            set,
            phase,
            chain,
            filter,
            snapshot,
            extent,
        } = *self;

        let get = ChunkGet::new(position, snapshot);
        let set = chain.process_phase(phase, position, &get, set);
        let set = match filter {
            Some(mut filter) => {
                let live = LiveReader(extent.as_ref());
                apply_filter_to_chunk(filter.as_mut(), position, &get, set, &live)
            }
            None => set,
        };

        log::trace!(
            "Processed {:?} ({:?}): {} edited cells, {} layers loaded",
            position,
            phase,
            set.edited_cell_count(),
            get.loaded_layer_count()
        );

        Box::new(ChunkProcessingTaskResult { position, set })
    }
}

/// The processed edit of one chunk column.
pub struct ChunkProcessingTaskResult {
    position: ChunkPos,
    set: ChunkSet,
}

impl TaskResult for ChunkProcessingTaskResult {
    /// Queues the processed edit for writing.
    fn handle_result(self: Box<Self>) -> ChunkWriteCommand {
        ChunkWriteCommand::new(self.position, self.set)
    }
}
