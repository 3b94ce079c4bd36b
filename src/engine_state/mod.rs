//! # Engine State Module
//!
//! The core engine module that owns the worker pool and the world handles, and
//! turns queued edits into world writes.
//!
//! ## Key Components
//!
//! * `EngineState` - The main state container for the engine
//! * `EditSession` - Collects one edit and commits it
//! * `commit_state` - Holds processed chunk edits until they are written
//! * `processing` - Batch processors and per-voxel filters
//! * `task_management` - Manages worker threads
//! * `voxels` - Blocks, chunk buffers, placement and host interfaces
//!
//! ## Commit Pipeline
//!
//! 1. Every chunk column of the edit becomes a task with private forks of the
//!    processor chain and the filter
//! 2. Workers run the tasks; the committing thread waits at the barrier
//! 3. Processed edits are written to the live world
//! 4. Processors, then the filter, flush deferred work, such as placement updates
//!    that crossed a chunk border
//! 5. Post-tick processors run over the written chunks
//!
//! Dropping an [`EditSession`] without committing discards its buffers. Nothing
//! is written and nothing is flushed.

use std::{collections::BTreeMap, sync::Arc};

use cgmath::Point3;
use web_time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::error::EngineError;
use commit_state::CommitState;
use processing::{
    filter::{Filter, LinkedFilter},
    BatchProcessor, BatchProcessorChain, ProcessorPhase,
};
use task_management::TaskManager;
use voxels::{
    block::{mask::PlacementMasks, registry::BlockRegistry, Ordinal, UNSET},
    chunk::{layer_of, ChunkPos, ChunkSet},
    host::{LiveExtent, PlacementResolver, WorldSnapshot},
    placement::{processor::PlacementStateProcessor, rules::ConnectionRules},
    tasks::chunk_processing_task::ChunkProcessingTask,
    world::MemoryWorld,
};

pub mod commit_state;
pub mod processing;
pub mod task_management;
pub mod voxels;

/// What a committed edit did.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSummary {
    /// Chunk columns the edit touched.
    pub chunks_processed: usize,
    /// Cells written while committing, post-tick writes included.
    pub cells_written: usize,
    /// Cells written by deferred work after the commit.
    pub deferred_updates: usize,
    /// Chunk jobs lost to dead workers.
    pub failed_chunks: usize,
    pub elapsed: Duration,
}

/// The main state container for the edit engine.
///
/// # Examples
///
/// ```
/// use voxel_edit_engine::{config::EngineConfig, engine_state::EngineState};
/// use voxel_edit_engine::engine_state::voxels::host::LiveExtent;
///
/// let config = EngineConfig { worker_count: 2, ..EngineConfig::default() };
/// let (mut engine, world) = EngineState::with_memory_world(config).unwrap();
/// let fence = engine.registry().default_state("oak_fence").unwrap().ordinal();
///
/// let mut edit = engine.edit().unwrap();
/// edit.set_block(0, 64, 0, fence).unwrap();
/// edit.set_block(1, 64, 0, fence).unwrap();
/// let summary = edit.commit().unwrap();
///
/// assert_eq!(summary.chunks_processed, 1);
/// let state = engine.registry().format_state(world.read_live_block(0, 64, 0).unwrap()).unwrap();
/// assert!(state.contains("east=true"));
/// ```
pub struct EngineState {
    config: EngineConfig,
    registry: Arc<BlockRegistry>,
    masks: Arc<PlacementMasks>,
    task_manager: TaskManager,
    snapshot: Arc<dyn WorldSnapshot>,
    extent: Arc<dyn LiveExtent>,
    resolver: Arc<dyn PlacementResolver>,
}

impl EngineState {
    /// Creates an engine editing the world behind `snapshot` and `extent`.
    pub fn new(
        config: EngineConfig,
        registry: Arc<BlockRegistry>,
        snapshot: Arc<dyn WorldSnapshot>,
        extent: Arc<dyn LiveExtent>,
        resolver: Arc<dyn PlacementResolver>,
    ) -> Self {
        let masks = Arc::new(PlacementMasks::new(&registry));
        let task_manager = TaskManager::new(config.worker_count);
        log::info!(
            "Engine ready: {} block types, {} states, layers {:?}",
            registry.type_count(),
            registry.state_count(),
            snapshot.layer_range()
        );
        EngineState {
            config,
            registry,
            masks,
            task_manager,
            snapshot,
            extent,
            resolver,
        }
    }

    /// Creates an engine over a fresh [`MemoryWorld`] sized from `config`, using
    /// the builtin block table and [`ConnectionRules`].
    pub fn with_memory_world(config: EngineConfig) -> Result<(Self, Arc<MemoryWorld>), EngineError> {
        let registry = Arc::new(BlockRegistry::builtin()?);
        let world = Arc::new(MemoryWorld::new(config.min_layer..=config.max_layer));
        let engine = EngineState::new(
            config,
            registry,
            world.clone(),
            world.clone(),
            Arc::new(ConnectionRules),
        );
        Ok((engine, world))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn masks(&self) -> &Arc<PlacementMasks> {
        &self.masks
    }

    /// A placement processor configured from the engine config.
    pub fn placement_processor(&self) -> Result<PlacementStateProcessor, EngineError> {
        PlacementStateProcessor::from_config(
            &self.config.placement,
            self.registry.clone(),
            self.masks.clone(),
            self.resolver.clone(),
            self.extent.clone(),
        )
    }

    /// Starts an edit. The placement processor is installed when enabled in the
    /// config.
    pub fn edit(&mut self) -> Result<EditSession<'_>, EngineError> {
        let mut chain = BatchProcessorChain::new();
        if self.config.placement.enabled {
            chain.add(Box::new(self.placement_processor()?));
        }
        Ok(EditSession {
            engine: self,
            sets: BTreeMap::new(),
            chain,
            filter: None,
        })
    }

    /// Runs one phase of `chain` over `sets` and waits for every chunk.
    fn run_phase(
        &mut self,
        phase: ProcessorPhase,
        sets: BTreeMap<ChunkPos, ChunkSet>,
        chain: &BatchProcessorChain,
        filter: Option<&dyn Filter>,
        commit_state: &mut CommitState,
    ) -> usize {
        for (position, set) in sets {
            self.task_manager.publish_task(Box::new(ChunkProcessingTask::new(
                position,
                set,
                phase,
                chain.fork_chain(),
                filter.map(|filter| filter.fork()),
                self.snapshot.clone(),
                self.extent.clone(),
            )));
            self.task_manager.process_completed_tasks(commit_state);
        }
        self.task_manager.join(commit_state);
        self.task_manager.take_failed_tasks()
    }
}

/// One edit against the engine's world.
pub struct EditSession<'e> {
    engine: &'e mut EngineState,
    sets: BTreeMap<ChunkPos, ChunkSet>,
    chain: BatchProcessorChain,
    filter: Option<Box<dyn Filter>>,
}

impl EditSession<'_> {
    /// Records a pending write.
    ///
    /// # Errors
    /// `ReservedOrdinal` for [`UNSET`], `UnknownOrdinal` for ordinals the registry
    /// does not know, `LayerOutOfRange` for heights outside the world.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, ordinal: Ordinal) -> Result<(), EngineError> {
        if ordinal == UNSET {
            return Err(EngineError::ReservedOrdinal { x, y, z });
        }
        if self.engine.registry.state(ordinal).is_none() {
            return Err(EngineError::UnknownOrdinal(ordinal));
        }
        let layer = layer_of(y);
        let range = self.engine.snapshot.layer_range();
        if !range.contains(&layer) {
            return Err(EngineError::LayerOutOfRange {
                layer,
                min: *range.start(),
                max: *range.end(),
            });
        }

        let position = ChunkPos::containing(x, z);
        self.sets
            .entry(position)
            .or_default()
            .set_block(x & 15, y, z & 15, ordinal);
        Ok(())
    }

    /// Parses `state` (e.g. `oak_stairs[facing=east]`) and records it.
    pub fn set_state(&mut self, x: i32, y: i32, z: i32, state: &str) -> Result<(), EngineError> {
        let ordinal = self.engine.registry.parse_state(state)?.ordinal();
        self.set_block(x, y, z, ordinal)
    }

    /// Sets every block of the box between `a` and `b`, both inclusive.
    ///
    /// # Returns
    /// The number of cells recorded.
    pub fn fill(&mut self, a: Point3<i32>, b: Point3<i32>, ordinal: Ordinal) -> Result<usize, EngineError> {
        let mut count = 0;
        for y in a.y.min(b.y)..=a.y.max(b.y) {
            for z in a.z.min(b.z)..=a.z.max(b.z) {
                for x in a.x.min(b.x)..=a.x.max(b.x) {
                    self.set_block(x, y, z, ordinal)?;
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    pub fn add_processor(&mut self, processor: Box<dyn BatchProcessor>) {
        self.chain.add(processor);
    }

    /// Adds a per-voxel filter. Filters run after the edit phase, in the order
    /// they were added.
    pub fn add_filter(&mut self, filter: Box<dyn Filter>) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => Box::new(LinkedFilter::link(existing, filter)),
            None => filter,
        });
    }

    pub fn chunk_count(&self) -> usize {
        self.sets.len()
    }

    pub fn edited_cell_count(&self) -> usize {
        self.sets.values().map(ChunkSet::edited_cell_count).sum()
    }

    /// Processes and writes the edit.
    ///
    /// Chunk jobs never fail the commit; errors writing the processed chunks or
    /// flushing deferred work are returned.
    pub fn commit(self) -> Result<EditSummary, EngineError> {
        let started = Instant::now();
        let EditSession {
            engine,
            sets,
            chain,
            filter,
        } = self;

        let chunks_processed = sets.len();
        let mut commit_state = CommitState::new(engine.extent.clone());
        let mut failed_chunks = engine.run_phase(
            ProcessorPhase::Edit,
            sets,
            &chain,
            filter.as_deref(),
            &mut commit_state,
        );
        let mut cells_written = commit_state.apply()?;
        let mut deferred_updates = chain.flush()?;
        if let Some(filter) = &filter {
            deferred_updates += filter.flush()?;
        }

        if chain.has_phase(ProcessorPhase::PostTick) {
            let written: BTreeMap<ChunkPos, ChunkSet> = commit_state
                .last_applied()
                .iter()
                .map(|position| (*position, ChunkSet::new()))
                .collect();
            failed_chunks += engine.run_phase(
                ProcessorPhase::PostTick,
                written,
                &chain,
                None,
                &mut commit_state,
            );
            cells_written += commit_state.apply()?;
        }

        let summary = EditSummary {
            chunks_processed,
            cells_written,
            deferred_updates,
            failed_chunks,
            elapsed: started.elapsed(),
        };
        log::info!(
            "Committed {} chunk(s): {} cells written, {} deferred updates, {} failed, in {:?}",
            summary.chunks_processed,
            summary.cells_written,
            summary.deferred_updates,
            summary.failed_chunks,
            summary.elapsed
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::host::LiveExtent;

    fn engine(workers: usize) -> (EngineState, Arc<MemoryWorld>) {
        let config = EngineConfig {
            worker_count: workers,
            ..EngineConfig::default()
        };
        EngineState::with_memory_world(config).unwrap()
    }

    #[test]
    fn set_block_validates_input() {
        let (mut engine, _world) = engine(0);
        let mut edit = engine.edit().unwrap();
        assert!(matches!(edit.set_block(0, 0, 0, UNSET), Err(EngineError::ReservedOrdinal { .. })));
        assert!(matches!(edit.set_block(0, 0, 0, u16::MAX), Err(EngineError::UnknownOrdinal(_))));
        assert!(matches!(edit.set_block(0, 4096, 0, 2), Err(EngineError::LayerOutOfRange { .. })));
        assert_eq!(edit.edited_cell_count(), 0);
    }

    #[test]
    fn fill_spans_chunks() {
        let (mut engine, world) = engine(2);
        let stone = engine.registry().default_state("stone").unwrap().ordinal();
        let mut edit = engine.edit().unwrap();
        assert_eq!(edit.fill(Point3::new(14, 0, 0), Point3::new(17, 1, 1), stone).unwrap(), 16);
        assert_eq!(edit.chunk_count(), 2);

        let summary = edit.commit().unwrap();
        assert_eq!(summary.chunks_processed, 2);
        assert_eq!(summary.cells_written, 16);
        assert_eq!(world.read_live_block(17, 1, 1).unwrap(), stone);
    }

    #[test]
    fn dropped_session_writes_nothing() {
        let (mut engine, world) = engine(1);
        let stone = engine.registry().default_state("stone").unwrap().ordinal();
        {
            let mut edit = engine.edit().unwrap();
            edit.set_block(0, 0, 0, stone).unwrap();
        }
        assert_eq!(world.column_count(), 0);
        assert_eq!(world.live_writes(), 0);
    }

    #[test]
    fn unknown_mask_names_fail_the_edit() {
        let mut config = EngineConfig {
            worker_count: 0,
            ..EngineConfig::default()
        };
        config.placement.mask = Some(vec!["marble".to_string()]);
        let (mut engine, _world) = EngineState::with_memory_world(config).unwrap();
        assert!(matches!(engine.edit(), Err(EngineError::UnknownBlockType(_))));
    }
}
