//! # Filter Chain
//!
//! Filters are per-voxel transformations. A filter sees one voxel at a time
//! through a [`VoxelCursor`], may rewrite it, and is told through
//! [`Filter::finish`] when a chunk is done.
//!
//! ## Forking
//!
//! Chunks are processed in parallel, so every worker gets its own copy of the
//! filter made with [`Filter::fork`]. Each filter carries a [`FilterLineage`]:
//! a fresh id per instance, plus the id of the instance it was originally forked
//! from. That lineage is what [`LinkedFilter::fork_with`] uses to decide how to
//! combine a linked filter with another one, instead of guessing from types.
//!
//! Filters that accumulate statistics keep them in shared atomics, so a fork
//! reports into the same totals as its origin.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use cgmath::Point3;

use crate::engine_state::voxels::{
    block::{mask::BlockTypeMask, registry::BlockRegistry, Ordinal, AIR, UNSET},
    chunk::{layer_index, local_coordinates, ChunkGet, ChunkPos, ChunkSet, ChunkView, CHUNK_SIZE},
    host::BlockReader,
};
use crate::error::EngineError;

static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(1);

fn next_filter_id() -> u64 {
    NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of a filter instance and of the instance it descends from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FilterLineage {
    id: u64,
    origin: u64,
}

impl FilterLineage {
    /// A new, unrelated lineage.
    pub fn new() -> Self {
        let id = next_filter_id();
        FilterLineage { id, origin: id }
    }

    /// The lineage of a fresh fork: a new id, the same origin.
    pub fn fork(&self) -> Self {
        FilterLineage {
            id: next_filter_id(),
            origin: self.origin,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn origin(&self) -> u64 {
        self.origin
    }

    /// Whether `self` is a different instance forked from the same origin as `other`.
    pub fn is_fork_of(&self, other: &FilterLineage) -> bool {
        self.origin == other.origin && self.id != other.id
    }
}

impl Default for FilterLineage {
    fn default() -> Self {
        Self::new()
    }
}

/// A per-voxel transformation.
pub trait Filter: Send {
    /// Processes the voxel under the cursor.
    fn apply_to_voxel(&mut self, voxel: &mut VoxelCursor<'_>);

    /// Called once after every voxel of a chunk has been visited.
    fn finish(&mut self) {}

    /// Creates an independent copy for use on another chunk.
    fn fork(&self) -> Box<dyn Filter>;

    /// Runs work deferred by this filter and its forks. Called once on the
    /// filter an edit was given, after every chunk of the edit is written.
    ///
    /// # Returns
    /// The number of blocks written.
    fn flush(&self) -> Result<usize, EngineError> {
        Ok(0)
    }

    fn lineage(&self) -> FilterLineage;
}

/// A movable view of one voxel inside a chunk job.
///
/// Reads resolve through the pending edit first and fall back to the pre-edit
/// contents; writes go to the pending edit, allocating its layer on first use.
pub struct VoxelCursor<'a> {
    chunk: ChunkPos,
    get: &'a ChunkGet,
    set: &'a mut ChunkSet,
    outside: &'a dyn BlockReader,
    layer: i32,
    index: usize,
}

impl<'a> VoxelCursor<'a> {
    pub fn new(chunk: ChunkPos, get: &'a ChunkGet, set: &'a mut ChunkSet, outside: &'a dyn BlockReader) -> Self {
        VoxelCursor {
            chunk,
            get,
            set,
            outside,
            layer: 0,
            index: 0,
        }
    }

    /// Moves to cell `index` of `layer`.
    pub fn move_to(&mut self, layer: i32, index: usize) {
        self.layer = layer;
        self.index = index;
    }

    pub fn chunk(&self) -> ChunkPos {
        self.chunk
    }

    pub fn layer(&self) -> i32 {
        self.layer
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Local `(x, y, z)` of the cell inside its layer.
    pub fn local(&self) -> (i32, i32, i32) {
        local_coordinates(self.index)
    }

    /// World position of the cell.
    pub fn position(&self) -> Point3<i32> {
        self.chunk.world_position(self.layer, self.index)
    }

    /// Whether the pending edit has an allocated array for `layer`.
    pub fn has_pending_layer(&self, layer: i32) -> bool {
        self.set.load_if_present(layer).is_some()
    }

    /// The pending ordinal, [`UNSET`] when the cell is not edited. Never allocates
    /// and never loads pre-edit data.
    pub fn pending(&self) -> Ordinal {
        self.set
            .load_if_present(self.layer)
            .map(|cells| cells[self.index])
            .unwrap_or(UNSET)
    }

    /// The effective ordinal: pending if edited, pre-edit otherwise.
    pub fn try_ordinal(&self) -> Result<Ordinal, EngineError> {
        match self.pending() {
            UNSET => Ok(self.get.load(self.layer)?[self.index]),
            pending => Ok(pending),
        }
    }

    /// Like [`VoxelCursor::try_ordinal`], reading failures as [`AIR`].
    pub fn ordinal(&self) -> Ordinal {
        self.try_ordinal().unwrap_or_else(|err| {
            log::warn!("Reading voxel {:?} failed, using air: {}", self.position(), err);
            AIR
        })
    }

    /// Records a pending write for the cell.
    pub fn set_ordinal(&mut self, ordinal: Ordinal) {
        self.set.load(self.layer)[self.index] = ordinal;
    }

    /// The effective world around the cell.
    pub fn world(&self) -> ChunkView<'_> {
        ChunkView {
            chunk: self.chunk,
            get: self.get,
            set: self.set,
            outside: self.outside,
        }
    }
}

/// Drives `filter` over every voxel of a chunk in layer, y, z, x order and then
/// finishes it.
pub fn apply_filter_to_chunk(
    filter: &mut dyn Filter,
    chunk: ChunkPos,
    get: &ChunkGet,
    mut set: ChunkSet,
    outside: &dyn BlockReader,
) -> ChunkSet {
    {
        let mut cursor = VoxelCursor::new(chunk, get, &mut set, outside);
        for layer in get.layer_range() {
            for index in 0..CHUNK_SIZE as usize {
                cursor.move_to(layer, index);
                filter.apply_to_voxel(&mut cursor);
            }
        }
    }
    filter.finish();
    set
}

/// Two filters run one after the other on every voxel.
pub struct LinkedFilter {
    parent: Box<dyn Filter>,
    child: Box<dyn Filter>,
    lineage: FilterLineage,
}

impl LinkedFilter {
    /// Runs `parent`, then `child`, on every voxel.
    pub fn link(parent: Box<dyn Filter>, child: Box<dyn Filter>) -> Self {
        LinkedFilter {
            parent,
            child,
            lineage: FilterLineage::new(),
        }
    }

    pub fn parent(&self) -> &dyn Filter {
        self.parent.as_ref()
    }

    pub fn child(&self) -> &dyn Filter {
        self.child.as_ref()
    }

    /// Combines this filter with `other`.
    ///
    /// * `other` is this very instance: returned unchanged
    /// * `other` is a fresh fork of the parent: the link is rebuilt around it,
    ///   keeping the current child and whatever it has accumulated
    /// * anything else: this filter becomes the parent of `other`
    pub fn fork_with(self, other: Box<dyn Filter>) -> Box<dyn Filter> {
        let other_lineage = other.lineage();
        if other_lineage.id() == self.lineage.id() {
            return Box::new(self);
        }
        if other_lineage.is_fork_of(&self.parent.lineage()) {
            log::trace!("Relinking forked parent {} into filter {}", other_lineage.id(), self.lineage.id());
            return Box::new(LinkedFilter {
                parent: other,
                child: self.child,
                lineage: self.lineage.fork(),
            });
        }
        Box::new(LinkedFilter::link(Box::new(self), other))
    }
}

impl Filter for LinkedFilter {
    fn apply_to_voxel(&mut self, voxel: &mut VoxelCursor<'_>) {
        self.parent.apply_to_voxel(voxel);
        self.child.apply_to_voxel(voxel);
    }

    fn finish(&mut self) {
        self.parent.finish();
        self.child.finish();
    }

    fn fork(&self) -> Box<dyn Filter> {
        Box::new(LinkedFilter {
            parent: self.parent.fork(),
            child: self.child.fork(),
            lineage: self.lineage.fork(),
        })
    }

    /// Flushes the parent, then the child. A parent error skips the child.
    fn flush(&self) -> Result<usize, EngineError> {
        Ok(self.parent.flush()? + self.child.flush()?)
    }

    fn lineage(&self) -> FilterLineage {
        self.lineage
    }
}

/// Totals gathered by a [`CountingFilter`] and all of its forks.
#[derive(Debug, Default)]
pub struct FilterStats {
    pub visited: AtomicU64,
    pub edited: AtomicU64,
    pub finished: AtomicU64,
}

/// Counts visited voxels, voxels with a pending edit, and finished chunks.
pub struct CountingFilter {
    stats: Arc<FilterStats>,
    lineage: FilterLineage,
}

impl CountingFilter {
    pub fn new() -> Self {
        CountingFilter {
            stats: Arc::new(FilterStats::default()),
            lineage: FilterLineage::new(),
        }
    }

    pub fn stats(&self) -> Arc<FilterStats> {
        self.stats.clone()
    }
}

impl Default for CountingFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for CountingFilter {
    fn apply_to_voxel(&mut self, voxel: &mut VoxelCursor<'_>) {
        self.stats.visited.fetch_add(1, Ordering::Relaxed);
        if voxel.pending() != UNSET {
            self.stats.edited.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn finish(&mut self) {
        self.stats.finished.fetch_add(1, Ordering::Relaxed);
    }

    fn fork(&self) -> Box<dyn Filter> {
        Box::new(CountingFilter {
            stats: self.stats.clone(),
            lineage: self.lineage.fork(),
        })
    }

    fn lineage(&self) -> FilterLineage {
        self.lineage
    }
}

/// Replaces every voxel whose type is in a mask with one fixed state.
pub struct ReplaceFilter {
    registry: Arc<BlockRegistry>,
    mask: Arc<BlockTypeMask>,
    replacement: Ordinal,
    lineage: FilterLineage,
}

impl ReplaceFilter {
    pub fn new(registry: Arc<BlockRegistry>, mask: BlockTypeMask, replacement: Ordinal) -> Self {
        ReplaceFilter {
            registry,
            mask: Arc::new(mask),
            replacement,
            lineage: FilterLineage::new(),
        }
    }
}

impl Filter for ReplaceFilter {
    fn apply_to_voxel(&mut self, voxel: &mut VoxelCursor<'_>) {
        let ordinal = voxel.ordinal();
        if ordinal != self.replacement && self.mask.contains(&self.registry, ordinal) {
            voxel.set_ordinal(self.replacement);
        }
    }

    fn fork(&self) -> Box<dyn Filter> {
        Box::new(ReplaceFilter {
            registry: self.registry.clone(),
            mask: self.mask.clone(),
            replacement: self.replacement,
            lineage: self.lineage.fork(),
        })
    }

    fn lineage(&self) -> FilterLineage {
        self.lineage
    }
}

/// Whether `index` is the last cell of its y row in scan order.
pub(crate) fn is_row_end(index: usize) -> bool {
    let (x, _, z) = local_coordinates(index);
    x == 15 && z == 15
}
