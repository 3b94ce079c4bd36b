//! # Placement Processor
//!
//! [`PlacementStateProcessor`] recomputes the placement-dependent state of every
//! edited voxel whose type is in its working mask, e.g. the connections of a fence
//! or the shape of a stair.
//!
//! ## Passes
//!
//! Work happens one y row of one layer at a time:
//!
//! 1. **First pass.** Every edited voxel of the row is recomputed in x, z order.
//!    Unedited voxels are only looked at when `include_unedited` is set.
//! 2. **Second pass.** When a recompute changed a stair, or any type of the ripple
//!    mask while second passes are enabled, its four planar neighbors are revisited
//!    right after the row. Neighbors outside the chunk are not recomputed; their
//!    absolute position goes to the cross-chunk queue instead.
//! 3. **Flush.** After every chunk of the edit is written, [`BatchProcessor::flush`]
//!    drains the cross-chunk queue against the live world.
//!
//! Edited voxels of the ripple mask that sit on the chunk border queue themselves
//! as well, so two connecting blocks edited in neighboring chunks of the same edit
//! see each other once both are written.
//!
//! Each row revisits a neighbor at most once, however many of its neighbors
//! changed, and `flush` handles each queued position once. A voxel is therefore
//! recomputed at most three times per edit.

use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use cgmath::Point3;
use crossbeam_channel::{Receiver, Sender};

use crate::config::PlacementConfig;
use crate::engine_state::processing::{
    filter::{is_row_end, Filter, FilterLineage, VoxelCursor},
    BatchProcessor, ProcessorScope,
};
use crate::engine_state::voxels::{
    block::{
        mask::{BlockTypeMask, PlacementMasks},
        registry::BlockRegistry,
        BlockState, Ordinal, UNSET,
    },
    chunk::{layer_index, ChunkGet, ChunkPos, ChunkSet, CHUNK_DIMENSION, CHUNK_PLANE_SIZE},
    host::{BlockReader, LiveExtent, LiveReader, PlacementResolver},
    placement::derive_click_context,
};
use crate::error::EngineError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Visit {
    First,
    Second,
}

/// Recomputes neighbor-dependent block states through a [`PlacementResolver`].
pub struct PlacementStateProcessor {
    registry: Arc<BlockRegistry>,
    masks: Arc<PlacementMasks>,
    mask: Arc<BlockTypeMask>,
    resolver: Arc<dyn PlacementResolver>,
    extent: Arc<dyn LiveExtent>,
    include_unedited: bool,
    second_pass: bool,
    cross_chunk: (Sender<Point3<i32>>, Receiver<Point3<i32>>),
    row_queue: VecDeque<(i32, i32)>,
    lineage: FilterLineage,
}

impl PlacementStateProcessor {
    /// A processor over the default mask with second passes on and unedited
    /// voxels ignored.
    pub fn new(
        registry: Arc<BlockRegistry>,
        masks: Arc<PlacementMasks>,
        resolver: Arc<dyn PlacementResolver>,
        extent: Arc<dyn LiveExtent>,
    ) -> Self {
        let mask = Arc::new(masks.default.clone());
        PlacementStateProcessor {
            registry,
            masks,
            mask,
            resolver,
            extent,
            include_unedited: false,
            second_pass: true,
            cross_chunk: crossbeam_channel::unbounded(),
            row_queue: VecDeque::new(),
            lineage: FilterLineage::new(),
        }
    }

    /// Builds a processor from the `placement` section of the engine config.
    ///
    /// # Errors
    /// `UnknownBlockType` when the configured mask names a type the registry
    /// does not know.
    pub fn from_config(
        config: &PlacementConfig,
        registry: Arc<BlockRegistry>,
        masks: Arc<PlacementMasks>,
        resolver: Arc<dyn PlacementResolver>,
        extent: Arc<dyn LiveExtent>,
    ) -> Result<Self, EngineError> {
        let mut processor = Self::new(registry, masks, resolver, extent)
            .with_include_unedited(config.include_unedited)
            .with_second_pass(config.second_pass);
        if let Some(names) = &config.mask {
            let mask = BlockTypeMask::from_names(&processor.registry, names)?;
            processor = processor.with_mask(mask);
        }
        Ok(processor)
    }

    pub fn with_mask(mut self, mask: BlockTypeMask) -> Self {
        self.mask = Arc::new(mask);
        self
    }

    pub fn with_include_unedited(mut self, include_unedited: bool) -> Self {
        self.include_unedited = include_unedited;
        self
    }

    pub fn with_second_pass(mut self, second_pass: bool) -> Self {
        self.second_pass = second_pass;
        self
    }

    pub fn mask(&self) -> &BlockTypeMask {
        &self.mask
    }

    /// Number of positions waiting for [`BatchProcessor::flush`].
    pub fn pending_cross_chunk(&self) -> usize {
        self.cross_chunk.1.len()
    }

    /// Removes every queued cross-chunk position without applying it.
    pub fn discard_pending(&self) -> Vec<Point3<i32>> {
        self.cross_chunk.1.try_iter().collect()
    }

    /// Recomputes the block at `get` in `source` as if placed at `set`, writing the
    /// result to `set` when it differs.
    ///
    /// # Returns
    /// Whether anything was written.
    pub fn apply(&self, source: &dyn LiveExtent, get: Point3<i32>, set: Point3<i32>) -> Result<bool, EngineError> {
        let ordinal = source.read_live_block(get.x, get.y, get.z)?;
        let Some(state) = self.masked_state(ordinal) else {
            return Ok(false);
        };
        let Some(updated) = self.resolve(state, set, &LiveReader(source)) else {
            return Ok(false);
        };
        if updated == ordinal {
            return Ok(false);
        }
        source.write_live_block(set.x, set.y, set.z, updated)?;
        Ok(true)
    }

    /// The recomputed state of the live block at `position`, without writing it.
    ///
    /// `None` when the block is outside the mask or already correct.
    pub fn apply_block(&self, position: Point3<i32>) -> Result<Option<Ordinal>, EngineError> {
        let ordinal = self.extent.read_live_block(position.x, position.y, position.z)?;
        let Some(state) = self.masked_state(ordinal) else {
            return Ok(None);
        };
        let updated = self.resolve(state, position, &LiveReader(self.extent.as_ref()));
        Ok(updated.filter(|updated| *updated != ordinal))
    }

    /// Drains the cross-chunk queue against the live world.
    ///
    /// Each position is handled once even if queued several times. A failing read
    /// or write stops the drain; positions not yet drained stay queued.
    ///
    /// # Returns
    /// The number of blocks written.
    pub fn flush(&self) -> Result<usize, EngineError> {
        let mut seen = HashSet::new();
        let mut written = 0;
        while let Ok(position) = self.cross_chunk.1.try_recv() {
            if !seen.insert(position) {
                continue;
            }
            if let Some(updated) = self.apply_block(position)? {
                self.extent
                    .write_live_block(position.x, position.y, position.z, updated)?;
                written += 1;
            }
        }
        log::debug!("Flushed {} deferred placement updates", written);
        Ok(written)
    }

    fn forked(&self) -> Self {
        PlacementStateProcessor {
            registry: self.registry.clone(),
            masks: self.masks.clone(),
            mask: self.mask.clone(),
            resolver: self.resolver.clone(),
            extent: self.extent.clone(),
            include_unedited: self.include_unedited,
            second_pass: self.second_pass,
            cross_chunk: self.cross_chunk.clone(),
            row_queue: VecDeque::new(),
            lineage: self.lineage.fork(),
        }
    }

    /// The state of `ordinal` if it is a known, masked block.
    fn masked_state(&self, ordinal: Ordinal) -> Option<BlockState<'_>> {
        if ordinal == UNSET {
            return None;
        }
        let Some(state) = self.registry.state(ordinal) else {
            log::warn!("Unknown ordinal {}, treating as air", ordinal);
            return None;
        };
        self.mask.contains_type(state.block_type().id).then_some(state)
    }

    /// Runs the resolver on a synthetic click. `None` when the resolver fails or
    /// returns something that is not a valid state.
    fn resolve(&self, state: BlockState<'_>, position: Point3<i32>, world: &dyn BlockReader) -> Option<Ordinal> {
        let context = derive_click_context(state, position);
        match self.resolver.resolve_placement(state, &context, world) {
            Ok(ordinal) if ordinal != UNSET && self.registry.state(ordinal).is_some() => Some(ordinal),
            Ok(ordinal) => {
                log::warn!("Placement of {} at {:?} produced invalid ordinal {}", state, position, ordinal);
                None
            }
            Err(err) => {
                log::warn!("Placement of {} at {:?} failed: {}", state, position, err);
                None
            }
        }
    }

    fn enqueue_cross_chunk(&self, position: Point3<i32>) {
        // the receiver lives as long as any fork, so sending cannot fail here
        if self.cross_chunk.0.send(position).is_err() {
            log::warn!("Cross-chunk queue closed, dropping {:?}", position);
        }
    }

    /// Recomputes the voxel under the cursor.
    fn update_voxel(&self, cursor: &mut VoxelCursor<'_>, visit: Visit, ripple: &mut VecDeque<(i32, i32)>) {
        let pending = cursor.pending();
        let ordinal = if pending != UNSET {
            pending
        } else if visit == Visit::Second || self.include_unedited {
            match cursor.try_ordinal() {
                Ok(ordinal) => ordinal,
                Err(err) => {
                    log::warn!("Skipping {:?}: {}", cursor.position(), err);
                    return;
                }
            }
        } else {
            return;
        };

        let Some(state) = self.masked_state(ordinal) else {
            return;
        };
        let type_id = state.block_type().id;
        if visit == Visit::Second && self.second_pass && !self.masks.requires_second_pass.contains_type(type_id) {
            return;
        }

        let position = cursor.position();
        let (x, _, z) = cursor.local();
        if visit == Visit::First
            && pending != UNSET
            && self.second_pass
            && self.masks.second.contains_type(type_id)
            && (x == 0 || z == 0 || x == CHUNK_DIMENSION - 1 || z == CHUNK_DIMENSION - 1)
        {
            self.enqueue_cross_chunk(position);
        }

        let Some(updated) = self.resolve(state, position, &cursor.world()) else {
            return;
        };
        if updated == ordinal {
            return;
        }

        let ripples = self.masks.stairs.contains_type(type_id)
            || (self.second_pass && self.masks.second.contains_type(type_id));
        if visit == Visit::First && ripples {
            ripple.extend([(x + 1, z), (x - 1, z), (x, z + 1), (x, z - 1)]);
        }
        cursor.set_ordinal(updated);
    }

    /// Revisits the neighbors queued while processing row `y` of `layer`, each
    /// cell at most once.
    fn second_pass_row(&self, cursor: &mut VoxelCursor<'_>, layer: i32, y: i32, ripple: &mut VecDeque<(i32, i32)>) {
        let mut unused = VecDeque::new();
        let mut revisited = [false; CHUNK_PLANE_SIZE as usize];
        while let Some((x, z)) = ripple.pop_front() {
            if !(0..CHUNK_DIMENSION).contains(&x) || !(0..CHUNK_DIMENSION).contains(&z) {
                if self.second_pass {
                    let chunk = cursor.chunk();
                    self.enqueue_cross_chunk(Point3::new(
                        chunk.min_block_x() + x,
                        (layer << 4) + y,
                        chunk.min_block_z() + z,
                    ));
                }
                continue;
            }
            if std::mem::replace(&mut revisited[(z * CHUNK_DIMENSION + x) as usize], true) {
                continue;
            }
            cursor.move_to(layer, layer_index(x, y, z));
            self.update_voxel(cursor, Visit::Second, &mut unused);
        }
    }
}

impl BatchProcessor for PlacementStateProcessor {
    fn process_set(&self, chunk: ChunkPos, get: &ChunkGet, mut set: ChunkSet) -> ChunkSet {
        let live = LiveReader(self.extent.as_ref());
        let mut ripple = VecDeque::new();
        {
            let mut cursor = VoxelCursor::new(chunk, get, &mut set, &live);
            for layer in get.layer_range() {
                if !self.include_unedited && !cursor.has_pending_layer(layer) {
                    continue;
                }
                for y in 0..CHUNK_DIMENSION {
                    for z in 0..CHUNK_DIMENSION {
                        for x in 0..CHUNK_DIMENSION {
                            cursor.move_to(layer, layer_index(x, y, z));
                            self.update_voxel(&mut cursor, Visit::First, &mut ripple);
                        }
                    }
                    self.second_pass_row(&mut cursor, layer, y, &mut ripple);
                }
            }
        }
        set
    }

    fn scope(&self) -> ProcessorScope {
        ProcessorScope::ChangingBlocks
    }

    fn fork(&self) -> Box<dyn BatchProcessor> {
        Box::new(self.forked())
    }

    fn flush(&self) -> Result<usize, EngineError> {
        PlacementStateProcessor::flush(self)
    }

    fn name(&self) -> &str {
        "placement"
    }
}

impl Filter for PlacementStateProcessor {
    /// Recomputes one voxel. Neighbor revisits of a row run when the cursor
    /// reaches the last cell of that row, matching the batch path.
    fn apply_to_voxel(&mut self, voxel: &mut VoxelCursor<'_>) {
        let mut ripple = std::mem::take(&mut self.row_queue);
        let (layer, index) = (voxel.layer(), voxel.index());
        self.update_voxel(voxel, Visit::First, &mut ripple);
        if is_row_end(index) {
            let (_, y, _) = voxel.local();
            self.second_pass_row(voxel, layer, y, &mut ripple);
            voxel.move_to(layer, index);
        }
        self.row_queue = ripple;
    }

    fn fork(&self) -> Box<dyn Filter> {
        Box::new(self.forked())
    }

    fn flush(&self) -> Result<usize, EngineError> {
        PlacementStateProcessor::flush(self)
    }

    fn lineage(&self) -> FilterLineage {
        self.lineage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::{
        processing::filter::apply_filter_to_chunk,
        voxels::{placement::rules::ConnectionRules, world::MemoryWorld},
    };

    struct Fixture {
        registry: Arc<BlockRegistry>,
        masks: Arc<PlacementMasks>,
        world: Arc<MemoryWorld>,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(BlockRegistry::builtin().unwrap());
            let masks = Arc::new(PlacementMasks::new(&registry));
            Fixture {
                registry,
                masks,
                world: Arc::new(MemoryWorld::new(0..=7)),
            }
        }

        fn processor(&self) -> PlacementStateProcessor {
            PlacementStateProcessor::new(
                self.registry.clone(),
                self.masks.clone(),
                Arc::new(ConnectionRules),
                self.world.clone(),
            )
        }

        fn ordinal(&self, text: &str) -> Ordinal {
            self.registry.parse_state(text).unwrap().ordinal()
        }

        fn get(&self, chunk: ChunkPos) -> ChunkGet {
            ChunkGet::new(chunk, self.world.clone())
        }

        fn format(&self, ordinal: Ordinal) -> String {
            self.registry.format_state(ordinal).unwrap()
        }
    }

    #[test]
    fn fences_in_one_chunk_connect() {
        let fixture = Fixture::new();
        let fence = fixture.ordinal("oak_fence");
        let mut set = ChunkSet::new();
        set.set_block(4, 64, 4, fence);
        set.set_block(4, 64, 3, fence);

        let processor = fixture.processor();
        let set = processor.process_set(ChunkPos::new(0, 0), &fixture.get(ChunkPos::new(0, 0)), set);
        assert_eq!(
            fixture.format(set.block_at(4, 64, 4)),
            "oak_fence[east=false,north=true,south=false,waterlogged=false,west=false]"
        );
        assert_eq!(
            fixture.format(set.block_at(4, 64, 3)),
            "oak_fence[east=false,north=false,south=true,waterlogged=false,west=false]"
        );
        assert_eq!(processor.pending_cross_chunk(), 0);
    }

    #[test]
    fn unedited_layers_are_never_loaded() {
        let fixture = Fixture::new();
        let mut set = ChunkSet::new();
        set.set_block(1, 20, 1, fixture.ordinal("oak_fence"));
        let get = fixture.get(ChunkPos::new(0, 0));

        fixture.processor().process_set(ChunkPos::new(0, 0), &get, set);
        // the fence's own layer may be read for neighbors, nothing else
        assert!(get.loaded_layer_count() <= 1);
        assert!(!get.is_loaded(4));
    }

    #[test]
    fn unedited_cells_are_ignored_unless_included() {
        let fixture = Fixture::new();
        let fence = fixture.ordinal("oak_fence");
        fixture.world.write_live_block(2, 64, 2, fence).unwrap();
        fixture.world.write_live_block(3, 64, 2, fixture.ordinal("stone")).unwrap();
        let chunk = ChunkPos::new(0, 0);

        let set = fixture.processor().process_set(chunk, &fixture.get(chunk), ChunkSet::new());
        assert!(set.is_empty());

        let set = fixture
            .processor()
            .with_include_unedited(true)
            .process_set(chunk, &fixture.get(chunk), ChunkSet::new());
        assert_eq!(set.edited_cell_count(), 1);
        assert_eq!(
            fixture.registry.state(set.block_at(2, 64, 2)).unwrap().get_bool("east"),
            Some(true)
        );
    }

    #[test]
    fn correct_states_are_not_rewritten() {
        let fixture = Fixture::new();
        let chunk = ChunkPos::new(0, 0);
        let mut set = ChunkSet::new();
        set.set_block(5, 64, 5, fixture.ordinal("oak_fence"));
        let first = fixture.processor().process_set(chunk, &fixture.get(chunk), set);
        let second = fixture.processor().process_set(chunk, &fixture.get(chunk), first.clone());
        assert_eq!(first, second);
    }

    #[test]
    fn stairs_at_the_border_queue_the_next_chunk() {
        let fixture = Fixture::new();
        let chunk = ChunkPos::new(0, 0);
        let mut set = ChunkSet::new();
        set.set_block(15, 64, 8, fixture.ordinal("oak_stairs[facing=north,shape=inner_left]"));

        let processor = fixture.processor();
        let set = processor.process_set(chunk, &fixture.get(chunk), set);
        assert_eq!(
            fixture.registry.state(set.block_at(15, 64, 8)).unwrap().get("shape").unwrap().to_string(),
            "straight"
        );
        let queued = processor.discard_pending();
        assert!(queued.contains(&Point3::new(16, 64, 8)));
        assert!(!queued.contains(&Point3::new(14, 64, 8)));
    }

    #[test]
    fn resolver_failures_leave_the_voxel_alone() {
        struct Failing;
        impl PlacementResolver for Failing {
            fn resolve_placement(
                &self,
                state: BlockState<'_>,
                _context: &crate::engine_state::voxels::placement::PlacementContext,
                _world: &dyn BlockReader,
            ) -> Result<Ordinal, EngineError> {
                Err(EngineError::UnknownProperty {
                    block: state.name().to_string(),
                    property: "shape".to_string(),
                })
            }
        }

        let fixture = Fixture::new();
        let fence = fixture.ordinal("oak_fence");
        let processor = PlacementStateProcessor::new(
            fixture.registry.clone(),
            fixture.masks.clone(),
            Arc::new(Failing),
            fixture.world.clone(),
        );
        let chunk = ChunkPos::new(0, 0);
        let mut set = ChunkSet::new();
        set.set_block(5, 64, 5, fence);
        let set = processor.process_set(chunk, &fixture.get(chunk), set);
        assert_eq!(set.block_at(5, 64, 5), fence);
    }

    /// Counts resolver calls per position.
    #[derive(Default)]
    struct CountingRules {
        calls: std::sync::Mutex<std::collections::HashMap<Point3<i32>, usize>>,
    }

    impl PlacementResolver for CountingRules {
        fn resolve_placement(
            &self,
            state: BlockState<'_>,
            context: &crate::engine_state::voxels::placement::PlacementContext,
            world: &dyn BlockReader,
        ) -> Result<Ordinal, EngineError> {
            *self.calls.lock().unwrap().entry(context.position).or_default() += 1;
            ConnectionRules.resolve_placement(state, context, world)
        }
    }

    #[test]
    fn crowded_border_voxel_is_recomputed_at_most_three_times() {
        let crowd = [(15, 8), (14, 8), (15, 7), (15, 9), (13, 8)];
        let center = Point3::new(15, 64, 8);
        let chunk = ChunkPos::new(0, 0);

        for filter_path in [false, true] {
            let fixture = Fixture::new();
            let fence = fixture.ordinal("oak_fence");
            let rules = Arc::new(CountingRules::default());
            let processor = PlacementStateProcessor::new(
                fixture.registry.clone(),
                fixture.masks.clone(),
                rules.clone(),
                fixture.world.clone(),
            );
            let mut set = ChunkSet::new();
            for (x, z) in crowd {
                set.set_block(x, 64, z, fence);
            }

            let set = if filter_path {
                let mut filter = Filter::fork(&processor);
                let live = LiveReader(fixture.world.as_ref());
                apply_filter_to_chunk(filter.as_mut(), chunk, &fixture.get(chunk), set, &live)
            } else {
                processor.process_set(chunk, &fixture.get(chunk), set)
            };
            for (layer, cells) in set.layers() {
                fixture.world.write_layer(chunk, layer, cells).unwrap();
            }
            processor.flush().unwrap();

            let calls = rules.calls.lock().unwrap();
            assert_eq!(calls.get(&center), Some(&3), "filter path: {}", filter_path);
            assert!(calls.values().all(|count| *count <= 3), "{:?}", calls);
        }
    }

    #[test]
    fn filter_path_matches_batch_path() {
        let fixture = Fixture::new();
        let chunk = ChunkPos::new(0, 0);
        let mut set = ChunkSet::new();
        for (x, z) in [(3, 3), (3, 4), (4, 4), (8, 8)] {
            set.set_block(x, 64, z, fixture.ordinal("glass_pane"));
        }
        set.set_block(7, 64, 8, fixture.ordinal("oak_stairs[facing=west]"));
        set.set_block(6, 64, 8, fixture.ordinal("oak_stairs[facing=north]"));

        let batch = fixture.processor().process_set(chunk, &fixture.get(chunk), set.clone());
        let mut filter = fixture.processor();
        let live = LiveReader(fixture.world.as_ref());
        let filtered = apply_filter_to_chunk(&mut filter, chunk, &fixture.get(chunk), set, &live);
        assert_eq!(batch, filtered);
    }

    #[test]
    fn single_point_apply_writes_only_changes() {
        let fixture = Fixture::new();
        let fence = fixture.ordinal("oak_fence");
        fixture.world.write_live_block(0, 64, 0, fence).unwrap();
        fixture.world.write_live_block(0, 64, 1, fence).unwrap();

        let processor = fixture.processor();
        let expected = fixture.ordinal("oak_fence[south=true]");
        assert_eq!(processor.apply_block(Point3::new(0, 64, 0)).unwrap(), Some(expected));
        let origin = Point3::new(0, 64, 0);
        assert!(processor.apply(fixture.world.as_ref(), origin, origin).unwrap());
        assert!(!processor.apply(fixture.world.as_ref(), origin, origin).unwrap());
        assert_eq!(processor.apply_block(origin).unwrap(), None);
    }

    #[test]
    fn flush_stops_at_world_errors() {
        let fixture = Fixture::new();
        let processor = fixture.processor();
        processor.enqueue_cross_chunk(Point3::new(0, 1024, 0));
        processor.enqueue_cross_chunk(Point3::new(0, 64, 0));
        assert!(matches!(processor.flush(), Err(EngineError::WorldAccess { .. })));
        assert_eq!(processor.pending_cross_chunk(), 1);
        assert_eq!(processor.flush().unwrap(), 0);
    }

    #[test]
    fn configured_mask_must_name_known_types() {
        let fixture = Fixture::new();
        let config = PlacementConfig {
            mask: Some(vec!["oak_fence".to_string(), "no_such_block".to_string()]),
            ..PlacementConfig::default()
        };
        let result = PlacementStateProcessor::from_config(
            &config,
            fixture.registry.clone(),
            fixture.masks.clone(),
            Arc::new(ConnectionRules),
            fixture.world.clone(),
        );
        assert!(matches!(result, Err(EngineError::UnknownBlockType(name)) if name == "no_such_block"));
    }
}
