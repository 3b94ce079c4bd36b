//! # Host Interfaces
//!
//! The narrow set of traits the engine needs from the world it edits. A host
//! implements them directly; nothing has to inherit from an engine type.
//!
//! * [`WorldSnapshot`] - pre-edit layer data, the source of every Get buffer
//! * [`LiveExtent`] - direct reads and writes against the live world, used when
//!   committing and by the deferred cross-chunk pass
//! * [`PlacementResolver`] - the host's interactive placement logic
//! * [`NativeIdSource`] - native state ids, used once to build the ordinal tables
//!
//! [`NativeWorldAdapter`] turns a host that speaks native ids into a
//! `WorldSnapshot` + `LiveExtent` pair speaking ordinals.

use std::{ops::RangeInclusive, sync::Arc};

use cgmath::Point3;

use super::{
    block::{ordinal::OrdinalRegistry, BlockState, Ordinal, AIR, UNSET},
    chunk::{ChunkPos, CHUNK_SIZE},
    placement::PlacementContext,
};
use crate::error::EngineError;

/// Point reads of resolved block ordinals.
pub trait BlockReader {
    /// The ordinal at a world position. Implementations never return [`UNSET`].
    fn block_at(&self, x: i32, y: i32, z: i32) -> Ordinal;
}

/// Read-only access to the world as it was before the edit.
pub trait WorldSnapshot: Send + Sync {
    /// Loads one 16×16×16 layer of a chunk column as `CHUNK_SIZE` ordinals in
    /// layer index order.
    fn load_layer(&self, chunk: ChunkPos, layer: i32) -> Result<Vec<Ordinal>, EngineError>;

    /// The layers that exist in this world.
    fn layer_range(&self) -> RangeInclusive<i32>;
}

/// Direct access to the live world.
pub trait LiveExtent: Send + Sync {
    fn read_live_block(&self, x: i32, y: i32, z: i32) -> Result<Ordinal, EngineError>;

    fn write_live_block(&self, x: i32, y: i32, z: i32, ordinal: Ordinal) -> Result<(), EngineError>;

    /// Writes the edited cells of one layer. Cells holding [`UNSET`] are left alone.
    ///
    /// The default writes cell by cell; hosts with bulk storage should override it.
    ///
    /// # Returns
    /// The number of cells written.
    fn write_layer(&self, chunk: ChunkPos, layer: i32, cells: &[Ordinal]) -> Result<usize, EngineError> {
        let mut written = 0;
        for (index, ordinal) in cells.iter().enumerate() {
            if *ordinal == UNSET {
                continue;
            }
            let position = chunk.world_position(layer, index);
            self.write_live_block(position.x, position.y, position.z, *ordinal)?;
            written += 1;
        }
        Ok(written)
    }
}

/// Reads a [`LiveExtent`] through the infallible [`BlockReader`] interface.
///
/// Failed reads are logged and read as [`AIR`].
pub struct LiveReader<'a>(pub &'a dyn LiveExtent);

impl BlockReader for LiveReader<'_> {
    fn block_at(&self, x: i32, y: i32, z: i32) -> Ordinal {
        match self.0.read_live_block(x, y, z) {
            Ok(UNSET) => AIR,
            Ok(ordinal) => ordinal,
            Err(err) => {
                log::warn!("Live read at ({}, {}, {}) failed, using air: {}", x, y, z, err);
                AIR
            }
        }
    }
}

/// The host's logic for placing a block interactively.
pub trait PlacementResolver: Send + Sync {
    /// Computes the state `state` would take if a player placed it with the given
    /// click, looking at the world through `world`.
    fn resolve_placement(
        &self,
        state: BlockState<'_>,
        context: &PlacementContext,
        world: &dyn BlockReader,
    ) -> Result<Ordinal, EngineError>;
}

/// Native numeric state ids of the host platform.
pub trait NativeIdSource: Send + Sync {
    /// The host's id for `state`, `None` when the host does not know the state.
    fn native_id_for(&self, state: BlockState<'_>) -> Option<u32>;
}

/// A host world storing native state ids.
pub trait NativeWorld: Send + Sync {
    fn load_native_layer(&self, chunk: ChunkPos, layer: i32) -> Result<Vec<u32>, EngineError>;

    fn read_native_block(&self, position: Point3<i32>) -> Result<u32, EngineError>;

    fn write_native_block(&self, position: Point3<i32>, native: u32) -> Result<(), EngineError>;

    fn layer_range(&self) -> RangeInclusive<i32>;
}

/// Exposes a [`NativeWorld`] in ordinals.
pub struct NativeWorldAdapter<W: NativeWorld> {
    world: W,
    ordinals: Arc<OrdinalRegistry>,
}

impl<W: NativeWorld> NativeWorldAdapter<W> {
    pub fn new(world: W, ordinals: Arc<OrdinalRegistry>) -> Self {
        NativeWorldAdapter { world, ordinals }
    }

    pub fn inner(&self) -> &W {
        &self.world
    }
}

impl<W: NativeWorld> WorldSnapshot for NativeWorldAdapter<W> {
    fn load_layer(&self, chunk: ChunkPos, layer: i32) -> Result<Vec<Ordinal>, EngineError> {
        let native = self.world.load_native_layer(chunk, layer)?;
        if native.len() != CHUNK_SIZE as usize {
            return Err(EngineError::MalformedLayer {
                chunk_x: chunk.x,
                chunk_z: chunk.z,
                layer,
                len: native.len(),
            });
        }
        Ok(native.into_iter().map(|id| self.ordinals.to_ordinal(id)).collect())
    }

    fn layer_range(&self) -> RangeInclusive<i32> {
        self.world.layer_range()
    }
}

impl<W: NativeWorld> LiveExtent for NativeWorldAdapter<W> {
    fn read_live_block(&self, x: i32, y: i32, z: i32) -> Result<Ordinal, EngineError> {
        let native = self.world.read_native_block(Point3::new(x, y, z))?;
        Ok(self.ordinals.to_ordinal(native))
    }

    fn write_live_block(&self, x: i32, y: i32, z: i32, ordinal: Ordinal) -> Result<(), EngineError> {
        if ordinal == UNSET {
            return Err(EngineError::ReservedOrdinal { x, y, z });
        }
        self.world
            .write_native_block(Point3::new(x, y, z), self.ordinals.to_native(ordinal))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use super::*;
    use crate::engine_state::voxels::block::registry::BlockRegistry;

    /// Native ids are ordinals shifted by 100; everything not stored is id 101 (air).
    struct ShiftedIds;

    impl NativeIdSource for ShiftedIds {
        fn native_id_for(&self, state: BlockState<'_>) -> Option<u32> {
            Some(state.ordinal() as u32 + 100)
        }
    }

    #[derive(Default)]
    struct NativeMap {
        cells: Mutex<HashMap<(i32, i32, i32), u32>>,
    }

    impl NativeWorld for NativeMap {
        fn load_native_layer(&self, chunk: ChunkPos, layer: i32) -> Result<Vec<u32>, EngineError> {
            let cells = self.cells.lock().unwrap();
            Ok((0..CHUNK_SIZE as usize)
                .map(|index| {
                    let p = chunk.world_position(layer, index);
                    cells.get(&(p.x, p.y, p.z)).copied().unwrap_or(101)
                })
                .collect())
        }

        fn read_native_block(&self, p: Point3<i32>) -> Result<u32, EngineError> {
            if p.y > 100 {
                return Err(EngineError::WorldAccess {
                    x: p.x,
                    y: p.y,
                    z: p.z,
                    reason: "above build limit".to_string(),
                });
            }
            Ok(self.cells.lock().unwrap().get(&(p.x, p.y, p.z)).copied().unwrap_or(101))
        }

        fn write_native_block(&self, p: Point3<i32>, native: u32) -> Result<(), EngineError> {
            self.cells.lock().unwrap().insert((p.x, p.y, p.z), native);
            Ok(())
        }

        fn layer_range(&self) -> RangeInclusive<i32> {
            0..=3
        }
    }

    fn adapter() -> (NativeWorldAdapter<NativeMap>, Arc<BlockRegistry>) {
        let registry = Arc::new(BlockRegistry::builtin().unwrap());
        let ordinals = Arc::new(OrdinalRegistry::new(registry.clone(), Arc::new(ShiftedIds)));
        (NativeWorldAdapter::new(NativeMap::default(), ordinals), registry)
    }

    #[test]
    fn writes_translate_to_native_ids() {
        let (adapter, registry) = adapter();
        let stone = registry.default_state("stone").unwrap().ordinal();
        adapter.write_live_block(1, 2, 3, stone).unwrap();
        assert_eq!(
            adapter.inner().cells.lock().unwrap().get(&(1, 2, 3)),
            Some(&(stone as u32 + 100))
        );
        assert_eq!(adapter.read_live_block(1, 2, 3).unwrap(), stone);
        assert!(matches!(
            adapter.write_live_block(0, 0, 0, UNSET),
            Err(EngineError::ReservedOrdinal { .. })
        ));
    }

    #[test]
    fn layers_translate_and_unknown_ids_become_air() {
        let (adapter, registry) = adapter();
        let dirt = registry.default_state("dirt").unwrap().ordinal();
        adapter.inner().cells.lock().unwrap().insert((0, 16, 0), dirt as u32 + 100);
        adapter.inner().cells.lock().unwrap().insert((1, 16, 0), 7);

        let layer = adapter.load_layer(ChunkPos::new(0, 0), 1).unwrap();
        assert_eq!(layer[0], dirt);
        assert_eq!(layer[1], AIR);
        assert_eq!(layer[2], AIR);
    }

    #[test]
    fn default_layer_write_skips_unset() {
        let (adapter, registry) = adapter();
        let stone = registry.default_state("stone").unwrap().ordinal();
        let mut cells = vec![UNSET; CHUNK_SIZE as usize];
        cells[1] = stone;
        cells[256] = stone;
        assert_eq!(adapter.write_layer(ChunkPos::new(1, 0), 0, &cells).unwrap(), 2);
        assert_eq!(adapter.read_live_block(17, 0, 0).unwrap(), stone);
        assert_eq!(adapter.read_live_block(17, 1, 0).unwrap(), stone);
        assert_eq!(adapter.inner().cells.lock().unwrap().len(), 2);
    }

    #[test]
    fn live_reader_degrades_failures_to_air() {
        let (adapter, _) = adapter();
        assert_eq!(LiveReader(&adapter).block_at(0, 500, 0), AIR);
    }
}
