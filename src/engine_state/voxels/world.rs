//! # World Module
//!
//! This module provides [`MemoryWorld`], an in-memory chunked world. It is the
//! reference host for the engine: it implements both [`WorldSnapshot`] and
//! [`LiveExtent`], so an [`EngineState`](crate::engine_state::EngineState) can edit
//! it without any other adapter.
//!
//! ## Architecture
//!
//! The world uses a sparse storage approach where only columns that have been
//! written are kept in memory. Inside a column only written layers are stored.
//! Anything not stored reads as air.
//!
//! ## Performance Considerations
//!
//! - Columns are stored in thread-safe containers so worker threads can load
//!   layers while the committing thread writes other columns
//! - Column lookup is O(1) using a hash map
//! - Whole-layer writes take the column lock once

use std::{
    collections::{BTreeMap, HashMap},
    ops::RangeInclusive,
    sync::{
        atomic::{AtomicUsize, Ordering},
        RwLock,
    },
};

use crate::core::MtResource;
use crate::engine_state::voxels::{
    block::{Ordinal, AIR, UNSET},
    chunk::{layer_index, layer_of, ChunkPos, CHUNK_SIZE},
    host::{LiveExtent, WorldSnapshot},
};
use crate::error::EngineError;

/// The stored layers of one chunk column.
#[derive(Default)]
struct Column {
    layers: BTreeMap<i32, Box<[Ordinal]>>,
}

impl Column {
    fn layer_mut(&mut self, layer: i32) -> &mut [Ordinal] {
        self.layers
            .entry(layer)
            .or_insert_with(|| vec![AIR; CHUNK_SIZE as usize].into_boxed_slice())
    }
}

/// Represents a voxel world composed of chunk columns held in memory.
///
/// # Examples
///
/// ```
/// use voxel_edit_engine::engine_state::voxels::{host::LiveExtent, world::MemoryWorld};
///
/// let world = MemoryWorld::new(-4..=19);
/// world.write_live_block(3, 64, -7, 2).unwrap();
/// assert_eq!(world.read_live_block(3, 64, -7).unwrap(), 2);
/// ```
pub struct MemoryWorld {
    columns: RwLock<HashMap<ChunkPos, MtResource<Column>>>,
    layer_range: RangeInclusive<i32>,
    layer_loads: AtomicUsize,
    live_writes: AtomicUsize,
}

impl MemoryWorld {
    /// Creates a new, empty world covering `layer_range`.
    pub fn new(layer_range: RangeInclusive<i32>) -> Self {
        MemoryWorld {
            columns: RwLock::new(HashMap::new()),
            layer_range,
            layer_loads: AtomicUsize::new(0),
            live_writes: AtomicUsize::new(0),
        }
    }

    fn column(&self, position: ChunkPos) -> Option<MtResource<Column>> {
        let columns = self
            .columns
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        columns.get(&position).cloned()
    }

    fn column_or_insert(&self, position: ChunkPos) -> MtResource<Column> {
        if let Some(column) = self.column(position) {
            return column;
        }
        let mut columns = self
            .columns
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        columns
            .entry(position)
            .or_insert_with(|| MtResource::new(Column::default()))
            .clone()
    }

    fn check_height(&self, x: i32, y: i32, z: i32) -> Result<i32, EngineError> {
        let layer = layer_of(y);
        if self.layer_range.contains(&layer) {
            Ok(layer)
        } else {
            Err(EngineError::WorldAccess {
                x,
                y,
                z,
                reason: format!(
                    "height outside layers {}..={}",
                    self.layer_range.start(),
                    self.layer_range.end()
                ),
            })
        }
    }

    /// Number of layer loads served to Get buffers so far.
    pub fn layer_loads(&self) -> usize {
        self.layer_loads.load(Ordering::Relaxed)
    }

    /// Number of single-block live writes so far. Layer writes are not counted.
    pub fn live_writes(&self) -> usize {
        self.live_writes.load(Ordering::Relaxed)
    }

    /// Number of columns holding any data.
    pub fn column_count(&self) -> usize {
        self.columns
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl WorldSnapshot for MemoryWorld {
    fn load_layer(&self, chunk: ChunkPos, layer: i32) -> Result<Vec<Ordinal>, EngineError> {
        if !self.layer_range.contains(&layer) {
            return Err(EngineError::LayerOutOfRange {
                layer,
                min: *self.layer_range.start(),
                max: *self.layer_range.end(),
            });
        }
        self.layer_loads.fetch_add(1, Ordering::Relaxed);

        let Some(column) = self.column(chunk) else {
            return Ok(vec![AIR; CHUNK_SIZE as usize]);
        };
        let column = column.get();
        let stored = column.layers.get(&layer).map(|data| data.to_vec());
        Ok(stored.unwrap_or_else(|| vec![AIR; CHUNK_SIZE as usize]))
    }

    fn layer_range(&self) -> RangeInclusive<i32> {
        self.layer_range.clone()
    }
}

impl LiveExtent for MemoryWorld {
    fn read_live_block(&self, x: i32, y: i32, z: i32) -> Result<Ordinal, EngineError> {
        let layer = self.check_height(x, y, z)?;
        let Some(column) = self.column(ChunkPos::containing(x, z)) else {
            return Ok(AIR);
        };
        let column = column.get();
        let ordinal = column
            .layers
            .get(&layer)
            .map(|data| data[layer_index(x, y, z)])
            .unwrap_or(AIR);
        Ok(ordinal)
    }

    fn write_live_block(&self, x: i32, y: i32, z: i32, ordinal: Ordinal) -> Result<(), EngineError> {
        if ordinal == UNSET {
            return Err(EngineError::ReservedOrdinal { x, y, z });
        }
        let layer = self.check_height(x, y, z)?;
        let column = self.column_or_insert(ChunkPos::containing(x, z));
        column.get_mut().layer_mut(layer)[layer_index(x, y, z)] = ordinal;
        self.live_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_layer(&self, chunk: ChunkPos, layer: i32, cells: &[Ordinal]) -> Result<usize, EngineError> {
        if !self.layer_range.contains(&layer) {
            return Err(EngineError::LayerOutOfRange {
                layer,
                min: *self.layer_range.start(),
                max: *self.layer_range.end(),
            });
        }
        if cells.len() != CHUNK_SIZE as usize {
            return Err(EngineError::MalformedLayer {
                chunk_x: chunk.x,
                chunk_z: chunk.z,
                layer,
                len: cells.len(),
            });
        }

        let column = self.column_or_insert(chunk);
        let mut column = column.get_mut();
        let stored = column.layer_mut(layer);
        let mut written = 0;
        for (cell, ordinal) in stored.iter_mut().zip(cells) {
            if *ordinal != UNSET {
                *cell = *ordinal;
                written += 1;
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_cells_read_as_air() {
        let world = MemoryWorld::new(0..=3);
        assert_eq!(world.read_live_block(5, 5, 5).unwrap(), AIR);
        assert_eq!(world.load_layer(ChunkPos::new(9, 9), 2).unwrap(), vec![AIR; CHUNK_SIZE as usize]);
        assert_eq!(world.layer_loads(), 1);
        assert_eq!(world.column_count(), 0);
    }

    #[test]
    fn writes_are_visible_to_reads_and_snapshots() {
        let world = MemoryWorld::new(0..=3);
        world.write_live_block(-1, 17, -16, 7).unwrap();
        assert_eq!(world.read_live_block(-1, 17, -16).unwrap(), 7);

        let layer = world.load_layer(ChunkPos::new(-1, -1), 1).unwrap();
        assert_eq!(layer[layer_index(15, 1, 0)], 7);
        assert_eq!(world.live_writes(), 1);
    }

    #[test]
    fn heights_outside_the_world_fail() {
        let world = MemoryWorld::new(0..=3);
        assert!(matches!(world.read_live_block(0, 64, 0), Err(EngineError::WorldAccess { .. })));
        assert!(matches!(world.write_live_block(0, -1, 0, 7), Err(EngineError::WorldAccess { .. })));
        assert!(matches!(world.write_live_block(0, 0, 0, UNSET), Err(EngineError::ReservedOrdinal { .. })));
    }

    #[test]
    fn layer_writes_merge_over_existing_data() {
        let world = MemoryWorld::new(0..=3);
        world.write_live_block(0, 0, 0, 7).unwrap();
        let mut cells = vec![UNSET; CHUNK_SIZE as usize];
        cells[1] = 8;
        assert_eq!(world.write_layer(ChunkPos::new(0, 0), 0, &cells).unwrap(), 1);
        assert_eq!(world.read_live_block(0, 0, 0).unwrap(), 7);
        assert_eq!(world.read_live_block(1, 0, 0).unwrap(), 8);
        assert!(world.write_layer(ChunkPos::new(0, 0), 0, &cells[..10]).is_err());
    }
}
