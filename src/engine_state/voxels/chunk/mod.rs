//! # Chunk Module
//!
//! This module provides the two per-column buffers every edit works on:
//!
//! * [`ChunkGet`] - the block ordinals that existed before the edit, loaded from the
//!   world snapshot one layer at a time and only when something asks for them
//! * [`ChunkSet`] - the pending edit, allocated one layer at a time on first write
//!
//! A chunk column is 16×16 blocks wide and split vertically into 16-block layers.
//! Inside a layer a cell is addressed by `(y << 8) | (z << 4) | x`.
//!
//! ## Memory Optimization
//!
//! Most cells of a typical edit are never touched. Both buffers exploit that:
//! a layer of the Set buffer does not exist until something is written to it, and
//! a layer of the Get buffer is not read from the world until a cell of it has to be
//! resolved. [`ChunkSet::load_if_present`] lets hot loops check a layer without
//! allocating it.
//!
//! ### Performance Characteristics
//! - **Cell read**: O(1) once the layer is resident
//! - **Layer allocation**: one zero-filled `CHUNK_SIZE` array, [`UNSET`] being zero

use std::{collections::BTreeMap, ops::RangeInclusive, sync::Arc, sync::OnceLock};

use cgmath::Point3;

use super::{
    block::{Ordinal, AIR, UNSET},
    host::{BlockReader, WorldSnapshot},
};
use crate::error::EngineError;
use chunk_iteration::EditedCellIterator;

pub mod chunk_iteration;

/// The dimension (width, height, depth) of a chunk layer in blocks.
pub const CHUNK_DIMENSION: i32 = 16;
/// The number of blocks in a single 2D plane of a layer (CHUNK_DIMENSION²).
pub const CHUNK_PLANE_SIZE: i32 = CHUNK_DIMENSION * CHUNK_DIMENSION;
/// The total number of blocks in a layer (CHUNK_DIMENSION³).
pub const CHUNK_SIZE: i32 = CHUNK_PLANE_SIZE * CHUNK_DIMENSION;

/// Flattens local coordinates (each in `0..16`) into a layer index.
#[inline]
pub fn layer_index(x: i32, y: i32, z: i32) -> usize {
    (((y & 15) << 8) | ((z & 15) << 4) | (x & 15)) as usize
}

/// Splits a layer index back into local `(x, y, z)`.
#[inline]
pub fn local_coordinates(index: usize) -> (i32, i32, i32) {
    let index = index as i32;
    (index & 15, (index >> 8) & 15, (index >> 4) & 15)
}

/// The layer containing world height `y`.
#[inline]
pub fn layer_of(y: i32) -> i32 {
    y >> 4
}

/// Position of a chunk column in chunk coordinates.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        ChunkPos { x, z }
    }

    /// The column containing the world block at `(x, _, z)`.
    pub fn containing(x: i32, z: i32) -> Self {
        ChunkPos::new(x >> 4, z >> 4)
    }

    pub fn min_block_x(&self) -> i32 {
        self.x * CHUNK_DIMENSION
    }

    pub fn min_block_z(&self) -> i32 {
        self.z * CHUNK_DIMENSION
    }

    /// Whether world column `(x, z)` lies in this chunk.
    pub fn contains(&self, x: i32, z: i32) -> bool {
        ChunkPos::containing(x, z) == *self
    }

    /// World position of a cell given by layer and layer index.
    pub fn world_position(&self, layer: i32, index: usize) -> Point3<i32> {
        let (x, y, z) = local_coordinates(index);
        Point3::new(
            self.min_block_x() + x,
            (layer << 4) + y,
            self.min_block_z() + z,
        )
    }
}

/// Allocates a layer array filled with [`UNSET`].
fn unset_layer() -> Box<[Ordinal]> {
    bytemuck::zeroed_slice_box(CHUNK_SIZE as usize)
}

/// The pre-edit contents of a chunk column.
///
/// Layers are fetched from the [`WorldSnapshot`] on first access and cached for
/// the lifetime of the buffer. Reads take `&self`, so one buffer can be shared by
/// every processor that looks at the chunk.
pub struct ChunkGet {
    position: ChunkPos,
    min_layer: i32,
    layers: Box<[OnceLock<Box<[Ordinal]>>]>,
    snapshot: Arc<dyn WorldSnapshot>,
}

impl ChunkGet {
    pub fn new(position: ChunkPos, snapshot: Arc<dyn WorldSnapshot>) -> Self {
        let range = snapshot.layer_range();
        let count = (range.end() - range.start() + 1).max(0) as usize;
        ChunkGet {
            position,
            min_layer: *range.start(),
            layers: (0..count).map(|_| OnceLock::new()).collect(),
            snapshot,
        }
    }

    pub fn position(&self) -> ChunkPos {
        self.position
    }

    pub fn layer_range(&self) -> RangeInclusive<i32> {
        self.min_layer..=self.min_layer + self.layers.len() as i32 - 1
    }

    fn slot(&self, layer: i32) -> Result<&OnceLock<Box<[Ordinal]>>, EngineError> {
        let range = self.layer_range();
        if !range.contains(&layer) {
            return Err(EngineError::LayerOutOfRange {
                layer,
                min: *range.start(),
                max: *range.end(),
            });
        }
        Ok(&self.layers[(layer - self.min_layer) as usize])
    }

    /// Returns the pre-edit ordinals of `layer`, loading them on first access.
    ///
    /// # Errors
    /// * `LayerOutOfRange` if the layer is outside the world
    /// * `MalformedLayer` if the snapshot returns an array of the wrong size
    /// * Whatever the snapshot reports when it cannot load the layer
    pub fn load(&self, layer: i32) -> Result<&[Ordinal], EngineError> {
        let slot = self.slot(layer)?;
        if let Some(data) = slot.get() {
            return Ok(&data[..]);
        }

        let data = self.snapshot.load_layer(self.position, layer)?;
        if data.len() != CHUNK_SIZE as usize {
            return Err(EngineError::MalformedLayer {
                chunk_x: self.position.x,
                chunk_z: self.position.z,
                layer,
                len: data.len(),
            });
        }
        log::trace!(
            "Loaded layer {} of chunk ({}, {})",
            layer,
            self.position.x,
            self.position.z
        );
        Ok(&slot.get_or_init(|| data.into_boxed_slice())[..])
    }

    /// Whether `layer` has already been loaded.
    pub fn is_loaded(&self, layer: i32) -> bool {
        self.slot(layer).map(|slot| slot.get().is_some()).unwrap_or(false)
    }

    pub fn loaded_layer_count(&self) -> usize {
        self.layers.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Pre-edit ordinal at local `x`/`z` and world height `y`.
    ///
    /// Heights outside the world read as [`AIR`].
    pub fn block_at(&self, x: i32, y: i32, z: i32) -> Result<Ordinal, EngineError> {
        let layer = layer_of(y);
        if !self.layer_range().contains(&layer) {
            return Ok(AIR);
        }
        Ok(self.load(layer)?[layer_index(x, y, z)])
    }
}

/// The pending edit of a chunk column.
///
/// Sparse over layers: a layer that was never written has no array at all. Inside
/// an allocated layer, [`UNSET`] means "no change here".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkSet {
    layers: BTreeMap<i32, Box<[Ordinal]>>,
}

impl ChunkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the layer if it has been allocated. Never allocates.
    pub fn load_if_present(&self, layer: i32) -> Option<&[Ordinal]> {
        self.layers.get(&layer).map(|data| &data[..])
    }

    /// Returns the layer, allocating it filled with [`UNSET`] if absent.
    pub fn load(&mut self, layer: i32) -> &mut [Ordinal] {
        self.layers.entry(layer).or_insert_with(unset_layer)
    }

    /// Pending ordinal at local `x`/`z` and world height `y`, [`UNSET`] if none.
    pub fn block_at(&self, x: i32, y: i32, z: i32) -> Ordinal {
        self.load_if_present(layer_of(y))
            .map(|data| data[layer_index(x, y, z)])
            .unwrap_or(UNSET)
    }

    /// Records a pending write at local `x`/`z` and world height `y`.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, ordinal: Ordinal) {
        self.load(layer_of(y))[layer_index(x, y, z)] = ordinal;
    }

    /// Overlays `other` onto this buffer. Cells `other` edited win.
    pub fn merge(&mut self, other: ChunkSet) {
        for (layer, incoming) in other.layers {
            match self.layers.get_mut(&layer) {
                Some(existing) => {
                    for (cell, ordinal) in existing.iter_mut().zip(incoming.iter()) {
                        if *ordinal != UNSET {
                            *cell = *ordinal;
                        }
                    }
                }
                None => {
                    self.layers.insert(layer, incoming);
                }
            }
        }
    }

    /// Iterates the allocated layers in ascending order.
    pub fn layers(&self) -> impl Iterator<Item = (i32, &[Ordinal])> {
        self.layers.iter().map(|(layer, data)| (*layer, &data[..]))
    }

    pub fn layer_keys(&self) -> Vec<i32> {
        self.layers.keys().copied().collect()
    }

    /// Iterates every edited cell as `(layer, index, ordinal)`.
    pub fn edited_cells(&self) -> EditedCellIterator<'_> {
        EditedCellIterator::new(self)
    }

    /// True when no cell holds a pending change, allocated layers included.
    pub fn is_empty(&self) -> bool {
        self.layers
            .values()
            .all(|data| data.iter().all(|ordinal| *ordinal == UNSET))
    }

    pub fn edited_cell_count(&self) -> usize {
        self.edited_cells().count()
    }
}

/// The effective world as seen from inside one chunk job.
///
/// Inside the column a cell reads the pending edit first and falls back to the
/// pre-edit contents. Outside the column reads go to `outside`, normally the live
/// world.
///
/// Reads are not limited to edited layers. Redstone wire looks one layer above
/// and below itself, so resolving a wire can load a `get` layer that has no
/// pending `set` buffer.
pub struct ChunkView<'a> {
    pub chunk: ChunkPos,
    pub get: &'a ChunkGet,
    pub set: &'a ChunkSet,
    pub outside: &'a dyn BlockReader,
}

impl BlockReader for ChunkView<'_> {
    fn block_at(&self, x: i32, y: i32, z: i32) -> Ordinal {
        if !self.chunk.contains(x, z) {
            return self.outside.block_at(x, y, z);
        }
        let pending = self.set.block_at(x, y, z);
        if pending != UNSET {
            return pending;
        }
        self.get.block_at(x, y, z).unwrap_or_else(|err| {
            log::warn!("Reading ({}, {}, {}) failed, using air: {}", x, y, z, err);
            AIR
        })
    }
}
