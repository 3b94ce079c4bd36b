//! # Chunk Iteration Module
//!
//! This module provides an iterator over the edited cells of a [`ChunkSet`].
//!
//! ## Sparse-Aware Iteration
//!
//! The `EditedCellIterator` is designed to work with the Set buffer's sparse format:
//! 1. Layers that were never allocated are not visited at all
//! 2. Inside an allocated layer, cells holding `UNSET` are skipped
//! 3. Layers are visited bottom-up, cells in layer index order (y, then z, then x)

use std::collections::btree_map;

use crate::engine_state::voxels::block::{Ordinal, UNSET};

use super::ChunkSet;

/// An iterator over all edited cells of a chunk, yielding `(layer, index, ordinal)`.
pub struct EditedCellIterator<'a> {
    /// Remaining allocated layers
    layers: btree_map::Iter<'a, i32, Box<[Ordinal]>>,
    /// The layer currently being scanned and its cells
    current: Option<(i32, &'a [Ordinal])>,
    /// Next cell to look at in the current layer
    cell_offset: usize,
}

impl<'a> EditedCellIterator<'a> {
    /// Creates a new `EditedCellIterator` positioned before the first edited cell.
    pub fn new(set: &'a ChunkSet) -> Self {
        EditedCellIterator {
            layers: set.layers.iter(),
            current: None,
            cell_offset: 0,
        }
    }
}

impl Iterator for EditedCellIterator<'_> {
    type Item = (i32, usize, Ordinal);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((layer, cells)) = self.current {
                while self.cell_offset < cells.len() {
                    let index = self.cell_offset;
                    self.cell_offset += 1;
                    if cells[index] != UNSET {
                        return Some((layer, index, cells[index]));
                    }
                }
            }

            // Current layer exhausted, move to the next allocated one
            let (layer, cells) = self.layers.next()?;
            self.current = Some((*layer, &cells[..]));
            self.cell_offset = 0;
        }
    }
}
