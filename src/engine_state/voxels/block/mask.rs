//! # Block Type Masks
//!
//! A mask is a set of block *types* with O(1) membership, stored as one bit per
//! type id. Masks are built once from the registry and shared immutably between
//! processors.
//!
//! The placement masks are derived from two sources: the category tags declared in
//! the block table, and static name tables for types that carry no category.

use bitvec::prelude::BitVec;
use phf::{phf_set, Set};

use super::{
    block_type::BlockCategory,
    registry::BlockRegistry,
    BlockTypeId, Ordinal,
};
use crate::error::EngineError;

/// Types whose connectivity depends on neighbors that may change in the same edit.
static REQUIRES_SECOND_PASS_NAMES: Set<&'static str> = phf_set! {
    "iron_bars",
    "glass_pane",
    "white_stained_glass_pane",
    "orange_stained_glass_pane",
    "magenta_stained_glass_pane",
    "light_blue_stained_glass_pane",
    "yellow_stained_glass_pane",
    "lime_stained_glass_pane",
    "pink_stained_glass_pane",
    "gray_stained_glass_pane",
    "light_gray_stained_glass_pane",
    "cyan_stained_glass_pane",
    "purple_stained_glass_pane",
    "blue_stained_glass_pane",
    "brown_stained_glass_pane",
    "green_stained_glass_pane",
    "red_stained_glass_pane",
    "black_stained_glass_pane",
    "tripwire",
    "twisting_vines_plant",
    "cave_vines_plant",
    "weeping_vines_plant",
    "vine",
    "redstone_wire",
};

const REQUIRES_SECOND_PASS_CATEGORIES: [BlockCategory; 5] = [
    BlockCategory::Fences,
    BlockCategory::FenceGates,
    BlockCategory::Walls,
    BlockCategory::CaveVines,
    BlockCategory::Panes,
];

/// Shape-sensitive types that do not need a second pass.
static DEFAULT_EXTRA_NAMES: Set<&'static str> = phf_set! {
    "chorus_plant",
    "dripstone_block",
    "pointed_dripstone",
    "big_dripleaf",
    "big_dripleaf_stem",
    "campfire",
    "chest",
    "trapped_chest",
    "crafter",
    "mushroom_stem",
    "brown_mushroom_block",
    "red_mushroom_block",
};

const DEFAULT_EXTRA_CATEGORIES: [BlockCategory; 3] = [
    BlockCategory::Stairs,
    BlockCategory::BambooBlocks,
    BlockCategory::TallFlowers,
];

/// A set of block types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTypeMask {
    bits: BitVec,
}

impl BlockTypeMask {
    /// Creates an empty mask able to hold every type of `registry`.
    pub fn empty(registry: &BlockRegistry) -> Self {
        BlockTypeMask {
            bits: BitVec::repeat(false, registry.type_count()),
        }
    }

    /// Creates a mask from block type names.
    ///
    /// # Errors
    /// `UnknownBlockType` for a name the registry does not know. Use this for
    /// user-supplied masks; static tables skip unknown names instead.
    pub fn from_names<I, S>(registry: &BlockRegistry, names: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut mask = Self::empty(registry);
        for name in names {
            let name = name.as_ref();
            let block_type = registry
                .block_type_by_name(name)
                .ok_or_else(|| EngineError::UnknownBlockType(name.to_string()))?;
            mask.insert(block_type.id);
        }
        Ok(mask)
    }

    pub fn insert(&mut self, id: BlockTypeId) {
        let index = id as usize;
        if index < self.bits.len() {
            self.bits.set(index, true);
        }
    }

    /// Adds every type of a static name table that the registry knows.
    fn insert_known(&mut self, registry: &BlockRegistry, names: &Set<&'static str>) {
        for name in names.iter() {
            match registry.block_type_by_name(name) {
                Some(block_type) => self.insert(block_type.id),
                None => log::debug!("Mask entry `{}` is not in the block table", name),
            }
        }
    }

    /// Adds every type tagged with one of `categories`.
    fn insert_categories(&mut self, registry: &BlockRegistry, categories: &[BlockCategory]) {
        for block_type in registry.block_types() {
            if categories.iter().any(|category| block_type.in_category(*category)) {
                self.insert(block_type.id);
            }
        }
    }

    pub fn contains_type(&self, id: BlockTypeId) -> bool {
        self.bits.get(id as usize).map(|bit| *bit).unwrap_or(false)
    }

    /// Whether the type of `ordinal` is in the mask. Unknown ordinals are not.
    pub fn contains(&self, registry: &BlockRegistry, ordinal: Ordinal) -> bool {
        registry
            .type_id_of(ordinal)
            .map(|id| self.contains_type(id))
            .unwrap_or(false)
    }

    pub fn union(&self, other: &BlockTypeMask) -> BlockTypeMask {
        let mut bits = self.bits.clone();
        for index in other.bits.iter_ones() {
            if index < bits.len() {
                bits.set(index, true);
            }
        }
        BlockTypeMask { bits }
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones()
    }
}

/// The masks driving the placement processor.
#[derive(Clone, Debug)]
pub struct PlacementMasks {
    /// Every shape-sensitive type; the processor's default working mask.
    pub default: BlockTypeMask,
    /// Types only recomputed once their neighbors are final.
    pub requires_second_pass: BlockTypeMask,
    /// Types whose change ripples to planar neighbors.
    pub second: BlockTypeMask,
    pub stairs: BlockTypeMask,
}

impl PlacementMasks {
    pub fn new(registry: &BlockRegistry) -> Self {
        let mut requires_second_pass = BlockTypeMask::empty(registry);
        requires_second_pass.insert_known(registry, &REQUIRES_SECOND_PASS_NAMES);
        requires_second_pass.insert_categories(registry, &REQUIRES_SECOND_PASS_CATEGORIES);

        let mut stairs = BlockTypeMask::empty(registry);
        stairs.insert_categories(registry, &[BlockCategory::Stairs]);

        let mut default = requires_second_pass.clone();
        default.insert_known(registry, &DEFAULT_EXTRA_NAMES);
        default.insert_categories(registry, &DEFAULT_EXTRA_CATEGORIES);

        let second = stairs.union(&requires_second_pass);

        log::debug!(
            "Placement masks: {} default, {} second-pass, {} ripple types",
            default.len(),
            requires_second_pass.len(),
            second.len()
        );

        PlacementMasks {
            default,
            requires_second_pass,
            second,
            stairs,
        }
    }
}
