//! # Block Side Module
//!
//! This module defines the six faces of a block and the compass directions used
//! by connectivity logic. A side doubles as the value type of `direction`
//! properties (`facing=north`) and as the name of side-keyed properties
//! (`north=true`, `east=low`).

use cgmath::Vector3;
use num_derive::FromPrimitive;

/// Represents the six possible faces of a block.
///
/// Each variant is assigned a unique integer value so it can index fixed-size
/// per-side arrays such as [`SideSet`].
///
/// The order is: [NORTH, EAST, SOUTH, WEST, UP, DOWN]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, FromPrimitive)]
pub enum BlockSide {
    /// Facing negative Z
    NORTH = 0,

    /// Facing positive X
    EAST = 1,

    /// Facing positive Z
    SOUTH = 2,

    /// Facing negative X
    WEST = 3,

    /// Facing positive Y
    UP = 4,

    /// Facing negative Y
    DOWN = 5,
}

impl BlockSide {
    /// The four compass sides in the priority order used for wall placement.
    pub const HORIZONTAL: [BlockSide; 4] = [
        BlockSide::NORTH,
        BlockSide::EAST,
        BlockSide::SOUTH,
        BlockSide::WEST,
    ];

    /// Returns an array containing all six sides in index order.
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::NORTH,
            BlockSide::EAST,
            BlockSide::SOUTH,
            BlockSide::WEST,
            BlockSide::UP,
            BlockSide::DOWN,
        ]
    }

    /// Converts an index back into a side, `None` past `DOWN`.
    pub fn from_index(index: usize) -> Option<Self> {
        num::FromPrimitive::from_usize(index)
    }

    /// Parses the lowercase property spelling of a side.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "north" => Some(BlockSide::NORTH),
            "east" => Some(BlockSide::EAST),
            "south" => Some(BlockSide::SOUTH),
            "west" => Some(BlockSide::WEST),
            "up" => Some(BlockSide::UP),
            "down" => Some(BlockSide::DOWN),
            _ => None,
        }
    }

    /// The lowercase property spelling of this side.
    pub fn name(self) -> &'static str {
        match self {
            BlockSide::NORTH => "north",
            BlockSide::EAST => "east",
            BlockSide::SOUTH => "south",
            BlockSide::WEST => "west",
            BlockSide::UP => "up",
            BlockSide::DOWN => "down",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            BlockSide::NORTH => BlockSide::SOUTH,
            BlockSide::EAST => BlockSide::WEST,
            BlockSide::SOUTH => BlockSide::NORTH,
            BlockSide::WEST => BlockSide::EAST,
            BlockSide::UP => BlockSide::DOWN,
            BlockSide::DOWN => BlockSide::UP,
        }
    }

    /// Rotates a compass side a quarter turn counter-clockwise seen from above.
    /// Vertical sides are returned unchanged.
    pub fn counter_clockwise(self) -> Self {
        match self {
            BlockSide::NORTH => BlockSide::WEST,
            BlockSide::WEST => BlockSide::SOUTH,
            BlockSide::SOUTH => BlockSide::EAST,
            BlockSide::EAST => BlockSide::NORTH,
            vertical => vertical,
        }
    }

    pub fn is_horizontal(self) -> bool {
        !matches!(self, BlockSide::UP | BlockSide::DOWN)
    }

    /// Whether two compass sides lie on the same axis (north/south or east/west).
    pub fn same_axis(self, other: BlockSide) -> bool {
        self == other || self == other.opposite()
    }

    /// Unit offset from a block to its neighbor on this side.
    pub fn offset(self) -> Vector3<i32> {
        match self {
            BlockSide::NORTH => Vector3::new(0, 0, -1),
            BlockSide::EAST => Vector3::new(1, 0, 0),
            BlockSide::SOUTH => Vector3::new(0, 0, 1),
            BlockSide::WEST => Vector3::new(-1, 0, 0),
            BlockSide::UP => Vector3::new(0, 1, 0),
            BlockSide::DOWN => Vector3::new(0, -1, 0),
        }
    }
}

/// A set of sides, stored as one flag per side in `BlockSide` index order.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SideSet {
    flags: [bool; 6],
}

impl SideSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, side: BlockSide) {
        self.flags[side as usize] = true;
    }

    pub fn contains(&self, side: BlockSide) -> bool {
        self.flags[side as usize]
    }

    pub fn is_empty(&self) -> bool {
        !self.flags.iter().any(|flag| *flag)
    }

    /// Iterates the contained sides in index order.
    pub fn iter(&self) -> impl Iterator<Item = BlockSide> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, present)| **present)
            .filter_map(|(index, _)| BlockSide::from_index(index))
    }
}

impl FromIterator<BlockSide> for SideSet {
    fn from_iter<I: IntoIterator<Item = BlockSide>>(iter: I) -> Self {
        let mut set = SideSet::new();
        for side in iter {
            set.insert(side);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_offsets_cancel() {
        for side in BlockSide::all() {
            assert_eq!(side.offset() + side.opposite().offset(), Vector3::new(0, 0, 0));
            assert_eq!(side.opposite().opposite(), side);
        }
    }

    #[test]
    fn counter_clockwise_cycles_compass() {
        let mut side = BlockSide::NORTH;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(side);
            side = side.counter_clockwise();
        }
        assert_eq!(side, BlockSide::NORTH);
        assert_eq!(
            seen,
            vec![BlockSide::NORTH, BlockSide::WEST, BlockSide::SOUTH, BlockSide::EAST]
        );
        assert_eq!(BlockSide::UP.counter_clockwise(), BlockSide::UP);
    }

    #[test]
    fn names_round_trip_through_index() {
        for (index, side) in BlockSide::all().into_iter().enumerate() {
            assert_eq!(BlockSide::from_index(index), Some(side));
            assert_eq!(BlockSide::from_name(side.name()), Some(side));
        }
        assert_eq!(BlockSide::from_index(6), None);
        assert_eq!(BlockSide::from_name("sideways"), None);
    }

    #[test]
    fn side_set_iterates_in_index_order() {
        let set: SideSet = [BlockSide::UP, BlockSide::NORTH, BlockSide::WEST].into_iter().collect();
        assert!(set.contains(BlockSide::WEST));
        assert!(!set.contains(BlockSide::EAST));
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![BlockSide::NORTH, BlockSide::WEST, BlockSide::UP]
        );
        assert!(SideSet::new().is_empty());
    }
}
