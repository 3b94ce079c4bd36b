//! # Placement Module
//!
//! Recomputes the neighbor-dependent part of a block state (fence connections,
//! stair shapes, pane links) by pretending a player just placed the block.
//!
//! ## Synthetic clicks
//!
//! The host already knows how to turn "player clicked face F of block B at point P"
//! into a block state. [`derive_click_context`] reconstructs a plausible click from
//! the sides a state is attached to, so that logic can be reused as a black box:
//!
//! 1. **Floor**: no attachment sides, or a type with both `north` and `east`
//!    properties (multi-directional shapes). Click the top face of the block below.
//! 2. **Wall**: the first of north, east, south, west the state attaches to. Click
//!    the facing side of that neighbor, slightly below full height, or at half
//!    height if the state also attaches upwards.
//! 3. **Ceiling**: only attached upwards. Click the bottom face of the block above.
//! 4. **Down**: only attached downwards. Click the top face of the block below.
//!
//! The recomputation itself lives in [`processor`]; [`rules`] provides a
//! self-contained [`PlacementResolver`](crate::engine_state::voxels::host::PlacementResolver)
//! for hosts that have no placement logic of their own.

use cgmath::{Point3, Vector3};

use super::block::{
    block_side::{BlockSide, SideSet},
    BlockState,
};

pub mod processor;
pub mod rules;

/// A simulated player click.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementContext {
    /// The block being placed.
    pub position: Point3<i32>,
    /// Where on the clicked face the click landed, in world coordinates.
    pub click_position: Point3<f64>,
    /// The face of `clicked_block` that was clicked. `None` when no click can be
    /// derived; resolvers leave the state unchanged in that case.
    pub clicked_face: Option<BlockSide>,
    /// The existing block that was clicked.
    pub clicked_block: Point3<i32>,
}

impl PlacementContext {
    fn centered(position: Point3<i32>, dy: f64, face: BlockSide, clicked_block: Vector3<i32>) -> Self {
        PlacementContext {
            position,
            click_position: Point3::new(
                position.x as f64 + 0.5,
                position.y as f64 + dy,
                position.z as f64 + 0.5,
            ),
            clicked_face: Some(face),
            clicked_block: position + clicked_block,
        }
    }
}

/// Derives the synthetic click that would have placed `state` at `position`.
pub fn derive_click_context(state: BlockState<'_>, position: Point3<i32>) -> PlacementContext {
    derive_from_sides(
        state.directions(),
        state.has_property("north") && state.has_property("east"),
        position,
    )
}

fn derive_from_sides(sides: SideSet, multi_directional: bool, position: Point3<i32>) -> PlacementContext {
    if sides.is_empty() || multi_directional {
        return PlacementContext::centered(position, 0.0, BlockSide::UP, Vector3::new(0, -1, 0));
    }

    if let Some(side) = BlockSide::HORIZONTAL.into_iter().find(|side| sides.contains(*side)) {
        let offset = side.offset();
        let y = if sides.contains(BlockSide::UP) { 0.5 } else { 0.2 };
        return PlacementContext {
            position,
            click_position: Point3::new(
                position.x as f64 + 0.5 * (1 + offset.x) as f64,
                position.y as f64 + y,
                position.z as f64 + 0.5 * (1 + offset.z) as f64,
            ),
            clicked_face: Some(side.opposite()),
            clicked_block: position + offset,
        };
    }

    if sides.contains(BlockSide::UP) {
        return PlacementContext::centered(position, 1.0, BlockSide::DOWN, Vector3::new(0, 1, 0));
    }

    // Only DOWN is left.
    PlacementContext::centered(position, -1.0, BlockSide::UP, Vector3::new(0, -1, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::registry::BlockRegistry;

    fn context(state: &str) -> PlacementContext {
        let registry = BlockRegistry::builtin().unwrap();
        let state = registry.parse_state(state).unwrap();
        derive_click_context(state, Point3::new(10, 64, -3))
    }

    #[test]
    fn fence_is_a_floor_placement() {
        let ctx = context("oak_fence[north=true,east=true]");
        assert_eq!(ctx.clicked_face, Some(BlockSide::UP));
        assert_eq!(ctx.click_position, Point3::new(10.5, 64.0, -2.5));
        assert_eq!(ctx.clicked_block, Point3::new(10, 63, -3));
    }

    #[test]
    fn undirected_block_is_a_floor_placement() {
        let ctx = context("stone");
        assert_eq!(ctx.clicked_face, Some(BlockSide::UP));
        assert_eq!(ctx.clicked_block, Point3::new(10, 63, -3));
    }

    #[test]
    fn facing_block_clicks_the_wall_it_faces() {
        let ctx = context("oak_stairs[facing=east]");
        assert_eq!(ctx.clicked_face, Some(BlockSide::WEST));
        assert_eq!(ctx.click_position, Point3::new(11.0, 64.2, -2.5));
        assert_eq!(ctx.clicked_block, Point3::new(11, 64, -3));
    }

    #[test]
    fn wall_click_is_raised_when_also_attached_up() {
        let ctx = context("vine[south=true,up=true]");
        // vine carries north and east properties, so it is a floor placement
        assert_eq!(ctx.clicked_face, Some(BlockSide::UP));

        let ctx = derive_from_sides(
            [BlockSide::SOUTH, BlockSide::UP].into_iter().collect(),
            false,
            Point3::new(0, 10, 0),
        );
        assert_eq!(ctx.clicked_face, Some(BlockSide::NORTH));
        assert_eq!(ctx.click_position, Point3::new(0.5, 10.5, 1.0));
        assert_eq!(ctx.clicked_block, Point3::new(0, 10, 1));
    }

    #[test]
    fn north_wins_over_later_sides() {
        let ctx = derive_from_sides(
            [BlockSide::WEST, BlockSide::NORTH].into_iter().collect(),
            false,
            Point3::new(0, 0, 0),
        );
        assert_eq!(ctx.clicked_face, Some(BlockSide::SOUTH));
        assert_eq!(ctx.click_position, Point3::new(0.5, 0.2, 0.0));
    }

    #[test]
    fn vertical_attachments_click_above_or_below() {
        let ctx = context("pointed_dripstone[vertical_direction=up]");
        assert_eq!(ctx.clicked_face, Some(BlockSide::DOWN));
        assert_eq!(ctx.click_position, Point3::new(10.5, 65.0, -2.5));
        assert_eq!(ctx.clicked_block, Point3::new(10, 65, -3));

        let ctx = context("pointed_dripstone[vertical_direction=down]");
        assert_eq!(ctx.clicked_face, Some(BlockSide::UP));
        assert_eq!(ctx.click_position, Point3::new(10.5, 63.0, -2.5));
        assert_eq!(ctx.clicked_block, Point3::new(10, 63, -3));
    }
}
