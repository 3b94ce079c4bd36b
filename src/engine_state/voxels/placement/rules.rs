//! # Connection Rules
//!
//! A [`PlacementResolver`] that knows how the common connecting blocks attach to
//! their neighbors. Hosts with their own placement logic plug that in instead;
//! this one keeps the engine usable (and testable) on its own.
//!
//! | Family | Connects to |
//! |--------|-------------|
//! | fences | fences of the same material, fence gates across their axis, solid blocks |
//! | panes, iron bars | panes, walls, solid blocks |
//! | walls | walls, panes, fence gates across their axis, solid blocks |
//! | redstone wire | wire on the same level, one level down, or one level up |
//!
//! Stairs take their facing from the clicked face and their shape from the stairs
//! in front of and behind them. Fence gates sink into adjacent walls. Every other
//! block is returned unchanged.

use cgmath::Point3;

use crate::engine_state::voxels::{
    block::{
        block_side::BlockSide,
        block_type::{BlockCategory, PropertyValue},
        BlockState, Ordinal,
    },
    host::{BlockReader, PlacementResolver},
    placement::PlacementContext,
};
use crate::error::EngineError;

const NETHER_BRICK_FENCE: &str = "nether_brick_fence";
const REDSTONE_WIRE: &str = "redstone_wire";

/// Reference connection logic for fences, panes, walls, stairs, gates and wire.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectionRules;

impl PlacementResolver for ConnectionRules {
    fn resolve_placement(
        &self,
        state: BlockState<'_>,
        context: &PlacementContext,
        world: &dyn BlockReader,
    ) -> Result<Ordinal, EngineError> {
        let Some(face) = context.clicked_face else {
            return Ok(state.ordinal());
        };
        let neighbors = Neighbors {
            world,
            origin: state,
            position: context.position,
        };
        let block_type = state.block_type();

        let resolved = if block_type.in_category(BlockCategory::Fences) {
            connect_booleans(state, |side| neighbors.fence_connects(side))
        } else if block_type.in_category(BlockCategory::Panes) {
            connect_booleans(state, |side| neighbors.pane_connects(side))
        } else if block_type.in_category(BlockCategory::Walls) {
            wall_state(state, &neighbors)
        } else if block_type.in_category(BlockCategory::Stairs) {
            stairs_state(state, face, &neighbors)
        } else if block_type.in_category(BlockCategory::FenceGates) {
            gate_state(state, &neighbors)
        } else if block_type.name == REDSTONE_WIRE {
            wire_state(state, &neighbors)
        } else {
            state
        };
        Ok(resolved.ordinal())
    }
}

/// Looks at the blocks around the position being placed.
struct Neighbors<'w, 's> {
    world: &'w dyn BlockReader,
    origin: BlockState<'s>,
    position: Point3<i32>,
}

impl<'s> Neighbors<'_, 's> {
    fn at(&self, position: Point3<i32>) -> Option<BlockState<'s>> {
        let ordinal = self.world.block_at(position.x, position.y, position.z);
        self.origin.registry().state(ordinal)
    }

    fn beside(&self, side: BlockSide) -> Option<BlockState<'s>> {
        self.at(self.position + side.offset())
    }

    fn is_solid(state: Option<BlockState<'_>>) -> bool {
        state.map(|state| state.block_type().solid).unwrap_or(false)
    }

    fn in_category(state: Option<BlockState<'_>>, category: BlockCategory) -> bool {
        state
            .map(|state| state.block_type().in_category(category))
            .unwrap_or(false)
    }

    /// A fence gate connects on the two sides its hinge axis points at.
    fn gate_across(state: Option<BlockState<'_>>, side: BlockSide) -> bool {
        Self::in_category(state, BlockCategory::FenceGates)
            && state
                .and_then(|gate| gate.get_side("facing"))
                .map(|facing| !facing.same_axis(side))
                .unwrap_or(false)
    }

    fn fence_connects(&self, side: BlockSide) -> bool {
        let neighbor = self.beside(side);
        if let Some(fence) = neighbor.filter(|n| n.block_type().in_category(BlockCategory::Fences)) {
            return (fence.name() == NETHER_BRICK_FENCE) == (self.origin.name() == NETHER_BRICK_FENCE);
        }
        Self::gate_across(neighbor, side) || Self::is_solid(neighbor)
    }

    fn pane_connects(&self, side: BlockSide) -> bool {
        let neighbor = self.beside(side);
        Self::in_category(neighbor, BlockCategory::Panes)
            || Self::in_category(neighbor, BlockCategory::Walls)
            || Self::is_solid(neighbor)
    }

    fn wall_connects(&self, side: BlockSide) -> bool {
        let neighbor = self.beside(side);
        Self::in_category(neighbor, BlockCategory::Walls)
            || Self::in_category(neighbor, BlockCategory::Panes)
            || Self::gate_across(neighbor, side)
            || Self::is_solid(neighbor)
    }
}

fn connect_booleans<'s>(state: BlockState<'s>, connects: impl Fn(BlockSide) -> bool) -> BlockState<'s> {
    BlockSide::HORIZONTAL.into_iter().fold(state, |state, side| {
        state.with_or_same(side.name(), PropertyValue::Boolean(connects(side)))
    })
}

fn wall_state<'s>(state: BlockState<'s>, neighbors: &Neighbors<'_, 's>) -> BlockState<'s> {
    let mut connected = Vec::with_capacity(4);
    let mut resolved = state;
    for side in BlockSide::HORIZONTAL {
        let connects = neighbors.wall_connects(side);
        if connects {
            connected.push(side);
        }
        let value = if connects { "low" } else { "none" };
        resolved = resolved.with_or_same(side.name(), PropertyValue::Enum(value));
    }

    // A post is only left out of a straight run.
    let straight = connected.len() == 2 && connected[0].same_axis(connected[1]);
    resolved.with_or_same("up", PropertyValue::Boolean(!straight))
}

fn stairs_state<'s>(state: BlockState<'s>, face: BlockSide, neighbors: &Neighbors<'_, 's>) -> BlockState<'s> {
    let mut resolved = state;
    if face.is_horizontal() {
        resolved = resolved.with_or_same("facing", PropertyValue::Direction(face.opposite()));
    }
    let shape = stairs_shape(resolved, neighbors);
    resolved.with_or_same("shape", PropertyValue::Enum(shape))
}

fn stairs_shape(state: BlockState<'_>, neighbors: &Neighbors<'_, '_>) -> &'static str {
    let Some(facing) = state.get_side("facing") else {
        return "straight";
    };
    let half = state.get("half");
    let as_stairs = |neighbor: Option<BlockState<'_>>| {
        neighbor
            .filter(|n| n.block_type().in_category(BlockCategory::Stairs) && n.get("half") == half)
            .and_then(|n| n.get_side("facing"))
    };
    // Another stair on `side` facing the same way blocks the corner.
    let can_take_shape = |side: BlockSide| {
        let neighbor = neighbors.beside(side);
        as_stairs(neighbor) != Some(facing)
    };

    if let Some(front_facing) = as_stairs(neighbors.beside(facing)) {
        if !front_facing.same_axis(facing) && can_take_shape(front_facing.opposite()) {
            return if front_facing == facing.counter_clockwise() {
                "outer_left"
            } else {
                "outer_right"
            };
        }
    }

    if let Some(back_facing) = as_stairs(neighbors.beside(facing.opposite())) {
        if !back_facing.same_axis(facing) && can_take_shape(back_facing) {
            return if back_facing == facing.counter_clockwise() {
                "inner_left"
            } else {
                "inner_right"
            };
        }
    }

    "straight"
}

fn gate_state<'s>(state: BlockState<'s>, neighbors: &Neighbors<'_, 's>) -> BlockState<'s> {
    let Some(facing) = state.get_side("facing") else {
        return state;
    };
    let left = facing.counter_clockwise();
    let in_wall = [left, left.opposite()]
        .into_iter()
        .any(|side| Neighbors::in_category(neighbors.beside(side), BlockCategory::Walls));
    state.with_or_same("in_wall", PropertyValue::Boolean(in_wall))
}

fn wire_state<'s>(state: BlockState<'s>, neighbors: &Neighbors<'_, 's>) -> BlockState<'s> {
    let is_wire = |neighbor: Option<BlockState<'_>>| {
        neighbor.map(|n| n.name() == REDSTONE_WIRE).unwrap_or(false)
    };
    let above_is_solid = Neighbors::is_solid(neighbors.beside(BlockSide::UP));

    let mut sides = [("none", BlockSide::NORTH); 4];
    for (slot, side) in sides.iter_mut().zip(BlockSide::HORIZONTAL) {
        let beside = neighbors.position + side.offset();
        let neighbor = neighbors.at(beside);
        let value = if !above_is_solid
            && Neighbors::is_solid(neighbor)
            && is_wire(neighbors.at(beside + BlockSide::UP.offset()))
        {
            "up"
        } else if is_wire(neighbor)
            || (!Neighbors::is_solid(neighbor) && is_wire(neighbors.at(beside + BlockSide::DOWN.offset())))
        {
            "side"
        } else {
            "none"
        };
        *slot = (value, side);
    }

    // A wire with a single connection extends straight through itself.
    let connected: Vec<BlockSide> = sides
        .iter()
        .filter(|(value, _)| *value != "none")
        .map(|(_, side)| *side)
        .collect();
    if let [only] = connected.as_slice() {
        for slot in sides.iter_mut() {
            if slot.1 == only.opposite() {
                slot.0 = "side";
            }
        }
    }

    sides.into_iter().fold(state, |state, (value, side)| {
        state.with_or_same(side.name(), PropertyValue::Enum(value))
    })
}
