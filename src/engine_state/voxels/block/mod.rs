//! # Block Module
//!
//! This module provides the block-state model of the engine. Every distinct
//! combination of a block type and its property values is a *state*, and every
//! state is addressed by a dense 16-bit [`Ordinal`].
//!
//! ## Components
//!
//! * [`block_side`] - The six faces of a block and compass helpers
//! * [`block_type`] - Data-driven block type and property definitions
//! * [`registry`] - The state table, built once from a block table
//! * [`ordinal`] - Translation between ordinals and the host's native ids
//! * [`mask`] - Type masks used to select shape-sensitive blocks
//!
//! ## Reserved ordinals
//!
//! [`UNSET`] marks a cell with no pending edit and is never a real block.
//! [`AIR`] is the degenerate default every failed lookup falls back to.

use std::fmt;

use block_side::{BlockSide, SideSet};
use block_type::{BlockType, PropertyKind, PropertyValue};
use registry::BlockRegistry;

pub mod block_side;
pub mod block_type;
pub mod mask;
pub mod ordinal;
pub mod registry;

/// Dense index of one block state.
pub type Ordinal = u16;

/// Dense index of one block type.
pub type BlockTypeId = u16;

/// "No pending edit here". Cells holding this value fall through to the Get buffer.
pub const UNSET: Ordinal = 0;

/// The air state.
pub const AIR: Ordinal = 1;

/// A resolved block state: an ordinal together with the type it belongs to.
///
/// This is a cheap borrowed view into a [`BlockRegistry`]; deriving a modified
/// state returns another view rather than mutating anything.
#[derive(Copy, Clone)]
pub struct BlockState<'a> {
    registry: &'a BlockRegistry,
    block_type: &'a BlockType,
    ordinal: Ordinal,
}

impl<'a> BlockState<'a> {
    pub(crate) fn new(registry: &'a BlockRegistry, block_type: &'a BlockType, ordinal: Ordinal) -> Self {
        BlockState {
            registry,
            block_type,
            ordinal,
        }
    }

    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    pub fn block_type(&self) -> &'a BlockType {
        self.block_type
    }

    pub fn registry(&self) -> &'a BlockRegistry {
        self.registry
    }

    pub fn name(&self) -> &'a str {
        &self.block_type.name
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.block_type.has_property(name)
    }

    /// Gets the value of the named property.
    ///
    /// # Returns
    /// `None` if the type has no property of that name.
    pub fn get(&self, name: &str) -> Option<PropertyValue<'a>> {
        let index = self.block_type.property_index(name)?;
        let value = self.block_type.value_index(self.ordinal, index);
        Some(self.block_type.properties[index].value_at(value))
    }

    /// Gets a boolean property, `None` if absent or not boolean.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            PropertyValue::Boolean(value) => Some(value),
            _ => None,
        }
    }

    /// Gets a direction property, `None` if absent or not a direction.
    pub fn get_side(&self, name: &str) -> Option<BlockSide> {
        match self.get(name)? {
            PropertyValue::Direction(side) => Some(side),
            _ => None,
        }
    }

    /// Derives the state with one property replaced.
    ///
    /// # Arguments
    /// * `name` - The property to replace
    /// * `value` - The new value; must belong to the property's domain
    ///
    /// # Returns
    /// `None` if the property does not exist or the value is outside its domain.
    pub fn with(&self, name: &str, value: PropertyValue<'_>) -> Option<BlockState<'a>> {
        let index = self.block_type.property_index(name)?;
        let value = self.block_type.properties[index].index_of(value)?;
        Some(self.with_index(index, value))
    }

    /// Like [`BlockState::with`], but silently keeps the state when the property is
    /// missing. Handy when a block family only carries some of the connection sides.
    pub fn with_or_same(&self, name: &str, value: PropertyValue<'_>) -> BlockState<'a> {
        self.with(name, value).unwrap_or(*self)
    }

    /// Derives the state with property number `property` set to value number `value`.
    pub fn with_index(&self, property: usize, value: usize) -> BlockState<'a> {
        let ordinal = self.block_type.replace_value(self.ordinal, property, value);
        BlockState::new(self.registry, self.block_type, ordinal)
    }

    /// The sides this state attaches to.
    ///
    /// Collected from direction-kind property values, boolean properties named after
    /// a side that are `true`, and enum properties named after a side whose value is
    /// neither `none` nor `false`.
    pub fn directions(&self) -> SideSet {
        let mut sides = SideSet::new();
        for (index, property) in self.block_type.properties.iter().enumerate() {
            let value = property.value_at(self.block_type.value_index(self.ordinal, index));
            match (&property.kind, value) {
                (PropertyKind::Direction(_), PropertyValue::Direction(side)) => sides.insert(side),
                (PropertyKind::Boolean, PropertyValue::Boolean(true)) => {
                    if let Some(side) = BlockSide::from_name(&property.name) {
                        sides.insert(side);
                    }
                }
                (PropertyKind::Enum(_), PropertyValue::Enum(text)) if text != "none" && text != "false" => {
                    if let Some(side) = BlockSide::from_name(&property.name) {
                        sides.insert(side);
                    }
                }
                _ => {}
            }
        }
        sides
    }
}

impl PartialEq for BlockState<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.ordinal == other.ordinal
    }
}

impl Eq for BlockState<'_> {}

impl fmt::Display for BlockState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.block_type.name)?;
        if self.block_type.properties.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (index, property) in self.block_type.properties.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            let value = property.value_at(self.block_type.value_index(self.ordinal, index));
            write!(f, "{}={}", property.name, value)?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for BlockState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockState({} #{})", self, self.ordinal)
    }
}
