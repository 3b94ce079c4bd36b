//! # Block Type Module
//!
//! This module defines block types and their properties. Types are declared in
//! JSON (see `assets/block_types.json`) and turned into the runtime [`BlockType`]
//! used by the registry to enumerate block states.

use std::fmt;

use serde::Deserialize;

use super::{block_side::BlockSide, BlockTypeId, Ordinal};
use crate::error::EngineError;

/// Root of a block table document.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockTypesFile {
    pub block_types: Vec<BlockTypeDefinition>,
}

/// One block type as declared in a block table.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockTypeDefinition {
    pub name: String,
    /// Whether the block occupies a full collision cube. Connecting blocks attach
    /// to solid neighbors.
    #[serde(default = "default_solid")]
    pub solid: bool,
    #[serde(default)]
    pub categories: Vec<BlockCategory>,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
}

fn default_solid() -> bool {
    true
}

/// One property as declared in a block table.
///
/// `kind` is kept as text so an unrecognised kind can be reported as a
/// structural error instead of a parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Static block categories used to build masks and connection groups.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCategory {
    Fences,
    FenceGates,
    Walls,
    Panes,
    CaveVines,
    Stairs,
    BambooBlocks,
    TallFlowers,
}

/// The value domain of a property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    /// `false`, `true`, in that order.
    Boolean,
    Direction(Vec<BlockSide>),
    Enum(Vec<String>),
    Integer(Vec<i32>),
}

/// A borrowed property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValue<'a> {
    Boolean(bool),
    Direction(BlockSide),
    Enum(&'a str),
    Integer(i32),
}

impl fmt::Display for PropertyValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Boolean(value) => write!(f, "{}", value),
            PropertyValue::Direction(side) => f.write_str(side.name()),
            PropertyValue::Enum(value) => f.write_str(value),
            PropertyValue::Integer(value) => write!(f, "{}", value),
        }
    }
}

/// A named property with its ordered value domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub kind: PropertyKind,
}

impl Property {
    /// Builds a property from its declaration.
    ///
    /// # Errors
    /// `UnsupportedProperty` for an unknown kind, `InvalidPropertyValue` for a value
    /// that does not fit the kind or an empty value list.
    pub fn from_definition(block: &str, definition: &PropertyDefinition) -> Result<Self, EngineError> {
        let invalid = |value: &str| EngineError::InvalidPropertyValue {
            block: block.to_string(),
            property: definition.name.clone(),
            value: value.to_string(),
        };

        let kind = match definition.kind.as_str() {
            "boolean" => {
                if let Some(value) = definition
                    .values
                    .iter()
                    .find(|value| *value != "true" && *value != "false")
                {
                    return Err(invalid(value));
                }
                PropertyKind::Boolean
            }
            "direction" => PropertyKind::Direction(
                definition
                    .values
                    .iter()
                    .map(|value| BlockSide::from_name(value).ok_or_else(|| invalid(value)))
                    .collect::<Result<_, _>>()?,
            ),
            "enum" => PropertyKind::Enum(definition.values.clone()),
            "integer" => PropertyKind::Integer(
                definition
                    .values
                    .iter()
                    .map(|value| value.parse::<i32>().map_err(|_| invalid(value)))
                    .collect::<Result<_, _>>()?,
            ),
            other => {
                return Err(EngineError::UnsupportedProperty {
                    block: block.to_string(),
                    property: definition.name.clone(),
                    kind: other.to_string(),
                })
            }
        };

        let property = Property {
            name: definition.name.clone(),
            kind,
        };
        if property.value_count() == 0 {
            return Err(invalid(""));
        }
        Ok(property)
    }

    /// Number of values in the domain.
    pub fn value_count(&self) -> usize {
        match &self.kind {
            PropertyKind::Boolean => 2,
            PropertyKind::Direction(values) => values.len(),
            PropertyKind::Enum(values) => values.len(),
            PropertyKind::Integer(values) => values.len(),
        }
    }

    /// The value at `index` in the domain. `index` must be below `value_count()`.
    pub fn value_at(&self, index: usize) -> PropertyValue<'_> {
        match &self.kind {
            PropertyKind::Boolean => PropertyValue::Boolean(index == 1),
            PropertyKind::Direction(values) => PropertyValue::Direction(values[index]),
            PropertyKind::Enum(values) => PropertyValue::Enum(&values[index]),
            PropertyKind::Integer(values) => PropertyValue::Integer(values[index]),
        }
    }

    /// Position of `value` in the domain, if it belongs to it.
    pub fn index_of(&self, value: PropertyValue<'_>) -> Option<usize> {
        match (&self.kind, value) {
            (PropertyKind::Boolean, PropertyValue::Boolean(value)) => Some(value as usize),
            (PropertyKind::Direction(values), PropertyValue::Direction(side)) => {
                values.iter().position(|candidate| *candidate == side)
            }
            (PropertyKind::Enum(values), PropertyValue::Enum(text)) => {
                values.iter().position(|candidate| candidate == text)
            }
            (PropertyKind::Integer(values), PropertyValue::Integer(number)) => {
                values.iter().position(|candidate| *candidate == number)
            }
            _ => None,
        }
    }

    /// Position of the value spelled `text` in the domain.
    pub fn parse_index(&self, text: &str) -> Option<usize> {
        match &self.kind {
            PropertyKind::Boolean => match text {
                "false" => Some(0),
                "true" => Some(1),
                _ => None,
            },
            PropertyKind::Direction(values) => {
                let side = BlockSide::from_name(text)?;
                values.iter().position(|candidate| *candidate == side)
            }
            PropertyKind::Enum(values) => values.iter().position(|candidate| candidate == text),
            PropertyKind::Integer(values) => {
                let number = text.parse::<i32>().ok()?;
                values.iter().position(|candidate| *candidate == number)
            }
        }
    }
}

/// A registered block type.
///
/// The states of a type occupy the contiguous ordinal range
/// `first_ordinal..first_ordinal + state_count`. Within that range the last
/// property varies fastest.
#[derive(Debug, Clone)]
pub struct BlockType {
    pub id: BlockTypeId,
    pub name: String,
    pub solid: bool,
    pub categories: Vec<BlockCategory>,
    pub properties: Vec<Property>,
    pub first_ordinal: Ordinal,
    pub state_count: usize,
    strides: Vec<usize>,
}

impl BlockType {
    pub(crate) fn new(
        id: BlockTypeId,
        definition: &BlockTypeDefinition,
        properties: Vec<Property>,
        first_ordinal: Ordinal,
    ) -> Self {
        let mut strides = vec![1; properties.len()];
        for i in (0..properties.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * properties[i + 1].value_count();
        }
        let state_count = properties.iter().map(Property::value_count).product();

        BlockType {
            id,
            name: definition.name.clone(),
            solid: definition.solid,
            categories: definition.categories.clone(),
            properties,
            first_ordinal,
            state_count,
            strides,
        }
    }

    pub fn in_category(&self, category: BlockCategory) -> bool {
        self.categories.contains(&category)
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|property| property.name == name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property_index(name).is_some()
    }

    /// Whether `ordinal` is one of this type's states.
    pub fn contains(&self, ordinal: Ordinal) -> bool {
        let offset = ordinal as usize;
        let first = self.first_ordinal as usize;
        offset >= first && offset < first + self.state_count
    }

    /// Index of the value property `property` takes in state `ordinal`.
    pub(crate) fn value_index(&self, ordinal: Ordinal, property: usize) -> usize {
        let local = (ordinal - self.first_ordinal) as usize;
        (local / self.strides[property]) % self.properties[property].value_count()
    }

    /// Ordinal of `ordinal` with one property value index replaced.
    pub(crate) fn replace_value(&self, ordinal: Ordinal, property: usize, value: usize) -> Ordinal {
        let current = self.value_index(ordinal, property);
        let local = (ordinal - self.first_ordinal) as usize;
        let replaced = local - current * self.strides[property] + value * self.strides[property];
        self.first_ordinal + replaced as Ordinal
    }

    /// Ordinal of the state with the given value index for every property.
    pub(crate) fn ordinal_for(&self, value_indices: &[usize]) -> Ordinal {
        let local: usize = value_indices
            .iter()
            .zip(&self.strides)
            .map(|(value, stride)| value * stride)
            .sum();
        self.first_ordinal + local as Ordinal
    }
}
