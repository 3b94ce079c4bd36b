//! # Block Registry
//!
//! The registry enumerates every block state of a block table and assigns each a
//! dense [`Ordinal`]. The table is built once and is immutable afterwards, so it is
//! shared between threads behind an `Arc` without any locking.
//!
//! ## Layout
//!
//! * Ordinal `0` belongs to a reserved pseudo type and is the [`UNSET`] sentinel
//! * Ordinal `1` is [`AIR`]
//! * Every declared type then receives a contiguous range of ordinals, one per
//!   combination of its property values, with the last property varying fastest

use std::collections::HashMap;

use super::{
    block_type::{BlockType, BlockTypeDefinition, BlockTypesFile, Property},
    BlockState, BlockTypeId, Ordinal, AIR, UNSET,
};
use crate::error::EngineError;

/// The block table compiled into the crate.
pub const BUILTIN_BLOCK_TYPES: &str = include_str!("../../../../assets/block_types.json");

const RESERVED_TYPE_NAME: &str = "__reserved__";
const AIR_TYPE_NAME: &str = "air";

/// The number of ordinals a 16-bit index can address.
const MAX_ORDINALS: usize = Ordinal::MAX as usize + 1;

/// Immutable table of block types and their states.
#[derive(Debug)]
pub struct BlockRegistry {
    types: Vec<BlockType>,
    by_name: HashMap<String, BlockTypeId>,
    ordinal_to_type: Vec<BlockTypeId>,
}

impl BlockRegistry {
    /// Builds the registry from the block table compiled into the crate.
    pub fn builtin() -> Result<Self, EngineError> {
        Self::from_json_str(BUILTIN_BLOCK_TYPES)
    }

    /// Builds a registry from a JSON block table.
    ///
    /// # Errors
    /// Fails on malformed JSON, on a property kind the registry cannot model, and
    /// when the table would need more ordinals than fit in 16 bits. All of these are
    /// startup failures.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let file: BlockTypesFile = serde_json::from_str(json).map_err(EngineError::RegistryParse)?;
        Self::from_definitions(&file.block_types)
    }

    /// Builds a registry from already-parsed definitions.
    pub fn from_definitions(definitions: &[BlockTypeDefinition]) -> Result<Self, EngineError> {
        let builtin = [
            BlockTypeDefinition {
                name: RESERVED_TYPE_NAME.to_string(),
                solid: false,
                categories: Vec::new(),
                properties: Vec::new(),
            },
            BlockTypeDefinition {
                name: AIR_TYPE_NAME.to_string(),
                solid: false,
                categories: Vec::new(),
                properties: Vec::new(),
            },
        ];

        let mut types: Vec<BlockType> = Vec::with_capacity(definitions.len() + builtin.len());
        let mut by_name = HashMap::new();
        let mut ordinal_to_type = Vec::new();

        let declared = definitions
            .iter()
            .filter(|definition| definition.name != AIR_TYPE_NAME);

        for definition in builtin.iter().chain(declared) {
            if by_name.contains_key(&definition.name) {
                log::warn!("Duplicate block type `{}` ignored", definition.name);
                continue;
            }

            let properties = definition
                .properties
                .iter()
                .map(|property| Property::from_definition(&definition.name, property))
                .collect::<Result<Vec<_>, _>>()?;

            let first = ordinal_to_type.len();
            let id = types.len() as BlockTypeId;
            let state_count: usize = properties.iter().map(Property::value_count).product();
            if first + state_count > MAX_ORDINALS {
                return Err(EngineError::OrdinalOverflow(first + state_count));
            }

            ordinal_to_type.extend(std::iter::repeat(id).take(state_count));
            by_name.insert(definition.name.clone(), id);
            types.push(BlockType::new(id, definition, properties, first as Ordinal));
        }

        log::info!(
            "Block registry built: {} types, {} states",
            types.len(),
            ordinal_to_type.len()
        );

        Ok(BlockRegistry {
            types,
            by_name,
            ordinal_to_type,
        })
    }

    /// Total number of ordinals, including the reserved one.
    pub fn state_count(&self) -> usize {
        self.ordinal_to_type.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Iterates every registered type in id order, the reserved type included.
    pub fn block_types(&self) -> impl Iterator<Item = &BlockType> {
        self.types.iter()
    }

    pub fn block_type(&self, id: BlockTypeId) -> Option<&BlockType> {
        self.types.get(id as usize)
    }

    pub fn block_type_by_name(&self, name: &str) -> Option<&BlockType> {
        self.by_name.get(name).and_then(|id| self.block_type(*id))
    }

    pub fn type_id_of(&self, ordinal: Ordinal) -> Option<BlockTypeId> {
        self.ordinal_to_type.get(ordinal as usize).copied()
    }

    /// Resolves an ordinal into a state view.
    ///
    /// # Returns
    /// `None` for ordinals past the end of the table.
    pub fn state(&self, ordinal: Ordinal) -> Option<BlockState<'_>> {
        let block_type = self.block_type(self.type_id_of(ordinal)?)?;
        Some(BlockState::new(self, block_type, ordinal))
    }

    /// Resolves an ordinal that must be a real block state.
    ///
    /// # Errors
    /// `UnknownOrdinal` for [`UNSET`] and for ordinals past the end of the table.
    pub fn resolved_state(&self, ordinal: Ordinal) -> Result<BlockState<'_>, EngineError> {
        if ordinal == UNSET {
            return Err(EngineError::UnknownOrdinal(ordinal));
        }
        self.state(ordinal).ok_or(EngineError::UnknownOrdinal(ordinal))
    }

    /// The air state.
    pub fn air(&self) -> BlockState<'_> {
        BlockState::new(self, &self.types[1], AIR)
    }

    /// The state of `name` with every property at its first value.
    pub fn default_state(&self, name: &str) -> Result<BlockState<'_>, EngineError> {
        let block_type = self
            .block_type_by_name(name)
            .ok_or_else(|| EngineError::UnknownBlockType(name.to_string()))?;
        Ok(BlockState::new(self, block_type, block_type.first_ordinal))
    }

    /// Whether the state fills its whole cell. Unknown ordinals count as not solid.
    pub fn is_solid(&self, ordinal: Ordinal) -> bool {
        self.type_id_of(ordinal)
            .and_then(|id| self.block_type(id))
            .map(|block_type| block_type.solid)
            .unwrap_or(false)
    }

    /// Parses a state written as `name` or `name[property=value,...]`.
    ///
    /// Properties that are not listed keep their first value.
    pub fn parse_state(&self, text: &str) -> Result<BlockState<'_>, EngineError> {
        let text = text.trim();
        let (name, assignments) = match text.find('[') {
            Some(open) => {
                let inner = text[open + 1..]
                    .strip_suffix(']')
                    .ok_or_else(|| EngineError::MalformedState(text.to_string()))?;
                (&text[..open], Some(inner))
            }
            None => (text, None),
        };

        let mut state = self.default_state(name)?;
        let Some(assignments) = assignments else {
            return Ok(state);
        };

        for assignment in assignments.split(',').filter(|part| !part.trim().is_empty()) {
            let (key, value) = assignment
                .split_once('=')
                .ok_or_else(|| EngineError::MalformedState(text.to_string()))?;
            state = self.with_property_text(state, key.trim(), value.trim())?;
        }
        Ok(state)
    }

    /// Formats an ordinal the way [`BlockRegistry::parse_state`] reads it.
    pub fn format_state(&self, ordinal: Ordinal) -> Result<String, EngineError> {
        Ok(self.resolved_state(ordinal)?.to_string())
    }

    /// The ordinal of `ordinal` with one property set to the value spelled `value`.
    pub fn with_property(&self, ordinal: Ordinal, name: &str, value: &str) -> Result<Ordinal, EngineError> {
        let state = self.resolved_state(ordinal)?;
        Ok(self.with_property_text(state, name, value)?.ordinal())
    }

    fn with_property_text<'a>(
        &'a self,
        state: BlockState<'a>,
        name: &str,
        value: &str,
    ) -> Result<BlockState<'a>, EngineError> {
        let block_type = state.block_type();
        let index = block_type
            .property_index(name)
            .ok_or_else(|| EngineError::UnknownProperty {
                block: block_type.name.clone(),
                property: name.to_string(),
            })?;
        let value_index = block_type.properties[index]
            .parse_index(value)
            .ok_or_else(|| EngineError::InvalidPropertyValue {
                block: block_type.name.clone(),
                property: name.to_string(),
                value: value.to_string(),
            })?;
        Ok(state.with_index(index, value_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::{block_side::BlockSide, block_type::PropertyValue};

    fn registry() -> BlockRegistry {
        BlockRegistry::builtin().unwrap()
    }

    #[test]
    fn reserved_and_air_come_first() {
        let registry = registry();
        assert_eq!(registry.type_id_of(UNSET), Some(0));
        assert_eq!(registry.state(AIR).unwrap().name(), "air");
        assert!(registry.resolved_state(UNSET).is_err());
        assert!(!registry.is_solid(AIR));
        assert!(registry.is_solid(registry.default_state("stone").unwrap().ordinal()));
    }

    #[test]
    fn ordinals_are_dense_and_unique() {
        let registry = registry();
        let mut seen = std::collections::HashSet::new();
        for ordinal in 1..registry.state_count() {
            let formatted = registry.format_state(ordinal as Ordinal).unwrap();
            assert!(seen.insert(formatted.clone()), "duplicate state {formatted}");
            assert_eq!(registry.parse_state(&formatted).unwrap().ordinal(), ordinal as Ordinal);
        }
        assert!(registry.state(registry.state_count() as Ordinal).is_none());
    }

    #[test]
    fn fence_state_parses_and_formats() {
        let registry = registry();
        let fence = registry.parse_state("oak_fence[north=true]").unwrap();
        assert_eq!(fence.get("north"), Some(PropertyValue::Boolean(true)));
        assert_eq!(fence.get("south"), Some(PropertyValue::Boolean(false)));
        assert!(fence.directions().contains(BlockSide::NORTH));
        assert!(!fence.directions().contains(BlockSide::EAST));
        assert!(fence.to_string().starts_with("oak_fence["));
        assert!(fence.to_string().contains("north=true"));

        let moved = registry.with_property(fence.ordinal(), "north", "false").unwrap();
        assert_eq!(moved, registry.default_state("oak_fence").unwrap().ordinal());
    }

    #[test]
    fn wall_enum_sides_count_as_directions() {
        let registry = registry();
        let wall = registry
            .parse_state("cobblestone_wall[east=low,west=none,up=true]")
            .unwrap();
        let sides = wall.directions();
        assert!(sides.contains(BlockSide::EAST));
        assert!(!sides.contains(BlockSide::WEST));
        assert!(sides.contains(BlockSide::UP));
    }

    #[test]
    fn bad_state_strings_are_rejected() {
        let registry = registry();
        assert!(matches!(
            registry.parse_state("unobtainium"),
            Err(EngineError::UnknownBlockType(_))
        ));
        assert!(matches!(
            registry.parse_state("oak_fence[north=maybe]"),
            Err(EngineError::InvalidPropertyValue { .. })
        ));
        assert!(matches!(
            registry.parse_state("oak_fence[color=red]"),
            Err(EngineError::UnknownProperty { .. })
        ));
        assert!(matches!(
            registry.parse_state("oak_fence[north=true"),
            Err(EngineError::MalformedState(_))
        ));
    }

    #[test]
    fn unsupported_property_kind_fails_the_build() {
        let json = r#"{ "block_types": [
            { "name": "lamp", "properties": [ { "name": "color", "kind": "rgb" } ] }
        ] }"#;
        assert!(matches!(
            BlockRegistry::from_json_str(json),
            Err(EngineError::UnsupportedProperty { .. })
        ));
    }

    #[test]
    fn table_too_large_for_ordinals_is_rejected() {
        let values: Vec<String> = (0..256).map(|n| format!("\"{n}\"")).collect();
        let values = values.join(",");
        let json = format!(
            r#"{{ "block_types": [ {{ "name": "huge", "properties": [
                {{ "name": "a", "kind": "integer", "values": [{values}] }},
                {{ "name": "b", "kind": "integer", "values": [{values}] }}
            ] }} ] }}"#
        );
        assert!(matches!(
            BlockRegistry::from_json_str(&json),
            Err(EngineError::OrdinalOverflow(_))
        ));
    }

    #[test]
    fn declared_air_is_not_duplicated() {
        let json = r#"{ "block_types": [ { "name": "air", "solid": false }, { "name": "stone" } ] }"#;
        let registry = BlockRegistry::from_json_str(json).unwrap();
        assert_eq!(registry.state_count(), 3);
        assert_eq!(registry.default_state("stone").unwrap().ordinal(), 2);
    }
}
