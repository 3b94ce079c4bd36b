//! # Error Module
//!
//! A single error type shared by every fallible operation in the engine.
//!
//! Errors fall in two groups. Structural failures (a property kind the registry
//! cannot model, a broken block table, an unreadable config) are fatal and surface
//! at startup. Everything else is reported per operation: isolated bad voxels are
//! logged and skipped inside the batch processors and never reach the caller.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine_state::voxels::block::Ordinal;

/// Errors produced by the edit engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A block type declares a property kind the registry has no model for.
    #[error("block type `{block}` declares property `{property}` with unsupported kind `{kind}`")]
    UnsupportedProperty {
        block: String,
        property: String,
        kind: String,
    },

    /// A property value could not be interpreted for its declared kind.
    #[error("property `{property}` of `{block}` has invalid value `{value}`")]
    InvalidPropertyValue {
        block: String,
        property: String,
        value: String,
    },

    /// No block type with this name is registered.
    #[error("unknown block type `{0}`")]
    UnknownBlockType(String),

    /// A block type has no property with this name.
    #[error("block type `{block}` has no property `{property}`")]
    UnknownProperty { block: String, property: String },

    /// A block state string could not be parsed.
    #[error("malformed block state `{0}`")]
    MalformedState(String),

    /// The block table produced more states than an ordinal can address.
    #[error("block table needs {0} ordinals, more than fit in 16 bits")]
    OrdinalOverflow(usize),

    /// An ordinal outside the registry was looked up.
    #[error("ordinal {0} is not a registered block state")]
    UnknownOrdinal(Ordinal),

    /// The reserved `UNSET` sentinel was used where a real block state is required.
    #[error("the reserved ordinal cannot be written at ({x}, {y}, {z})")]
    ReservedOrdinal { x: i32, y: i32, z: i32 },

    /// The builtin or supplied block table is not valid JSON for the expected schema.
    #[error("failed to parse block table: {0}")]
    RegistryParse(#[source] serde_json::Error),

    /// A vertical layer index outside the world's range was requested.
    #[error("layer {layer} is outside the world range {min}..={max}")]
    LayerOutOfRange { layer: i32, min: i32, max: i32 },

    /// The world snapshot returned a layer array of the wrong size.
    #[error("layer {layer} of chunk ({chunk_x}, {chunk_z}) has {len} cells")]
    MalformedLayer {
        chunk_x: i32,
        chunk_z: i32,
        layer: i32,
        len: usize,
    },

    /// The host world refused a read or a write.
    #[error("world access failed at ({x}, {y}, {z}): {reason}")]
    WorldAccess {
        x: i32,
        y: i32,
        z: i32,
        reason: String,
    },

    /// A configuration file could not be read.
    #[error("failed to read config `{path}`")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration document is not valid.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[source] serde_json::Error),
}
