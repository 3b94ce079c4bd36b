#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Edit Engine
//!
//! A bulk-edit engine for block worlds. Edits are recorded into dense per-layer
//! chunk buffers, run through a chain of processors and filters on a worker pool,
//! and written back through a small set of host traits.
//!
//! ## Key Modules
//!
//! * `core` - Shared concurrency primitives
//! * `config` - Engine settings, loaded from JSON
//! * `error` - The crate error type
//! * `engine_state` - The engine, its edit sessions, the worker pool, processors,
//!   filters and all voxel data
//!
//! ## Architecture
//!
//! Every block state is numbered with a dense 16-bit ordinal. A chunk column is
//! edited through two buffers: a Get buffer with the pre-edit ordinals, loaded
//! lazily per 16-block layer, and a Set buffer with the pending ordinals, allocated
//! per layer on first write. Processors transform Set buffers chunk by chunk in
//! parallel. The placement processor recomputes neighbor-dependent states such
//! as fence connections and stair shapes, deferring work that crosses a chunk
//! border until every chunk has been written.
//!
//! ## Usage
//!
//! ```rust
//! use voxel_edit_engine::{config::EngineConfig, engine_state::EngineState};
//!
//! voxel_edit_engine::init_logging();
//! let (mut engine, _world) = EngineState::with_memory_world(EngineConfig::default()).unwrap();
//! let mut edit = engine.edit().unwrap();
//! edit.set_state(0, 64, 0, "oak_stairs[facing=east]").unwrap();
//! let summary = edit.commit().unwrap();
//! assert_eq!(summary.chunks_processed, 1);
//! ```

use log::info;

pub mod config;
pub mod core;
pub mod engine_state;
pub mod error;

pub use config::{EngineConfig, PlacementConfig};
pub use engine_state::{EditSession, EditSummary, EngineState};
pub use error::EngineError;

/// Initializes `env_logger` on stdout, filtered by `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs the logger.
pub fn init_logging() {
    let mut log_builder = env_logger::Builder::new();
    let installed = log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .try_init()
        .is_ok();

    if installed {
        info!("Logger initialized");
    }
}
