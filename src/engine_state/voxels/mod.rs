//! # Voxels
//!
//! Everything that describes blocks and the chunk columns holding them.
//!
//! ## Architecture
//!
//! The voxel system is organized into several key components:
//!
//! * **Block**: block types, their properties and the dense ordinal numbering of
//!   every state
//! * **Chunk**: the Get and Set buffers of one chunk column
//! * **Host**: the traits a world implements to be edited
//! * **Placement**: neighbor-dependent state recomputation
//! * **World**: an in-memory host world
//! * **Tasks**: the chunk job run on the worker pool
//!
//! ## Data Flow
//!
//! 1. An edit records pending ordinals into per-chunk Set buffers
//! 2. A chunk job pairs each Set buffer with a lazily loaded Get buffer
//! 3. Processors and filters transform the Set buffer
//! 4. The result is written to the host through [`host::LiveExtent`]

pub mod block;
pub mod chunk;
pub mod host;
pub mod placement;
pub mod tasks;
pub mod world;
