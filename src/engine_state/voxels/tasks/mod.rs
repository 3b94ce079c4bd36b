//! # Voxel Task System
//!
//! Tasks that run voxel work on the worker pool. Each chunk column of an edit is
//! processed by its own task so columns can be handled in parallel.

pub mod chunk_processing_task;
