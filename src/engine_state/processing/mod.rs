//! # Processing Module
//!
//! Chunk-level transformations applied between the moment an edit is queued and the
//! moment it is written to the world.
//!
//! A [`BatchProcessor`] receives the pre-edit contents of one chunk column
//! ([`ChunkGet`]) and its pending edit ([`ChunkSet`]) and returns the edit to write.
//! Processors are grouped in a [`BatchProcessorChain`], ordered by
//! [`ProcessorScope`]: processors that only add blocks run before processors that
//! change them, which run before processors that remove them. Processors that only
//! observe the final edit run last.
//!
//! Per-voxel transformations live in [`filter`].

use std::cmp::Ordering;

use crate::engine_state::voxels::chunk::{ChunkGet, ChunkPos, ChunkSet};
use crate::error::EngineError;

pub mod filter;

/// What a processor does to the edit, used to order a chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessorScope {
    AddingBlocks,
    ChangingBlocks,
    RemovingBlocks,
    Custom,
    /// Only reads the edit. Always last.
    ReadingSetBlocks,
}

/// When a processor runs relative to the commit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProcessorPhase {
    /// Before the chunk is written.
    Edit,
    /// After every chunk of the edit is written and deferred updates are flushed.
    PostTick,
}

/// A chunk-level transformation of a pending edit.
pub trait BatchProcessor: Send {
    /// Transforms the pending edit of one chunk column.
    ///
    /// `get` holds the pre-edit contents and loads layers lazily, so a processor
    /// that never looks at unedited cells never pays for loading them.
    fn process_set(&self, chunk: ChunkPos, get: &ChunkGet, set: ChunkSet) -> ChunkSet;

    fn scope(&self) -> ProcessorScope;

    fn phase(&self) -> ProcessorPhase {
        ProcessorPhase::Edit
    }

    /// Creates the instance used by one chunk job. Forks may share state that
    /// has to outlive the job, such as queued deferred work.
    fn fork(&self) -> Box<dyn BatchProcessor>;

    /// Performs deferred work once every chunk of the edit has been written.
    ///
    /// # Returns
    /// The number of cells written to the world.
    fn flush(&self) -> Result<usize, EngineError> {
        Ok(0)
    }

    fn name(&self) -> &str;
}

/// An ordered list of processors.
///
/// Insertion keeps the chain sorted by [`ProcessorScope`]; processors of the same
/// scope keep the order they were added in.
#[derive(Default)]
pub struct BatchProcessorChain {
    processors: Vec<Box<dyn BatchProcessor>>,
}

impl BatchProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, processor: Box<dyn BatchProcessor>) {
        let scope = processor.scope();
        let position = self
            .processors
            .iter()
            .position(|existing| existing.scope().cmp(&scope) == Ordering::Greater)
            .unwrap_or(self.processors.len());
        log::debug!("Adding processor `{}` at position {}", processor.name(), position);
        self.processors.insert(position, processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Names of the processors in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|processor| processor.name()).collect()
    }

    /// Whether any processor runs in `phase`.
    pub fn has_phase(&self, phase: ProcessorPhase) -> bool {
        self.processors.iter().any(|processor| processor.phase() == phase)
    }

    /// Runs the processors of `phase` in chain order.
    pub fn process_phase(&self, phase: ProcessorPhase, chunk: ChunkPos, get: &ChunkGet, set: ChunkSet) -> ChunkSet {
        self.processors
            .iter()
            .filter(|processor| processor.phase() == phase)
            .fold(set, |set, processor| processor.process_set(chunk, get, set))
    }

    /// Forks every processor, keeping the order.
    pub fn fork_chain(&self) -> BatchProcessorChain {
        BatchProcessorChain {
            processors: self.processors.iter().map(|processor| processor.fork()).collect(),
        }
    }
}

impl BatchProcessor for BatchProcessorChain {
    fn process_set(&self, chunk: ChunkPos, get: &ChunkGet, set: ChunkSet) -> ChunkSet {
        self.process_phase(ProcessorPhase::Edit, chunk, get, set)
    }

    fn scope(&self) -> ProcessorScope {
        self.processors
            .iter()
            .map(|processor| processor.scope())
            .max()
            .unwrap_or(ProcessorScope::Custom)
    }

    fn fork(&self) -> Box<dyn BatchProcessor> {
        Box::new(self.fork_chain())
    }

    /// Flushes every processor in chain order, stopping at the first failure.
    fn flush(&self) -> Result<usize, EngineError> {
        let mut written = 0;
        for processor in &self.processors {
            written += processor.flush()?;
        }
        Ok(written)
    }

    fn name(&self) -> &str {
        "chain"
    }
}

#[cfg(test)]
mod tests {
    use std::{
        ops::RangeInclusive,
        sync::{
            atomic::{AtomicUsize, Ordering as AtomicOrdering},
            Arc,
        },
    };

    use super::*;
    use crate::engine_state::voxels::{block::Ordinal, chunk::CHUNK_SIZE, host::WorldSnapshot};

    struct Air;

    impl WorldSnapshot for Air {
        fn load_layer(&self, _chunk: ChunkPos, _layer: i32) -> Result<Vec<Ordinal>, EngineError> {
            Ok(vec![1; CHUNK_SIZE as usize])
        }

        fn layer_range(&self) -> RangeInclusive<i32> {
            0..=0
        }
    }

    /// Writes its marker at the first cell, overwriting whatever is there.
    struct Stamp {
        name: &'static str,
        scope: ProcessorScope,
        phase: ProcessorPhase,
        marker: Ordinal,
        flushed: Arc<AtomicUsize>,
    }

    impl Stamp {
        fn boxed(name: &'static str, scope: ProcessorScope, marker: Ordinal) -> Box<dyn BatchProcessor> {
            Box::new(Stamp {
                name,
                scope,
                phase: ProcessorPhase::Edit,
                marker,
                flushed: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    impl BatchProcessor for Stamp {
        fn process_set(&self, _chunk: ChunkPos, _get: &ChunkGet, mut set: ChunkSet) -> ChunkSet {
            set.set_block(0, 0, 0, self.marker);
            set
        }

        fn scope(&self) -> ProcessorScope {
            self.scope
        }

        fn phase(&self) -> ProcessorPhase {
            self.phase
        }

        fn fork(&self) -> Box<dyn BatchProcessor> {
            Box::new(Stamp {
                name: self.name,
                scope: self.scope,
                phase: self.phase,
                marker: self.marker,
                flushed: self.flushed.clone(),
            })
        }

        fn flush(&self) -> Result<usize, EngineError> {
            Ok(self.flushed.fetch_add(1, AtomicOrdering::Relaxed) + 1)
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[test]
    fn chain_orders_by_scope_and_keeps_insertion_order() {
        let mut chain = BatchProcessorChain::new();
        chain.add(Stamp::boxed("reader", ProcessorScope::ReadingSetBlocks, 5));
        chain.add(Stamp::boxed("remove", ProcessorScope::RemovingBlocks, 4));
        chain.add(Stamp::boxed("change-a", ProcessorScope::ChangingBlocks, 3));
        chain.add(Stamp::boxed("add", ProcessorScope::AddingBlocks, 2));
        chain.add(Stamp::boxed("change-b", ProcessorScope::ChangingBlocks, 6));

        assert_eq!(chain.names(), vec!["add", "change-a", "change-b", "remove", "reader"]);
        assert_eq!(chain.scope(), ProcessorScope::ReadingSetBlocks);
    }

    #[test]
    fn chain_applies_processors_in_order() {
        let mut chain = BatchProcessorChain::new();
        chain.add(Stamp::boxed("late", ProcessorScope::RemovingBlocks, 9));
        chain.add(Stamp::boxed("early", ProcessorScope::AddingBlocks, 8));

        let get = ChunkGet::new(ChunkPos::new(0, 0), Arc::new(Air));
        let set = chain.fork().process_set(ChunkPos::new(0, 0), &get, ChunkSet::new());
        assert_eq!(set.block_at(0, 0, 0), 9);
    }

    #[test]
    fn chain_runs_only_the_requested_phase() {
        let mut chain = BatchProcessorChain::new();
        chain.add(Box::new(Stamp {
            name: "post",
            scope: ProcessorScope::Custom,
            phase: ProcessorPhase::PostTick,
            marker: 7,
            flushed: Arc::new(AtomicUsize::new(0)),
        }));
        assert!(chain.has_phase(ProcessorPhase::PostTick));
        assert!(!chain.has_phase(ProcessorPhase::Edit));

        let get = ChunkGet::new(ChunkPos::new(0, 0), Arc::new(Air));
        let edit = chain.process_set(ChunkPos::new(0, 0), &get, ChunkSet::new());
        assert!(edit.is_empty());
        let post = chain.process_phase(ProcessorPhase::PostTick, ChunkPos::new(0, 0), &get, ChunkSet::new());
        assert_eq!(post.block_at(0, 0, 0), 7);
    }

    #[test]
    fn chain_flush_sums_processor_writes() {
        let mut chain = BatchProcessorChain::new();
        chain.add(Stamp::boxed("a", ProcessorScope::Custom, 2));
        chain.add(Stamp::boxed("b", ProcessorScope::Custom, 3));
        assert_eq!(chain.flush().unwrap(), 2);
        // the forks share their counters with the originals
        assert_eq!(chain.fork_chain().flush().unwrap(), 4);
    }
}
