//! # Jobs and Results
//!
//! A `Task` is moved to a worker, consumes itself in `process()` and produces a
//! `TaskResult`, which is moved back and consumed on the committing thread. Both
//! sides must therefore be `Send`; anything they share is behind `Arc`.

use crate::engine_state::commit_state::ChunkWriteCommand;

/// A unit of work executed on a worker thread.
///
/// Tasks own all the data they need. A chunk job, for example, owns its pending
/// edit and its forked processors, and hands the edit back through its result.
pub trait Task: Send {
    /// Processes the task and returns a result.
    ///
    /// Runs on a worker thread. Errors are handled inside the task and reported
    /// through the result; a panic takes the worker down with it.
    fn process(self: Box<Self>) -> Box<dyn TaskResult + Send>;
}

/// The result of processing a `Task`.
pub trait TaskResult: Send {
    /// Handles the result on the committing thread.
    ///
    /// # Returns
    /// The chunk write to queue until the barrier.
    fn handle_result(self: Box<Self>) -> ChunkWriteCommand;
}
