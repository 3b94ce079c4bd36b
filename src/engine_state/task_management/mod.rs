//! # Worker Pool
//!
//! Runs chunk jobs of an edit in parallel and funnels their results back to the
//! committing thread.
//!
//! ## Components
//! - `TaskManager`: owns the workers, dispatches jobs and waits at the barrier
//! - `Task` / `TaskResult`: a chunk job and what it hands back
//! - `TaskChannel`: the job and result channels of one worker
//!
//! Each worker is a `std::thread` with a dedicated pair of channels. A pool of
//! zero workers is valid: every task then runs on the thread that calls
//! [`TaskManager::join`].
//!
//! ## Job Flow
//! 1. `publish_task()` hands a job to the next idle worker, round-robin, or
//!    queues it when every worker is busy
//! 2. The worker runs it and sends the result back
//! 3. `process_completed_tasks()` collects finished chunk writes without
//!    blocking and hands queued jobs to the workers it freed
//! 4. `join()` blocks until nothing is queued or in flight
//!
//! ## Failure Handling
//! A worker whose task panics stops answering. The manager notices the closed
//! channel, logs it, counts the lost tasks and stops scheduling on that worker.
//! The rest of the edit carries on.
//!
//! ## Example Usage
//! ```rust,ignore
//! let mut task_manager = TaskManager::new(4);
//! task_manager.publish_task(Box::new(ChunkProcessingTask::new(/* ... */)));
//!
//! let mut commit_state = CommitState::new(extent);
//! task_manager.join(&mut commit_state);
//! commit_state.apply()?;
//! ```

pub mod task;

use log::info;
use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};
use task::{Task, TaskResult};

use super::commit_state::CommitState;

/// A communication channel between the committing thread and a worker thread.
///
/// # Fields
/// - `task_sender`: Sends tasks to the worker
/// - `result_receiver`: Receives task results from the worker
/// - `num_tasks_in_flight`: Tracks number of tasks currently being processed
/// - `alive`: Cleared once the worker is found dead
/// - `_worker`: Handle to the worker thread (kept alive by this struct)
#[derive(Debug)]
pub struct TaskChannel {
    task_sender: Sender<Box<dyn Task + Send>>,
    result_receiver: Receiver<Box<dyn TaskResult + Send>>,
    num_tasks_in_flight: usize,
    alive: bool,
    _worker: JoinHandle<()>,
}

/// A fixed pool of worker threads running chunk jobs.
///
/// Jobs that find every worker busy wait in a FIFO queue. Results are only ever
/// handled on the thread that owns the manager.
pub struct TaskManager {
    channels: Vec<TaskChannel>,
    queued_tasks: VecDeque<Box<dyn Task + Send>>,
    current_channel: usize,
    failed_tasks: usize,
}

/// Maximum number of tasks that can be in flight per worker channel.
///
/// Kept at 1 so a busy worker never holds work another idle worker could take.
pub const MAX_TASKS_IN_FLIGHT: usize = 1;

impl TaskManager {
    /// Creates a new `TaskManager` with the specified number of worker threads.
    ///
    /// # Arguments
    /// * `num_workers` - Number of worker threads to create. Zero processes every
    ///   task inline during [`TaskManager::join`].
    pub fn new(num_workers: usize) -> Self {
        let mut channels = Vec::with_capacity(num_workers);

        for index in 0..num_workers {
            let (task_tx, task_rx) = channel::<Box<dyn Task + Send>>();
            let (result_tx, result_rx) = channel::<Box<dyn TaskResult + Send>>();

            let task_closure = move || {
                while let Ok(task) = task_rx.recv() {
                    let result = task.process();
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            };

            let worker = match thread::Builder::new()
                .name(format!("edit-worker-{}", index))
                .spawn(task_closure)
            {
                Ok(worker) => worker,
                Err(err) => {
                    log::error!("Failed to spawn worker {}: {}", index, err);
                    continue;
                }
            };

            channels.push(TaskChannel {
                task_sender: task_tx,
                result_receiver: result_rx,
                num_tasks_in_flight: 0,
                alive: true,
                _worker: worker,
            });
        }

        info!(
            "Task manager started {} worker(s), available parallelism: {:?}",
            channels.len(),
            thread::available_parallelism()
        );

        TaskManager {
            channels,
            queued_tasks: VecDeque::new(),
            current_channel: 0,
            failed_tasks: 0,
        }
    }

    /// Number of workers still accepting tasks.
    pub fn worker_count(&self) -> usize {
        self.channels.iter().filter(|channel| channel.alive).count()
    }

    /// Number of tasks waiting for a worker.
    pub fn queued_task_count(&self) -> usize {
        self.queued_tasks.len()
    }

    /// Number of tasks currently on a worker.
    pub fn in_flight_task_count(&self) -> usize {
        self.channels
            .iter()
            .map(|channel| channel.num_tasks_in_flight)
            .sum()
    }

    /// Returns and resets the number of tasks lost to dead workers.
    pub fn take_failed_tasks(&mut self) -> usize {
        std::mem::take(&mut self.failed_tasks)
    }

    /// Attempts to send a task to a specific worker channel.
    ///
    /// # Returns
    /// - `Ok(())` if the task was successfully sent to the worker
    /// - `Err(task)` if the send failed because the worker is gone; the channel
    ///   is marked dead
    fn try_send_task(
        &mut self,
        task: Box<dyn Task + Send>,
        channel_idx: usize,
    ) -> Result<(), Box<dyn Task + Send>> {
        match self.channels[channel_idx].task_sender.send(task) {
            Ok(_) => {
                self.channels[channel_idx].num_tasks_in_flight += 1;
                Ok(())
            }
            Err(task) => {
                log::error!("Worker {} is gone, retiring its channel", channel_idx);
                self.channels[channel_idx].alive = false;
                Err(task.0)
            }
        }
    }

    /// Finds an available worker channel that can accept a new task.
    ///
    /// Round-robin starting from the last used channel. Dead channels and channels
    /// at `MAX_TASKS_IN_FLIGHT` are skipped.
    fn find_available_channel(&self) -> Option<usize> {
        if self.channels.is_empty() {
            return None;
        }

        let start_channel = self.current_channel % self.channels.len();
        let mut current = start_channel;

        loop {
            let channel = &self.channels[current];
            if channel.alive && channel.num_tasks_in_flight < MAX_TASKS_IN_FLIGHT {
                return Some(current);
            }
            current = (current + 1) % self.channels.len();
            if current == start_channel {
                return None;
            }
        }
    }

    /// Publishes a new task for execution.
    ///
    /// # Returns
    /// - `true` if the task was immediately scheduled on an available worker
    /// - `false` if the task was queued because all workers are busy
    pub fn publish_task(&mut self, task: Box<dyn Task + Send>) -> bool {
        match self.find_available_channel() {
            Some(channel_idx) => match self.try_send_task(task, channel_idx) {
                Ok(_) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                    true
                }
                Err(task) => {
                    self.queued_tasks.push_back(task);
                    false
                }
            },
            None => {
                self.queued_tasks.push_back(task);
                false
            }
        }
    }

    /// Moves queued tasks onto available workers, oldest first, until either the
    /// queue is empty or every worker is busy.
    pub fn process_queued_tasks(&mut self) {
        while !self.queued_tasks.is_empty() {
            let Some(channel_idx) = self.find_available_channel() else {
                return;
            };
            let Some(task) = self.queued_tasks.pop_front() else {
                return;
            };
            match self.try_send_task(task, channel_idx) {
                Ok(_) => self.current_channel = (channel_idx + 1) % self.channels.len(),
                Err(task) => self.queued_tasks.push_front(task),
            }
        }
    }

    /// Handles every result the workers have finished so far, without blocking,
    /// then refills the freed workers from the queue.
    pub fn process_completed_tasks(&mut self, commit_state: &mut CommitState) {
        for channel in &mut self.channels {
            while let Ok(result) = channel.result_receiver.try_recv() {
                channel.num_tasks_in_flight -= 1;
                commit_state.write(result.handle_result());
            }
        }
        self.process_queued_tasks();
    }

    /// Blocks until no task is queued or in flight, handling every result.
    ///
    /// This is the barrier of an edit. With no live workers the queue is drained
    /// on the calling thread.
    pub fn join(&mut self, commit_state: &mut CommitState) {
        loop {
            self.process_queued_tasks();

            if self.worker_count() == 0 {
                while let Some(task) = self.queued_tasks.pop_front() {
                    commit_state.write(task.process().handle_result());
                }
            }

            for (index, channel) in self.channels.iter_mut().enumerate() {
                if channel.num_tasks_in_flight == 0 {
                    continue;
                }
                match channel.result_receiver.recv() {
                    Ok(result) => {
                        channel.num_tasks_in_flight -= 1;
                        commit_state.write(result.handle_result());
                    }
                    Err(_) => {
                        log::error!(
                            "Worker {} died, dropping {} task(s)",
                            index,
                            channel.num_tasks_in_flight
                        );
                        self.failed_tasks += channel.num_tasks_in_flight;
                        channel.num_tasks_in_flight = 0;
                        channel.alive = false;
                    }
                }
            }

            if self.queued_tasks.is_empty() && self.in_flight_task_count() == 0 {
                return;
            }
        }
    }
}
