// WorkerPool: N OS threads pulling tasks off the shared queue (spec §5: "a
// fixed-size pool of worker threads... within a pipeline, execute is
// single-threaded per task; cross-task ordering is established by sequence
// numbers, not by call order"). Every worker can run a task for any
// deployed pipeline; there is no per-worker affinity and no work-stealing
// step, since a single shared `crossbeam::channel` already gives every idle
// worker equal access to the next task, the same idiom `nes-memory` uses for
// its buffer free list.

use crate::registry::PipelineRegistry;
use crate::task::{Task, TaskKind, SHUTDOWN_PIPELINE};
use nes_common::WorkerId;
use nes_memory::LocalBufferPool;
use nes_execution::WorkerContext;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `num_workers` threads, each with its own `LocalBufferPool` of
    /// `local_pool_capacity` pages (spec §4.1, §2), consuming from the same
    /// `receiver`.
    pub fn spawn(
        num_workers: usize,
        receiver: crossbeam::channel::Receiver<Task>,
        registry: Arc<PipelineRegistry>,
        buffer_manager: Arc<nes_memory::BufferManager>,
        local_pool_capacity: usize,
    ) -> Self {
        let handles = (0..num_workers)
            .map(|i| {
                let receiver = receiver.clone();
                let registry = registry.clone();
                let local_pool = LocalBufferPool::new(buffer_manager.clone(), local_pool_capacity);
                let worker_id = WorkerId::new(i as u64);
                std::thread::Builder::new()
                    .name(format!("nes-worker-{i}"))
                    .spawn(move || worker_loop(worker_id, receiver, registry, local_pool))
                    .expect("spawning a worker thread")
            })
            .collect();
        WorkerPool { handles }
    }

    /// Blocks until every worker thread has exited. Each thread exits after
    /// consuming its own `SHUTDOWN_PIPELINE` poison pill (`QueryManager`
    /// queues exactly one per worker before calling this).
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(worker_id: WorkerId, receiver: crossbeam::channel::Receiver<Task>, registry: Arc<PipelineRegistry>, local_pool: Arc<LocalBufferPool>) {
    let mut worker = WorkerContext::new(worker_id, local_pool);
    while let Ok(task) = receiver.recv() {
        if task.pipeline == SHUTDOWN_PIPELINE {
            break;
        }
        let Some((pipeline, plan)) = registry.get(task.pipeline) else {
            warn!(target: "nes", pipeline = %task.pipeline, "task for unregistered pipeline dropped");
            continue;
        };
        let result = match task.kind {
            TaskKind::Data(buffer) => pipeline.execute(buffer, &mut worker).map(|_| ()),
            TaskKind::Control(message) => pipeline.reconfigure(message),
        };
        if let Err(err) = result {
            warn!(target: "nes", pipeline = %task.pipeline, error = %err, "task failed");
            plan.report_fatal_error(err.to_string());
        }
    }
    debug!(target: "nes", worker_id = %worker_id, "worker exiting");
}
