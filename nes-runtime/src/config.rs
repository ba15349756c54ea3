// QueryManagerConfig: the handful of knobs spec §5's concurrency model
// exposes as configuration rather than hard-coding (worker count, how many
// buffers a worker may stash locally, how deep the shared task queue runs
// before a producer blocks).

#[derive(Clone, Copy, Debug)]
pub struct QueryManagerConfig {
    /// Defaults to the host's logical core count (spec §5: "a fixed-size
    /// pool of worker threads").
    pub num_workers: usize,
    /// Per-worker local buffer sub-pool capacity (spec §4.1).
    pub local_pool_capacity: usize,
    /// Bound on the shared task queue; a full queue applies backpressure to
    /// whichever thread is posting the next task (source or pipeline).
    pub task_queue_capacity: usize,
}

impl Default for QueryManagerConfig {
    fn default() -> Self {
        QueryManagerConfig {
            num_workers: num_cpus::get(),
            local_pool_capacity: 16,
            task_queue_capacity: 1024,
        }
    }
}
