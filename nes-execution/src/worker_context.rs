// Per-worker-thread scratch (spec §2 "WorkerContext"): a thread-local
// buffer sub-pool, the per-worker-and-operator slice/build-store state that
// the pre-aggregation and join-build stages own exclusively until they
// stage it for merging (spec §5, "no cross-worker locking on the
// pre-aggregation path"), a small RNG, and the worker's own id.
//
// Per-operator state is addressed by `OperatorId` rather than given its own
// named field per operator kind, since the set of window/join operators in
// one query plan is only known at deploy time, not at compile time.

use nes_common::{OperatorId, WorkerId};
use nes_memory::{LocalBufferPool, TupleBuffer};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// SplitMix64: enough statistical quality for work sampling and tie
/// breaking inside the engine, no external dependency pulled in just for a
/// scratch RNG.
#[derive(Clone, Copy, Debug)]
pub struct WorkerRng(u64);

impl WorkerRng {
    pub fn new(seed: u64) -> Self {
        WorkerRng(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

pub struct WorkerContext {
    worker_id: WorkerId,
    local_pool: Arc<LocalBufferPool>,
    rng: WorkerRng,
    operator_state: HashMap<OperatorId, Box<dyn Any + Send>>,
}

impl WorkerContext {
    pub fn new(worker_id: WorkerId, local_pool: Arc<LocalBufferPool>) -> Self {
        WorkerContext {
            worker_id,
            local_pool,
            rng: WorkerRng::new(worker_id.as_u64() ^ 0x2545F4914F6CDD1D),
            operator_state: HashMap::new(),
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn local_pool(&self) -> &Arc<LocalBufferPool> {
        &self.local_pool
    }

    pub fn get_buffer_blocking(&self) -> TupleBuffer {
        self.local_pool.get_buffer_blocking()
    }

    pub fn get_buffer_timeout(&self, timeout: Duration) -> Option<TupleBuffer> {
        self.local_pool.get_buffer_timeout(timeout)
    }

    pub fn rng(&mut self) -> &mut WorkerRng {
        &mut self.rng
    }

    /// This worker's exclusively owned scratch for `operator`, created with
    /// `Default` on first access. Ownership transfers away (the entry is
    /// removed) when the operator stages its state for merging.
    pub fn operator_state<T: Default + Send + 'static>(&mut self, operator: OperatorId) -> &mut T {
        self.operator_state
            .entry(operator)
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("operator state type is stable per OperatorId for the lifetime of a query")
    }

    /// Like `operator_state`, but for types without a cheap `Default` (e.g.
    /// a pre-aggregation store that must be constructed with a
    /// `SliceAssigner`): `init` runs at most once per operator, the first
    /// time this worker sees it.
    pub fn operator_state_with<T: Send + 'static>(&mut self, operator: OperatorId, init: impl FnOnce() -> T) -> &mut T {
        self.operator_state
            .entry(operator)
            .or_insert_with(|| Box::new(init()))
            .downcast_mut::<T>()
            .expect("operator state type is stable per OperatorId for the lifetime of a query")
    }

    /// Removes and returns `operator`'s scratch, e.g. to move ownership of
    /// a slice store's arena into the staging area without cloning it (spec
    /// §9 "pointer graphs in slice stores").
    pub fn take_operator_state<T: Default + Send + 'static>(&mut self, operator: OperatorId) -> T {
        match self.operator_state.remove(&operator) {
            Some(boxed) => *boxed.downcast::<T>().expect("operator state type is stable per OperatorId"),
            None => T::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nes_memory::{BufferManager, BufferManagerConfig};

    fn worker() -> WorkerContext {
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 4, buffer_size: 64, local_pool_capacity: 2 });
        let local = LocalBufferPool::new(mgr, 2);
        WorkerContext::new(WorkerId::new(0), local)
    }

    #[test]
    fn operator_state_is_created_lazily_and_persists() {
        let mut ctx = worker();
        let op = OperatorId::new(1);
        *ctx.operator_state::<u64>(op) += 5;
        *ctx.operator_state::<u64>(op) += 2;
        assert_eq!(*ctx.operator_state::<u64>(op), 7);
    }

    #[test]
    fn take_operator_state_removes_the_entry() {
        let mut ctx = worker();
        let op = OperatorId::new(1);
        *ctx.operator_state::<u64>(op) = 42;
        let taken: u64 = ctx.take_operator_state(op);
        assert_eq!(taken, 42);
        assert_eq!(*ctx.operator_state::<u64>(op), 0);
    }

    #[test]
    fn rng_is_deterministic_for_a_given_seed() {
        let mut a = WorkerRng::new(7);
        let mut b = WorkerRng::new(7);
        assert_eq!(a.next_u64(), b.next_u64());
    }
}
