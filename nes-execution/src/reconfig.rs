// Reconfiguration messages (spec §4.10) travel in-band through the same
// task queues as data buffers, so a worker observes them in the correct
// order relative to the data they bracket.

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReconfigurationMessage {
    /// Propagate, calling `setup` if the pipeline hasn't been set up yet.
    Start,
    /// Drain the queue, then decrement the successors' producer count;
    /// propagate once it reaches zero.
    SoftEndOfStream,
    /// Same as `SoftEndOfStream` but discards remaining buffered tasks for
    /// this pipeline first.
    HardEndOfStream,
    /// Release operator state once every downstream termination has been
    /// observed.
    Destroy,
}
