// DataSink (spec §6): the terminal consumer of a pipeline's output. A sink
// is called from whichever worker thread happened to execute the final
// pipeline's stage, so implementations must be internally synchronized if
// they hold mutable state (spec §6: "must be tolerant to being called from
// any worker thread").

use nes_base::Result;
use nes_execution::WorkerContext;
use nes_memory::TupleBuffer;

pub trait DataSink: Send + Sync {
    fn setup(&self) -> Result<()>;
    fn write_data(&self, buffer: TupleBuffer, worker: &mut WorkerContext) -> Result<()>;
    fn shutdown(&self) -> Result<()>;
}
