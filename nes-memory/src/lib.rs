mod buffer;
mod buffer_manager;
mod hash_map;
mod varsized;

pub use buffer::{BufferMetadata, BufferSink, TupleBuffer};
pub use buffer_manager::{BufferManager, BufferManagerConfig, LocalBufferPool};
pub use hash_map::{ChainedHashMap, EntryHandle};
pub use varsized::VariableSizedAccess;
