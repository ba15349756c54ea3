// TupleBuffer: a reference-counted, fixed-capacity byte page plus the
// metadata that travels with it through a query (spec §3, §6). The original
// NebulaStream buffer hand-rolls an atomic refcount with explicit
// retain/release and a "memory segment" controlling recycling on the last
// release; here `Arc<BufferInner>` and its `Drop` impl do that job, which
// also makes the double-release case the original guards against
// unrepresentable: there is no `release()` to call twice.
//
// A freshly allocated buffer is exclusively owned (refcount 1), so its
// writer can fill in payload bytes and metadata through `Arc::get_mut`
// before handing it downstream (cloning it onto a queue, attaching it as a
// child). Once shared, `Arc::get_mut` returns `None` and further mutation
// is refused rather than silently racing.

use nes_common::{ChunkNumber, OriginId, SequenceNumber};
use nes_base::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a buffer's backing storage goes when the last handle to it drops.
pub trait BufferSink: fmt::Debug + Send + Sync {
    fn reclaim(&self, data: Box<[u8]>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferMetadata {
    pub watermark: u64,
    pub origin_id: OriginId,
    pub sequence_number: SequenceNumber,
    pub chunk_number: ChunkNumber,
    pub last_chunk: bool,
    pub creation_ts_nanos: u128,
    pub num_tuples: u64,
}

impl BufferMetadata {
    fn now() -> Self {
        let creation_ts_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        BufferMetadata {
            watermark: 0,
            origin_id: OriginId::new(0),
            sequence_number: SequenceNumber::ZERO,
            chunk_number: ChunkNumber::new(0),
            last_chunk: true,
            creation_ts_nanos,
            num_tuples: 0,
        }
    }
}

enum Recycle {
    Unpooled,
    Pooled(std::sync::Weak<dyn BufferSink>),
}

impl fmt::Debug for Recycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recycle::Unpooled => write!(f, "Unpooled"),
            Recycle::Pooled(_) => write!(f, "Pooled"),
        }
    }
}

#[derive(Debug)]
struct BufferInner {
    data: Box<[u8]>,
    meta: BufferMetadata,
    children: Vec<TupleBuffer>,
    recycle: Recycle,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        let data = std::mem::replace(&mut self.data, Box::new([]));
        if let Recycle::Pooled(sink) = &self.recycle {
            if let Some(sink) = sink.upgrade() {
                sink.reclaim(data);
            }
        }
    }
}

/// A handle to a tuple buffer. Cloning is cheap (an `Arc` bump) and is how
/// the same page ends up referenced by a pipeline's input queue, its
/// reconfiguration callbacks, and any parent buffer that holds it as a
/// variable-sized child simultaneously.
#[derive(Debug, Clone)]
pub struct TupleBuffer(Arc<BufferInner>);

impl TupleBuffer {
    pub(crate) fn new_unpooled(data: Box<[u8]>) -> Self {
        TupleBuffer(Arc::new(BufferInner {
            data,
            meta: BufferMetadata::now(),
            children: Vec::new(),
            recycle: Recycle::Unpooled,
        }))
    }

    pub(crate) fn new_pooled(data: Box<[u8]>, sink: std::sync::Weak<dyn BufferSink>) -> Self {
        TupleBuffer(Arc::new(BufferInner {
            data,
            meta: BufferMetadata::now(),
            children: Vec::new(),
            recycle: Recycle::Pooled(sink),
        }))
    }

    pub fn size(&self) -> usize {
        self.0.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0.data
    }

    /// Exclusive write access to the payload. `None` once this handle is no
    /// longer the only owner (spec §4.1, invariant: only the owning thread
    /// may write before a buffer is shared downstream).
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        Arc::get_mut(&mut self.0).map(|inner| &mut inner.data[..])
    }

    pub fn metadata(&self) -> BufferMetadata {
        self.0.meta
    }

    pub fn set_watermark(&mut self, watermark: u64) -> Result<()> {
        self.mutate(|inner| inner.meta.watermark = watermark)
    }

    pub fn set_origin_id(&mut self, origin_id: OriginId) -> Result<()> {
        self.mutate(|inner| inner.meta.origin_id = origin_id)
    }

    pub fn set_sequence_number(&mut self, sequence_number: SequenceNumber) -> Result<()> {
        self.mutate(|inner| inner.meta.sequence_number = sequence_number)
    }

    pub fn set_chunk_number(&mut self, chunk_number: ChunkNumber, last_chunk: bool) -> Result<()> {
        self.mutate(|inner| {
            inner.meta.chunk_number = chunk_number;
            inner.meta.last_chunk = last_chunk;
        })
    }

    pub fn set_num_tuples(&mut self, num_tuples: u64) -> Result<()> {
        self.mutate(|inner| inner.meta.num_tuples = num_tuples)
    }

    /// Number of variable-sized child buffers already attached.
    pub fn num_children(&self) -> u32 {
        self.0.children.len() as u32
    }

    pub fn child(&self, index: u32) -> Result<TupleBuffer> {
        self.0
            .children
            .get(index as usize)
            .cloned()
            .ok_or(Error::ChildIndexOutOfRange(index))
    }

    /// Attaches `child` as the next variable-sized child slot, returning its
    /// index. Fails once a buffer already holds `u32::MAX` children (spec
    /// §4.3, `BufferManager::attachChild`).
    pub fn attach_child(&mut self, child: TupleBuffer) -> Result<u32> {
        let this = Arc::get_mut(&mut self.0)
            .ok_or_else(|| Error::invariant_violation("attach_child on a shared buffer"))?;
        if this.children.len() >= u32::MAX as usize {
            return Err(Error::ChildLimitExceeded);
        }
        this.children.push(child);
        Ok((this.children.len() - 1) as u32)
    }

    fn mutate(&mut self, f: impl FnOnce(&mut BufferInner)) -> Result<()> {
        let inner = Arc::get_mut(&mut self.0)
            .ok_or_else(|| Error::invariant_violation("mutation of a shared buffer"))?;
        f(inner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpooled_buffer_is_writable_while_exclusively_owned() {
        let mut buf = TupleBuffer::new_unpooled(vec![0u8; 16].into_boxed_slice());
        assert!(buf.as_mut_slice().is_some());
        buf.set_watermark(42).unwrap();
        assert_eq!(buf.metadata().watermark, 42);
    }

    #[test]
    fn shared_buffer_refuses_mutation() {
        let mut buf = TupleBuffer::new_unpooled(vec![0u8; 16].into_boxed_slice());
        let _clone = buf.clone();
        assert!(buf.set_watermark(1).is_err());
        assert!(buf.as_mut_slice().is_none());
    }

    #[test]
    fn attach_child_then_load_by_index() {
        let mut parent = TupleBuffer::new_unpooled(vec![0u8; 16].into_boxed_slice());
        let child = TupleBuffer::new_unpooled(vec![1u8; 8].into_boxed_slice());
        let idx = parent.attach_child(child.clone()).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(parent.num_children(), 1);
        assert_eq!(parent.child(0).unwrap().as_slice(), child.as_slice());
        assert!(parent.child(1).is_err());
    }

    #[derive(Debug)]
    struct RecordingSink(std::sync::Mutex<Vec<usize>>);
    impl BufferSink for RecordingSink {
        fn reclaim(&self, data: Box<[u8]>) {
            self.0.lock().unwrap().push(data.len());
        }
    }

    #[test]
    fn pooled_buffer_reclaims_on_last_drop() {
        let sink = Arc::new(RecordingSink(std::sync::Mutex::new(Vec::new())));
        let weak: std::sync::Weak<dyn BufferSink> = Arc::downgrade(&sink) as _;
        let buf = TupleBuffer::new_pooled(vec![0u8; 32].into_boxed_slice(), weak);
        let clone = buf.clone();
        drop(buf);
        assert!(sink.0.lock().unwrap().is_empty());
        drop(clone);
        assert_eq!(*sink.0.lock().unwrap(), vec![32]);
    }
}
