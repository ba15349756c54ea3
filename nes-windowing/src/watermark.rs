// Single- and multi-origin watermark processors (spec §3 "WatermarkProcessor",
// §4.2). A single origin's watermark only advances past gaps once every
// sequence number up to that point has been seen - out-of-order updates sit
// in `pending` until the gap closes. The multi-origin processor is the
// engine's only cross-thread synchronization point on the triggering path
// (spec §5), guarded by one mutex around a small critical section.

use nes_common::{OriginId, SequenceNumber};
use nes_base::{Error, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

struct OriginWatermark {
    next_expected: SequenceNumber,
    contiguous: u64,
    pending: BTreeMap<SequenceNumber, u64>,
}

impl OriginWatermark {
    fn new() -> Self {
        OriginWatermark { next_expected: SequenceNumber::ZERO, contiguous: 0, pending: BTreeMap::new() }
    }

    fn update(&mut self, seq: SequenceNumber, watermark: u64) -> Result<u64> {
        if seq < self.next_expected {
            // Already folded into `contiguous`; idempotent only if the
            // resubmitted watermark agrees with what advanced us past it.
            // We no longer have the original per-seq value once it is
            // folded, so we accept any watermark <= contiguous and reject
            // anything that would imply a value greater than what we
            // already emitted downstream.
            if watermark > self.contiguous {
                return Err(Error::invariant_violation(format!(
                    "watermark for already-applied sequence {seq} increased from {} to {watermark}",
                    self.contiguous
                )));
            }
            return Ok(self.contiguous);
        }
        if let Some(&existing) = self.pending.get(&seq) {
            if existing != watermark {
                return Err(Error::invariant_violation(format!(
                    "duplicate sequence {seq} with differing watermark: {existing} vs {watermark}"
                )));
            }
            return Ok(self.contiguous);
        }
        self.pending.insert(seq, watermark);
        while let Some(&next_watermark) = self.pending.get(&self.next_expected) {
            self.pending.remove(&self.next_expected);
            self.contiguous = self.contiguous.max(next_watermark);
            self.next_expected = self.next_expected.next();
        }
        Ok(self.contiguous)
    }
}

/// Tracks `updateWatermark(origin, seq, wm)` for one input origin (spec
/// §4.2). Exposed directly for single-input operators; multi-input
/// operators go through `MultiOriginWatermarkProcessor`.
pub struct WatermarkProcessor {
    inner: Mutex<OriginWatermark>,
}

impl Default for WatermarkProcessor {
    fn default() -> Self {
        WatermarkProcessor { inner: Mutex::new(OriginWatermark::new()) }
    }
}

impl WatermarkProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, seq: SequenceNumber, watermark: u64) -> Result<u64> {
        self.inner.lock().update(seq, watermark)
    }

    pub fn current_watermark(&self) -> u64 {
        self.inner.lock().contiguous
    }
}

/// One `OriginWatermark` per participating origin; the output watermark is
/// the minimum across all of them (spec §4.2). Origins not yet registered
/// contribute a watermark of 0, which is what keeps scenario 3 (§8, two
/// origins gating a window) from emitting before every origin has spoken at
/// least once.
pub struct MultiOriginWatermarkProcessor {
    origins: Mutex<HashMap<OriginId, OriginWatermark>>,
    participating: Vec<OriginId>,
}

impl MultiOriginWatermarkProcessor {
    pub fn new(participating_origins: Vec<OriginId>) -> Self {
        let mut origins = HashMap::new();
        for origin in &participating_origins {
            origins.insert(*origin, OriginWatermark::new());
        }
        MultiOriginWatermarkProcessor { origins: Mutex::new(origins), participating: participating_origins }
    }

    pub fn participating_origins(&self) -> &[OriginId] {
        &self.participating
    }

    /// Applies the update and returns the new global watermark (spec §4.2
    /// `updateWatermark`). Non-decreasing by construction: each origin's own
    /// contiguous watermark is monotone and the global value is their min.
    pub fn update_watermark(&self, origin: OriginId, seq: SequenceNumber, watermark: u64) -> Result<u64> {
        let mut origins = self.origins.lock();
        let entry = origins
            .get_mut(&origin)
            .ok_or_else(|| Error::invariant_violation(format!("unknown origin {origin}")))?;
        entry.update(seq, watermark)?;
        let global = origins.values().map(|o| o.contiguous).min().unwrap_or(0);
        debug!(target: "nes", origin = %origin, global_watermark = global, "watermark updated");
        Ok(global)
    }

    /// Const, thread-safe snapshot (spec §4.2 `getCurrentWatermark`).
    pub fn current_watermark(&self) -> u64 {
        self.origins.lock().values().map(|o| o.contiguous).min().unwrap_or(0)
    }

    pub fn origin_watermark(&self, origin: OriginId) -> Option<u64> {
        self.origins.lock().get(&origin).map(|o| o.contiguous)
    }
}
