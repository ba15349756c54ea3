// StreamJoinOperatorHandler (spec §4.7, supplemented by
// original_source/.../StreamJoinOperatorHandler.hpp): the shared state one
// build operator per side and one probe operator register against, exactly
// once per operator pair. It owns both sides' staging areas, the two-origin
// watermark gate, and the window-identifier table the original keeps so a
// probe can address a window it did not itself discover.

use crate::build_rows::BuildRows;
use crate::build_store::JoinVariant;
use crate::slice::JoinSlice;
use crate::staging::JoinStagingArea;
use crate::{hash_join, nested_loop};
use nes_common::{OriginId, SequenceNumber};
use nes_base::Result;
use nes_windowing::{MultiOriginWatermarkProcessor, SliceAssigner};
use std::collections::{BTreeSet, HashMap};

/// Opaque handle to a window tracked by one handler, addressed by the probe
/// side without it having to recompute `(start, end)` itself (spec
/// supplement: "window-identifier-to-(start,end) lookup").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct JoinWindowId(u64);

pub struct JoinedRow {
    pub left_payload: Vec<u8>,
    pub right_payload: Vec<u8>,
}

pub struct JoinWindowResult {
    pub window_id: JoinWindowId,
    pub start: u64,
    pub end: u64,
    pub sequence_number: SequenceNumber,
    pub rows: Vec<JoinedRow>,
}

pub struct StreamJoinOperatorHandler {
    assigner: SliceAssigner,
    variant: JoinVariant,
    left_origin: OriginId,
    right_origin: OriginId,
    watermarks: MultiOriginWatermarkProcessor,
    left_staging: JoinStagingArea,
    right_staging: JoinStagingArea,
    next_window_id: u64,
    window_ids: HashMap<(u64, u64), JoinWindowId>,
    next_seq: SequenceNumber,
    emitted: BTreeSet<(u64, u64)>,
}

impl StreamJoinOperatorHandler {
    pub fn new(assigner: SliceAssigner, variant: JoinVariant, left_origin: OriginId, right_origin: OriginId) -> Self {
        StreamJoinOperatorHandler {
            assigner,
            variant,
            left_origin,
            right_origin,
            watermarks: MultiOriginWatermarkProcessor::new(vec![left_origin, right_origin]),
            left_staging: JoinStagingArea::new(),
            right_staging: JoinStagingArea::new(),
            next_window_id: 0,
            window_ids: HashMap::new(),
            next_seq: SequenceNumber::ZERO,
            emitted: BTreeSet::new(),
        }
    }

    pub fn assigner(&self) -> SliceAssigner {
        self.assigner
    }

    pub fn variant(&self) -> JoinVariant {
        self.variant
    }

    pub fn left_origin(&self) -> OriginId {
        self.left_origin
    }

    pub fn right_origin(&self) -> OriginId {
        self.right_origin
    }

    pub fn left_staging(&self) -> &JoinStagingArea {
        &self.left_staging
    }

    pub fn right_staging(&self) -> &JoinStagingArea {
        &self.right_staging
    }

    /// Applies a watermark update from one side, returning the new global
    /// (minimum-of-both-origins) watermark. A window cannot complete until
    /// both sides have spoken past its end (spec §4.7 "Failure of either
    /// side to deliver a watermark stalls emission").
    pub fn update_watermark(&self, origin: OriginId, seq: SequenceNumber, watermark: u64) -> Result<u64> {
        self.watermarks.update_watermark(origin, seq, watermark)
    }

    pub fn stage_left(&self, slices: Vec<JoinSlice>) {
        self.left_staging.stage(slices);
    }

    pub fn stage_right(&self, slices: Vec<JoinSlice>) {
        self.right_staging.stage(slices);
    }

    fn window_id_for(&mut self, start: u64, end: u64) -> JoinWindowId {
        *self.window_ids.entry((start, end)).or_insert_with(|| {
            let id = JoinWindowId(self.next_window_id);
            self.next_window_id += 1;
            id
        })
    }

    /// Drops a window's identifier once it is fully emitted (spec
    /// supplement: `deleteWindow`).
    fn delete_window(&mut self, start: u64, end: u64) {
        self.window_ids.remove(&(start, end));
    }

    fn merge_side(staging: &JoinStagingArea, start: u64, end: u64, variant: JoinVariant) -> BuildRows {
        let slices = staging.slices_in_window(start, end);
        let mut merged = match variant {
            JoinVariant::NestedLoop => BuildRows::new_nested_loop(),
            JoinVariant::Hash => BuildRows::new_hash(),
        };
        for slice in &slices {
            merged.merge(&slice.rows);
        }
        merged
    }

    fn probe(&self, left: &BuildRows, right: &BuildRows) -> Vec<JoinedRow> {
        let pairs = match self.variant {
            JoinVariant::NestedLoop => nested_loop::probe(left, right),
            JoinVariant::Hash => hash_join::probe(left, right),
        };
        pairs.into_iter().map(|(left_payload, right_payload)| JoinedRow { left_payload, right_payload }).collect()
    }

    /// Emits every window complete as of the current global watermark,
    /// probing left against right, in non-decreasing `end` order (spec
    /// §4.6's ordering rule, reused here).
    pub fn trigger(&mut self) -> Vec<JoinWindowResult> {
        let watermark = self.watermarks.current_watermark();
        let mut candidates: BTreeSet<(u64, u64)> = BTreeSet::new();
        for start in self.left_staging.all_slice_starts().into_iter().chain(self.right_staging.all_slice_starts()) {
            candidates.extend(self.assigner.windows_for_slice(start));
        }
        let mut ready: Vec<(u64, u64)> =
            candidates.into_iter().filter(|&(ws, we)| we <= watermark && !self.emitted.contains(&(ws, we))).collect();
        ready.sort_by_key(|&(_, we)| we);

        let mut results = Vec::new();
        for (ws, we) in ready {
            if !self.emitted.insert((ws, we)) {
                continue;
            }
            let left = Self::merge_side(&self.left_staging, ws, we, self.variant);
            let right = Self::merge_side(&self.right_staging, ws, we, self.variant);
            if left.is_empty() || right.is_empty() {
                continue;
            }
            let rows = self.probe(&left, &right);
            let window_id = self.window_id_for(ws, we);
            let sequence_number = self.next_seq;
            self.next_seq = self.next_seq.next();
            results.push(JoinWindowResult { window_id, start: ws, end: we, sequence_number, rows });
            self.delete_window(ws, we);
        }
        let last_needed_by = |start: u64| self.assigner.last_needed_by(start);
        self.left_staging.evict(watermark, last_needed_by);
        self.right_staging.evict(watermark, last_needed_by);
        results
    }
}
