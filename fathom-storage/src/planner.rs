// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Write planning: where each incoming chunk lands in the store.
//!
//! Given the store's current primary index and a batch of chunks sorted by
//! first timestamp, the planner decides for every chunk whether it
//! overwrites existing records, extends the tail, or must be inserted in
//! front of existing records. Insertions become push-forward operations:
//! existing records at and after the insertion point move towards the end
//! of the array to open a gap.
//!
//! Placements are computed against the index as it was before the batch
//! and resolved once every push of the batch is known, so a chunk's final
//! positions account for pushes requested by chunks planned after it.
//! The existing index does not have to be sorted; membership is by exact
//! timestamp value.
//!
//! Rows whose index is still NaN were allocated by a batch that never
//! wrote them, typically one interrupted after its structural step. They
//! are free slots: a chunk that fits the unwritten run in front of its
//! successor (or at the end of the array) lands there instead of growing
//! the array again, so re-submitting an interrupted batch is idempotent.

use fathom_core::{FathomError, Result, Timestamp};
use std::cmp::Ordering;
use std::ops::Range;

/// Target positions of one chunk along the primary dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Records land at `start..end` in order
    Contiguous(Range<usize>),
    /// Record `k` lands at `indices[k]`
    Indices(Vec<usize>),
}

impl Placement {
    pub fn len(&self) -> usize {
        match self {
            Placement::Contiguous(r) => r.len(),
            Placement::Indices(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One past the highest target position
    pub fn upper_bound(&self) -> usize {
        match self {
            Placement::Contiguous(r) => r.end,
            Placement::Indices(i) => i.iter().max().map(|m| m + 1).unwrap_or(0),
        }
    }

    pub fn positions(&self) -> Vec<usize> {
        match self {
            Placement::Contiguous(r) => r.clone().collect(),
            Placement::Indices(i) => i.clone(),
        }
    }
}

/// Open `count` slots at `insertion_point`, moving everything after it
/// forward. Points are in the coordinates of the array as it stands when
/// the push is applied, after all earlier pushes of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushForward {
    pub insertion_point: usize,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    /// One placement per chunk, in batch order
    pub placements: Vec<Placement>,
    /// Push-forward operations, applied in order
    pub push_forward: Vec<PushForward>,
    /// Primary extent once the batch has committed
    pub final_size: usize,
    /// Primary extent the plan was computed against
    pub existing_len: usize,
}

impl WritePlan {
    pub fn total_push(&self) -> usize {
        self.push_forward.iter().map(|p| p.count).sum()
    }

    pub fn requires_structural_change(&self) -> bool {
        self.final_size > self.existing_len || !self.push_forward.is_empty()
    }
}

/// Where a chunk record goes, before push offsets are resolved
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Overwrites the existing record at this original position
    Existing(usize),
    /// Offset within the gap opened by push `push`
    Inserted { push: usize, offset: usize },
    /// Offset past the end of the array
    Tail(usize),
}

/// A push requested against original coordinates
#[derive(Debug, Clone, Copy)]
struct PendingPush {
    point: usize,
    count: usize,
}

/// Sorted view of the existing index for membership and successor lookups
struct ExistingIndex {
    sorted: Vec<(Timestamp, usize)>,
}

impl ExistingIndex {
    fn new(existing: &[Timestamp]) -> Self {
        // unwritten slots hold NaN and never match
        let mut sorted: Vec<(Timestamp, usize)> = existing
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, t)| !t.is_nan())
            .map(|(pos, t)| (t, pos))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { sorted }
    }

    fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    fn min(&self) -> Timestamp {
        self.sorted[0].0
    }

    fn max(&self) -> Timestamp {
        self.sorted[self.sorted.len() - 1].0
    }

    fn position(&self, t: Timestamp) -> Option<usize> {
        self.sorted
            .binary_search_by(|(v, _)| v.total_cmp(&t))
            .ok()
            .map(|i| self.sorted[i].1)
    }

    /// Smallest existing timestamp greater than `t`, with its position
    fn successor(&self, t: Timestamp) -> Option<(Timestamp, usize)> {
        let i = self
            .sorted
            .partition_point(|(v, _)| v.total_cmp(&t) != Ordering::Greater);
        self.sorted.get(i).copied()
    }
}

/// A maximal run of unwritten rows, filled from the front
#[derive(Debug, Clone, Copy)]
struct FreeRun {
    start: usize,
    end: usize,
    used: usize,
}

impl FreeRun {
    fn remaining(&self) -> usize {
        self.end - self.start - self.used
    }

    fn close(&mut self) {
        self.used = self.end - self.start;
    }
}

/// Unwritten rows of the existing index
struct FreeSlots {
    runs: Vec<FreeRun>,
}

impl FreeSlots {
    fn new(existing: &[Timestamp]) -> Self {
        let mut runs: Vec<FreeRun> = Vec::new();
        for (pos, t) in existing.iter().enumerate() {
            if !t.is_nan() {
                continue;
            }
            match runs.last_mut() {
                Some(run) if run.end == pos => run.end += 1,
                _ => runs.push(FreeRun {
                    start: pos,
                    end: pos + 1,
                    used: 0,
                }),
            }
        }
        Self { runs }
    }

    fn has_run_ending_at(&self, end: usize) -> bool {
        self.runs.iter().any(|r| r.end == end)
    }

    /// Claim `len` rows of the run ending right before `end`. A run too
    /// small for the chunk is closed so later chunks cannot land in front
    /// of records inserted after it.
    fn take_before(&mut self, end: usize, len: usize) -> Option<usize> {
        let run = self.runs.iter_mut().find(|r| r.end == end)?;
        if run.remaining() < len {
            run.close();
            return None;
        }
        let start = run.start + run.used;
        run.used += len;
        Some(start)
    }

    /// Claim the first `len` rows of the untouched run starting at `start`
    fn take_after(&mut self, start: usize, len: usize) -> Option<usize> {
        let run = self.runs.iter_mut().find(|r| r.start == start)?;
        if run.used > 0 || run.remaining() < len {
            run.close();
            return None;
        }
        run.used = len;
        Some(start)
    }
}

fn existing_slots(start: usize, len: usize) -> Vec<Slot> {
    (start..start + len).map(Slot::Existing).collect()
}

/// Plan a batch of chunk indices against the `existing` primary index.
///
/// `chunks` must be ordered by first timestamp with strictly increasing
/// minimums, and each chunk index must be strictly ascending.
pub fn plan_writes(existing: &[Timestamp], chunks: &[&[Timestamp]]) -> Result<WritePlan> {
    validate_batch(chunks)?;

    let existing_len = existing.len();
    let index = ExistingIndex::new(existing);
    let mut free = FreeSlots::new(existing);

    let mut pushes: Vec<PendingPush> = Vec::new();
    let mut running_total = 0usize;
    let mut drafts: Vec<(Vec<Slot>, bool)> = Vec::with_capacity(chunks.len());

    for (chunk_no, chunk) in chunks.iter().enumerate() {
        let matches: Vec<Option<usize>> = chunk.iter().map(|&t| index.position(t)).collect();
        let matched = matches.iter().filter(|m| m.is_some()).count();
        let first = chunk[0];
        let last = chunk[chunk.len() - 1];

        if matched == chunk.len() {
            let slots = matches.iter().flatten().map(|&p| Slot::Existing(p)).collect();
            tracing::trace!(chunk = chunk_no, "Chunk overwrites existing records");
            drafts.push((slots, true));
            continue;
        }

        if matched == 0 {
            if index.is_empty() || first > index.max() {
                if let Some(start) = free.take_before(existing_len, chunk.len()) {
                    tracing::trace!(chunk = chunk_no, start, "Chunk fills unwritten tail rows");
                    drafts.push((existing_slots(start, chunk.len()), true));
                    continue;
                }
                let slots = (0..chunk.len())
                    .map(|k| Slot::Tail(running_total + k))
                    .collect();
                running_total += chunk.len();
                tracing::trace!(chunk = chunk_no, "Chunk appends to tail");
                drafts.push((slots, false));
                continue;
            }

            let (next, pos) = index.successor(first).ok_or_else(|| {
                FathomError::planning(format!(
                    "chunk {} starting at {} has no successor in the store",
                    chunk_no, first
                ))
            })?;
            if next < last {
                return Err(FathomError::planning(format!(
                    "chunk {} ({}..={}) interleaves existing record {}",
                    chunk_no, first, last, next
                )));
            }
            let head = last < index.min() && !free.has_run_ending_at(pos);
            if let Some(start) = free.take_before(pos, chunk.len()) {
                tracing::trace!(chunk = chunk_no, start, "Chunk fills unwritten rows");
                drafts.push((existing_slots(start, chunk.len()), true));
                continue;
            }
            let point = if head { 0 } else { pos };
            let push = pushes.len();
            pushes.push(PendingPush {
                point,
                count: chunk.len(),
            });
            tracing::trace!(chunk = chunk_no, point, "Chunk inserted before existing records");
            let slots = (0..chunk.len())
                .map(|offset| Slot::Inserted { push, offset })
                .collect();
            drafts.push((slots, false));
            continue;
        }

        // partially contained: the matched records must be one unbroken run
        let first_match = matches.iter().position(|m| m.is_some()).unwrap_or(0);
        let last_match = matches.iter().rposition(|m| m.is_some()).unwrap_or(0);
        if matches[first_match..=last_match].iter().any(|m| m.is_none()) {
            return Err(FathomError::planning(format!(
                "chunk {} has new records between existing ones",
                chunk_no
            )));
        }
        let leading = first_match;
        let trailing = chunk.len() - 1 - last_match;
        if leading > 0 && trailing > 0 {
            return Err(FathomError::planning(format!(
                "chunk {} has new records on both sides of existing ones",
                chunk_no
            )));
        }

        let mut slots: Vec<Slot> = Vec::with_capacity(chunk.len());
        if leading > 0 {
            let anchor = matches[first_match].unwrap_or(0);
            let head = first < index.min() && !free.has_run_ending_at(anchor);
            if let Some(start) = free.take_before(anchor, leading) {
                slots.extend(existing_slots(start, leading));
            } else {
                let point = if head { 0 } else { anchor };
                let push = pushes.len();
                pushes.push(PendingPush {
                    point,
                    count: leading,
                });
                slots.extend((0..leading).map(|offset| Slot::Inserted { push, offset }));
            }
        }
        slots.extend(
            matches[first_match..=last_match]
                .iter()
                .flatten()
                .map(|&p| Slot::Existing(p)),
        );
        let after_match = matches[last_match].map(|p| p + 1).unwrap_or(existing_len);
        if trailing > 0 {
            if let Some(start) = free.take_after(after_match, trailing) {
                slots.extend(existing_slots(start, trailing));
            } else if last > index.max() {
                slots.extend((0..trailing).map(|k| Slot::Tail(running_total + k)));
                running_total += trailing;
            } else {
                let push = pushes.len();
                pushes.push(PendingPush {
                    point: after_match,
                    count: trailing,
                });
                slots.extend((0..trailing).map(|offset| Slot::Inserted { push, offset }));
            }
        }
        tracing::trace!(chunk = chunk_no, leading, trailing, "Chunk partially overlaps store");
        drafts.push((slots, true));
    }

    let total_push: usize = pushes.iter().map(|p| p.count).sum();
    let resolver = Resolver {
        pushes: &pushes,
        existing_len,
        total_push,
    };

    let placements: Vec<Placement> = drafts
        .into_iter()
        .map(|(slots, explicit)| {
            let positions: Vec<usize> = slots.iter().map(|s| resolver.resolve(*s)).collect();
            if explicit {
                Placement::Indices(positions)
            } else {
                let start = positions[0];
                Placement::Contiguous(start..start + positions.len())
            }
        })
        .collect();

    let push_forward = (0..pushes.len())
        .map(|k| PushForward {
            insertion_point: resolver.applied_point(k),
            count: pushes[k].count,
        })
        .collect();

    let final_size = existing_len + total_push + running_total;
    debug_assert!(placements.iter().all(|p| p.upper_bound() <= final_size));

    tracing::debug!(
        chunks = chunks.len(),
        existing_len,
        final_size,
        pushes = pushes.len(),
        total_push,
        "Planned write batch"
    );

    Ok(WritePlan {
        placements,
        push_forward,
        final_size,
        existing_len,
    })
}

fn validate_batch(chunks: &[&[Timestamp]]) -> Result<()> {
    for (chunk_no, chunk) in chunks.iter().enumerate() {
        if chunk.is_empty() {
            return Err(FathomError::planning(format!("chunk {} is empty", chunk_no)));
        }
        if chunk.windows(2).any(|w| w[0].partial_cmp(&w[1]) != Some(Ordering::Less)) {
            return Err(FathomError::planning(format!(
                "chunk {} index is not strictly ascending",
                chunk_no
            )));
        }
    }
    for (chunk_no, pair) in chunks.windows(2).enumerate() {
        if pair[0][0].partial_cmp(&pair[1][0]) != Some(Ordering::Less) {
            return Err(FathomError::planning(format!(
                "chunks {} and {} are not ordered by first timestamp",
                chunk_no,
                chunk_no + 1
            )));
        }
    }
    Ok(())
}

/// Maps original-coordinate slots to final positions
struct Resolver<'a> {
    pushes: &'a [PendingPush],
    existing_len: usize,
    total_push: usize,
}

impl Resolver<'_> {
    fn resolve(&self, slot: Slot) -> usize {
        match slot {
            Slot::Existing(pos) => {
                pos + self
                    .pushes
                    .iter()
                    .filter(|p| p.point <= pos)
                    .map(|p| p.count)
                    .sum::<usize>()
            }
            Slot::Inserted { push, offset } => {
                let point = self.pushes[push].point;
                let later: usize = self.pushes[push + 1..]
                    .iter()
                    .filter(|p| p.point < point)
                    .map(|p| p.count)
                    .sum();
                self.applied_point(push) + later + offset
            }
            Slot::Tail(offset) => self.existing_len + self.total_push + offset,
        }
    }

    /// Insertion point of push `k` once pushes `0..k` have been applied
    fn applied_point(&self, k: usize) -> usize {
        let point = self.pushes[k].point;
        point
            + self.pushes[..k]
                .iter()
                .filter(|p| p.point <= point)
                .map(|p| p.count)
                .sum::<usize>()
    }
}
