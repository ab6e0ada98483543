//! Observation slot model.
//!
//! A [`TimeSlot`] is one fixed-width schedulable telescope window on a given
//! night. The [`SlotCollection`] owns the per-run slot sequence and keeps the
//! used/free partition consistent on every mutation. Slots hold the assigned
//! target by name only; target state lives in the catalog.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::conditions::{slew_time, ObservingConditions};
use crate::config::SlewRates;
use crate::error::{ScheduleError, ScheduleResult};
use crate::models::TargetCatalog;
use crate::scheduler::Assignment;

/// Slot identifier, unique across the whole campaign and increasing in
/// chronological order within and across nights.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SlotIndex(pub u32);

impl SlotIndex {
    pub fn new(value: u32) -> Self {
        SlotIndex(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One schedulable telescope time window.
///
/// `obs_start`/`obs_end` bracket the effective exposure inside the slot;
/// `obs_start < obs_end <= end` always holds after construction.
#[derive(Debug, Clone)]
pub struct TimeSlot {
    pub index: SlotIndex,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub mid: DateTime<Utc>,
    pub obs_start: DateTime<Utc>,
    pub obs_end: DateTime<Utc>,
    /// Local calendar night this slot belongs to.
    pub date: NaiveDate,
    /// UTC calendar date of the slot start.
    pub date_utc: NaiveDate,
    used: bool,
    target: Option<String>,
}

impl TimeSlot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: SlotIndex,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        mid: DateTime<Utc>,
        obs_start: DateTime<Utc>,
        obs_end: DateTime<Utc>,
        date: NaiveDate,
        date_utc: NaiveDate,
    ) -> Self {
        debug_assert!(obs_start < obs_end && obs_end <= end);
        Self {
            index,
            start,
            end,
            mid,
            obs_start,
            obs_end,
            date,
            date_utc,
            used: false,
            target: None,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Name of the assigned target, if any.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub(crate) fn set_target(&mut self, name: Option<String>) {
        self.target = name;
    }

    fn shift(&mut self, offset: Duration) {
        self.start += offset;
        self.end += offset;
        self.mid += offset;
        self.obs_start += offset;
        self.obs_end += offset;
    }
}

/// Ordered slot sequence with derived used/free indexes.
///
/// Invariant: used and free partition the full slot set on every mutation.
#[derive(Debug, Clone, Default)]
pub struct SlotCollection {
    slots: Vec<TimeSlot>,
    used: Vec<SlotIndex>,
    free: Vec<SlotIndex>,
    dates: Vec<NaiveDate>,
    dates_utc: Vec<NaiveDate>,
    positions: HashMap<SlotIndex, usize>,
}

impl SlotCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot and classify it. Callers guarantee index uniqueness.
    pub fn add_slot(&mut self, slot: TimeSlot) {
        if !self.dates.contains(&slot.date) {
            self.dates.push(slot.date);
        }
        if !self.dates_utc.contains(&slot.date_utc) {
            self.dates_utc.push(slot.date_utc);
        }
        self.positions.insert(slot.index, self.slots.len());
        if slot.used {
            self.used.push(slot.index);
        } else {
            self.free.push(slot.index);
        }
        self.slots.push(slot);
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn all_slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn used_slots(&self) -> impl Iterator<Item = &TimeSlot> {
        self.slots.iter().filter(|s| s.used)
    }

    pub fn free_slots(&self) -> impl Iterator<Item = &TimeSlot> {
        self.slots.iter().filter(|s| !s.used)
    }

    pub fn num_used(&self) -> usize {
        self.used.len()
    }

    pub fn num_free(&self) -> usize {
        self.free.len()
    }

    /// Local calendar nights, in chronological (insertion) order.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// UTC calendar dates, in chronological (insertion) order.
    pub fn dates_utc(&self) -> &[NaiveDate] {
        &self.dates_utc
    }

    pub fn get(&self, index: SlotIndex) -> Option<&TimeSlot> {
        self.positions.get(&index).map(|&pos| &self.slots[pos])
    }

    pub fn slots_by_date(&self, date: NaiveDate) -> impl Iterator<Item = &TimeSlot> {
        self.slots.iter().filter(move |s| s.date == date)
    }

    /// Used slots whose assigned target belongs to `field`, in
    /// chronological order. A target belongs to a field when its name is
    /// the field followed by an underscore-separated suffix, so "F1" does
    /// not capture "F10_a".
    pub fn slots_by_field(&self, field: &str) -> Vec<SlotIndex> {
        let prefix = format!("{}_", field);
        self.slots
            .iter()
            .filter(|s| {
                s.used && s.target.as_deref().is_some_and(|name| name.starts_with(&prefix))
            })
            .map(|s| s.index)
            .collect()
    }

    /// Free slots gathered night by night until at least `n_requested` have
    /// been collected.
    ///
    /// Earlier nights are exhausted completely before a later night is
    /// touched, so the result may exceed `n_requested`; it is smaller only
    /// when the whole collection runs out.
    pub fn available_slots(&self, n_requested: usize) -> Vec<SlotIndex> {
        let mut collected = Vec::new();
        for date in &self.dates {
            collected.extend(
                self.slots
                    .iter()
                    .filter(|s| !s.used && s.date == *date)
                    .map(|s| s.index),
            );
            if collected.len() >= n_requested {
                break;
            }
        }
        collected
    }

    /// Mark a slot as holding `target`.
    ///
    /// Callers must not mark the same index twice within a scheduling pass.
    pub fn mark_used(&mut self, index: SlotIndex, target: &str) -> ScheduleResult<()> {
        let pos = *self
            .positions
            .get(&index)
            .ok_or(ScheduleError::InvalidSlot(index))?;
        self.slots[pos].used = true;
        self.slots[pos].target = Some(target.to_string());
        self.free.retain(|&i| i != index);
        self.used.push(index);
        Ok(())
    }

    /// Replace the target of an already-used slot without touching the
    /// used/free partition. Field reordering only.
    pub(crate) fn reassign(&mut self, index: SlotIndex, target: &str) -> ScheduleResult<()> {
        let pos = *self
            .positions
            .get(&index)
            .ok_or(ScheduleError::InvalidSlot(index))?;
        self.slots[pos].set_target(Some(target.to_string()));
        Ok(())
    }

    /// Clear all usage state; every slot becomes free again.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.used = false;
            slot.target = None;
        }
        self.used.clear();
        self.free = self.slots.iter().map(|s| s.index).collect();
    }

    /// Commit a solved assignment: set slot targets, mark slots used, and
    /// advance the catalog's observed counters by one exposure per slot.
    ///
    /// The dummy pseudo-target is skipped; its slots stay free.
    pub fn commit_assignment(
        &mut self,
        assignment: &Assignment,
        catalog: &mut TargetCatalog,
    ) -> ScheduleResult<()> {
        for (&index, name) in assignment.real_assignments() {
            self.mark_used(index, name)?;
            catalog.commit_observation(name, 1)?;
        }
        Ok(())
    }

    /// Shift slot times forward by accumulated slew overhead.
    ///
    /// Walks consecutive slot pairs within the same night; for each pair
    /// with both slots assigned, the slew time from the first slot's
    /// end-of-exposure pointing to the second slot's start-of-exposure
    /// pointing is added to a running per-night offset, and the second
    /// slot's five time fields are shifted by the cumulative offset. The
    /// accumulator resets at night boundaries. Pairs with an unassigned
    /// member are skipped without bridging: the accumulator persists past
    /// them but no shift derived from a non-adjacent pair is ever applied.
    ///
    /// Must run exactly once per pipeline stage, after the assignment is
    /// committed and before any geometry recomputation that depends on
    /// slot timing.
    pub fn apply_slew_shift(&mut self, oc: &dyn ObservingConditions, rates: &SlewRates) {
        let mut overhead_sec = 0.0_f64;
        for i in 0..self.slots.len().saturating_sub(1) {
            if self.slots[i].date != self.slots[i + 1].date {
                overhead_sec = 0.0;
                continue;
            }

            let (cur_index, tgt_index) = (self.slots[i].index, self.slots[i + 1].index);
            let (cur_target, tgt_target) =
                match (self.slots[i].target.clone(), self.slots[i + 1].target.clone()) {
                    (Some(c), Some(t)) => (c, t),
                    _ => {
                        log::warn!(
                            "slot {} or {} is empty during slew time calculation",
                            cur_index,
                            tgt_index
                        );
                        continue;
                    }
                };

            let cur_altaz = oc.alt_az(cur_index, &cur_target);
            let tgt_altaz = oc.alt_az(tgt_index, &tgt_target);
            let cur_rot = oc.rotator_angle_end(cur_index, &cur_target);
            let tgt_rot = oc.rotator_angle_start(tgt_index, &tgt_target);
            let pair_sec = slew_time(&cur_altaz, cur_rot, &tgt_altaz, tgt_rot, rates).value();
            overhead_sec += pair_sec;
            log::info!(
                "slew {} -> {} ({} -> {}) = {:.1} s, cumulative {:.1} s",
                cur_index,
                tgt_index,
                cur_target,
                tgt_target,
                pair_sec,
                overhead_sec
            );

            let offset = Duration::milliseconds((overhead_sec * 1000.0).round() as i64);
            self.slots[i + 1].shift(offset);
        }
    }

    /// Check the used/free partition invariant. Debug aid for tests.
    pub fn partition_is_consistent(&self) -> bool {
        let used_ok = self
            .used
            .iter()
            .all(|&i| self.get(i).is_some_and(|s| s.used));
        let free_ok = self
            .free
            .iter()
            .all(|&i| self.get(i).is_some_and(|s| !s.used));
        used_ok && free_ok && self.used.len() + self.free.len() == self.slots.len()
    }
}
