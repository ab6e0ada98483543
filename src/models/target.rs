//! Observation target model.
//!
//! A [`Target`] carries its working-group tag, sky position, exposure quota
//! and progress; the [`TargetCatalog`] owns all targets for a run and keeps
//! the observing/completed partition consistent as observations are
//! committed.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{ScheduleError, ScheduleResult};

/// An observable object with a quota and a progress counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Working-group tag, e.g. "CO", "GE", "GA".
    pub working_group: String,
    /// Unique name within the catalog.
    pub name: String,
    /// Right ascension, ICRS degrees.
    pub ra: qtty::Degrees,
    /// Declination, ICRS degrees.
    pub dec: qtty::Degrees,
    /// Position angle, degrees.
    pub position_angle: qtty::Degrees,
    /// Total exposures requested.
    pub required_exposures: u32,
    /// Lower value = higher precedence.
    pub priority: i32,
    /// Exposures taken so far.
    pub observed_exposures: u32,
}

impl Target {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        working_group: impl Into<String>,
        name: impl Into<String>,
        ra: qtty::Degrees,
        dec: qtty::Degrees,
        position_angle: qtty::Degrees,
        required_exposures: u32,
        priority: i32,
        observed_exposures: u32,
    ) -> Self {
        Self {
            working_group: working_group.into(),
            name: name.into(),
            ra,
            dec,
            position_angle,
            required_exposures,
            priority,
            observed_exposures,
        }
    }

    /// A target is complete once its progress meets its quota.
    pub fn is_complete(&self) -> bool {
        self.observed_exposures >= self.required_exposures
    }

    /// Exposures still outstanding.
    pub fn remaining_exposures(&self) -> u32 {
        self.required_exposures.saturating_sub(self.observed_exposures)
    }
}

/// Token of a numeric-aware sort key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NaturalToken {
    Number(u64),
    Text(String),
}

/// Compare strings so that embedded numbers sort numerically, matching
/// human-readable field numbering ("F2" before "F10").
///
/// This is the comparator applied to the "CO" working group's name lists;
/// it is exposed separately so the policy is testable in isolation.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a).cmp(&natural_key(b))
}

fn natural_key(s: &str) -> Vec<NaturalToken> {
    let mut tokens = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut value: u64 = 0;
            while let Some(&d) = chars.peek() {
                if let Some(digit) = d.to_digit(10) {
                    value = value.saturating_mul(10).saturating_add(digit as u64);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(NaturalToken::Number(value));
        } else {
            let mut text = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    break;
                }
                text.push(d.to_ascii_lowercase());
                chars.next();
            }
            tokens.push(NaturalToken::Text(text));
        }
    }
    tokens
}

/// Name-keyed target container with observing/completed views.
#[derive(Debug, Clone, Default)]
pub struct TargetCatalog {
    targets: Vec<Target>,
    positions: HashMap<String, usize>,
}

impl TargetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target by name.
    pub fn add_target(&mut self, target: Target) -> ScheduleResult<()> {
        if self.positions.contains_key(&target.name) {
            return Err(ScheduleError::DuplicateName(target.name));
        }
        self.positions.insert(target.name.clone(), self.targets.len());
        self.targets.push(target);
        Ok(())
    }

    pub fn num_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.positions.get(name).map(|&pos| &self.targets[pos])
    }

    pub fn all_targets(&self) -> &[Target] {
        &self.targets
    }

    /// Targets with outstanding exposures.
    pub fn observing_targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(|t| !t.is_complete())
    }

    /// Targets whose quota is met.
    pub fn completed_targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(|t| t.is_complete())
    }

    /// Observing targets at or below a priority cutoff.
    pub fn observing_targets_by_priority(&self, cutoff: i32) -> Vec<&Target> {
        self.observing_targets()
            .filter(|t| t.priority <= cutoff)
            .collect()
    }

    /// Distinct priority values, ascending.
    pub fn priorities(&self) -> Vec<i32> {
        let set: BTreeSet<i32> = self.targets.iter().map(|t| t.priority).collect();
        set.into_iter().collect()
    }

    /// Distinct working groups, sorted.
    pub fn working_groups(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.targets.iter().map(|t| t.working_group.as_str()).collect();
        set.into_iter().map(String::from).collect()
    }

    /// Per-group target name lists. The "CO" group is ordered with the
    /// numeric-aware comparator, all others lexically.
    pub fn group_names(&self) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for target in &self.targets {
            map.entry(target.working_group.clone())
                .or_default()
                .push(target.name.clone());
        }
        for (group, names) in &mut map {
            if group == "CO" {
                names.sort_by(|a, b| natural_cmp(a, b));
            } else {
                names.sort();
            }
        }
        map
    }

    /// Exposures already taken, summed per working group.
    pub fn finished_by_group(&self) -> HashMap<String, u32> {
        let mut map: HashMap<String, u32> = HashMap::new();
        for target in &self.targets {
            *map.entry(target.working_group.clone()).or_default() += target.observed_exposures;
        }
        map
    }

    /// Advance a target's progress by `count` exposures.
    ///
    /// A target crossing its quota moves from the observing view to the
    /// completed view exactly once; further commits leave it there.
    pub fn commit_observation(&mut self, name: &str, count: u32) -> ScheduleResult<()> {
        let pos = *self
            .positions
            .get(name)
            .ok_or_else(|| ScheduleError::UnknownTarget(name.to_string()))?;
        self.targets[pos].observed_exposures += count;
        Ok(())
    }

    /// Overwrite a target's progress counter.
    ///
    /// Only the field-reordering pass uses this, when it re-derives each
    /// target's observed count from the slots it occupies after re-packing.
    pub(crate) fn set_observed(&mut self, name: &str, count: u32) -> ScheduleResult<()> {
        let pos = *self
            .positions
            .get(name)
            .ok_or_else(|| ScheduleError::UnknownTarget(name.to_string()))?;
        self.targets[pos].observed_exposures = count;
        Ok(())
    }
}
