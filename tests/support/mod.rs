//! Shared fixtures for integration tests: a synthetic observing-conditions
//! provider and a small two-night campaign model.
#![allow(dead_code)]

use chrono::{Duration, NaiveDate};

use sspplan::conditions::{AltAz, ObservingConditions, Planet};
use sspplan::config::ObserverSite;
use sspplan::scheduler::ObservationModel;
use sspplan::{SlotCollection, SlotIndex, Target, TargetCatalog, TimeSlot};

pub fn site() -> ObserverSite {
    ObserverSite::new(19.83, -155.47, 4139.0, -10.0)
}

pub fn make_slot(index: u32, date: NaiveDate, hour: u32, minute: u32) -> TimeSlot {
    let start = date.and_hms_opt(hour, minute, 0).unwrap().and_utc();
    let width = Duration::minutes(15);
    let overhead = Duration::minutes(2);
    TimeSlot::new(
        SlotIndex::new(index),
        start,
        start + width,
        start + overhead + (width - overhead) / 2,
        start + overhead,
        start + width,
        date,
        date,
    )
}

/// Two nights of four slots each, indices 1..=8.
pub fn two_night_grid() -> SlotCollection {
    let night_a = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
    let night_b = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
    let mut slots = SlotCollection::new();
    for i in 0..4u32 {
        slots.add_slot(make_slot(i + 1, night_a, 6, i * 15));
    }
    for i in 0..4u32 {
        slots.add_slot(make_slot(i + 5, night_b, 6, i * 15));
    }
    slots
}

pub fn make_target(group: &str, name: &str, nexp: u32, priority: i32) -> Target {
    Target::new(
        group,
        name,
        qtty::Degrees::new(150.0),
        qtty::Degrees::new(2.0),
        qtty::Degrees::new(0.0),
        nexp,
        priority,
        0,
    )
}

/// Deterministic synthetic geometry: every quantity is a simple function
/// of the slot index and target name, with efficiency decaying over the
/// campaign so earlier slots are always preferred.
pub struct SyntheticConditions;

impl ObservingConditions for SyntheticConditions {
    fn airmass(&self, slot: SlotIndex, _target: &str) -> f64 {
        1.05 + 0.01 * slot.value() as f64
    }

    fn hour_angle(&self, _slot: SlotIndex, _target: &str) -> f64 {
        -1.5
    }

    fn alt_az(&self, slot: SlotIndex, target: &str) -> AltAz {
        let ord = target.bytes().last().unwrap_or(0) as f64;
        AltAz::from_deg(
            35.0 + slot.value() as f64,
            (15.0 * slot.value() as f64 + ord) % 360.0,
        )
    }

    fn rotator_angle_start(&self, _slot: SlotIndex, _target: &str) -> qtty::Degrees {
        qtty::Degrees::new(0.0)
    }

    fn rotator_angle_end(&self, _slot: SlotIndex, _target: &str) -> qtty::Degrees {
        qtty::Degrees::new(0.0)
    }

    fn efficiency(&self, slot: SlotIndex, _target: &str) -> f64 {
        1.0 / (1.0 + 0.05 * slot.value() as f64)
    }

    fn moon_separation(&self, _slot: SlotIndex, _target: &str) -> qtty::Degrees {
        qtty::Degrees::new(90.0)
    }

    fn moon_illumination(&self, _slot: SlotIndex) -> f64 {
        0.1
    }

    fn moon_alt_az(&self, _slot: SlotIndex) -> AltAz {
        AltAz::from_deg(-10.0, 0.0)
    }

    fn moon_phase_angle(&self, _slot: SlotIndex) -> qtty::Degrees {
        qtty::Degrees::new(120.0)
    }

    fn planet_separation(&self, _planet: Planet, _slot: SlotIndex, _target: &str) -> qtty::Degrees {
        qtty::Degrees::new(45.0)
    }
}

/// Campaign model serving the two-night grid and synthetic geometry.
pub struct SurveyModel;

impl ObservationModel for SurveyModel {
    fn fresh_slots(&self) -> SlotCollection {
        two_night_grid()
    }

    fn conditions(
        &self,
        _slots: &SlotCollection,
        _catalog: &TargetCatalog,
    ) -> Box<dyn ObservingConditions> {
        Box::new(SyntheticConditions)
    }
}
