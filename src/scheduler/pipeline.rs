//! Multi-stage planning pipeline.
//!
//! The full plan is produced in passes over the same campaign:
//!
//! 1. one solver pass per priority level, ascending, each committing into
//!    the shared slot collection and catalog;
//! 2. a field-reordering heuristic that repacks the committed slots of the
//!    configured survey group so each field's visits are consecutive;
//! 3. an unrestricted pass on a rebuilt catalog whose quotas are the counts
//!    actually won in the earlier passes, solved against a fresh slot grid;
//! 4. the slew-time adjustment shifting slot times by accumulated
//!    repointing overhead, followed by a geometry rebuild;
//! 5. optionally, one more unrestricted pass against the shifted times.
//!
//! Any non-optimal solve aborts the pipeline with the stage name attached.

use std::collections::BTreeSet;

use crate::conditions::ObservingConditions;
use crate::config::{ObserverSite, PlanParams};
use crate::error::ScheduleResult;
use crate::models::{SlotCollection, Target, TargetCatalog};
use crate::scheduler::optimize_schedule;

/// Source of campaign geometry: the slot grid and the per-(slot, target)
/// observing conditions derived from it.
pub trait ObservationModel {
    /// Build the full slot grid with original, unshifted timing.
    fn fresh_slots(&self) -> SlotCollection;

    /// Build a conditions provider for the given slot timing and targets.
    fn conditions(
        &self,
        slots: &SlotCollection,
        catalog: &TargetCatalog,
    ) -> Box<dyn ObservingConditions>;
}

/// Final committed schedule.
#[derive(Debug)]
pub struct PlanOutcome {
    pub slots: SlotCollection,
    pub catalog: TargetCatalog,
}

/// Run the full planning pipeline for one campaign.
pub fn run_pipeline(
    model: &dyn ObservationModel,
    catalog: TargetCatalog,
    params: &PlanParams,
    site: &ObserverSite,
) -> ScheduleResult<PlanOutcome> {
    let mut catalog = catalog;
    let mut slots = model.fresh_slots();
    let max_exposures = params.max_exposures(slots.num_slots());
    log::info!(
        "planning {} targets over {} slots, caps {:?}",
        catalog.num_targets(),
        slots.num_slots(),
        max_exposures
    );
    let oc = model.conditions(&slots, &catalog);

    for priority in catalog.priorities() {
        log::info!("priority pass {}", priority);
        let solved = optimize_schedule(
            &slots,
            &catalog,
            oc.as_ref(),
            params,
            site,
            &max_exposures,
            Some(priority),
        )
        .into_solved(&format!("priority pass {}", priority))?;
        slots.commit_assignment(&solved.assignment, &mut catalog)?;
    }

    if let Some(group) = params.reorder_group.as_deref() {
        reorder_fields(&mut slots, &mut catalog, group)?;
    }

    // Unrestricted pass: quotas become the counts actually won so far, and
    // the solve starts over on a fresh grid.
    let mut catalog2 = catalog_from_committed(&slots, &catalog);
    let mut slots2 = model.fresh_slots();
    log::info!(
        "unrestricted pass over {} committed targets",
        catalog2.num_targets()
    );
    let solved = optimize_schedule(
        &slots2,
        &catalog2,
        oc.as_ref(),
        params,
        site,
        &max_exposures,
        None,
    )
    .into_solved("unrestricted pass")?;
    slots2.commit_assignment(&solved.assignment, &mut catalog2)?;

    merge_missing(&mut catalog2, &catalog)?;

    if let Some(group) = params.reorder_group.as_deref() {
        reorder_fields(&mut slots2, &mut catalog2, group)?;
    }

    slots2.apply_slew_shift(oc.as_ref(), &params.slew);
    let oc2 = model.conditions(&slots2, &catalog2);

    if params.refine_after_slew {
        let mut catalog3 = catalog_from_committed(&slots2, &catalog2);
        slots2.reset();
        log::info!("refine pass over {} committed targets", catalog3.num_targets());
        let solved = optimize_schedule(
            &slots2,
            &catalog3,
            oc2.as_ref(),
            params,
            site,
            &max_exposures,
            None,
        )
        .into_solved("refine pass")?;
        slots2.commit_assignment(&solved.assignment, &mut catalog3)?;
        merge_missing(&mut catalog3, &catalog2)?;
        return Ok(PlanOutcome {
            slots: slots2,
            catalog: catalog3,
        });
    }

    Ok(PlanOutcome {
        slots: slots2,
        catalog: catalog2,
    })
}

/// Catalog for a follow-up pass: each target that won slots reappears with
/// its winnings as the new quota and a cleared progress counter.
fn catalog_from_committed(slots: &SlotCollection, source: &TargetCatalog) -> TargetCatalog {
    let mut rebuilt = TargetCatalog::new();
    for slot in slots.used_slots() {
        let Some(name) = slot.target() else { continue };
        if rebuilt.contains(name) {
            continue;
        }
        let Some(target) = source.get(name) else {
            log::warn!("committed slot {} holds unknown target '{}'", slot.index, name);
            continue;
        };
        let replacement = Target::new(
            target.working_group.clone(),
            target.name.clone(),
            target.ra,
            target.dec,
            target.position_angle,
            target.observed_exposures,
            target.priority,
            0,
        );
        // Names are deduplicated above, so this cannot collide.
        let _ = rebuilt.add_target(replacement);
    }
    rebuilt
}

/// Carry over source targets the destination has never seen, so reporting
/// downstream sees the whole campaign.
fn merge_missing(dest: &mut TargetCatalog, source: &TargetCatalog) -> ScheduleResult<()> {
    for target in source.all_targets() {
        if !dest.contains(&target.name) {
            dest.add_target(target.clone())?;
        }
    }
    Ok(())
}

/// Repack the committed slots of one working group so that each field's
/// visits are consecutive and ordered by (priority, name).
///
/// A field is everything before the last `_` of a target name. Within each
/// field the committed slots are refilled greedily in chronological order,
/// each target taking up to its quota; progress counters are re-derived
/// from the slots each target ends up holding.
fn reorder_fields(
    slots: &mut SlotCollection,
    catalog: &mut TargetCatalog,
    group: &str,
) -> ScheduleResult<()> {
    let mut fields: BTreeSet<String> = BTreeSet::new();
    for slot in slots.used_slots() {
        let Some(name) = slot.target() else { continue };
        let Some(target) = catalog.get(name) else { continue };
        if target.working_group != group {
            continue;
        }
        match name.rfind('_') {
            Some(pos) => {
                fields.insert(name[..pos].to_string());
            }
            None => log::warn!("target '{}' has no field component, skipping reorder", name),
        }
    }

    for field in fields {
        let field_slots = slots.slots_by_field(&field);

        let mut members: BTreeSet<String> = BTreeSet::new();
        for &index in &field_slots {
            if let Some(name) = slots.get(index).and_then(|s| s.target()) {
                members.insert(name.to_string());
            }
        }
        let mut ordered: Vec<&Target> = members.iter().filter_map(|name| catalog.get(name)).collect();
        ordered.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.name.cmp(&b.name))
        });
        log::debug!(
            "reordering field {}: {} slots, targets {:?}",
            field,
            field_slots.len(),
            ordered.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );

        let mut plan: Vec<(String, usize)> = Vec::new();
        let mut cursor = 0usize;
        for target in ordered {
            let take = (target.required_exposures as usize).min(field_slots.len() - cursor);
            plan.push((target.name.clone(), take));
            cursor += take;
        }

        let mut cursor = 0usize;
        for (name, take) in plan {
            for &index in &field_slots[cursor..cursor + take] {
                slots.reassign(index, &name)?;
            }
            catalog.set_observed(&name, take as u32)?;
            cursor += take;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SlotIndex;
    use chrono::{Duration, NaiveDate};

    fn make_slot(index: u32, date: NaiveDate, hour: u32, minute: u32) -> crate::models::TimeSlot {
        let start = date.and_hms_opt(hour, minute, 0).unwrap().and_utc();
        let width = Duration::minutes(15);
        let overhead = Duration::minutes(2);
        crate::models::TimeSlot::new(
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

    fn make_target(group: &str, name: &str, nexp: u32, priority: i32, observed: u32) -> Target {
        Target::new(
            group,
            name,
            qtty::Degrees::new(150.0),
            qtty::Degrees::new(2.0),
            qtty::Degrees::new(0.0),
            nexp,
            priority,
            observed,
        )
    }

    #[test]
    fn test_reorder_fields_groups_visits_by_target() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let mut slots = SlotCollection::new();
        for i in 0..4 {
            slots.add_slot(make_slot(i + 1, date, 6, i * 15));
        }
        // Interleaved committed order: b, a, b, a.
        slots.mark_used(SlotIndex::new(1), "F1_b").unwrap();
        slots.mark_used(SlotIndex::new(2), "F1_a").unwrap();
        slots.mark_used(SlotIndex::new(3), "F1_b").unwrap();
        slots.mark_used(SlotIndex::new(4), "F1_a").unwrap();

        let mut catalog = TargetCatalog::new();
        catalog.add_target(make_target("GA", "F1_a", 2, 1, 2)).unwrap();
        catalog.add_target(make_target("GA", "F1_b", 2, 1, 2)).unwrap();

        reorder_fields(&mut slots, &mut catalog, "GA").unwrap();

        let held: Vec<_> = slots
            .used_slots()
            .map(|s| s.target().unwrap_or_default().to_string())
            .collect();
        assert_eq!(held, vec!["F1_a", "F1_a", "F1_b", "F1_b"]);
        assert_eq!(catalog.get("F1_a").unwrap().observed_exposures, 2);
        assert_eq!(catalog.get("F1_b").unwrap().observed_exposures, 2);
        assert!(slots.partition_is_consistent());
    }

    #[test]
    fn test_reorder_fields_prefers_priority_and_rederives_counts() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let mut slots = SlotCollection::new();
        for i in 0..3 {
            slots.add_slot(make_slot(i + 1, date, 6, i * 15));
        }
        slots.mark_used(SlotIndex::new(1), "F1_low").unwrap();
        slots.mark_used(SlotIndex::new(2), "F1_low").unwrap();
        slots.mark_used(SlotIndex::new(3), "F1_high").unwrap();

        let mut catalog = TargetCatalog::new();
        // The higher-precedence target's quota exceeds its winnings; it
        // absorbs slots from the lower one, whose count is re-derived.
        catalog
            .add_target(make_target("GA", "F1_high", 2, 1, 1))
            .unwrap();
        catalog
            .add_target(make_target("GA", "F1_low", 2, 2, 2))
            .unwrap();

        reorder_fields(&mut slots, &mut catalog, "GA").unwrap();

        let held: Vec<_> = slots
            .used_slots()
            .map(|s| s.target().unwrap_or_default().to_string())
            .collect();
        assert_eq!(held, vec!["F1_high", "F1_high", "F1_low"]);
        assert_eq!(catalog.get("F1_high").unwrap().observed_exposures, 2);
        assert_eq!(catalog.get("F1_low").unwrap().observed_exposures, 1);
    }

    #[test]
    fn test_reorder_fields_ignores_other_groups() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let mut slots = SlotCollection::new();
        for i in 0..2 {
            slots.add_slot(make_slot(i + 1, date, 6, i * 15));
        }
        slots.mark_used(SlotIndex::new(1), "F1_b").unwrap();
        slots.mark_used(SlotIndex::new(2), "F1_a").unwrap();

        let mut catalog = TargetCatalog::new();
        catalog.add_target(make_target("CO", "F1_a", 1, 1, 1)).unwrap();
        catalog.add_target(make_target("CO", "F1_b", 1, 1, 1)).unwrap();

        reorder_fields(&mut slots, &mut catalog, "GA").unwrap();

        let held: Vec<_> = slots
            .used_slots()
            .map(|s| s.target().unwrap_or_default().to_string())
            .collect();
        // Not the reorder group: committed order is untouched.
        assert_eq!(held, vec!["F1_b", "F1_a"]);
    }

    #[test]
    fn test_reorder_fields_keeps_f1_and_f10_apart() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let mut slots = SlotCollection::new();
        for i in 0..2 {
            slots.add_slot(make_slot(i + 1, date, 6, i * 15));
        }
        slots.mark_used(SlotIndex::new(1), "F10_a").unwrap();
        slots.mark_used(SlotIndex::new(2), "F1_a").unwrap();

        let mut catalog = TargetCatalog::new();
        // F1_a's quota exceeds its winnings; it must not absorb F10's slot.
        catalog.add_target(make_target("GA", "F1_a", 2, 1, 1)).unwrap();
        catalog.add_target(make_target("GA", "F10_a", 1, 2, 1)).unwrap();

        reorder_fields(&mut slots, &mut catalog, "GA").unwrap();

        assert_eq!(
            slots.get(SlotIndex::new(1)).unwrap().target(),
            Some("F10_a")
        );
        assert_eq!(slots.get(SlotIndex::new(2)).unwrap().target(), Some("F1_a"));
        assert_eq!(catalog.get("F1_a").unwrap().observed_exposures, 1);
        assert_eq!(catalog.get("F10_a").unwrap().observed_exposures, 1);
    }

    #[test]
    fn test_catalog_from_committed_resets_progress() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let mut slots = SlotCollection::new();
        for i in 0..3 {
            slots.add_slot(make_slot(i + 1, date, 6, i * 15));
        }
        slots.mark_used(SlotIndex::new(1), "A").unwrap();
        slots.mark_used(SlotIndex::new(2), "A").unwrap();

        let mut catalog = TargetCatalog::new();
        catalog.add_target(make_target("GA", "A", 5, 1, 2)).unwrap();
        catalog.add_target(make_target("GA", "B", 5, 1, 0)).unwrap();

        let rebuilt = catalog_from_committed(&slots, &catalog);
        assert_eq!(rebuilt.num_targets(), 1);
        let a = rebuilt.get("A").unwrap();
        // Winnings become the quota; progress restarts.
        assert_eq!(a.required_exposures, 2);
        assert_eq!(a.observed_exposures, 0);
        assert!(!rebuilt.contains("B"));
    }

    #[test]
    fn test_merge_missing_adds_untouched_targets() {
        let mut dest = TargetCatalog::new();
        dest.add_target(make_target("GA", "A", 2, 1, 2)).unwrap();
        let mut source = TargetCatalog::new();
        source.add_target(make_target("GA", "A", 5, 1, 2)).unwrap();
        source.add_target(make_target("CO", "C", 3, 1, 0)).unwrap();

        merge_missing(&mut dest, &source).unwrap();
        assert_eq!(dest.num_targets(), 2);
        // Existing entries keep the destination's version.
        assert_eq!(dest.get("A").unwrap().required_exposures, 2);
        assert_eq!(dest.get("C").unwrap().required_exposures, 3);
    }
}
