//! Binary-program formulation of a single scheduling pass.
//!
//! One call builds the assignment problem for the current catalog state and
//! candidate slot pool, hands it to the MILP solver and extracts the winning
//! slot-to-target mapping. The dummy pseudo-target is a full participant:
//! it absorbs every slot the real targets cannot or should not take, which
//! keeps the slot-exclusivity constraint an equality.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use good_lp::{
    constraint, default_solver, variable, variables, Constraint, Expression, ResolutionError,
    Solution, SolverModel, Variable,
};

use crate::conditions::{ObservingConditions, Planet};
use crate::config::{ObserverSite, PlanParams};
use crate::models::{SlotCollection, SlotIndex, Target, TargetCatalog};
use crate::scheduler::{dummy_target, Assignment, SolveOutcome, Solved, DUMMY_GROUP};

/// Split a sorted slot index list into maximal runs of consecutive indices.
///
/// Block-boundary and minimum-run constraints only make sense within a run;
/// a gap in the index sequence is a gap in the night.
fn split_contiguous(indices: &[SlotIndex]) -> Vec<Vec<SlotIndex>> {
    let mut runs: Vec<Vec<SlotIndex>> = Vec::new();
    for &index in indices {
        match runs.last_mut() {
            Some(run) if run.last().map(|i| i.value() + 1) == Some(index.value()) => {
                run.push(index);
            }
            _ => runs.push(vec![index]),
        }
    }
    runs
}

/// Hard observability gates for one (slot, target) pair.
///
/// The same conditions are emitted as solver constraints multiplied by the
/// assignment variable; this closed form exists so the caller can detect a
/// pool with no feasible pair before handing the solver a problem the dummy
/// would otherwise absorb silently.
fn gates_pass(
    oc: &dyn ObservingConditions,
    params: &PlanParams,
    site: &ObserverSite,
    slot: SlotIndex,
    target: &Target,
) -> bool {
    if oc.moon_separation(slot, &target.name).value() < params.moon_separation.limit {
        return false;
    }
    for planet in Planet::ALL {
        if oc.planet_separation(planet, slot, &target.name).value()
            < params.planet_separation.limit
        {
            return false;
        }
    }
    let airmass_limit = params.airmass_limit(&target.working_group);
    if airmass_limit < f64::MAX && oc.airmass(slot, &target.name) > airmass_limit {
        return false;
    }
    if target.dec.value() > site.latitude_deg
        && oc.hour_angle(slot, &target.name).abs() < params.meridian_warn_ha
    {
        return false;
    }
    let range = params.rotator_range(&target.working_group);
    let rot_start = oc.rotator_angle_start(slot, &target.name).value();
    let rot_end = oc.rotator_angle_end(slot, &target.name).value();
    rot_start >= range.min_deg
        && rot_start <= range.max_deg
        && rot_end >= range.min_deg
        && rot_end <= range.max_deg
}

/// Solve one scheduling pass.
///
/// With `cutoff = Some(p)` only observing targets at priority `p` or better
/// compete; with `cutoff = None` the whole catalog competes and per-target
/// contiguity constraints are added on top of the per-group ones.
///
/// The candidate slot pool is the free slots gathered night by night until
/// the outstanding exposure demand of the competing targets is covered.
///
/// # Arguments
/// * `max_exposures` - per-working-group exposure caps for this pass.
///
/// # Returns
/// The solver outcome; only [`SolveOutcome::Optimal`] carries an
/// assignment.
#[allow(clippy::too_many_arguments)]
pub fn optimize_schedule(
    slots: &SlotCollection,
    catalog: &TargetCatalog,
    oc: &dyn ObservingConditions,
    params: &PlanParams,
    site: &ObserverSite,
    max_exposures: &HashMap<String, u32>,
    cutoff: Option<i32>,
) -> SolveOutcome {
    let pool: Vec<&Target> = match cutoff {
        Some(priority) => catalog.observing_targets_by_priority(priority),
        None => catalog.all_targets().iter().collect(),
    };
    let required: u32 = pool.iter().map(|t| t.remaining_exposures()).sum();
    let candidate_slots = slots.available_slots(required as usize);
    log::info!(
        "pass (cutoff {:?}): {} targets, {} exposures outstanding, {} candidate slots",
        cutoff,
        pool.len(),
        required,
        candidate_slots.len()
    );

    // A pool with outstanding demand but not a single feasible (slot,
    // target) pair would solve trivially with the dummy taking every slot;
    // report it as infeasible instead of committing an empty schedule.
    let demanding: Vec<&Target> = pool
        .iter()
        .copied()
        .filter(|t| t.remaining_exposures() > 0)
        .collect();
    if !candidate_slots.is_empty() && !demanding.is_empty() {
        let any_feasible = demanding.iter().any(|t| {
            candidate_slots
                .iter()
                .any(|&slot| gates_pass(oc, params, site, slot, t))
        });
        if !any_feasible {
            log::warn!(
                "none of the {} outstanding targets has a feasible candidate slot",
                demanding.len()
            );
            return SolveOutcome::Infeasible;
        }
    }

    let dummy = dummy_target(slots.num_slots() as u32);
    let n_real = pool.len();
    let dummy_index = n_real;
    let names: Vec<String> = pool
        .iter()
        .map(|t| t.name.clone())
        .chain(std::iter::once(dummy.name.clone()))
        .collect();

    let mut groups: Vec<String> = catalog.working_groups();
    groups.push(DUMMY_GROUP.to_string());
    let dummy_group_index = groups.len() - 1;
    let group_positions: HashMap<&str, usize> = groups
        .iter()
        .enumerate()
        .map(|(pos, g)| (g.as_str(), pos))
        .collect();
    let group_of: Vec<usize> = pool
        .iter()
        .map(|t| {
            group_positions
                .get(t.working_group.as_str())
                .copied()
                .unwrap_or(dummy_group_index)
        })
        .chain(std::iter::once(dummy_group_index))
        .collect();

    let quota = |ti: usize| -> (u32, u32) {
        if ti == dummy_index {
            (dummy.required_exposures, dummy.observed_exposures)
        } else {
            (pool[ti].required_exposures, pool[ti].observed_exposures)
        }
    };

    // Candidate slots grouped by UTC date, chronological within each date.
    let candidate_set: HashSet<SlotIndex> = candidate_slots.iter().copied().collect();
    let mut by_date: BTreeMap<NaiveDate, Vec<SlotIndex>> = BTreeMap::new();
    for slot in slots.all_slots() {
        if candidate_set.contains(&slot.index) {
            by_date.entry(slot.date_utc).or_default().push(slot.index);
        }
    }
    log::info!("candidate dates: {:?}", by_date.keys().collect::<Vec<_>>());

    let mut vars = variables!();

    // assign[(slot, target)] = 1 iff the target takes the slot.
    let mut assign: HashMap<(SlotIndex, usize), Variable> = HashMap::new();
    for &slot in &candidate_slots {
        for ti in 0..=n_real {
            assign.insert((slot, ti), vars.add(variable().binary()));
        }
    }

    // complete[(date, target)] = 1 iff the target's full quota lands on
    // that date. Real targets only: the dummy absorbing a whole night must
    // not collect the bonus for idling.
    let mut complete: HashMap<(NaiveDate, usize), Variable> = HashMap::new();
    for &date in by_date.keys() {
        for ti in 0..n_real {
            complete.insert((date, ti), vars.add(variable().binary()));
        }
    }

    // Per-(date, slot, group) activity plus block start/end indicators.
    let mut grp_active: HashMap<(NaiveDate, SlotIndex, usize), Variable> = HashMap::new();
    let mut grp_start: HashMap<(NaiveDate, SlotIndex, usize), Variable> = HashMap::new();
    let mut grp_end: HashMap<(NaiveDate, SlotIndex, usize), Variable> = HashMap::new();
    for (&date, day_slots) in &by_date {
        for &slot in day_slots {
            for gi in 0..groups.len() {
                grp_active.insert((date, slot, gi), vars.add(variable().binary()));
                grp_start.insert((date, slot, gi), vars.add(variable().binary()));
                grp_end.insert((date, slot, gi), vars.add(variable().binary()));
            }
        }
    }

    // Per-(date, slot, target) block start/end indicators for the
    // unrestricted pass; the assignment variable itself is the activity.
    let target_runs = cutoff.is_none() && params.target_min_run > 1;
    let mut tgt_start: HashMap<(NaiveDate, SlotIndex, usize), Variable> = HashMap::new();
    let mut tgt_end: HashMap<(NaiveDate, SlotIndex, usize), Variable> = HashMap::new();
    if target_runs {
        for (&date, day_slots) in &by_date {
            for &slot in day_slots {
                for ti in 0..=n_real {
                    tgt_start.insert((date, slot, ti), vars.add(variable().binary()));
                    tgt_end.insert((date, slot, ti), vars.add(variable().binary()));
                }
            }
        }
    }

    // Objective: effective exposure, completion bonus, priority penalty.
    // The dummy scores zero efficiency by definition.
    let mut objective = Expression::from(0.0);
    for &slot in &candidate_slots {
        for (ti, target) in pool.iter().enumerate() {
            objective += oc.efficiency(slot, &target.name) * assign[&(slot, ti)];
            objective -= params.weight_priority * target.priority as f64 * assign[&(slot, ti)];
        }
    }
    for (_, &y) in &complete {
        objective += params.weight_completion * y;
    }

    let mut constraints: Vec<Constraint> = Vec::new();

    // Quota: assignments plus prior progress never exceed the requested
    // exposures.
    for ti in 0..=n_real {
        let total = candidate_slots
            .iter()
            .fold(Expression::from(0.0), |acc, &slot| acc + assign[&(slot, ti)]);
        let (nexp, observed) = quota(ti);
        let remaining = nexp as f64 - observed as f64;
        constraints.push(constraint!(total <= remaining));
    }

    // Completion linkage: the indicator may only rise when the full quota
    // lands within one date.
    for (&date, day_slots) in &by_date {
        for ti in 0..n_real {
            let day_total = day_slots
                .iter()
                .fold(Expression::from(0.0), |acc, &slot| acc + assign[&(slot, ti)]);
            let (nexp, _) = quota(ti);
            let full_quota = nexp as f64;
            constraints.push(constraint!(day_total >= full_quota * complete[&(date, ti)]));
        }
    }

    // Exclusivity: every candidate slot goes to exactly one target, the
    // dummy included.
    for &slot in &candidate_slots {
        let total =
            (0..=n_real).fold(Expression::from(0.0), |acc, ti| acc + assign[&(slot, ti)]);
        constraints.push(constraint!(total == 1.0));
    }

    // Per-working-group exposure caps, net of exposures already taken.
    let finished = catalog.finished_by_group();
    for group in catalog.working_groups() {
        if let Some(&cap) = max_exposures.get(&group) {
            let done = finished.get(&group).copied().unwrap_or(0);
            let total = candidate_slots
                .iter()
                .flat_map(|&slot| {
                    pool.iter()
                        .enumerate()
                        .filter(|(_, t)| t.working_group == group)
                        .map(move |(ti, _)| (slot, ti))
                })
                .fold(Expression::from(0.0), |acc, key| acc + assign[&key]);
            let headroom = cap as f64 - done as f64;
            constraints.push(constraint!(total <= headroom));
        }
    }

    // Group activity mirrors the slot assignments of its members.
    for (&date, day_slots) in &by_date {
        for &slot in day_slots {
            for gi in 0..groups.len() {
                let members = (0..=n_real)
                    .filter(|&ti| group_of[ti] == gi)
                    .fold(Expression::from(0.0), |acc, ti| acc + assign[&(slot, ti)]);
                constraints.push(constraint!(grp_active[&(date, slot, gi)] == members));
            }
        }
    }

    // The configured last group may never be active before another slot of
    // the same night where it is inactive: once it starts it runs to the
    // end of the night.
    if let Some(last_group) = params.last_group.as_deref() {
        if let Some(&gi) = group_positions.get(last_group) {
            for (&date, day_slots) in &by_date {
                for (a, &later) in day_slots.iter().enumerate() {
                    for &earlier in &day_slots[..a] {
                        constraints.push(constraint!(
                            grp_active[&(date, later, gi)] >= grp_active[&(date, earlier, gi)]
                        ));
                    }
                }
            }
        }
    }

    // Block boundaries: start/end indicators flag activity transitions
    // within each contiguous slot run.
    for (&date, day_slots) in &by_date {
        for run in split_contiguous(day_slots) {
            let first = run[0];
            let last = run[run.len() - 1];
            for gi in 0..groups.len() {
                constraints.push(constraint!(
                    grp_active[&(date, first, gi)] == grp_start[&(date, first, gi)]
                ));
                constraints.push(constraint!(
                    grp_active[&(date, last, gi)] == grp_end[&(date, last, gi)]
                ));
            }
            if run.len() == 1 {
                continue;
            }
            for k in 1..run.len() {
                let (cur, prev) = (run[k], run[k - 1]);
                for gi in 0..groups.len() {
                    constraints.push(constraint!(
                        grp_active[&(date, cur, gi)] - grp_active[&(date, prev, gi)]
                            <= grp_start[&(date, cur, gi)]
                    ));
                    constraints.push(constraint!(
                        grp_start[&(date, cur, gi)] <= grp_active[&(date, cur, gi)]
                    ));
                    constraints.push(constraint!(
                        grp_start[&(date, cur, gi)] + grp_active[&(date, prev, gi)] <= 1.0
                    ));
                }
            }
            for k in 0..run.len() - 1 {
                let (cur, next) = (run[k], run[k + 1]);
                for gi in 0..groups.len() {
                    constraints.push(constraint!(
                        grp_active[&(date, cur, gi)] - grp_active[&(date, next, gi)]
                            <= grp_end[&(date, cur, gi)]
                    ));
                    constraints.push(constraint!(
                        grp_end[&(date, cur, gi)] <= grp_active[&(date, cur, gi)]
                    ));
                    constraints.push(constraint!(
                        grp_end[&(date, cur, gi)] + grp_active[&(date, next, gi)] <= 1.0
                    ));
                }
            }
        }
    }

    // Minimum contiguous run per group. Runs shorter than the requirement
    // are exempt rather than forbidden.
    for (&date, day_slots) in &by_date {
        for run in split_contiguous(day_slots) {
            for (gi, group) in groups.iter().enumerate() {
                let min_run = params.group_min_run(group);
                if min_run <= 1 || run.len() < min_run {
                    continue;
                }
                for k in (min_run - 1)..run.len() {
                    for j in 0..min_run {
                        constraints.push(constraint!(
                            grp_end[&(date, run[k], gi)] <= grp_active[&(date, run[k - j], gi)]
                        ));
                    }
                }
                for k in 0..=(run.len() - min_run) {
                    for j in 0..min_run {
                        constraints.push(constraint!(
                            grp_start[&(date, run[k], gi)] <= grp_active[&(date, run[k + j], gi)]
                        ));
                    }
                }
            }
        }
    }

    // Target-level block boundaries and minimum runs, unrestricted pass
    // only.
    if target_runs {
        let min_run = params.target_min_run;
        for (&date, day_slots) in &by_date {
            for run in split_contiguous(day_slots) {
                let first = run[0];
                let last = run[run.len() - 1];
                for ti in 0..=n_real {
                    constraints.push(constraint!(
                        assign[&(first, ti)] == tgt_start[&(date, first, ti)]
                    ));
                    constraints
                        .push(constraint!(assign[&(last, ti)] == tgt_end[&(date, last, ti)]));
                }
                if run.len() > 1 {
                    for k in 1..run.len() {
                        let (cur, prev) = (run[k], run[k - 1]);
                        for ti in 0..=n_real {
                            constraints.push(constraint!(
                                assign[&(cur, ti)] - assign[&(prev, ti)]
                                    <= tgt_start[&(date, cur, ti)]
                            ));
                            constraints.push(constraint!(
                                tgt_start[&(date, cur, ti)] <= assign[&(cur, ti)]
                            ));
                            constraints.push(constraint!(
                                tgt_start[&(date, cur, ti)] + assign[&(prev, ti)] <= 1.0
                            ));
                        }
                    }
                    for k in 0..run.len() - 1 {
                        let (cur, next) = (run[k], run[k + 1]);
                        for ti in 0..=n_real {
                            constraints.push(constraint!(
                                assign[&(cur, ti)] - assign[&(next, ti)]
                                    <= tgt_end[&(date, cur, ti)]
                            ));
                            constraints.push(constraint!(
                                tgt_end[&(date, cur, ti)] <= assign[&(cur, ti)]
                            ));
                            constraints.push(constraint!(
                                tgt_end[&(date, cur, ti)] + assign[&(next, ti)] <= 1.0
                            ));
                        }
                    }
                }
                if run.len() < min_run {
                    continue;
                }
                for k in (min_run - 1)..run.len() {
                    for ti in 0..=n_real {
                        for j in 0..min_run {
                            constraints.push(constraint!(
                                tgt_end[&(date, run[k], ti)] <= assign[&(run[k - j], ti)]
                            ));
                        }
                    }
                }
                for k in 0..=(run.len() - min_run) {
                    for ti in 0..=n_real {
                        for j in 0..min_run {
                            constraints.push(constraint!(
                                tgt_start[&(date, run[k], ti)] <= assign[&(run[k + j], ti)]
                            ));
                        }
                    }
                }
            }
        }
    }

    // Observability gates, multiplied by the assignment variable so an
    // unassigned pair never constrains anything.
    for &slot in &candidate_slots {
        for (ti, target) in pool.iter().enumerate() {
            let var = assign[&(slot, ti)];

            let moon_margin =
                oc.moon_separation(slot, &target.name).value() - params.moon_separation.limit;
            constraints.push(constraint!(moon_margin * var >= 0.0));

            for planet in Planet::ALL {
                let planet_margin = oc.planet_separation(planet, slot, &target.name).value()
                    - params.planet_separation.limit;
                constraints.push(constraint!(planet_margin * var >= 0.0));
            }

            let airmass_limit = params.airmass_limit(&target.working_group);
            if airmass_limit < f64::MAX {
                let airmass_margin = airmass_limit - oc.airmass(slot, &target.name);
                constraints.push(constraint!(airmass_margin * var >= 0.0));
            }

            if target.dec.value() > site.latitude_deg {
                let ha_margin =
                    oc.hour_angle(slot, &target.name).abs() - params.meridian_warn_ha;
                constraints.push(constraint!(ha_margin * var >= 0.0));
            }

            let range = params.rotator_range(&target.working_group);
            for angle in [
                oc.rotator_angle_start(slot, &target.name).value(),
                oc.rotator_angle_end(slot, &target.name).value(),
            ] {
                constraints.push(constraint!((angle - range.min_deg) * var >= 0.0));
                constraints.push(constraint!((range.max_deg - angle) * var >= 0.0));
            }
        }
    }

    log::info!(
        "solving: {} assignment variables, {} constraints",
        assign.len(),
        constraints.len()
    );
    let mut model = vars.maximise(objective).using(default_solver);
    for c in constraints {
        model = model.with(c);
    }

    let solution = match model.solve() {
        Ok(solution) => solution,
        Err(ResolutionError::Infeasible) => return SolveOutcome::Infeasible,
        Err(ResolutionError::Unbounded) => return SolveOutcome::Unbounded,
        Err(ResolutionError::Other(reason)) => return SolveOutcome::Error(reason.to_string()),
        Err(ResolutionError::Str(reason)) => return SolveOutcome::Error(reason),
    };

    let mut assignment = Assignment::new();
    for &slot in &candidate_slots {
        for ti in 0..=n_real {
            if solution.value(assign[&(slot, ti)]) > 0.5 {
                assignment.assign(slot, names[ti].clone());
            }
        }
    }
    log::info!(
        "optimal: {} of {} candidate slots assigned to real targets",
        assignment.real_assignments().count(),
        candidate_slots.len()
    );

    SolveOutcome::Optimal(Solved {
        assignment,
        candidate_slots,
        candidate_targets: pool.iter().map(|t| t.name.clone()).collect(),
    })
}
