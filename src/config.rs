//! Scheduling parameters and observer site description.
//!
//! Parameters are loaded from a TOML file; every knob has a default so a
//! partial file is enough. Per-working-group tables fall back to a
//! group-independent default when a group is missing, which keeps small
//! test setups from having to spell out the full instrument configuration.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ScheduleError, ScheduleResult};

/// Limit/warn threshold pair, in the unit of the quantity it guards.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Threshold {
    pub limit: f64,
    pub warn: f64,
}

impl Threshold {
    pub fn new(limit: f64, warn: f64) -> Self {
        Self { limit, warn }
    }
}

/// Allowed instrument rotator range for a working group, in degrees.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RotatorRange {
    pub min_deg: f64,
    pub max_deg: f64,
}

impl Default for RotatorRange {
    fn default() -> Self {
        Self {
            min_deg: -164.0,
            max_deg: 164.0,
        }
    }
}

/// Instrument slew rates in degrees per second.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SlewRates {
    pub azimuth_deg_per_sec: f64,
    pub elevation_deg_per_sec: f64,
    pub rotator_deg_per_sec: f64,
}

impl Default for SlewRates {
    fn default() -> Self {
        Self {
            azimuth_deg_per_sec: 0.5,
            elevation_deg_per_sec: 0.5,
            rotator_deg_per_sec: 1.5,
        }
    }
}

/// Observatory location and clock offset.
#[derive(Debug, Clone, Deserialize)]
pub struct ObserverSite {
    /// Latitude in decimal degrees (-90 to 90)
    pub latitude_deg: f64,
    /// Longitude in decimal degrees (-180 to 180)
    pub longitude_deg: f64,
    /// Elevation in meters above sea level
    pub elevation_m: f64,
    /// Offset of the local calendar from UTC, in hours
    pub utc_offset_hours: f64,
}

impl ObserverSite {
    pub fn new(
        latitude_deg: f64,
        longitude_deg: f64,
        elevation_m: f64,
        utc_offset_hours: f64,
    ) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            elevation_m,
            utc_offset_hours,
        }
    }
}

/// Scheduling parameters.
///
/// Weighting conventions follow the objective in
/// [`crate::scheduler::optimize_schedule`]: `weight_completion` rewards a
/// target finishing its full quota within one UTC date, `weight_priority`
/// penalizes assigning high-numbered (low-precedence) targets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanParams {
    /// Slot width in minutes.
    pub slot_width_min: f64,
    /// Pre-exposure overhead at the head of each slot, in minutes.
    pub overhead_min: f64,
    /// Sun altitude defining twilight, in degrees (negative below horizon).
    pub twilight_deg: f64,

    /// Objective bonus per (date, target) completion indicator.
    pub weight_completion: f64,
    /// Objective penalty multiplier on target priority values.
    pub weight_priority: f64,

    /// Minimum separation from the Moon, in degrees.
    pub moon_separation: Threshold,
    /// Minimum separation from Mars/Jupiter/Saturn, in degrees.
    pub planet_separation: Threshold,
    /// Maximum Moon illumination fraction.
    pub moon_illumination: Threshold,
    /// Maximum Moon altitude, in degrees.
    pub moon_altitude: Threshold,
    /// Meridian-avoidance hour angle magnitude, in hours.
    pub meridian_warn_ha: f64,

    /// Per-working-group airmass thresholds.
    pub airmass: HashMap<String, Threshold>,
    /// Per-working-group rotator ranges.
    pub rotator: HashMap<String, RotatorRange>,
    /// Per-working-group minimum contiguous run length, in slots.
    pub min_run: HashMap<String, usize>,
    /// Minimum contiguous run per individual target (unrestricted pass).
    pub target_min_run: usize,

    /// Per-working-group share of the total slot budget, as a fraction.
    pub share: HashMap<String, f64>,
    /// Margin applied symmetrically around each group share.
    pub share_margin: f64,

    /// Working group forced to start no earlier than the others each night.
    pub last_group: Option<String>,
    /// Working group whose committed slots get the field-reordering pass.
    pub reorder_group: Option<String>,

    /// Instrument slew rates.
    pub slew: SlewRates,
    /// Re-run the unrestricted solve after the slew adjustment.
    pub refine_after_slew: bool,
}

impl Default for PlanParams {
    fn default() -> Self {
        Self {
            slot_width_min: 15.0,
            overhead_min: 2.0,
            twilight_deg: -12.0,
            weight_completion: 10.0,
            weight_priority: 1.0,
            moon_separation: Threshold::new(60.0, 80.0),
            planet_separation: Threshold::new(10.0, 20.0),
            moon_illumination: Threshold::new(0.25, 0.15),
            moon_altitude: Threshold::new(0.0, -5.0),
            meridian_warn_ha: 0.5,
            airmass: HashMap::new(),
            rotator: HashMap::new(),
            min_run: HashMap::new(),
            target_min_run: 2,
            share: HashMap::new(),
            share_margin: 0.1,
            last_group: None,
            reorder_group: None,
            slew: SlewRates::default(),
            refine_after_slew: false,
        }
    }
}

impl PlanParams {
    /// Load parameters from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ScheduleResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ScheduleError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Parse parameters from a TOML string.
    pub fn from_toml_str(text: &str) -> ScheduleResult<Self> {
        toml::from_str(text).map_err(|e| ScheduleError::Config(e.to_string()))
    }

    /// Airmass limit for a working group. Groups without an explicit entry
    /// get an effectively unconstrained limit.
    pub fn airmass_limit(&self, group: &str) -> f64 {
        self.airmass.get(group).map_or(f64::MAX, |t| t.limit)
    }

    /// Rotator range for a working group.
    pub fn rotator_range(&self, group: &str) -> RotatorRange {
        self.rotator.get(group).copied().unwrap_or_default()
    }

    /// Minimum contiguous run for a working group (1 = no requirement).
    pub fn group_min_run(&self, group: &str) -> usize {
        self.min_run.get(group).copied().unwrap_or(1).max(1)
    }

    /// Maximum exposures per working group given the total slot budget.
    ///
    /// Groups without a configured share are uncapped.
    pub fn max_exposures(&self, num_slots: usize) -> HashMap<String, u32> {
        self.share
            .iter()
            .map(|(group, frac)| {
                let cap = (frac + 0.5 * self.share_margin) * num_slots as f64;
                (group.clone(), cap as u32)
            })
            .collect()
    }

    /// Minimum exposures per working group given the total slot budget.
    pub fn min_exposures(&self, num_slots: usize) -> HashMap<String, u32> {
        self.share
            .iter()
            .map(|(group, frac)| {
                let floor = (frac - 0.5 * self.share_margin) * num_slots as f64;
                (group.clone(), floor.max(0.0) as u32)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = PlanParams::default();
        assert_eq!(params.slot_width_min, 15.0);
        assert_eq!(params.target_min_run, 2);
        assert!(!params.refine_after_slew);
        assert!(params.last_group.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let params = PlanParams::from_toml_str(
            r#"
            slot_width_min = 20.0
            last_group = "GA"

            [airmass.CO]
            limit = 1.5
            warn = 1.3

            [min_run]
            GA = 2
            "#,
        )
        .unwrap();

        assert_eq!(params.slot_width_min, 20.0);
        assert_eq!(params.last_group.as_deref(), Some("GA"));
        assert_eq!(params.airmass_limit("CO"), 1.5);
        assert_eq!(params.group_min_run("GA"), 2);
        // Unconfigured groups fall back to defaults.
        assert_eq!(params.airmass_limit("GE"), f64::MAX);
        assert_eq!(params.group_min_run("GE"), 1);
        assert_eq!(params.rotator_range("GE").max_deg, 164.0);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = PlanParams::from_toml_str("slot_width_min = []").unwrap_err();
        assert!(matches!(err, ScheduleError::Config(_)));
    }

    #[test]
    fn test_max_exposures_from_shares() {
        let mut params = PlanParams::default();
        params.share.insert("CO".into(), 0.5);
        params.share.insert("GA".into(), 0.3);
        params.share_margin = 0.1;

        let caps = params.max_exposures(100);
        assert_eq!(caps["CO"], 55);
        assert_eq!(caps["GA"], 35);

        let floors = params.min_exposures(100);
        assert_eq!(floors["CO"], 45);
        assert_eq!(floors["GA"], 25);
    }
}
