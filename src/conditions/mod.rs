//! Observing-conditions provider contract.
//!
//! The astronomical-geometry engine lives outside this crate; the scheduler
//! consumes it only through the [`ObservingConditions`] trait. Every lookup
//! is a pure function of immutable per-run geometry: a handle is built once
//! for a given (slot set, target set, observer) and discarded as soon as
//! slot timing changes underneath it.

pub mod cache;

use serde::{Deserialize, Serialize};

use crate::config::SlewRates;
use crate::models::SlotIndex;

/// Horizontal pointing of the telescope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AltAz {
    pub alt: qtty::Degrees,
    pub az: qtty::Degrees,
}

impl AltAz {
    pub fn new(alt: qtty::Degrees, az: qtty::Degrees) -> Self {
        Self { alt, az }
    }

    pub fn from_deg(alt: f64, az: f64) -> Self {
        Self {
            alt: qtty::Degrees::new(alt),
            az: qtty::Degrees::new(az),
        }
    }
}

/// Solar-system bodies the optimizer keeps separation from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Planet {
    Mars,
    Jupiter,
    Saturn,
}

impl Planet {
    pub const ALL: [Planet; 3] = [Planet::Mars, Planet::Jupiter, Planet::Saturn];
}

impl std::fmt::Display for Planet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Planet::Mars => write!(f, "mars"),
            Planet::Jupiter => write!(f, "jupiter"),
            Planet::Saturn => write!(f, "saturn"),
        }
    }
}

/// Per-(slot, target) geometry lookups.
///
/// Implementations precompute their tables for one fixed slot/target set;
/// none of the methods mutate. Targets are keyed by catalog name; the
/// reserved dummy pseudo-target is never passed to a provider — the
/// optimizer scores it as zero efficiency by definition.
pub trait ObservingConditions {
    /// Airmass at slot midpoint.
    fn airmass(&self, slot: SlotIndex, target: &str) -> f64;

    /// Hour angle at slot midpoint, in hours.
    fn hour_angle(&self, slot: SlotIndex, target: &str) -> f64;

    /// Horizontal coordinates at slot midpoint.
    fn alt_az(&self, slot: SlotIndex, target: &str) -> AltAz;

    /// Instrument rotator angle at the start of the exposure, degrees.
    fn rotator_angle_start(&self, slot: SlotIndex, target: &str) -> qtty::Degrees;

    /// Instrument rotator angle at the end of the exposure, degrees.
    fn rotator_angle_end(&self, slot: SlotIndex, target: &str) -> qtty::Degrees;

    /// Effective-exposure efficiency, dimensionless.
    fn efficiency(&self, slot: SlotIndex, target: &str) -> f64;

    /// Angular separation from the Moon, degrees.
    fn moon_separation(&self, slot: SlotIndex, target: &str) -> qtty::Degrees;

    /// Moon illumination fraction at slot midpoint.
    fn moon_illumination(&self, slot: SlotIndex) -> f64;

    /// Horizontal coordinates of the Moon at slot midpoint.
    fn moon_alt_az(&self, slot: SlotIndex) -> AltAz;

    /// Moon phase angle at slot midpoint, degrees.
    fn moon_phase_angle(&self, slot: SlotIndex) -> qtty::Degrees;

    /// Angular separation from a planet, degrees.
    fn planet_separation(&self, planet: Planet, slot: SlotIndex, target: &str) -> qtty::Degrees;
}

/// Azimuth difference wrapped to [-180, 180) degrees; the mount rotates
/// the short way around.
fn wrap_deg(diff: f64) -> f64 {
    (diff + 180.0).rem_euclid(360.0) - 180.0
}

/// Time to repoint from one (pointing, rotator) state to another.
///
/// The three axes move simultaneously; the slowest axis dominates.
pub fn slew_time(
    from: &AltAz,
    from_rot: qtty::Degrees,
    to: &AltAz,
    to_rot: qtty::Degrees,
    rates: &SlewRates,
) -> qtty::Seconds {
    let az_diff = wrap_deg(to.az.value() - from.az.value()).abs();
    let el_diff = (to.alt.value() - from.alt.value()).abs();
    let rot_diff = (to_rot.value() - from_rot.value()).abs();

    let seconds = (az_diff / rates.azimuth_deg_per_sec)
        .max(el_diff / rates.elevation_deg_per_sec)
        .max(rot_diff / rates.rotator_deg_per_sec);
    qtty::Seconds::new(seconds)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> SlewRates {
        SlewRates {
            azimuth_deg_per_sec: 1.0,
            elevation_deg_per_sec: 1.0,
            rotator_deg_per_sec: 1.0,
        }
    }

    #[test]
    fn test_slowest_axis_dominates() {
        let from = AltAz::from_deg(40.0, 100.0);
        let to = AltAz::from_deg(50.0, 103.0);
        let t = slew_time(
            &from,
            qtty::Degrees::new(0.0),
            &to,
            qtty::Degrees::new(2.0),
            &rates(),
        );
        // Elevation moved 10 degrees, the largest of the three.
        assert!((t.value() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_azimuth_wraps_the_short_way() {
        let from = AltAz::from_deg(40.0, 350.0);
        let to = AltAz::from_deg(40.0, 10.0);
        let t = slew_time(
            &from,
            qtty::Degrees::new(0.0),
            &to,
            qtty::Degrees::new(0.0),
            &rates(),
        );
        // 350 -> 10 is 20 degrees through north, not 340 the long way.
        assert!((t.value() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_move_zero_time() {
        let p = AltAz::from_deg(40.0, 100.0);
        let t = slew_time(
            &p,
            qtty::Degrees::new(30.0),
            &p,
            qtty::Degrees::new(30.0),
            &rates(),
        );
        assert_eq!(t.value(), 0.0);
    }
}
