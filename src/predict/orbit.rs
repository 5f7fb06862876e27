use chrono::{DateTime, Duration, Utc};

use crate::predict::element_set::ElementSet;
use crate::predict::error::PropagationError;
use crate::predict::propagation::{eci_to_geodetic, Orbit, Propagator, WGS84_A_KM};
use crate::predict::types::{GeodeticPoint, OrbitalParameters};

/// Earth gravitational parameter, km³/s².
pub const MU_KM3_S2: f64 = 398_600.441_8;
pub const EARTH_RADIUS_KM: f64 = WGS84_A_KM;

const MINUTES_PER_DAY: f64 = 1440.0;
// Tolerance when counting steps over a float window.
const STEP_EPSILON: f64 = 1e-9;

/// Sample the orbit from `now + start` to `now + end` minutes, every `step` minutes.
pub fn calculate_orbit_path(
    propagator: &dyn Propagator,
    elements: &ElementSet,
    start_offset_min: f64,
    end_offset_min: f64,
    step_min: f64,
) -> Vec<GeodeticPoint> {
    calculate_orbit_path_at(
        propagator,
        elements,
        Utc::now(),
        start_offset_min,
        end_offset_min,
        step_min,
    )
}

/// Same as [`calculate_orbit_path`] with an explicit reference instant.
///
/// Samples that fail to propagate are skipped; if the element set cannot be
/// prepared at all the result is empty.
pub fn calculate_orbit_path_at(
    propagator: &dyn Propagator,
    elements: &ElementSet,
    reference: DateTime<Utc>,
    start_offset_min: f64,
    end_offset_min: f64,
    step_min: f64,
) -> Vec<GeodeticPoint> {
    let finite = start_offset_min.is_finite() && end_offset_min.is_finite() && step_min.is_finite();
    if !finite || !(step_min > 0.0) || !(end_offset_min >= start_offset_min) {
        log::warn!(
            "Invalid orbit path window [{}, {}] step {}",
            start_offset_min,
            end_offset_min,
            step_min
        );
        return Vec::new();
    }

    let orbit = match propagator.prepare(elements) {
        Ok(orbit) => orbit,
        Err(e) => {
            log::warn!("Cannot propagate element set {}: {}", elements.id, e);
            return Vec::new();
        }
    };

    let steps = ((end_offset_min - start_offset_min) / step_min + STEP_EPSILON).floor() as usize;
    let mut points = Vec::with_capacity(steps + 1);

    for i in 0..=steps {
        let offset_min = start_offset_min + i as f64 * step_min;
        let Some(at) = offset_time(reference, offset_min) else {
            log::warn!("Skipping orbit sample at {} min: time out of range", offset_min);
            continue;
        };
        match sample_point(propagator, orbit.as_ref(), at) {
            Ok(point) => points.push(point),
            Err(e) => log::warn!("Skipping orbit sample at {}: {}", at, e),
        }
    }

    points
}

fn offset_time(reference: DateTime<Utc>, offset_min: f64) -> Option<DateTime<Utc>> {
    let millis = (offset_min * 60_000.0).round();
    if !(millis.abs() < i64::MAX as f64) {
        return None;
    }
    reference.checked_add_signed(Duration::try_milliseconds(millis as i64)?)
}

pub fn sample_point(
    propagator: &dyn Propagator,
    orbit: &dyn Orbit,
    at: DateTime<Utc>,
) -> Result<GeodeticPoint, PropagationError> {
    let state = orbit.propagate(at)?;
    let geodetic = eci_to_geodetic(state.position, propagator.sidereal_time(at));
    Ok(GeodeticPoint {
        timestamp: at,
        latitude: geodetic.latitude_deg,
        longitude: geodetic.longitude_deg,
        altitude_km: geodetic.altitude_km,
        velocity_kmh: state.speed_km_s() * 3600.0,
    })
}

/// Keplerian parameters derived from the element set's mean motion.
pub fn calculate_orbital_parameters(
    propagator: &dyn Propagator,
    elements: &ElementSet,
) -> Option<OrbitalParameters> {
    let orbit = match propagator.prepare(elements) {
        Ok(orbit) => orbit,
        Err(e) => {
            log::warn!("Cannot derive orbital parameters for {}: {}", elements.id, e);
            return None;
        }
    };

    let mean = orbit.mean_elements();
    if !(mean.mean_motion_rev_per_day > 0.0) || !(0.0..1.0).contains(&mean.eccentricity) {
        log::warn!("Element set {} has unusable mean elements", elements.id);
        return None;
    }

    let n_rad_s = mean.mean_motion_rev_per_day * std::f64::consts::TAU / 86_400.0;
    let semi_major_axis = (MU_KM3_S2 / (n_rad_s * n_rad_s)).cbrt();

    Some(OrbitalParameters {
        inclination_deg: mean.inclination_deg,
        eccentricity: mean.eccentricity,
        mean_motion_rev_per_day: mean.mean_motion_rev_per_day,
        period_minutes: MINUTES_PER_DAY / mean.mean_motion_rev_per_day,
        apogee_km: semi_major_axis * (1.0 + mean.eccentricity) - EARTH_RADIUS_KM,
        perigee_km: semi_major_axis * (1.0 - mean.eccentricity) - EARTH_RADIUS_KM,
    })
}
