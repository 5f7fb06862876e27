use chrono::{DateTime, Utc};
use sgp4::{Constants, Elements};

use crate::predict::element_set::ElementSet;
use crate::predict::error::PropagationError;
use crate::predict::observer::ObserverLocation;

// WGS-84
pub const WGS84_A_KM: f64 = 6378.137;
pub const WGS84_E2: f64 = 0.006_694_379_990_14;

/// Earth-centred inertial state: position in km, velocity in km/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EciState {
    pub position: [f64; 3],
    pub velocity: [f64; 3],
}

impl EciState {
    pub fn speed_km_s(&self) -> f64 {
        norm(self.velocity)
    }

    fn is_finite(&self) -> bool {
        self.position.iter().chain(&self.velocity).all(|v| v.is_finite())
    }
}

/// Raw mean elements as published in the element set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanElements {
    pub inclination_deg: f64,
    pub eccentricity: f64,
    pub mean_motion_rev_per_day: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAngles {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geodetic {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

/// An element set made ready for repeated evaluation.
pub trait Orbit: Send + Sync {
    fn propagate(&self, at: DateTime<Utc>) -> Result<EciState, PropagationError>;
    fn mean_elements(&self) -> MeanElements;
}

/// Numeric propagation capability. Any standards-conformant model can sit
/// behind this; the default is SGP4.
pub trait Propagator: Send + Sync {
    fn prepare(&self, elements: &ElementSet) -> Result<Box<dyn Orbit>, PropagationError>;

    /// Greenwich mean sidereal time in radians.
    fn sidereal_time(&self, at: DateTime<Utc>) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sgp4Propagator;

struct Sgp4Orbit {
    elements: Elements,
    constants: Constants,
}

impl Propagator for Sgp4Propagator {
    fn prepare(&self, set: &ElementSet) -> Result<Box<dyn Orbit>, PropagationError> {
        let elements =
            Elements::from_tle(set.name.clone(), set.line1.as_bytes(), set.line2.as_bytes())
                .map_err(|e| PropagationError::Elements(e.to_string()))?;
        let constants = Constants::from_elements(&elements)
            .map_err(|e| PropagationError::Elements(e.to_string()))?;
        Ok(Box::new(Sgp4Orbit {
            elements,
            constants,
        }))
    }

    fn sidereal_time(&self, at: DateTime<Utc>) -> f64 {
        sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&at.naive_utc()))
    }
}

impl Orbit for Sgp4Orbit {
    fn propagate(&self, at: DateTime<Utc>) -> Result<EciState, PropagationError> {
        let minutes = self
            .elements
            .datetime_to_minutes_since_epoch(&at.naive_utc())
            .map_err(|e| PropagationError::Propagation(e.to_string()))?;

        let prediction = self
            .constants
            .propagate(minutes)
            .map_err(|e| PropagationError::Propagation(e.to_string()))?;

        let state = EciState {
            position: prediction.position,
            velocity: prediction.velocity,
        };
        if !state.is_finite() {
            return Err(PropagationError::NonFinite(at));
        }
        Ok(state)
    }

    fn mean_elements(&self) -> MeanElements {
        MeanElements {
            inclination_deg: self.elements.inclination,
            eccentricity: self.elements.eccentricity,
            mean_motion_rev_per_day: self.elements.mean_motion,
        }
    }
}

/// Rotate an inertial position into the Earth-fixed frame.
pub fn eci_to_ecf(eci: [f64; 3], gmst: f64) -> [f64; 3] {
    let cos_gmst = gmst.cos();
    let sin_gmst = gmst.sin();
    [
        eci[0] * cos_gmst + eci[1] * sin_gmst,
        -eci[0] * sin_gmst + eci[1] * cos_gmst,
        eci[2],
    ]
}

pub fn ecf_to_look_angles(observer: &ObserverLocation, sat_ecf: [f64; 3]) -> LookAngles {
    let sta = observer.position_ecef_km();
    let dr = [sat_ecf[0] - sta[0], sat_ecf[1] - sta[1], sat_ecf[2] - sta[2]];
    let range_km = norm(dr);

    let (east, north, up) = ecef_to_enu(dr, observer.lat_rad(), observer.lon_rad());
    let azimuth_deg = east.atan2(north).to_degrees().rem_euclid(360.0);
    let elevation_deg = if range_km > 0.0 {
        (up / range_km).asin().to_degrees()
    } else {
        0.0
    };

    LookAngles {
        azimuth_deg,
        elevation_deg,
        range_km,
    }
}

pub fn ecf_to_geodetic(ecf: [f64; 3]) -> Geodetic {
    let [x, y, z] = ecf;
    let p = (x * x + y * y).sqrt();
    let longitude = y.atan2(x);

    let mut latitude = z.atan2(p * (1.0 - WGS84_E2));
    let mut altitude = 0.0;
    for _ in 0..8 {
        let sin_lat = latitude.sin();
        let n = WGS84_A_KM / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        altitude = if latitude.cos().abs() > 1e-10 {
            p / latitude.cos() - n
        } else {
            z.abs() - n * (1.0 - WGS84_E2)
        };
        latitude = z.atan2(p * (1.0 - WGS84_E2 * n / (n + altitude)));
    }

    Geodetic {
        latitude_deg: latitude.to_degrees(),
        longitude_deg: normalize_longitude(longitude.to_degrees()),
        altitude_km: altitude,
    }
}

pub fn eci_to_geodetic(eci: [f64; 3], gmst: f64) -> Geodetic {
    ecf_to_geodetic(eci_to_ecf(eci, gmst))
}

/// Wrap any longitude into `[-180, 180)`.
pub fn normalize_longitude(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

pub fn ecef_to_enu(dr: [f64; 3], lat_rad: f64, lon_rad: f64) -> (f64, f64, f64) {
    let sin_lat = lat_rad.sin();
    let cos_lat = lat_rad.cos();
    let sin_lon = lon_rad.sin();
    let cos_lon = lon_rad.cos();

    let east = -sin_lon * dr[0] + cos_lon * dr[1];
    let north = -sin_lat * cos_lon * dr[0] - sin_lat * sin_lon * dr[1] + cos_lat * dr[2];
    let up = cos_lat * cos_lon * dr[0] + cos_lat * sin_lon * dr[1] + sin_lat * dr[2];
    (east, north, up)
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::element_set::tests::iss;

    #[test]
    fn longitude_wraps_into_half_open_range() {
        assert_eq!(normalize_longitude(180.0), -180.0);
        assert_eq!(normalize_longitude(-180.0), -180.0);
        assert_eq!(normalize_longitude(190.0), -170.0);
        assert_eq!(normalize_longitude(-540.0), -180.0);
        assert!((normalize_longitude(359.5) - -0.5).abs() < 1e-9);
    }

    #[test]
    fn geodetic_round_trips_observer_position() {
        let observer = ObserverLocation::new(45.5, -122.6, 420_000.0);
        let geo = ecf_to_geodetic(observer.position_ecef_km());
        assert!((geo.latitude_deg - 45.5).abs() < 1e-6);
        assert!((geo.longitude_deg - -122.6).abs() < 1e-6);
        assert!((geo.altitude_km - 420.0).abs() < 1e-3);
    }

    #[test]
    fn satellite_overhead_is_at_zenith() {
        let observer = ObserverLocation::new(10.0, 20.0, 0.0);
        let above = ObserverLocation::new(10.0, 20.0, 400_000.0).position_ecef_km();
        let look = ecf_to_look_angles(&observer, above);
        assert!((look.elevation_deg - 90.0).abs() < 1e-6);
        assert!((look.range_km - 400.0).abs() < 1e-6);
    }

    #[test]
    fn sgp4_state_at_epoch_is_low_earth_orbit() {
        let set = iss();
        let orbit = Sgp4Propagator.prepare(&set).unwrap();
        let state = orbit.propagate(set.epoch).unwrap();
        let radius = norm(state.position);
        assert!(radius > 6600.0 && radius < 6900.0, "radius {radius}");
        assert!(state.speed_km_s() > 7.0 && state.speed_km_s() < 8.0);

        let geo = eci_to_geodetic(state.position, Sgp4Propagator.sidereal_time(set.epoch));
        assert!(geo.latitude_deg.abs() <= 51.7);
        assert!(geo.altitude_km > 300.0 && geo.altitude_km < 450.0);
    }

    #[test]
    fn mean_elements_come_from_line_two() {
        let orbit = Sgp4Propagator.prepare(&iss()).unwrap();
        let m = orbit.mean_elements();
        assert!((m.inclination_deg - 51.6416).abs() < 1e-9);
        assert!((m.eccentricity - 0.0006703).abs() < 1e-12);
        assert!((m.mean_motion_rev_per_day - 15.72125391).abs() < 1e-6);
    }
}
