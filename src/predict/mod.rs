mod element_set;
mod error;
mod observer;
mod orbit;
mod pass_finder;
mod propagation;
mod resolver;
mod types;

pub use element_set::{parse_epoch, ElementSet, LINE1_MARKER, LINE2_MARKER};
pub use error::{PropagationError, ResolveError};
pub use observer::ObserverLocation;
pub use orbit::{calculate_orbit_path, calculate_orbit_path_at, calculate_orbital_parameters};
pub use pass_finder::{predict_next_pass_from, predict_passes, predict_passes_from, PassSearch};
pub use propagation::{normalize_longitude, Propagator, Sgp4Propagator};
pub use resolver::{ElementSetResolver, HttpFetcher, TextFetcher, TleSources};
pub use types::{GeodeticPoint, OrbitalParameters, PassPrediction, PathPoint, TleSource};

#[cfg(test)]
pub(crate) mod testing {
    pub use super::element_set::tests::iss;
    pub use super::orbit::tests::CountingPropagator;
}
