/// Remote catalog module
///
/// This module handles:
/// - JSON representations of remote entities (model.rs)
/// - The HTTP client used to fetch them (client.rs)
///
/// The catalog serves two granularities of the same entity: a "light"
/// listing (identity + change timestamp, enough to decide whether a
/// re-sync is needed) and a "detail" document (full entity with nested
/// children). Paper maps only exist in light form.

pub mod client;
pub mod model;
