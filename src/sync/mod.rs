/// Reconciliation engine module
///
/// This module handles:
/// - The generic diff/merge pass over one parent scope (rules.rs)
/// - Per-entity-kind matching and copy rules (kinds.rs)
/// - The remote reconciler that fetches, hydrates and schedules
///   downloads (mirror.rs)
///
/// The generic pass is pure; all I/O lives in mirror.rs.

pub mod kinds;
pub mod mirror;
pub mod rules;
