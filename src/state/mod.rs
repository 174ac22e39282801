/// Local replica module
///
/// This module handles all persisted state, including:
/// - Local entity structs shared across the engine (data.rs)
/// - The SQLite replica and its per-entity queries (store.rs)
/// - The persisted background work queue (queue.rs)
///
/// Everything lives in one SQLite file; that file is the snapshot the
/// orchestrator uploads at the end of a run, which is what makes runs
/// resumable.

pub mod data;
pub mod queue;
pub mod store;
