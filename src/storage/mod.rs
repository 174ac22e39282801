/// Binary storage module
///
/// This module handles:
/// - The local blob store addressed by logical paths (assets.rs)
/// - Snapshot targets: where the replica database and the static
///   export end up (snapshot.rs)

pub mod assets;
pub mod snapshot;
