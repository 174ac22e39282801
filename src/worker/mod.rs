/// Background worker module
///
/// This module handles:
/// - The drain loop over the persisted queue (here)
/// - One idempotent handler per job kind (jobs.rs)
///
/// At most one drainer may run against a given replica - the queue
/// carries no lease column, concurrent drains are unsafe by contract.

pub mod jobs;

use crate::catalog::client::CatalogClient;
use crate::error::Result;
use crate::state::queue::{WorkItem, WorkKind};
use crate::state::store::Replica;
use crate::storage::assets::AssetStore;

/// The job kinds this engine drains. ProcessLayer and MigrateMap rows
/// belong to the full map server and are left untouched.
pub const DRAINED_KINDS: [WorkKind; 3] = [
    WorkKind::MirrorLayer,
    WorkKind::MirrorPaperMap,
    WorkKind::UnpackLayer,
];

#[derive(Debug, Default)]
pub struct DrainSummary {
    pub done: usize,
    pub failed: usize,
}

/// Process every Pending work item of each known kind, in insertion
/// order. Failures are isolated per job: the error lands on the row
/// and the loop moves on. No retry, no backoff - a row that failed
/// stays Pending for the next drain pass or run.
pub async fn drain(
    replica: &Replica,
    assets: &AssetStore,
    client: &CatalogClient,
) -> Result<DrainSummary> {
    let mut summary = DrainSummary::default();

    // Rows left Processing by an interrupted run are crash leftovers
    // (single drainer per replica); put them back in line first
    let reclaimed = replica.queue().reset_processing()?;
    if reclaimed > 0 {
        println!("♻️  Reclaimed {reclaimed} job(s) left mid-flight by an interrupted run");
    }

    for kind in DRAINED_KINDS {
        // Snapshot the pending list up front so a row that fails (and
        // returns to Pending) is not immediately re-attempted
        let items = replica.queue().pending(kind)?;
        for item in items {
            replica.queue().mark_processing(item.id)?;
            match dispatch(&item, replica, assets, client).await {
                Ok(()) => {
                    replica.queue().mark_done(item.id)?;
                    summary.done += 1;
                }
                Err(e) => {
                    eprintln!("❌ {} #{} failed: {e}", kind.as_str(), item.id);
                    replica.queue().mark_failed(item.id, &e.to_string())?;
                    summary.failed += 1;
                }
            }
        }
    }

    // Completed rows are consumed; Pending (including errored) rows
    // survive into the snapshot
    replica.queue().prune_done()?;

    println!(
        "🧺 Queue drained: {} done, {} failed, {} still pending",
        summary.done,
        summary.failed,
        replica.queue().pending_count()?
    );
    Ok(summary)
}

async fn dispatch(
    item: &WorkItem,
    replica: &Replica,
    assets: &AssetStore,
    client: &CatalogClient,
) -> Result<()> {
    match item.kind {
        WorkKind::MirrorLayer => {
            let job: jobs::MirrorLayerJob = serde_json::from_str(&item.data)?;
            jobs::mirror_layer(&job, client, assets).await
        }
        WorkKind::MirrorPaperMap => {
            let job: jobs::MirrorPaperMapJob = serde_json::from_str(&item.data)?;
            jobs::mirror_paper_map(&job, replica, client, assets).await
        }
        WorkKind::UnpackLayer => {
            let job: jobs::UnpackLayerJob = serde_json::from_str(&item.data)?;
            jobs::unpack_layer(&job, assets)
        }
        // Filtered out by DRAINED_KINDS
        WorkKind::ProcessLayer | WorkKind::MigrateMap => Ok(()),
    }
}
