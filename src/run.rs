//! The resumable run orchestrator.
//!
//! State machine:
//! `Init -> [RestoreSnapshot] -> ReconcileCatalog -> DrainQueue ->
//!  ExportStaticSnapshot -> PersistSnapshot -> Done`
//!
//! Strictly sequential: reconciliation finishes before the drain
//! starts, the drain finishes before the export, and the snapshot is
//! only re-uploaded once everything else succeeded. Pending rows left
//! by an interrupted prior run are picked up by the drain, which is
//! the whole point of resuming.

use std::path::{Path, PathBuf};

use reqwest::Url;

use crate::catalog::client::CatalogClient;
use crate::error::Result;
use crate::export;
use crate::state::data::IdentityPolicy;
use crate::state::store::Replica;
use crate::storage::assets::AssetStore;
use crate::storage::snapshot::{SnapshotTarget, SNAPSHOT_NAME};
use crate::sync::mirror::MirrorSession;
use crate::worker;

pub struct RunOptions {
    pub source: Url,
    pub target: SnapshotTarget,
    pub resume: bool,
    pub policy: IdentityPolicy,
    pub work_dir: PathBuf,
}

pub async fn run(options: RunOptions) -> Result<()> {
    std::fs::create_dir_all(&options.work_dir)?;
    let db_path = options.work_dir.join(SNAPSHOT_NAME);
    let assets_root = options.work_dir.join("assets");

    // Init -> [RestoreSnapshot]
    prepare_workspace(&options, &db_path, &assets_root).await?;

    let client = CatalogClient::new(options.source)?;
    let assets = AssetStore::new(&assets_root)?;

    {
        let replica = Replica::open(&db_path)?;

        // ReconcileCatalog
        let mut session = MirrorSession::new(&client, &replica, &assets, options.policy);
        session.sync_catalog().await?;
        let summary = &session.summary;
        println!(
            "🔁 Reconciled {} game(s): {} map(s) created, {} updated, {} deleted, {} download(s) queued{}",
            summary.games,
            summary.maps_created,
            summary.maps_updated,
            summary.maps_deleted,
            summary.downloads_queued,
            if summary.games_failed > 0 {
                format!(", {} game(s) failed", summary.games_failed)
            } else {
                String::new()
            }
        );

        // DrainQueue - includes Pending rows inherited from an
        // interrupted prior run
        worker::drain(&replica, &assets, &client).await?;

        // ExportStaticSnapshot - only settled assets get published
        export::export_static(
            &replica,
            &assets,
            &options.target,
            &options.work_dir.join("staging"),
        )
        .await?;
    }
    // Replica dropped: the database file is flushed and safe to copy

    // PersistSnapshot - atomic replace, so the next resumable run
    // starts from a consistent point
    options.target.persist_snapshot(&db_path).await?;
    println!("✅ Mirror run complete, snapshot persisted");
    Ok(())
}

/// Restore the prior snapshot when resuming; in every other case the
/// run starts from an empty store, so whatever a previous run left in
/// the working directory is dropped. A restored snapshot keeps the
/// asset cache - its Pending rows are about to re-download into it.
async fn prepare_workspace(
    options: &RunOptions,
    db_path: &Path,
    assets_root: &Path,
) -> Result<()> {
    if options.resume {
        if options.target.restore_snapshot(db_path).await? {
            println!("🔄 Resuming from the snapshot found at the target");
            return Ok(());
        }
        println!("🔄 No prior snapshot at the target, starting fresh");
    }
    clear_local_state(db_path, assets_root)
}

/// Drop the replica database and the cached assets. Leftover assets
/// would otherwise leak into the export of a fresh run.
fn clear_local_state(db_path: &Path, assets_root: &Path) -> Result<()> {
    if db_path.exists() {
        std::fs::remove_file(db_path)?;
    }
    if assets_root.exists() {
        std::fs::remove_dir_all(assets_root)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("map-mirror-run-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn options(resume: bool, target_dir: &Path) -> RunOptions {
        RunOptions {
            source: Url::parse("https://maps.example.com/api/").unwrap(),
            target: SnapshotTarget::Local(target_dir.to_path_buf()),
            resume,
            policy: IdentityPolicy::KeepId,
            work_dir: PathBuf::new(),
        }
    }

    fn seed_stale_state(work: &Path) -> (PathBuf, PathBuf) {
        let db_path = work.join(SNAPSHOT_NAME);
        let assets_root = work.join("assets");
        std::fs::write(&db_path, b"stale-replica").unwrap();
        std::fs::create_dir_all(assets_root.join("1/maps/12")).unwrap();
        std::fs::write(assets_root.join("1/maps/12/orphan.png"), b"tile").unwrap();
        (db_path, assets_root)
    }

    /// Resume requested but the target has nothing: the run must start
    /// from an empty store, not from whatever a crashed run left behind.
    #[tokio::test]
    async fn resume_without_a_prior_snapshot_starts_empty() {
        let work = scratch("resume-empty");
        let (db_path, assets_root) = seed_stale_state(&work);
        let target_dir = work.join("target");

        prepare_workspace(&options(true, &target_dir), &db_path, &assets_root)
            .await
            .unwrap();

        assert!(!db_path.exists());
        assert!(!assets_root.exists());
        let _ = std::fs::remove_dir_all(&work);
    }

    /// A non-resume run drops both the database and the asset cache, so
    /// the later export cannot publish orphaned files.
    #[tokio::test]
    async fn fresh_runs_clear_the_database_and_the_asset_cache() {
        let work = scratch("fresh");
        let (db_path, assets_root) = seed_stale_state(&work);
        let target_dir = work.join("target");

        prepare_workspace(&options(false, &target_dir), &db_path, &assets_root)
            .await
            .unwrap();

        assert!(!db_path.exists());
        assert!(!assets_root.exists());
        let _ = std::fs::remove_dir_all(&work);
    }

    /// A real resume restores the snapshot and keeps the asset cache.
    #[tokio::test]
    async fn resume_restores_the_snapshot_and_keeps_assets() {
        let work = scratch("resume-hit");
        let (db_path, assets_root) = seed_stale_state(&work);
        let target_dir = work.join("target");
        std::fs::create_dir_all(&target_dir).unwrap();
        std::fs::write(target_dir.join(SNAPSHOT_NAME), b"published-replica").unwrap();

        prepare_workspace(&options(true, &target_dir), &db_path, &assets_root)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&db_path).unwrap(), b"published-replica");
        assert!(assets_root.join("1/maps/12/orphan.png").exists());
        let _ = std::fs::remove_dir_all(&work);
    }
}
