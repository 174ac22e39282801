//! One handler per job kind.
//!
//! Every handler is idempotent: re-running one on a partially
//! completed job (after a crash mid-download) re-downloads and
//! overwrites. That is what makes resumption correct - handlers never
//! assume a clean starting state.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zip::read::ZipArchive;

use crate::catalog::client::CatalogClient;
use crate::error::{MirrorError, Result};
use crate::state::store::Replica;
use crate::storage::assets::{self, AssetStore};

/// Payload of a MirrorLayer work item: download one layer's tile
/// archive and unpack it into the tile tree.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorLayerJob {
    /// Local layer id
    pub target_id: i64,
    pub game_id: i64,
    pub map_id: i64,
    /// Already resolved against the catalog base address at queue time
    pub absolute_download_uri: String,
}

/// Payload of a MirrorPaperMap work item: download one paper map PDF.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorPaperMapJob {
    /// Local paper map id
    pub target_id: i64,
    pub game_id: i64,
    /// The parent map this paper map declared when it was queued
    pub expected_map_id: Option<i64>,
    pub absolute_download_uri: String,
}

/// Payload of an UnpackLayer work item: re-unpack an archive that is
/// already in the asset store.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpackLayerJob {
    pub target_id: i64,
    pub game_id: i64,
    pub map_id: i64,
}

pub async fn mirror_layer(
    job: &MirrorLayerJob,
    client: &CatalogClient,
    assets: &AssetStore,
) -> Result<()> {
    let archive_logical = assets::layer_archive(job.game_id, job.map_id, job.target_id);
    let archive_path = assets.path_of(&archive_logical);

    let bytes = client
        .download_to(&job.absolute_download_uri, &archive_path)
        .await?;

    let tile_dir = assets.path_of(&assets::layer_dir(job.game_id, job.map_id, job.target_id));
    let tiles = unpack_archive(&archive_path, &tile_dir)?;

    println!(
        "🗺️  Mirrored layer {} ({} bytes, {} tiles)",
        job.target_id, bytes, tiles
    );
    Ok(())
}

pub async fn mirror_paper_map(
    job: &MirrorPaperMapJob,
    replica: &Replica,
    client: &CatalogClient,
    assets: &AssetStore,
) -> Result<()> {
    let paper = replica.paper_map_by_id(job.target_id)?.ok_or_else(|| {
        MirrorError::Integrity(format!("paper map {} no longer exists locally", job.target_id))
    })?;

    // The declared parent map must still be the one we queued against,
    // and it must still exist - otherwise this item fails alone
    if paper.map_id != job.expected_map_id {
        return Err(MirrorError::Integrity(format!(
            "paper map {} declares map {:?}, expected {:?}",
            paper.id, paper.map_id, job.expected_map_id
        )));
    }
    if let Some(map_id) = paper.map_id {
        if replica.map_by_id(map_id)?.is_none() {
            return Err(MirrorError::Integrity(format!(
                "paper map {} references missing map {map_id}",
                paper.id
            )));
        }
    }

    let logical = assets::paper_map_path(job.game_id, paper.id, &paper.file_format);
    let bytes = client
        .download_to(&job.absolute_download_uri, &assets.path_of(&logical))
        .await?;

    println!("📄 Mirrored paper map '{}' ({} bytes)", paper.name, bytes);
    Ok(())
}

pub fn unpack_layer(job: &UnpackLayerJob, assets: &AssetStore) -> Result<()> {
    let archive_logical = assets::layer_archive(job.game_id, job.map_id, job.target_id);
    let archive_path = assets.path_of(&archive_logical);
    if !archive_path.exists() {
        return Err(MirrorError::Integrity(format!(
            "no stored archive for layer {}",
            job.target_id
        )));
    }

    let tile_dir = assets.path_of(&assets::layer_dir(job.game_id, job.map_id, job.target_id));
    let tiles = unpack_archive(&archive_path, &tile_dir)?;
    println!("📦 Unpacked layer {} ({} tiles)", job.target_id, tiles);
    Ok(())
}

/// Extract every file entry of a zip archive under `dest_dir`,
/// overwriting existing files. Entries that escape the destination
/// (absolute or `..` paths) are skipped. Returns the file count.
fn unpack_archive(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let file = fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut count = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            continue;
        };

        let out_path = dest_dir.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        count += 1;
    }

    Ok(count)
}
