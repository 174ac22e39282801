//! Static export: emit a full JSON + asset mirror of the replica.
//!
//! The JSON documents mirror the catalog API shapes (games.json, per
//! game maps.json, per map detail, papermaps.json) so a static web
//! host can serve what the live server would. Assets are published
//! under their logical paths. Runs only after the queue has fully
//! drained - the export reflects settled assets only.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::Result;
use crate::state::data::{GameMap, MapLayer, MapLocation};
use crate::state::store::Replica;
use crate::storage::assets::AssetStore;
use crate::storage::snapshot::SnapshotTarget;

#[derive(Debug, Default)]
pub struct ExportSummary {
    pub documents: usize,
    pub assets: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GameDoc<'a> {
    id: i64,
    name: &'a str,
    title: &'a str,
    attribution: &'a str,
    last_change_utc: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MapLightDoc<'a> {
    id: i64,
    name: &'a str,
    last_change_utc: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MapDetailDoc<'a> {
    id: i64,
    guid: &'a str,
    name: &'a str,
    world_name: &'a str,
    size_in_meters: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_uri: Option<&'a str>,
    last_change_utc: DateTime<Utc>,
    layers: Vec<LayerDoc<'a>>,
    locations: Vec<LocationDoc<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LayerDoc<'a> {
    id: i64,
    guid: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    format: &'a str,
    min_zoom: i64,
    max_zoom: i64,
    default_zoom: i64,
    tile_size: i64,
    factor_x: f64,
    factor_y: f64,
    is_default: bool,
    last_change_utc: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationDoc<'a> {
    id: i64,
    guid: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    name: &'a str,
    x: f64,
    y: f64,
    last_change_utc: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaperMapDoc<'a> {
    id: i64,
    name: &'a str,
    file_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    map_id: Option<i64>,
    last_change_utc: DateTime<Utc>,
}

/// Write the JSON mirror into `staging`, then publish staging + assets
/// to the target.
pub async fn export_static(
    replica: &Replica,
    assets: &AssetStore,
    target: &SnapshotTarget,
    staging: &Path,
) -> Result<ExportSummary> {
    let mut summary = ExportSummary::default();

    // Fresh staging tree every run
    if staging.exists() {
        std::fs::remove_dir_all(staging)?;
    }
    std::fs::create_dir_all(staging)?;

    let games = replica.games()?;
    let game_docs: Vec<GameDoc> = games
        .iter()
        .map(|g| GameDoc {
            id: g.id,
            name: &g.name,
            title: &g.title,
            attribution: &g.attribution,
            last_change_utc: g.last_change_utc,
        })
        .collect();
    write_doc(staging, "games.json", &game_docs, &mut summary)?;

    for game in &games {
        let maps = replica.maps_of(game.id)?;
        let lights: Vec<MapLightDoc> = maps
            .iter()
            .map(|m| MapLightDoc {
                id: m.id,
                name: &m.name,
                last_change_utc: m.last_change_utc,
            })
            .collect();
        write_doc(
            staging,
            &format!("games/{}/maps.json", game.id),
            &lights,
            &mut summary,
        )?;

        for map in &maps {
            let layers = replica.layers_of(map.id)?;
            let locations = replica.locations_of(map.id)?;
            let doc = map_detail_doc(map, &layers, &locations);
            write_doc(
                staging,
                &format!("games/{}/maps/{}.json", game.id, map.id),
                &doc,
                &mut summary,
            )?;
        }

        let papers = replica.paper_maps_of(game.id)?;
        let paper_docs: Vec<PaperMapDoc> = papers
            .iter()
            .map(|p| PaperMapDoc {
                id: p.id,
                name: &p.name,
                file_format: &p.file_format,
                file_size: p.file_size,
                map_id: p.map_id,
                last_change_utc: p.last_change_utc,
            })
            .collect();
        write_doc(
            staging,
            &format!("games/{}/papermaps.json", game.id),
            &paper_docs,
            &mut summary,
        )?;
    }

    // Publish the JSON tree, then the settled asset tree
    publish_tree(target, staging).await?;
    summary.assets = publish_tree(target, assets.root()).await?;

    println!(
        "📤 Exported {} document(s) and {} asset file(s)",
        summary.documents, summary.assets
    );
    Ok(summary)
}

fn map_detail_doc<'a>(
    map: &'a GameMap,
    layers: &'a [MapLayer],
    locations: &'a [MapLocation],
) -> MapDetailDoc<'a> {
    MapDetailDoc {
        id: map.id,
        guid: &map.guid,
        name: &map.name,
        world_name: &map.world_name,
        size_in_meters: map.size_in_meters,
        image_uri: map.image_path.as_deref(),
        last_change_utc: map.last_change_utc,
        layers: layers
            .iter()
            .map(|l| LayerDoc {
                id: l.id,
                guid: &l.guid,
                kind: &l.kind,
                format: &l.format,
                min_zoom: l.min_zoom,
                max_zoom: l.max_zoom,
                default_zoom: l.default_zoom,
                tile_size: l.tile_size,
                factor_x: l.factor_x,
                factor_y: l.factor_y,
                is_default: l.is_default,
                last_change_utc: l.last_change_utc,
            })
            .collect(),
        locations: locations
            .iter()
            .map(|l| LocationDoc {
                id: l.id,
                guid: &l.guid,
                kind: &l.kind,
                name: &l.name,
                x: l.x,
                y: l.y,
                last_change_utc: l.last_change_utc,
            })
            .collect(),
    }
}

fn write_doc<T: Serialize>(
    staging: &Path,
    relative: &str,
    doc: &T,
    summary: &mut ExportSummary,
) -> Result<()> {
    let path = staging.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(doc)?)?;
    summary.documents += 1;
    Ok(())
}

/// Publish every file under `root` to the target, preserving relative
/// paths. Returns the file count.
async fn publish_tree(target: &SnapshotTarget, root: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir entries stay under their root")
            .to_string_lossy()
            .replace('\\', "/");
        target.publish_file(&relative, entry.path()).await?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::state::data::Game;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn export_writes_api_shaped_documents_and_copies_assets() {
        let work = std::env::temp_dir().join(format!("map-mirror-export-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&work);

        let replica = Replica::open_in_memory().unwrap();
        replica
            .insert_game(&Game {
                id: 1,
                name: "arma3".into(),
                title: "Arma 3".into(),
                attribution: String::new(),
                last_change_utc: t(10),
            })
            .unwrap();
        replica
            .insert_map(&GameMap {
                id: 12,
                game_id: 1,
                guid: "altis-guid".into(),
                name: "altis".into(),
                world_name: "Altis".into(),
                size_in_meters: 30720.0,
                image_path: None,
                last_change_utc: t(10),
            })
            .unwrap();

        let assets = AssetStore::new(&work.join("assets")).unwrap();
        assets.store("1/maps/12/101/0/0/0.png", b"tile").unwrap();

        let target_dir = work.join("target");
        let target = SnapshotTarget::Local(target_dir.clone());
        let summary = export_static(&replica, &assets, &target, &work.join("staging"))
            .await
            .unwrap();

        assert_eq!(summary.documents, 4); // games, maps, one detail, papermaps
        assert_eq!(summary.assets, 1);

        let games_json = std::fs::read_to_string(target_dir.join("games.json")).unwrap();
        assert!(games_json.contains("\"lastChangeUtc\""));

        let detail = std::fs::read_to_string(target_dir.join("games/1/maps/12.json")).unwrap();
        assert!(detail.contains("\"worldName\": \"Altis\""));
        assert!(target_dir.join("1/maps/12/101/0/0/0.png").exists());

        let _ = std::fs::remove_dir_all(&work);
    }
}
