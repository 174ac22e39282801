//! The remote reconciler: fetches light listings, hydrates details,
//! persists the diff and schedules binary downloads.
//!
//! One `MirrorSession` drives a whole run. Fetching is async; the
//! apply_* functions are pure database work so the reconciliation
//! semantics stay testable without a network.
//!
//! Order per top-level entity: fetch light list -> reconcile (cascading
//! into layers and locations) -> persist (so generated local ids
//! exist) -> item_done to flush scheduled downloads. A failure in one
//! entity never rolls back already-committed siblings - partial
//! progress is what resumption relies on.

use std::collections::{HashMap, HashSet};

use crate::catalog::client::CatalogClient;
use crate::catalog::model::{
    RemoteGame, RemoteLayer, RemoteMapDetail, RemoteMapLight, RemotePaperMap,
};
use crate::error::{MirrorError, Result};
use crate::state::data::{GameMap, IdentityPolicy};
use crate::state::queue::WorkKind;
use crate::state::store::Replica;
use crate::storage::assets::{self, AssetStore};
use crate::worker::jobs::{MirrorLayerJob, MirrorPaperMapJob};

use super::kinds::{hydrate_map, GameRules, LayerRules, LocationRules, MapRules, PaperMapRules};
use super::rules::{reconcile, DownloadSlot, ReconcileRules};

/// Counters for one run, printed at the end.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub games: usize,
    pub maps_created: usize,
    pub maps_updated: usize,
    pub maps_deleted: usize,
    pub downloads_queued: usize,
    pub games_failed: usize,
}

/// Result of one maps light pass for a game.
pub struct MapsPass {
    /// Remote map ids that are new or changed (detail fetch needed)
    pub changed: HashSet<i64>,
    /// Remote map id -> local map id, for every surviving map
    pub map_ids: HashMap<i64, i64>,
}

pub struct MirrorSession<'a> {
    client: &'a CatalogClient,
    replica: &'a Replica,
    assets: &'a AssetStore,
    policy: IdentityPolicy,
    /// Run-wide set of already-scheduled downloads, keyed by job kind
    /// and local entity id. Shared across every pass so the same asset
    /// is never queued twice in one run.
    scheduled: HashSet<(WorkKind, i64)>,
    pub summary: SyncSummary,
}

impl<'a> MirrorSession<'a> {
    pub fn new(
        client: &'a CatalogClient,
        replica: &'a Replica,
        assets: &'a AssetStore,
        policy: IdentityPolicy,
    ) -> Self {
        MirrorSession {
            client,
            replica,
            assets,
            policy,
            scheduled: HashSet::new(),
            summary: SyncSummary::default(),
        }
    }

    fn scheduled_ids(&self, kind: WorkKind) -> HashSet<i64> {
        self.scheduled
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .collect()
    }

    /// Reconcile the whole catalog: games, then each game's maps and
    /// paper maps. Structural errors abort; any other failure is
    /// isolated to its game.
    pub async fn sync_catalog(&mut self) -> Result<()> {
        let remote_games = self.client.games().await?;
        println!("🌍 Remote catalog lists {} game(s)", remote_games.len());

        let rules = GameRules {
            policy: self.policy,
        };
        let out = reconcile(&rules, &remote_games, self.replica.games()?, &HashSet::new());

        for game in &out.removed {
            self.assets.delete(&assets::game_dir(game.id))?;
            self.replica.delete_game(game.id)?;
            println!("🗑️  Removed game '{}' (gone from remote)", game.name);
        }
        for game in &out.updated {
            self.replica.update_game(game)?;
        }
        for game in &out.created {
            self.replica.insert_game(game)?;
        }

        let locals = self.replica.games()?;
        for remote_game in &remote_games {
            let Some(local) = locals.iter().find(|l| rules.is_match(remote_game, l)) else {
                continue;
            };
            self.summary.games += 1;
            if let Err(e) = self.sync_game(remote_game, local.id).await {
                if e.is_structural() || matches!(e, MirrorError::NotImplemented(_)) {
                    return Err(e);
                }
                self.summary.games_failed += 1;
                eprintln!("⚠️  Game '{}' failed, continuing: {e}", remote_game.name);
            }
        }
        Ok(())
    }

    async fn sync_game(&mut self, remote_game: &RemoteGame, local_game_id: i64) -> Result<()> {
        let map_ids = self.sync_maps(remote_game.id, local_game_id).await?;
        self.sync_paper_maps(remote_game.id, local_game_id, map_ids)
            .await?;
        Ok(())
    }

    // ========== Maps ==========

    async fn sync_maps(
        &mut self,
        remote_game_id: i64,
        local_game_id: i64,
    ) -> Result<HashMap<i64, i64>> {
        let lights = self.client.maps(remote_game_id).await?;
        let pass = self.apply_map_lights(local_game_id, &lights)?;

        for light in &lights {
            if !pass.changed.contains(&light.id) {
                continue;
            }
            let Some(&local_map_id) = pass.map_ids.get(&light.id) else {
                continue;
            };
            // Per-map isolation: a broken map does not sink its siblings
            if let Err(e) = self
                .sync_map_detail(remote_game_id, light.id, local_map_id)
                .await
            {
                if e.is_structural() || matches!(e, MirrorError::NotImplemented(_)) {
                    return Err(e);
                }
                eprintln!("⚠️  Map '{}' failed, continuing: {e}", light.name);
            }
        }
        Ok(pass.map_ids)
    }

    /// The maps light pass: match, copy-if-changed, create-if-absent,
    /// delete-if-missing. Pure database work.
    pub fn apply_map_lights(
        &mut self,
        local_game_id: i64,
        lights: &[RemoteMapLight],
    ) -> Result<MapsPass> {
        let rules = MapRules {
            policy: self.policy,
            game_id: local_game_id,
        };
        let locals = self.replica.maps_of(local_game_id)?;

        // A map is due whenever its light stamp disagrees with the
        // stored hydration stamp; the light pass itself never advances
        // that stamp, so a map stays due until its detail applies
        let changed: HashSet<i64> = lights
            .iter()
            .filter(|r| match locals.iter().find(|l| rules.is_match(r, l)) {
                Some(l) => l.last_change_utc != r.last_change_utc,
                None => true,
            })
            .map(|r| r.id)
            .collect();

        let out = reconcile(&rules, lights, locals, &HashSet::new());

        for map in &out.removed {
            self.assets.delete(&assets::map_dir(local_game_id, map.id))?;
            self.replica.delete_map(map.id)?;
            self.summary.maps_deleted += 1;
            println!("🗑️  Removed map '{}' (gone from remote)", map.name);
        }
        for map in &out.updated {
            self.replica.update_map(map)?;
            self.summary.maps_updated += 1;
        }
        for map in &out.created {
            self.replica.insert_map(map)?;
            self.summary.maps_created += 1;
        }

        let locals = self.replica.maps_of(local_game_id)?;
        let mut map_ids = HashMap::new();
        for light in lights {
            if let Some(local) = locals.iter().find(|l| rules.is_match(light, l)) {
                map_ids.insert(light.id, local.id);
            }
        }
        Ok(MapsPass { changed, map_ids })
    }

    async fn sync_map_detail(
        &mut self,
        remote_game_id: i64,
        remote_map_id: i64,
        local_map_id: i64,
    ) -> Result<()> {
        let detail = self.client.map_detail(remote_game_id, remote_map_id).await?;
        let mut map = self.replica.map_by_id(local_map_id)?.ok_or_else(|| {
            MirrorError::Structural(format!("map {local_map_id} vanished mid-run"))
        })?;

        // Best effort: a missing preview is not fatal to reconciliation
        if let Some(uri) = &detail.image_uri {
            if let Some(logical) = self.download_preview(&map, uri).await {
                map.image_path = Some(logical);
            }
        }

        self.apply_map_detail(&mut map, &detail)
    }

    /// Hydrate one map from its detail document, reconcile its nested
    /// layers and locations, persist, then flush scheduled downloads
    /// for this map (item_done).
    pub fn apply_map_detail(&mut self, map: &mut GameMap, detail: &RemoteMapDetail) -> Result<()> {
        hydrate_map(map, detail);
        self.replica.update_map(map)?;

        let pending = self.reconcile_layers(map, &detail.layers)?;
        self.reconcile_locations(map.id, &detail.locations)?;

        // Commit happened above; now turn pending downloads into rows
        self.item_done_layers(map, pending)?;

        println!(
            "🗺️  Map '{}': {} layer(s), {} location(s)",
            map.name,
            detail.layers.len(),
            detail.locations.len()
        );
        Ok(())
    }

    fn reconcile_layers(
        &mut self,
        map: &GameMap,
        remote_layers: &[RemoteLayer],
    ) -> Result<Vec<(i64, RemoteLayer)>> {
        let rules = LayerRules::new(self.policy, map.id)?;
        let locals = self.replica.layers_of(map.id)?;
        let scheduled = self.scheduled_ids(WorkKind::MirrorLayer);
        let out = reconcile(&rules, remote_layers, locals, &scheduled);

        for layer in &out.removed {
            self.assets
                .delete(&assets::layer_dir(map.game_id, map.id, layer.id))?;
            self.replica.delete_layer(layer.id)?;
        }
        for layer in &out.updated {
            self.replica.update_layer(layer)?;
        }
        let mut created_ids = Vec::with_capacity(out.created.len());
        for layer in &out.created {
            created_ids.push(self.replica.insert_layer(layer)?);
        }

        // Resolve download slots now that every local id exists
        let mut pending = Vec::new();
        for (slot, light) in out.to_download {
            let id = match slot {
                DownloadSlot::Existing(id) => id,
                DownloadSlot::New(index) => created_ids[index],
            };
            pending.push((id, light));
        }
        Ok(pending)
    }

    fn reconcile_locations(
        &mut self,
        map_id: i64,
        remote_locations: &[crate::catalog::model::RemoteLocation],
    ) -> Result<()> {
        let rules = LocationRules {
            policy: self.policy,
            map_id,
        };
        let locals = self.replica.locations_of(map_id)?;
        let out = reconcile(&rules, remote_locations, locals, &HashSet::new());

        for location in &out.removed {
            self.replica.delete_location(location.id)?;
        }
        for location in &out.updated {
            self.replica.update_location(location)?;
        }
        for location in &out.created {
            self.replica.insert_location(location)?;
        }
        Ok(())
    }

    /// Flush this map's pending layer downloads into the queue,
    /// resolving relative URIs into absolute URLs. Entities already
    /// scheduled this run are skipped, then the pending list is
    /// consumed.
    fn item_done_layers(&mut self, map: &GameMap, pending: Vec<(i64, RemoteLayer)>) -> Result<()> {
        for (layer_id, light) in pending {
            if !self.scheduled.insert((WorkKind::MirrorLayer, layer_id)) {
                continue;
            }
            let Some(uri) = &light.download_uri else {
                continue;
            };
            let job = MirrorLayerJob {
                target_id: layer_id,
                game_id: map.game_id,
                map_id: map.id,
                absolute_download_uri: self.client.resolve(uri)?,
            };
            self.replica.queue().enqueue(
                WorkKind::MirrorLayer,
                layer_id,
                &serde_json::to_string(&job)?,
            )?;
            self.summary.downloads_queued += 1;
            println!("⬇️  Queued tile archive for layer {layer_id}");
        }
        Ok(())
    }

    // ========== Paper maps ==========

    async fn sync_paper_maps(
        &mut self,
        remote_game_id: i64,
        local_game_id: i64,
        map_ids: HashMap<i64, i64>,
    ) -> Result<()> {
        let lights = self.client.paper_maps(remote_game_id).await?;
        self.apply_paper_maps(local_game_id, map_ids, &lights)
    }

    /// The paper maps pass. Self-contained lights: reconcile, persist,
    /// item_done - no detail fetch.
    pub fn apply_paper_maps(
        &mut self,
        local_game_id: i64,
        map_ids: HashMap<i64, i64>,
        lights: &[RemotePaperMap],
    ) -> Result<()> {
        let rules = PaperMapRules {
            policy: self.policy,
            game_id: local_game_id,
            map_ids,
        };
        let locals = self.replica.paper_maps_of(local_game_id)?;
        let scheduled = self.scheduled_ids(WorkKind::MirrorPaperMap);
        let out = reconcile(&rules, lights, locals, &scheduled);

        for paper in &out.removed {
            self.assets.delete(&assets::paper_map_path(
                local_game_id,
                paper.id,
                &paper.file_format,
            ))?;
            self.replica.delete_paper_map(paper.id)?;
        }
        for paper in &out.updated {
            self.replica.update_paper_map(paper)?;
        }
        let mut created_ids = Vec::with_capacity(out.created.len());
        for paper in &out.created {
            created_ids.push(self.replica.insert_paper_map(paper)?);
        }

        for (slot, light) in out.to_download {
            let paper_id = match slot {
                DownloadSlot::Existing(id) => id,
                DownloadSlot::New(index) => created_ids[index],
            };
            if !self.scheduled.insert((WorkKind::MirrorPaperMap, paper_id)) {
                continue;
            }
            let Some(uri) = &light.download_uri else {
                continue;
            };
            let expected_map_id = self
                .replica
                .paper_map_by_id(paper_id)?
                .and_then(|p| p.map_id);
            let job = MirrorPaperMapJob {
                target_id: paper_id,
                game_id: local_game_id,
                expected_map_id,
                absolute_download_uri: self.client.resolve(uri)?,
            };
            self.replica.queue().enqueue(
                WorkKind::MirrorPaperMap,
                paper_id,
                &serde_json::to_string(&job)?,
            )?;
            self.summary.downloads_queued += 1;
            println!("⬇️  Queued paper map {paper_id}");
        }
        Ok(())
    }

    // ========== Preview images ==========

    /// Best-effort preview download: any failure (network, unsupported
    /// or corrupt image) just means no preview.
    async fn download_preview(&self, map: &GameMap, uri: &str) -> Option<String> {
        let url = self.client.resolve(uri).ok()?;
        let bytes = self.client.fetch_bytes(&url).await.ok()?;

        // Decode before caching - a corrupt preview is worse than none
        let format = image::guess_format(&bytes).ok()?;
        image::load_from_memory_with_format(&bytes, format).ok()?;
        let ext = match format {
            image::ImageFormat::Png => "png",
            image::ImageFormat::Jpeg => "jpg",
            image::ImageFormat::WebP => "webp",
            _ => return None,
        };

        let logical = format!("{}/preview.{ext}", assets::map_dir(map.game_id, map.id));
        self.assets.store(&logical, &bytes).ok()?;
        println!("🖼️  Cached preview for map '{}'", map.name);
        Some(logical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::Url;

    use crate::catalog::model::RemoteLocation;
    use crate::state::data::Game;
    use crate::state::queue::WorkState;

    fn t(h: u32) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    struct Fixture {
        client: CatalogClient,
        replica: Replica,
        assets: AssetStore,
        _root: std::path::PathBuf,
    }

    impl Fixture {
        fn new(tag: &str) -> Self {
            let root = std::env::temp_dir().join(format!(
                "map-mirror-session-{tag}-{}",
                std::process::id()
            ));
            let _ = std::fs::remove_dir_all(&root);
            Fixture {
                client: CatalogClient::new(Url::parse("https://maps.example.com/api/").unwrap())
                    .unwrap(),
                replica: Replica::open_in_memory().unwrap(),
                assets: AssetStore::new(&root).unwrap(),
                _root: root,
            }
        }

        fn session(&self, policy: IdentityPolicy) -> MirrorSession<'_> {
            MirrorSession::new(&self.client, &self.replica, &self.assets, policy)
        }

        fn seed_game(&self) {
            self.replica
                .insert_game(&Game {
                    id: 1,
                    name: "arma3".into(),
                    title: "Arma 3".into(),
                    attribution: String::new(),
                    last_change_utc: t(9),
                })
                .unwrap();
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self._root);
        }
    }

    fn altis_light(stamp: chrono::DateTime<chrono::Utc>) -> RemoteMapLight {
        RemoteMapLight {
            id: 12,
            name: "altis".into(),
            last_change_utc: stamp,
        }
    }

    fn altis_detail(stamp: chrono::DateTime<chrono::Utc>, max_zoom: i64) -> RemoteMapDetail {
        RemoteMapDetail {
            id: 12,
            guid: Some("altis-guid".into()),
            name: "altis".into(),
            world_name: "Altis".into(),
            size_in_meters: 30720.0,
            image_uri: None,
            last_change_utc: stamp,
            layers: vec![RemoteLayer {
                id: 101,
                guid: None,
                kind: "Topographic".into(),
                format: "PngAndWebp".into(),
                min_zoom: 0,
                max_zoom,
                default_zoom: 2,
                tile_size: 256,
                factor_x: 1.0,
                factor_y: 1.0,
                is_default: true,
                download_uri: Some("games/1/maps/12/101/tiles.zip".into()),
                last_change_utc: stamp,
            }],
            locations: vec![RemoteLocation {
                id: 7,
                guid: None,
                kind: "City".into(),
                name: "Kavala".into(),
                x: 3500.0,
                y: 13300.0,
                last_change_utc: stamp,
            }],
        }
    }

    /// Scenario A: first run creates matching local ids and exactly one
    /// MirrorLayer work item.
    #[test]
    fn first_run_creates_entities_and_queues_one_layer_download() {
        let fx = Fixture::new("scenario-a");
        fx.seed_game();
        let mut session = fx.session(IdentityPolicy::KeepId);

        let lights = vec![altis_light(t(10))];
        let pass = session.apply_map_lights(1, &lights).unwrap();
        assert_eq!(pass.map_ids.get(&12), Some(&12));
        assert!(pass.changed.contains(&12));

        let mut map = fx.replica.map_by_id(12).unwrap().unwrap();
        session.apply_map_detail(&mut map, &altis_detail(t(10), 5)).unwrap();

        let layer = fx.replica.layer_by_id(101).unwrap().unwrap();
        assert_eq!(layer.max_zoom, 5);
        assert_eq!(fx.replica.locations_of(12).unwrap().len(), 1);

        let pending = fx.replica.queue().pending(WorkKind::MirrorLayer).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].target_entity_id, Some(101));
        assert_eq!(pending[0].state, WorkState::Pending);

        let job: MirrorLayerJob = serde_json::from_str(&pending[0].data).unwrap();
        assert_eq!(
            job.absolute_download_uri,
            "https://maps.example.com/api/games/1/maps/12/101/tiles.zip"
        );
    }

    /// Scenario B: an immediate re-run with no remote change is a no-op.
    #[test]
    fn rerun_with_no_change_is_idempotent() {
        let fx = Fixture::new("scenario-b");
        fx.seed_game();
        let mut session = fx.session(IdentityPolicy::KeepId);

        let lights = vec![altis_light(t(10))];
        session.apply_map_lights(1, &lights).unwrap();
        let mut map = fx.replica.map_by_id(12).unwrap().unwrap();
        session.apply_map_detail(&mut map, &altis_detail(t(10), 5)).unwrap();
        let queued_before = fx.replica.queue().pending_count().unwrap();

        // Fresh session, same remote state: nothing changes, nothing queues
        let mut session = fx.session(IdentityPolicy::KeepId);
        let pass = session.apply_map_lights(1, &lights).unwrap();
        assert!(pass.changed.is_empty());
        assert_eq!(session.summary.maps_updated, 0);
        assert_eq!(session.summary.maps_created, 0);
        assert_eq!(fx.replica.queue().pending_count().unwrap(), queued_before);
    }

    /// Scenario C: a layer's MaxZoom changes under a new timestamp;
    /// the copy is applied and exactly one new work item appears for
    /// the existing local layer.
    #[test]
    fn changed_layer_updates_in_place_and_queues_once() {
        let fx = Fixture::new("scenario-c");
        fx.seed_game();
        let mut session = fx.session(IdentityPolicy::KeepId);

        session.apply_map_lights(1, &[altis_light(t(10))]).unwrap();
        let mut map = fx.replica.map_by_id(12).unwrap().unwrap();
        session.apply_map_detail(&mut map, &altis_detail(t(10), 5)).unwrap();

        // Drain finished in a previous run; new run sees MaxZoom 5 -> 6
        let drained: Vec<i64> = fx
            .replica
            .queue()
            .pending(WorkKind::MirrorLayer)
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        for id in drained {
            fx.replica.queue().mark_processing(id).unwrap();
            fx.replica.queue().mark_done(id).unwrap();
        }
        fx.replica.queue().prune_done().unwrap();

        let mut session = fx.session(IdentityPolicy::KeepId);
        session.apply_map_lights(1, &[altis_light(t(11))]).unwrap();
        let mut map = fx.replica.map_by_id(12).unwrap().unwrap();
        session.apply_map_detail(&mut map, &altis_detail(t(11), 6)).unwrap();

        let layer = fx.replica.layer_by_id(101).unwrap().unwrap();
        assert_eq!(layer.max_zoom, 6);

        let pending = fx.replica.queue().pending(WorkKind::MirrorLayer).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].target_entity_id, Some(101));
    }

    /// A transient detail-fetch failure must not eat the change signal:
    /// the light pass alone leaves the map due, and the next run
    /// re-fetches the detail and applies the layer update.
    #[test]
    fn a_failed_detail_fetch_keeps_the_map_due_for_rehydration() {
        let fx = Fixture::new("stale-detail");
        fx.seed_game();
        let mut session = fx.session(IdentityPolicy::KeepId);

        session.apply_map_lights(1, &[altis_light(t(10))]).unwrap();
        let mut map = fx.replica.map_by_id(12).unwrap().unwrap();
        session.apply_map_detail(&mut map, &altis_detail(t(10), 5)).unwrap();

        // Next run: the remote moved to t(11) but the detail fetch
        // fails after the light pass (isolated, not applied)
        let mut session = fx.session(IdentityPolicy::KeepId);
        let pass = session.apply_map_lights(1, &[altis_light(t(11))]).unwrap();
        assert!(pass.changed.contains(&12));

        // One run later the map must still read as due
        let mut session = fx.session(IdentityPolicy::KeepId);
        let pass = session.apply_map_lights(1, &[altis_light(t(11))]).unwrap();
        assert!(pass.changed.contains(&12));

        let mut map = fx.replica.map_by_id(12).unwrap().unwrap();
        session.apply_map_detail(&mut map, &altis_detail(t(11), 6)).unwrap();
        assert_eq!(fx.replica.layer_by_id(101).unwrap().unwrap().max_zoom, 6);

        // And once hydrated, the map settles
        let mut session = fx.session(IdentityPolicy::KeepId);
        let pass = session.apply_map_lights(1, &[altis_light(t(11))]).unwrap();
        assert!(pass.changed.is_empty());
    }

    /// Scenario D: a map removed remotely disappears locally, with its
    /// layers and locations, in the same pass.
    #[test]
    fn removed_map_is_deleted_with_its_children() {
        let fx = Fixture::new("scenario-d");
        fx.seed_game();
        let mut session = fx.session(IdentityPolicy::KeepId);

        session.apply_map_lights(1, &[altis_light(t(10))]).unwrap();
        let mut map = fx.replica.map_by_id(12).unwrap().unwrap();
        session.apply_map_detail(&mut map, &altis_detail(t(10), 5)).unwrap();

        let mut session = fx.session(IdentityPolicy::KeepId);
        session.apply_map_lights(1, &[]).unwrap();

        assert!(fx.replica.map_by_id(12).unwrap().is_none());
        assert!(fx.replica.layers_of(12).unwrap().is_empty());
        assert!(fx.replica.locations_of(12).unwrap().is_empty());
        assert_eq!(session.summary.maps_deleted, 1);
    }

    /// No duplicate scheduling: once a layer is scheduled in a run,
    /// another changed pass in the same run queues nothing new for it.
    #[test]
    fn a_layer_is_never_scheduled_twice_in_one_run() {
        let fx = Fixture::new("no-dup");
        fx.seed_game();
        let mut session = fx.session(IdentityPolicy::KeepId);

        session.apply_map_lights(1, &[altis_light(t(10))]).unwrap();
        let mut map = fx.replica.map_by_id(12).unwrap().unwrap();
        session.apply_map_detail(&mut map, &altis_detail(t(10), 5)).unwrap();
        // Same run, the layer changed again
        session.apply_map_detail(&mut map, &altis_detail(t(11), 7)).unwrap();

        let pending = fx.replica.queue().pending(WorkKind::MirrorLayer).unwrap();
        assert_eq!(pending.len(), 1);

        let layer = fx.replica.layer_by_id(101).unwrap().unwrap();
        assert_eq!(layer.max_zoom, 7);
    }

    /// Paper maps reconcile from their self-contained lights and queue
    /// downloads with the declared parent translated to a local id.
    #[test]
    fn paper_maps_queue_downloads_with_expected_parent() {
        let fx = Fixture::new("papermaps");
        fx.seed_game();
        let mut session = fx.session(IdentityPolicy::KeepId);

        session.apply_map_lights(1, &[altis_light(t(10))]).unwrap();
        let mut map = fx.replica.map_by_id(12).unwrap().unwrap();
        session.apply_map_detail(&mut map, &altis_detail(t(10), 5)).unwrap();

        let paper = RemotePaperMap {
            id: 3,
            name: "Altis 1:50000".into(),
            file_format: "PDF".into(),
            file_size: Some(1024),
            map_id: Some(12),
            download_uri: Some("games/1/papermaps/3/download".into()),
            last_change_utc: t(10),
        };
        session
            .apply_paper_maps(1, [(12, 12)].into_iter().collect(), &[paper])
            .unwrap();

        let pending = fx.replica.queue().pending(WorkKind::MirrorPaperMap).unwrap();
        assert_eq!(pending.len(), 1);
        let job: MirrorPaperMapJob = serde_json::from_str(&pending[0].data).unwrap();
        assert_eq!(job.expected_map_id, Some(12));
        assert_eq!(
            job.absolute_download_uri,
            "https://maps.example.com/api/games/1/papermaps/3/download"
        );
    }

    /// BusinessKey runs must fail loudly on layers instead of guessing
    /// a key.
    #[test]
    fn business_key_layers_raise_not_implemented() {
        let fx = Fixture::new("business-key");
        fx.seed_game();
        let mut session = fx.session(IdentityPolicy::BusinessKey);

        session.apply_map_lights(1, &[altis_light(t(10))]).unwrap();
        let maps = fx.replica.maps_of(1).unwrap();
        let mut map = maps.into_iter().next().unwrap();

        let err = session
            .apply_map_detail(&mut map, &altis_detail(t(10), 5))
            .unwrap_err();
        assert!(matches!(err, MirrorError::NotImplemented(_)));
    }
}
