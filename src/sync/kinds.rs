//! Matching and copy rules for each entity kind.
//!
//! Each kind gets one small rules value wired with its identity policy
//! and parent scope. KeepId compares remote and local ids directly;
//! BusinessKey compares a stable key and leaves local ids for the
//! store to assign.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::catalog::model::{
    RemoteGame, RemoteLayer, RemoteLocation, RemoteMapDetail, RemoteMapLight, RemotePaperMap,
};
use crate::error::{MirrorError, Result};
use crate::state::data::{Game, GameMap, IdentityPolicy, MapLayer, MapLocation, PaperMap};

use super::rules::ReconcileRules;

// ========== Games ==========

pub struct GameRules {
    pub policy: IdentityPolicy,
}

impl ReconcileRules for GameRules {
    type Remote = RemoteGame;
    type Local = Game;

    fn is_match(&self, remote: &RemoteGame, local: &Game) -> bool {
        match self.policy {
            IdentityPolicy::KeepId => remote.id == local.id,
            // The short name ("arma3") is stable across sources
            IdentityPolicy::BusinessKey => remote.name == local.name,
        }
    }

    fn copy(&self, remote: &RemoteGame, local: &mut Game) -> bool {
        if remote.last_change_utc == local.last_change_utc {
            return false;
        }
        local.name = remote.name.clone();
        local.title = remote.title.clone();
        local.attribution = remote.attribution.clone();
        local.last_change_utc = remote.last_change_utc;
        true
    }

    fn to_entity(&self, remote: &RemoteGame) -> Game {
        Game {
            id: keep_or_mint(self.policy, remote.id),
            name: remote.name.clone(),
            title: remote.title.clone(),
            attribution: remote.attribution.clone(),
            last_change_utc: remote.last_change_utc,
        }
    }

    fn local_id(&self, local: &Game) -> i64 {
        local.id
    }
}

// ========== Maps ==========

/// Maps reconcile from their light listing; the rest of the fields are
/// hydrated from the detail document afterwards (see `hydrate_map`).
///
/// The stored `last_change_utc` marks the stamp the map was last
/// *hydrated* at, so the light pass never writes it: only
/// `hydrate_map` advances it, once the detail (layers, locations,
/// scheduled downloads) has actually been applied. A detail fetch that
/// fails leaves the old stamp in place and the map stays due on the
/// next run.
pub struct MapRules {
    pub policy: IdentityPolicy,
    pub game_id: i64,
}

impl ReconcileRules for MapRules {
    type Remote = RemoteMapLight;
    type Local = GameMap;

    fn is_match(&self, remote: &RemoteMapLight, local: &GameMap) -> bool {
        match self.policy {
            IdentityPolicy::KeepId => remote.id == local.id,
            // The light listing carries no GUID, so the map name is the
            // business key within one game
            IdentityPolicy::BusinessKey => remote.name == local.name,
        }
    }

    fn copy(&self, remote: &RemoteMapLight, local: &mut GameMap) -> bool {
        if remote.last_change_utc == local.last_change_utc {
            return false;
        }
        // The stamp itself stays: it only advances in hydrate_map
        local.name = remote.name.clone();
        true
    }

    fn to_entity(&self, remote: &RemoteMapLight) -> GameMap {
        GameMap {
            id: keep_or_mint(self.policy, remote.id),
            game_id: self.game_id,
            guid: String::new(),
            name: remote.name.clone(),
            world_name: String::new(),
            size_in_meters: 0.0,
            image_path: None,
            // Never-hydrated marker: any real remote stamp differs
            last_change_utc: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn local_id(&self, local: &GameMap) -> i64 {
        local.id
    }
}

/// Fill in the fields only the detail document carries.
pub fn hydrate_map(map: &mut GameMap, detail: &RemoteMapDetail) {
    if let Some(guid) = &detail.guid {
        map.guid = guid.clone();
    }
    map.name = detail.name.clone();
    map.world_name = detail.world_name.clone();
    map.size_in_meters = detail.size_in_meters;
    map.last_change_utc = detail.last_change_utc;
}

// ========== Layers ==========

#[derive(Debug)]
pub struct LayerRules {
    policy: IdentityPolicy,
    pub map_id: i64,
}

impl LayerRules {
    /// BusinessKey matching for layers is deliberately unimplemented:
    /// there is no agreed stable key yet (the layer GUID is the
    /// candidate), and guessing one would silently mis-merge tile sets.
    pub fn new(policy: IdentityPolicy, map_id: i64) -> Result<Self> {
        if policy == IdentityPolicy::BusinessKey {
            return Err(MirrorError::NotImplemented(
                "layer business-key matching (run without --business-key, or define a stable layer key)",
            ));
        }
        Ok(LayerRules { policy, map_id })
    }
}

impl ReconcileRules for LayerRules {
    type Remote = RemoteLayer;
    type Local = MapLayer;

    fn is_match(&self, remote: &RemoteLayer, local: &MapLayer) -> bool {
        // Only KeepId can get here, see LayerRules::new
        remote.id == local.id
    }

    fn copy(&self, remote: &RemoteLayer, local: &mut MapLayer) -> bool {
        if remote.last_change_utc == local.last_change_utc {
            return false;
        }
        if let Some(guid) = &remote.guid {
            local.guid = guid.clone();
        }
        local.kind = remote.kind.clone();
        local.format = remote.format.clone();
        local.min_zoom = remote.min_zoom;
        local.max_zoom = remote.max_zoom;
        local.default_zoom = remote.default_zoom;
        local.tile_size = remote.tile_size;
        local.factor_x = remote.factor_x;
        local.factor_y = remote.factor_y;
        local.is_default = remote.is_default;
        local.last_change_utc = remote.last_change_utc;
        true
    }

    fn to_entity(&self, remote: &RemoteLayer) -> MapLayer {
        MapLayer {
            id: keep_or_mint(self.policy, remote.id),
            map_id: self.map_id,
            guid: remote.guid.clone().unwrap_or_default(),
            kind: remote.kind.clone(),
            format: remote.format.clone(),
            min_zoom: remote.min_zoom,
            max_zoom: remote.max_zoom,
            default_zoom: remote.default_zoom,
            tile_size: remote.tile_size,
            factor_x: remote.factor_x,
            factor_y: remote.factor_y,
            is_default: remote.is_default,
            last_change_utc: remote.last_change_utc,
        }
    }

    fn wants_download(&self, remote: &RemoteLayer) -> bool {
        remote.download_uri.is_some()
    }

    fn local_id(&self, local: &MapLayer) -> i64 {
        local.id
    }
}

// ========== Locations ==========

pub struct LocationRules {
    pub policy: IdentityPolicy,
    pub map_id: i64,
}

impl ReconcileRules for LocationRules {
    type Remote = RemoteLocation;
    type Local = MapLocation;

    fn is_match(&self, remote: &RemoteLocation, local: &MapLocation) -> bool {
        match self.policy {
            IdentityPolicy::KeepId => remote.id == local.id,
            IdentityPolicy::BusinessKey => match &remote.guid {
                Some(guid) if !local.guid.is_empty() => guid == &local.guid,
                _ => remote.name == local.name && remote.kind == local.kind,
            },
        }
    }

    fn copy(&self, remote: &RemoteLocation, local: &mut MapLocation) -> bool {
        if remote.last_change_utc == local.last_change_utc {
            return false;
        }
        if let Some(guid) = &remote.guid {
            local.guid = guid.clone();
        }
        local.kind = remote.kind.clone();
        local.name = remote.name.clone();
        local.x = remote.x;
        local.y = remote.y;
        local.last_change_utc = remote.last_change_utc;
        true
    }

    fn to_entity(&self, remote: &RemoteLocation) -> MapLocation {
        MapLocation {
            id: keep_or_mint(self.policy, remote.id),
            map_id: self.map_id,
            guid: remote.guid.clone().unwrap_or_default(),
            kind: remote.kind.clone(),
            name: remote.name.clone(),
            x: remote.x,
            y: remote.y,
            last_change_utc: remote.last_change_utc,
        }
    }

    fn local_id(&self, local: &MapLocation) -> i64 {
        local.id
    }
}

// ========== Paper maps ==========

pub struct PaperMapRules {
    pub policy: IdentityPolicy,
    pub game_id: i64,
    /// Remote map id -> local map id, built during the maps pass of the
    /// same game. Identity under KeepId, a real translation under
    /// BusinessKey.
    pub map_ids: HashMap<i64, i64>,
}

impl PaperMapRules {
    fn local_map_id(&self, remote_map_id: Option<i64>) -> Option<i64> {
        remote_map_id.and_then(|id| self.map_ids.get(&id).copied())
    }
}

impl ReconcileRules for PaperMapRules {
    type Remote = RemotePaperMap;
    type Local = PaperMap;

    fn is_match(&self, remote: &RemotePaperMap, local: &PaperMap) -> bool {
        match self.policy {
            IdentityPolicy::KeepId => remote.id == local.id,
            IdentityPolicy::BusinessKey => remote.name == local.name,
        }
    }

    fn copy(&self, remote: &RemotePaperMap, local: &mut PaperMap) -> bool {
        if remote.last_change_utc == local.last_change_utc {
            return false;
        }
        local.map_id = self.local_map_id(remote.map_id);
        local.name = remote.name.clone();
        local.file_format = remote.file_format.clone();
        local.file_size = remote.file_size;
        local.last_change_utc = remote.last_change_utc;
        true
    }

    fn to_entity(&self, remote: &RemotePaperMap) -> PaperMap {
        PaperMap {
            id: keep_or_mint(self.policy, remote.id),
            game_id: self.game_id,
            map_id: self.local_map_id(remote.map_id),
            name: remote.name.clone(),
            file_format: remote.file_format.clone(),
            file_size: remote.file_size,
            last_change_utc: remote.last_change_utc,
        }
    }

    fn wants_download(&self, remote: &RemotePaperMap) -> bool {
        remote.download_uri.is_some()
    }

    fn local_id(&self, local: &PaperMap) -> i64 {
        local.id
    }
}

fn keep_or_mint(policy: IdentityPolicy, remote_id: i64) -> i64 {
    match policy {
        IdentityPolicy::KeepId => remote_id,
        IdentityPolicy::BusinessKey => 0,
    }
}
