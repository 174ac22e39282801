/// Shared data structures for the local replica
///
/// These structs represent the data model that flows between
/// the database layer and the reconciliation engine.

use chrono::{DateTime, Utc};

/// How remote entities are matched against local ones.
///
/// Fixed per mirror configuration - the two policies are never mixed
/// within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityPolicy {
    /// Local ids are the remote ids (private 1:1 replica)
    KeepId,
    /// Local ids are minted locally; matching uses a stable business
    /// key (name or GUID). Required when several remote sources feed
    /// one local dataset.
    BusinessKey,
}

/// A game, the top level of the catalog hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    /// Local database id (equals the remote id under KeepId)
    pub id: i64,
    /// Stable short name (e.g. "arma3") - the business key for games
    pub name: String,
    pub title: String,
    pub attribution: String,
    /// Used purely for change detection, never interpreted
    pub last_change_utc: DateTime<Utc>,
}

/// A game map. Owns layers and locations.
#[derive(Debug, Clone, PartialEq)]
pub struct GameMap {
    pub id: i64,
    pub game_id: i64,
    /// Stable GUID from the detail document (light listings carry none,
    /// so BusinessKey matching for maps uses the name)
    pub guid: String,
    pub name: String,
    pub world_name: String,
    pub size_in_meters: f64,
    /// Logical asset path of the cached preview image, if downloaded
    pub image_path: Option<String>,
    pub last_change_utc: DateTime<Utc>,
}

/// A tile layer of a map. Carries a bulk binary payload (the tile
/// archive), so reconciling one schedules a MirrorLayer work item.
#[derive(Debug, Clone, PartialEq)]
pub struct MapLayer {
    pub id: i64,
    pub map_id: i64,
    pub guid: String,
    pub kind: String,
    pub format: String,
    pub min_zoom: i64,
    pub max_zoom: i64,
    pub default_zoom: i64,
    pub tile_size: i64,
    pub factor_x: f64,
    pub factor_y: f64,
    pub is_default: bool,
    pub last_change_utc: DateTime<Utc>,
}

/// A named point of interest on a map
#[derive(Debug, Clone, PartialEq)]
pub struct MapLocation {
    pub id: i64,
    pub map_id: i64,
    pub guid: String,
    pub kind: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub last_change_utc: DateTime<Utc>,
}

/// A printable paper map (PDF). Carries a bulk binary payload, so
/// reconciling one schedules a MirrorPaperMap work item.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperMap {
    pub id: i64,
    pub game_id: i64,
    /// Declared parent map (local id), verified by the download worker
    pub map_id: Option<i64>,
    pub name: String,
    pub file_format: String,
    pub file_size: Option<i64>,
    pub last_change_utc: DateTime<Utc>,
}
