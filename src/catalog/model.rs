/// JSON representations of remote catalog entities
///
/// The remote API serializes with camelCase field names and string
/// enums. `last_change_utc` is the only field the engine ever compares
/// for change detection - everything else is payload.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One game as listed by `GET {base}/games`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGame {
    pub id: i64,
    /// Stable short name (e.g. "arma3") - the business key for games
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub attribution: String,
    pub last_change_utc: DateTime<Utc>,
}

/// One map as listed by `GET {base}/games/{id}/maps`
///
/// Light form: just enough to match against the replica and decide
/// whether the detail document is worth fetching.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMapLight {
    pub id: i64,
    pub name: String,
    pub last_change_utc: DateTime<Utc>,
}

/// Full map document from `GET {base}/games/{gameId}/maps/{id}`,
/// including nested layers and locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMapDetail {
    pub id: i64,
    #[serde(default)]
    pub guid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub world_name: String,
    #[serde(default)]
    pub size_in_meters: f64,
    /// Relative URI of the preview image, if the map has one
    #[serde(default)]
    pub image_uri: Option<String>,
    pub last_change_utc: DateTime<Utc>,
    #[serde(default)]
    pub layers: Vec<RemoteLayer>,
    #[serde(default)]
    pub locations: Vec<RemoteLocation>,
}

/// One tile layer nested in a map detail document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLayer {
    pub id: i64,
    #[serde(default)]
    pub guid: Option<String>,
    /// Layer kind as a string enum ("Topographic", "Satellite", ...)
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub min_zoom: i64,
    #[serde(default)]
    pub max_zoom: i64,
    #[serde(default)]
    pub default_zoom: i64,
    #[serde(default)]
    pub tile_size: i64,
    #[serde(default = "one")]
    pub factor_x: f64,
    #[serde(default = "one")]
    pub factor_y: f64,
    #[serde(default)]
    pub is_default: bool,
    /// Relative URI of the tile archive for this layer
    #[serde(default)]
    pub download_uri: Option<String>,
    pub last_change_utc: DateTime<Utc>,
}

/// One point of interest nested in a map detail document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLocation {
    pub id: i64,
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub last_change_utc: DateTime<Utc>,
}

/// One paper map from `GET {base}/games/{id}/papermaps`
///
/// Paper maps are self-contained: the light listing carries everything,
/// there is no detail endpoint to fetch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePaperMap {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub file_format: String,
    #[serde(default)]
    pub file_size: Option<i64>,
    /// Remote id of the map this paper map belongs to, if any
    #[serde(default)]
    pub map_id: Option<i64>,
    #[serde(default)]
    pub download_uri: Option<String>,
    pub last_change_utc: DateTime<Utc>,
}

fn one() -> f64 {
    1.0
}
