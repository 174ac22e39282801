use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;

use super::data::{Game, GameMap, MapLayer, MapLocation, PaperMap};

/// The Replica manages the local SQLite state store.
/// It holds every mirrored entity plus the background work queue, and
/// the database file doubles as the snapshot that makes runs resumable.
pub struct Replica {
    conn: Connection,
    db_path: PathBuf,
}

impl Replica {
    /// Open (or create) the replica database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        println!("📁 Replica database at: {}", db_path.display());

        let replica = Replica {
            conn,
            db_path: db_path.to_path_buf(),
        };
        replica.init_schema()?;

        Ok(replica)
    }

    /// In-memory replica for tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let replica = Replica {
            conn: Connection::open_in_memory()?,
            db_path: PathBuf::from(":memory:"),
        };
        replica.init_schema()?;
        Ok(replica)
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(&self) -> Result<()> {
        // Cascading deletes keep a map's layers and locations in step
        // with the map row itself
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS games (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL UNIQUE,
                title           TEXT NOT NULL DEFAULT '',
                attribution     TEXT NOT NULL DEFAULT '',
                last_change_utc TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS maps (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id         INTEGER NOT NULL,
                guid            TEXT NOT NULL DEFAULT '',
                name            TEXT NOT NULL,
                world_name      TEXT NOT NULL DEFAULT '',
                size_in_meters  REAL NOT NULL DEFAULT 0,
                image_path      TEXT,
                last_change_utc TEXT NOT NULL,
                FOREIGN KEY(game_id) REFERENCES games(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS layers (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                map_id          INTEGER NOT NULL,
                guid            TEXT NOT NULL DEFAULT '',
                kind            TEXT NOT NULL DEFAULT '',
                format          TEXT NOT NULL DEFAULT '',
                min_zoom        INTEGER NOT NULL DEFAULT 0,
                max_zoom        INTEGER NOT NULL DEFAULT 0,
                default_zoom    INTEGER NOT NULL DEFAULT 0,
                tile_size       INTEGER NOT NULL DEFAULT 256,
                factor_x        REAL NOT NULL DEFAULT 1,
                factor_y        REAL NOT NULL DEFAULT 1,
                is_default      INTEGER NOT NULL DEFAULT 0,
                last_change_utc TEXT NOT NULL,
                FOREIGN KEY(map_id) REFERENCES maps(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS locations (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                map_id          INTEGER NOT NULL,
                guid            TEXT NOT NULL DEFAULT '',
                kind            TEXT NOT NULL DEFAULT '',
                name            TEXT NOT NULL,
                x               REAL NOT NULL DEFAULT 0,
                y               REAL NOT NULL DEFAULT 0,
                last_change_utc TEXT NOT NULL,
                FOREIGN KEY(map_id) REFERENCES maps(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS paper_maps (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id         INTEGER NOT NULL,
                map_id          INTEGER,
                name            TEXT NOT NULL,
                file_format     TEXT NOT NULL DEFAULT '',
                file_size       INTEGER,
                last_change_utc TEXT NOT NULL,
                FOREIGN KEY(game_id) REFERENCES games(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS work_items (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                kind              TEXT NOT NULL,
                state             TEXT NOT NULL DEFAULT 'Pending',
                data              TEXT NOT NULL,
                created_utc       TEXT NOT NULL,
                started_utc       TEXT,
                finished_utc      TEXT,
                error             TEXT,
                target_entity_id  INTEGER
            )",
            [],
        )?;

        // Fast lookups for the drain loop and the parent-scope queries
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_work_items_state
             ON work_items(state, kind)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_maps_game_id ON maps(game_id)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_layers_map_id ON layers(map_id)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_locations_map_id ON locations(map_id)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_paper_maps_game_id ON paper_maps(game_id)",
            [],
        )?;

        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    // ========== Games ==========

    pub fn games(&self) -> Result<Vec<Game>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, title, attribution, last_change_utc FROM games ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::row_to_game)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Insert a game. An id of 0 means "let SQLite assign one"
    /// (BusinessKey policy); any other id is kept as-is (KeepId).
    /// Returns the local id.
    pub fn insert_game(&self, game: &Game) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO games (id, name, title, attribution, last_change_utc)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Self::id_or_null(game.id),
                game.name,
                game.title,
                game.attribution,
                game.last_change_utc
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_game(&self, game: &Game) -> Result<()> {
        self.conn.execute(
            "UPDATE games SET name = ?2, title = ?3, attribution = ?4, last_change_utc = ?5
             WHERE id = ?1",
            params![
                game.id,
                game.name,
                game.title,
                game.attribution,
                game.last_change_utc
            ],
        )?;
        Ok(())
    }

    /// Remove a game. Maps, layers, locations and paper maps cascade.
    pub fn delete_game(&self, game_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM games WHERE id = ?1", params![game_id])?;
        Ok(())
    }

    // ========== Maps ==========

    pub fn maps_of(&self, game_id: i64) -> Result<Vec<GameMap>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, game_id, guid, name, world_name, size_in_meters, image_path, last_change_utc
             FROM maps WHERE game_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([game_id], Self::row_to_map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn map_by_id(&self, map_id: i64) -> Result<Option<GameMap>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, game_id, guid, name, world_name, size_in_meters, image_path, last_change_utc
             FROM maps WHERE id = ?1",
        )?;
        Ok(stmt.query_row([map_id], Self::row_to_map).optional()?)
    }

    pub fn insert_map(&self, map: &GameMap) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO maps (id, game_id, guid, name, world_name, size_in_meters, image_path, last_change_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Self::id_or_null(map.id),
                map.game_id,
                map.guid,
                map.name,
                map.world_name,
                map.size_in_meters,
                map.image_path,
                map.last_change_utc
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_map(&self, map: &GameMap) -> Result<()> {
        self.conn.execute(
            "UPDATE maps SET guid = ?2, name = ?3, world_name = ?4, size_in_meters = ?5,
                             image_path = ?6, last_change_utc = ?7
             WHERE id = ?1",
            params![
                map.id,
                map.guid,
                map.name,
                map.world_name,
                map.size_in_meters,
                map.image_path,
                map.last_change_utc
            ],
        )?;
        Ok(())
    }

    /// Remove a map. Its layers and locations cascade.
    pub fn delete_map(&self, map_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM maps WHERE id = ?1", params![map_id])?;
        Ok(())
    }

    // ========== Layers ==========

    pub fn layers_of(&self, map_id: i64) -> Result<Vec<MapLayer>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, map_id, guid, kind, format, min_zoom, max_zoom, default_zoom,
                    tile_size, factor_x, factor_y, is_default, last_change_utc
             FROM layers WHERE map_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([map_id], Self::row_to_layer)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn layer_by_id(&self, layer_id: i64) -> Result<Option<MapLayer>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, map_id, guid, kind, format, min_zoom, max_zoom, default_zoom,
                    tile_size, factor_x, factor_y, is_default, last_change_utc
             FROM layers WHERE id = ?1",
        )?;
        Ok(stmt.query_row([layer_id], Self::row_to_layer).optional()?)
    }

    pub fn insert_layer(&self, layer: &MapLayer) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO layers (id, map_id, guid, kind, format, min_zoom, max_zoom, default_zoom,
                                 tile_size, factor_x, factor_y, is_default, last_change_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                Self::id_or_null(layer.id),
                layer.map_id,
                layer.guid,
                layer.kind,
                layer.format,
                layer.min_zoom,
                layer.max_zoom,
                layer.default_zoom,
                layer.tile_size,
                layer.factor_x,
                layer.factor_y,
                layer.is_default,
                layer.last_change_utc
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_layer(&self, layer: &MapLayer) -> Result<()> {
        self.conn.execute(
            "UPDATE layers SET guid = ?2, kind = ?3, format = ?4, min_zoom = ?5, max_zoom = ?6,
                               default_zoom = ?7, tile_size = ?8, factor_x = ?9, factor_y = ?10,
                               is_default = ?11, last_change_utc = ?12
             WHERE id = ?1",
            params![
                layer.id,
                layer.guid,
                layer.kind,
                layer.format,
                layer.min_zoom,
                layer.max_zoom,
                layer.default_zoom,
                layer.tile_size,
                layer.factor_x,
                layer.factor_y,
                layer.is_default,
                layer.last_change_utc
            ],
        )?;
        Ok(())
    }

    pub fn delete_layer(&self, layer_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM layers WHERE id = ?1", params![layer_id])?;
        Ok(())
    }

    // ========== Locations ==========

    pub fn locations_of(&self, map_id: i64) -> Result<Vec<MapLocation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, map_id, guid, kind, name, x, y, last_change_utc
             FROM locations WHERE map_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([map_id], Self::row_to_location)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn insert_location(&self, location: &MapLocation) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO locations (id, map_id, guid, kind, name, x, y, last_change_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Self::id_or_null(location.id),
                location.map_id,
                location.guid,
                location.kind,
                location.name,
                location.x,
                location.y,
                location.last_change_utc
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_location(&self, location: &MapLocation) -> Result<()> {
        self.conn.execute(
            "UPDATE locations SET guid = ?2, kind = ?3, name = ?4, x = ?5, y = ?6, last_change_utc = ?7
             WHERE id = ?1",
            params![
                location.id,
                location.guid,
                location.kind,
                location.name,
                location.x,
                location.y,
                location.last_change_utc
            ],
        )?;
        Ok(())
    }

    pub fn delete_location(&self, location_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM locations WHERE id = ?1", params![location_id])?;
        Ok(())
    }

    // ========== Paper maps ==========

    pub fn paper_maps_of(&self, game_id: i64) -> Result<Vec<PaperMap>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, game_id, map_id, name, file_format, file_size, last_change_utc
             FROM paper_maps WHERE game_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([game_id], Self::row_to_paper_map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn paper_map_by_id(&self, paper_map_id: i64) -> Result<Option<PaperMap>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, game_id, map_id, name, file_format, file_size, last_change_utc
             FROM paper_maps WHERE id = ?1",
        )?;
        Ok(stmt
            .query_row([paper_map_id], Self::row_to_paper_map)
            .optional()?)
    }

    pub fn insert_paper_map(&self, paper: &PaperMap) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO paper_maps (id, game_id, map_id, name, file_format, file_size, last_change_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Self::id_or_null(paper.id),
                paper.game_id,
                paper.map_id,
                paper.name,
                paper.file_format,
                paper.file_size,
                paper.last_change_utc
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_paper_map(&self, paper: &PaperMap) -> Result<()> {
        self.conn.execute(
            "UPDATE paper_maps SET map_id = ?2, name = ?3, file_format = ?4, file_size = ?5,
                                   last_change_utc = ?6
             WHERE id = ?1",
            params![
                paper.id,
                paper.map_id,
                paper.name,
                paper.file_format,
                paper.file_size,
                paper.last_change_utc
            ],
        )?;
        Ok(())
    }

    pub fn delete_paper_map(&self, paper_map_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM paper_maps WHERE id = ?1", params![paper_map_id])?;
        Ok(())
    }

    // ========== Row mapping ==========

    fn id_or_null(id: i64) -> Option<i64> {
        if id == 0 {
            None
        } else {
            Some(id)
        }
    }

    fn row_to_game(row: &Row) -> rusqlite::Result<Game> {
        Ok(Game {
            id: row.get(0)?,
            name: row.get(1)?,
            title: row.get(2)?,
            attribution: row.get(3)?,
            last_change_utc: row.get(4)?,
        })
    }

    fn row_to_map(row: &Row) -> rusqlite::Result<GameMap> {
        Ok(GameMap {
            id: row.get(0)?,
            game_id: row.get(1)?,
            guid: row.get(2)?,
            name: row.get(3)?,
            world_name: row.get(4)?,
            size_in_meters: row.get(5)?,
            image_path: row.get(6)?,
            last_change_utc: row.get(7)?,
        })
    }

    fn row_to_layer(row: &Row) -> rusqlite::Result<MapLayer> {
        Ok(MapLayer {
            id: row.get(0)?,
            map_id: row.get(1)?,
            guid: row.get(2)?,
            kind: row.get(3)?,
            format: row.get(4)?,
            min_zoom: row.get(5)?,
            max_zoom: row.get(6)?,
            default_zoom: row.get(7)?,
            tile_size: row.get(8)?,
            factor_x: row.get(9)?,
            factor_y: row.get(10)?,
            is_default: row.get(11)?,
            last_change_utc: row.get(12)?,
        })
    }

    fn row_to_location(row: &Row) -> rusqlite::Result<MapLocation> {
        Ok(MapLocation {
            id: row.get(0)?,
            map_id: row.get(1)?,
            guid: row.get(2)?,
            kind: row.get(3)?,
            name: row.get(4)?,
            x: row.get(5)?,
            y: row.get(6)?,
            last_change_utc: row.get(7)?,
        })
    }

    fn row_to_paper_map(row: &Row) -> rusqlite::Result<PaperMap> {
        Ok(PaperMap {
            id: row.get(0)?,
            game_id: row.get(1)?,
            map_id: row.get(2)?,
            name: row.get(3)?,
            file_format: row.get(4)?,
            file_size: row.get(5)?,
            last_change_utc: row.get(6)?,
        })
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    fn sample_game(id: i64) -> Game {
        Game {
            id,
            name: "arma3".into(),
            title: "Arma 3".into(),
            attribution: "© Bohemia Interactive".into(),
            last_change_utc: t(10),
        }
    }

    fn sample_map(id: i64, game_id: i64) -> GameMap {
        GameMap {
            id,
            game_id,
            guid: "0a1b2c3d".into(),
            name: "altis".into(),
            world_name: "Altis".into(),
            size_in_meters: 30720.0,
            image_path: None,
            last_change_utc: t(10),
        }
    }

    #[test]
    fn keep_id_insert_preserves_the_remote_id() {
        let replica = Replica::open_in_memory().unwrap();
        let id = replica.insert_game(&sample_game(42)).unwrap();
        assert_eq!(id, 42);
    }

    #[test]
    fn business_key_insert_assigns_a_local_id() {
        let replica = Replica::open_in_memory().unwrap();
        let id = replica.insert_game(&sample_game(0)).unwrap();
        assert!(id > 0);
    }

    #[test]
    fn deleting_a_map_cascades_to_layers_and_locations() {
        let replica = Replica::open_in_memory().unwrap();
        replica.insert_game(&sample_game(1)).unwrap();
        replica.insert_map(&sample_map(12, 1)).unwrap();
        replica
            .insert_layer(&MapLayer {
                id: 101,
                map_id: 12,
                guid: "layer-guid".into(),
                kind: "Topographic".into(),
                format: "PngAndWebp".into(),
                min_zoom: 0,
                max_zoom: 5,
                default_zoom: 2,
                tile_size: 256,
                factor_x: 1.0,
                factor_y: 1.0,
                is_default: true,
                last_change_utc: t(10),
            })
            .unwrap();
        replica
            .insert_location(&MapLocation {
                id: 7,
                map_id: 12,
                guid: "loc-guid".into(),
                kind: "City".into(),
                name: "Kavala".into(),
                x: 3500.0,
                y: 13300.0,
                last_change_utc: t(10),
            })
            .unwrap();

        replica.delete_map(12).unwrap();

        assert!(replica.map_by_id(12).unwrap().is_none());
        assert!(replica.layers_of(12).unwrap().is_empty());
        assert!(replica.locations_of(12).unwrap().is_empty());
    }

    #[test]
    fn timestamps_round_trip_through_sqlite() {
        let replica = Replica::open_in_memory().unwrap();
        replica.insert_game(&sample_game(1)).unwrap();
        let map = sample_map(12, 1);
        replica.insert_map(&map).unwrap();

        let loaded = replica.map_by_id(12).unwrap().unwrap();
        assert_eq!(loaded.last_change_utc, map.last_change_utc);
    }
}
