use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Blob store for mirrored binaries, addressed by logical path.
///
/// Logical paths follow the catalog hierarchy:
/// `{gameId}/maps/{mapId}/{layerId}/{z}/{x}/{y}.ext` for tiles,
/// `{gameId}/papermaps/{paperMapId}.pdf` for paper maps. The engine
/// and the workers only ever move whole blobs through this store,
/// never individual pixels.
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(AssetStore {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute filesystem path for a logical path.
    pub fn path_of(&self, logical: &str) -> PathBuf {
        self.root.join(logical)
    }

    /// Write a blob, creating parent directories and overwriting any
    /// previous content (workers rely on overwrite being safe).
    pub fn store(&self, logical: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_of(logical);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn exists(&self, logical: &str) -> bool {
        self.path_of(logical).exists()
    }

    /// Remove a blob or a whole subtree. A missing target is fine -
    /// deletion is called for entities that may never have downloaded.
    pub fn delete(&self, logical: &str) -> Result<()> {
        let path = self.path_of(logical);
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else if path.is_file() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

// ========== Logical path helpers ==========

pub fn game_dir(game_id: i64) -> String {
    format!("{game_id}")
}

pub fn map_dir(game_id: i64, map_id: i64) -> String {
    format!("{game_id}/maps/{map_id}")
}

pub fn layer_dir(game_id: i64, map_id: i64, layer_id: i64) -> String {
    format!("{game_id}/maps/{map_id}/{layer_id}")
}

/// Where a layer's downloaded tile archive lands before unpacking
pub fn layer_archive(game_id: i64, map_id: i64, layer_id: i64) -> String {
    format!("{game_id}/maps/{map_id}/{layer_id}/tiles.zip")
}

pub fn paper_map_path(game_id: i64, paper_map_id: i64, file_format: &str) -> String {
    let ext = if file_format.is_empty() {
        "pdf".to_string()
    } else {
        file_format.to_lowercase()
    };
    format!("{game_id}/papermaps/{paper_map_id}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store(tag: &str) -> AssetStore {
        let root = std::env::temp_dir().join(format!("map-mirror-assets-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        AssetStore::new(&root).unwrap()
    }

    #[test]
    fn store_creates_parents_and_overwrites() {
        let store = scratch_store("overwrite");
        let logical = layer_archive(1, 12, 101);

        store.store(&logical, b"first").unwrap();
        store.store(&logical, b"second").unwrap();

        assert_eq!(fs::read(store.path_of(&logical)).unwrap(), b"second");
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn delete_removes_subtrees_and_tolerates_missing_paths() {
        let store = scratch_store("delete");
        store.store("1/maps/12/101/0/0/0.png", b"tile").unwrap();

        store.delete(&map_dir(1, 12)).unwrap();
        assert!(!store.exists("1/maps/12/101/0/0/0.png"));

        // Deleting again is a no-op
        store.delete(&map_dir(1, 12)).unwrap();
        let _ = fs::remove_dir_all(store.root());
    }
}
