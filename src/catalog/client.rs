use std::path::Path;

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::error::{MirrorError, Result};

use super::model::{RemoteGame, RemoteMapDetail, RemoteMapLight, RemotePaperMap};

/// HTTP client for the remote catalog.
///
/// All calls are sequential - the remote source is a single trusted
/// endpoint and simplicity beats throughput here. No retry or backoff:
/// a failed download surfaces on its work item and a later drain pass
/// picks it up again.
pub struct CatalogClient {
    http: Client,
    base: Url,
}

impl CatalogClient {
    /// Create a client for the given catalog base address.
    /// A trailing slash is enforced so relative joins behave.
    pub fn new(base: Url) -> Result<Self> {
        let base = if base.path().ends_with('/') {
            base
        } else {
            let mut b = base;
            b.set_path(&format!("{}/", b.path()));
            b
        };

        let http = Client::builder()
            .user_agent(concat!("map-mirror/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(CatalogClient { http, base })
    }

    /// Resolve a relative download URI from a light entity into an
    /// absolute URL against the catalog base address.
    pub fn resolve(&self, relative: &str) -> Result<String> {
        let url = self
            .base
            .join(relative)
            .map_err(|e| MirrorError::Structural(format!("bad download uri '{relative}': {e}")))?;
        Ok(url.to_string())
    }

    /// `GET {base}/games` - light list of every game in the catalog
    pub async fn games(&self) -> Result<Vec<RemoteGame>> {
        self.get_json("games").await
    }

    /// `GET {base}/games/{id}/maps` - light list of one game's maps
    pub async fn maps(&self, game_id: i64) -> Result<Vec<RemoteMapLight>> {
        self.get_json(&format!("games/{game_id}/maps")).await
    }

    /// `GET {base}/games/{gameId}/maps/{id}` - full map detail,
    /// including nested layers and locations
    pub async fn map_detail(&self, game_id: i64, map_id: i64) -> Result<RemoteMapDetail> {
        self.get_json(&format!("games/{game_id}/maps/{map_id}")).await
    }

    /// `GET {base}/games/{id}/papermaps` - self-contained light list
    pub async fn paper_maps(&self, game_id: i64) -> Result<Vec<RemotePaperMap>> {
        self.get_json(&format!("games/{game_id}/papermaps")).await
    }

    /// Fetch a small binary payload (preview images) into memory.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        Self::check_status(url, response.status())?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Download a (possibly large) binary payload straight to a file,
    /// chunk by chunk - tile archives do not fit in memory comfortably.
    /// Returns the number of bytes written.
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.http.get(url).send().await?;
        Self::check_status(url, response.status())?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Stream into a temp file and rename once complete: an
        // interrupted download never leaves a truncated file at the
        // final path, so the export only ever sees settled assets.
        let tmp = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&tmp).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, dest).await?;

        Ok(written)
    }

    /// Fetch and decode one JSON document. The body is parsed with
    /// serde_json directly so that a malformed payload surfaces as a
    /// structural error, not a generic transport error.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self
            .base
            .join(path)
            .map_err(|e| MirrorError::Structural(format!("bad catalog path '{path}': {e}")))?;

        let response = self.http.get(url.clone()).send().await?;
        Self::check_status(url.as_str(), response.status())?;

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// 4xx means the catalog disagrees with the replica about what
    /// exists - structural, the run must stop. 5xx is the remote
    /// having a bad moment: transient, isolated to the entity or work
    /// item in flight, retried by a later run.
    fn check_status(url: &str, status: StatusCode) -> Result<()> {
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(MirrorError::Structural(format!(
                "remote catalog has no resource at {url}"
            )));
        }
        if status.is_client_error() {
            return Err(MirrorError::Structural(format!(
                "remote catalog refused {url}: {status}"
            )));
        }
        Err(MirrorError::Unavailable(status.as_u16(), url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    /// Serve one canned HTTP response on a loopback port, then hang up.
    async fn serve_once(status_line: &'static str, body: &'static [u8]) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/tiles.zip")
    }

    #[test]
    fn resolve_joins_relative_uris_against_the_base() {
        let client = CatalogClient::new(Url::parse("https://maps.example.com/api").unwrap()).unwrap();
        let url = client.resolve("games/1/maps/12/101/tiles.zip").unwrap();
        assert_eq!(url, "https://maps.example.com/api/games/1/maps/12/101/tiles.zip");
    }

    #[test]
    fn resolve_keeps_absolute_uris_untouched() {
        let client = CatalogClient::new(Url::parse("https://maps.example.com/api/").unwrap()).unwrap();
        let url = client.resolve("https://cdn.example.com/tiles.zip").unwrap();
        assert_eq!(url, "https://cdn.example.com/tiles.zip");
    }

    #[test]
    fn server_errors_are_transient_but_client_errors_are_structural() {
        let err = CatalogClient::check_status("u", StatusCode::BAD_GATEWAY).unwrap_err();
        assert!(matches!(err, MirrorError::Unavailable(502, _)));
        assert!(!err.is_structural());

        assert!(CatalogClient::check_status("u", StatusCode::NOT_FOUND)
            .unwrap_err()
            .is_structural());
        assert!(CatalogClient::check_status("u", StatusCode::FORBIDDEN)
            .unwrap_err()
            .is_structural());
    }

    #[tokio::test]
    async fn download_lands_complete_files_with_no_temp_leftover() {
        let body = b"PK\x03\x04-pretend-tile-archive";
        let url = serve_once("HTTP/1.1 200 OK", body).await;

        let dir = std::env::temp_dir().join(format!("map-mirror-dl-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let dest = dir.join("12/101/tiles.zip");

        let client = CatalogClient::new(Url::parse("https://maps.example.com/api/").unwrap()).unwrap();
        let written = client.download_to(&url, &dest).await.unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!dest.with_extension("part").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn a_refused_download_leaves_nothing_behind() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable", b"").await;

        let dir = std::env::temp_dir().join(format!("map-mirror-dl503-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let dest = dir.join("tiles.zip");

        let client = CatalogClient::new(Url::parse("https://maps.example.com/api/").unwrap()).unwrap();
        let err = client.download_to(&url, &dest).await.unwrap_err();

        assert!(matches!(err, MirrorError::Unavailable(503, _)));
        assert!(!dest.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
