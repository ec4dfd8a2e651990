// src/fetch/mod.rs

pub mod zips;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, instrument};
use url::Url;

/// `dest` with `.part` appended to its file name.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Download `url` to `dest` unless `dest` already exists.
///
/// The body is streamed into `<dest>.part` and renamed into place once
/// complete, so `dest` only ever holds a finished download. No retries.
/// Returns `true` when a download happened.
#[instrument(level = "info", skip(client, dest), fields(dest = %dest.as_ref().display()))]
pub async fn download_archive(client: &Client, url: &str, dest: impl AsRef<Path>) -> Result<bool> {
    let dest = dest.as_ref();
    if dest.exists() {
        info!("archive already present; not downloading again");
        return Ok(false);
    }

    let url = Url::parse(url).with_context(|| format!("parsing source URL {}", url))?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {:?}", parent))?;
    }

    info!(%url, "downloading");
    let resp = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))?;

    let part = partial_path(dest);
    let mut file = fs::File::create(&part)
        .await
        .with_context(|| format!("creating {}", part.display()))?;
    let mut stream = resp.bytes_stream();
    let mut bytes = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("reading body from {}", url))?;
        file.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    fs::rename(&part, dest)
        .await
        .with_context(|| format!("moving {} into place", part.display()))?;
    info!(bytes, "download complete");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::{io::AsyncReadExt, net::TcpListener};

    /// Serve one HTTP response on a local port and return its URL.
    async fn serve_once(status: &'static str, body: &'static [u8]) -> Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            sock.write_all(head.as_bytes()).await.unwrap();
            sock.write_all(body).await.unwrap();
        });
        Ok(format!("http://{}/conjunto_de_datos_atus_anual_csv.zip", addr))
    }

    #[tokio::test]
    async fn existing_archive_is_not_fetched() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("inegi_atus.zip");
        std::fs::write(&dest, b"already here")?;
        // nothing listens on port 9; any request would fail
        let fetched = download_archive(&Client::new(), "http://127.0.0.1:9/x.zip", &dest).await?;
        assert!(!fetched);
        assert_eq!(std::fs::read(&dest)?, b"already here");
        Ok(())
    }

    #[tokio::test]
    async fn downloads_into_place() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("raw/inegi_atus.zip");
        let url = serve_once("200 OK", b"PK\x03\x04 zip bytes").await?;

        assert!(download_archive(&Client::new(), &url, &dest).await?);
        assert_eq!(std::fs::read(&dest)?, b"PK\x03\x04 zip bytes");
        assert!(!partial_path(&dest).exists());
        Ok(())
    }

    #[tokio::test]
    async fn error_status_leaves_no_archive() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("inegi_atus.zip");
        let url = serve_once("404 Not Found", b"missing").await?;

        assert!(download_archive(&Client::new(), &url, &dest).await.is_err());
        assert!(!dest.exists());
        Ok(())
    }

    #[test]
    fn partial_name() {
        assert_eq!(
            partial_path(Path::new("a/inegi_atus.zip")),
            PathBuf::from("a/inegi_atus.zip.part")
        );
    }
}
