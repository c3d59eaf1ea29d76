//! Artifact transport: streams a URL into a file while hashing it.
//!
//! `http(s)://` goes through reqwest, `file://` (and bare absolute paths) are
//! read straight from disk. Callers decide where the bytes land and what to do
//! with the digest; see [`crate::cache`].

use crate::error::{Error, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_BUFFER: usize = 64 * 1024;

/// Shared HTTP client for every fetch in one invocation
pub fn client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("kettle/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?;
    Ok(client)
}

/// Local path behind a `file://` URL or absolute path
pub fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        Some(PathBuf::from(path))
    } else if url.starts_with('/') {
        Some(PathBuf::from(url))
    } else {
        None
    }
}

/// Copy `url` into `dest`, returning the SHA-256 of what was written
pub async fn download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    progress: Option<&ProgressBar>,
) -> Result<String> {
    let mut out = fs::File::create(dest)
        .await
        .map_err(|source| cache_write(dest, source))?;
    let mut hasher = Sha256::new();
    let mut written: u64 = 0;

    if let Some(path) = local_path(url) {
        let mut file = fs::File::open(&path).await?;
        if let Some(pb) = progress {
            pb.set_length(file.metadata().await?.len());
        }
        let mut buffer = vec![0; READ_BUFFER];
        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            out.write_all(&buffer[..n])
                .await
                .map_err(|source| cache_write(dest, source))?;
            written += n as u64;
            if let Some(pb) = progress {
                pb.set_position(written);
            }
        }
    } else {
        let mut response = client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::NetworkError(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::NetworkError(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        if let Some(pb) = progress
            && let Some(total) = response.content_length()
        {
            pb.set_length(total);
        }

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::NetworkError(format!("{}: {}", url, e)))?
        {
            hasher.update(&chunk);
            out.write_all(&chunk)
                .await
                .map_err(|source| cache_write(dest, source))?;
            written += chunk.len() as u64;
            if let Some(pb) = progress {
                pb.set_position(written);
            }
        }
    }

    out.flush()
        .await
        .map_err(|source| cache_write(dest, source))?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of a file on disk, lowercase hex
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; READ_BUFFER];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn cache_write(path: &Path, source: std::io::Error) -> Error {
    Error::CacheWriteError {
        path: path.to_path_buf(),
        source,
    }
}

/// Progress bar for one download, or `None` when there is nowhere to draw it
pub fn progress_bar(multi: Option<&MultiProgress>, label: &str) -> Option<ProgressBar> {
    let multi = multi?;
    let pb = multi.add(ProgressBar::new(0));
    let style = ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(format!("⬇ {}", label));
    Some(pb)
}
