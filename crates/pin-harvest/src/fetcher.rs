//! Single-asset HTTP download with image validation.
//!
//! Downloads never raise: every failure is logged and reported as `false`
//! so the caller can move on to the next candidate.

use std::path::{Path, PathBuf};

use reqwest::header::{HeaderMap, HeaderValue, REFERER};

use crate::config::FetchOptions;
use crate::types::{HarvestError, HarvestResult};

#[derive(thiserror::Error, Debug)]
enum FetchFailure {
    #[error("unexpected status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("payload is not a decodable image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("could not write file: {0}")]
    Write(#[from] std::io::Error),
}

/// Downloads one asset at a time into a destination directory.
#[derive(Clone)]
pub struct AssetFetcher {
    client: reqwest::Client,
}

impl AssetFetcher {
    /// Build a fetcher, routing through `options.proxy_url` when set.
    pub fn new(options: &FetchOptions) -> HarvestResult<Self> {
        let mut headers = HeaderMap::new();
        let referer = HeaderValue::from_str(&options.referer)
            .map_err(|e| HarvestError::InvalidConfig(format!("referer header: {e}")))?;
        headers.insert(REFERER, referer);

        let mut builder = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.as_str())
            .default_headers(headers);

        // Environment proxies are ignored; only the configured one applies.
        builder = match &options.proxy_url {
            Some(proxy) => builder.proxy(reqwest::Proxy::all(proxy.as_str())?),
            None => builder.no_proxy(),
        };

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Fetch `url` into `dest_dir`, naming the file `file_name` or the URL's
    /// last path segment.
    ///
    /// An existing file at the destination counts as success without any
    /// network traffic.
    pub async fn fetch(&self, url: &str, dest_dir: &Path, file_name: Option<&str>) -> bool {
        let name = match file_name.map(str::to_string).or_else(|| file_name_from_url(url)) {
            Some(name) if is_plain_file_name(&name) => name,
            _ => {
                tracing::warn!("No usable file name for {url}, skipping download");
                return false;
            }
        };

        let dest = dest_dir.join(&name);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            tracing::info!("Image {name} already downloaded");
            return true;
        }

        match self.download(url, &dest).await {
            Ok(bytes) => {
                tracing::info!("Downloaded {name} ({bytes} bytes)");
                true
            }
            Err(e) => {
                tracing::warn!("Failed to download {url}: {e}");
                false
            }
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<usize, FetchFailure> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(FetchFailure::Status(status));
        }

        let body = response.bytes().await?;
        image::load_from_memory(&body)?;

        // Only a complete file may appear under the final name.
        let partial = partial_path(dest);
        if let Err(e) = tokio::fs::write(&partial, &body).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&partial, dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Ok(body.len())
    }
}

/// Last path segment of `url`, without query or fragment.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let segment = match url::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .map(str::to_string),
    };
    segment.filter(|s| !s.is_empty())
}

fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.part"))
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
