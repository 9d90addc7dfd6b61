//! Texture sources and the decoder that turns them into RGBA rasters.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use image::RgbaImage;
use tessera_config::LoaderConfig;

use crate::error::DecodeError;
use crate::key::decode_data_uri;

/// Where a texture's encoded bytes come from.
#[derive(Clone)]
pub enum TextureSource {
    /// A file on disk.
    Path(PathBuf),
    /// An `http://` or `https://` URL.
    Url(String),
    /// A base64 `data:` URI.
    DataUri(String),
    /// Encoded bytes already in memory.
    Bytes(Arc<[u8]>),
}

impl TextureSource {
    /// Classifies a raw key, resolving relative paths against `asset_root`.
    pub fn from_raw(raw: &str, asset_root: &Path) -> Self {
        let raw = raw.trim();
        if raw.starts_with("data:") {
            TextureSource::DataUri(raw.to_string())
        } else if raw.starts_with("http://") || raw.starts_with("https://") {
            TextureSource::Url(raw.to_string())
        } else {
            let path = Path::new(raw.strip_prefix("file://").unwrap_or(raw));
            if path.is_absolute() {
                TextureSource::Path(path.to_path_buf())
            } else {
                TextureSource::Path(asset_root.join(path))
            }
        }
    }

    /// Short description for logs and errors.
    pub fn describe(&self) -> String {
        match self {
            TextureSource::Path(p) => p.display().to_string(),
            TextureSource::Url(u) => u.clone(),
            TextureSource::DataUri(uri) => format!("data uri ({} bytes)", uri.len()),
            TextureSource::Bytes(b) => format!("{} in-memory bytes", b.len()),
        }
    }
}

impl fmt::Debug for TextureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Turns a source into pixels.
///
/// Implementations are shared across concurrent loads and must not assume
/// any ordering between calls.
pub trait ImageDecoder: Send + Sync {
    /// Fetches and decodes `source`.
    fn decode(&self, source: TextureSource) -> BoxFuture<'static, Result<RgbaImage, DecodeError>>;
}

/// Decodes encoded image bytes into an RGBA raster.
pub fn decode_bytes(bytes: &[u8]) -> Result<RgbaImage, DecodeError> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(DecodeError::Empty {
            width: img.width(),
            height: img.height(),
        });
    }
    Ok(img)
}

/// Reads files with tokio, fetches URLs with a blocking HTTP agent on the
/// blocking pool, and decodes on the blocking pool.
#[derive(Clone)]
pub struct DefaultDecoder {
    agent: ureq::Agent,
    max_source_bytes: u64,
}

impl DefaultDecoder {
    /// Creates a decoder honouring the loader's limits.
    pub fn new(config: &LoaderConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build();
        Self {
            agent,
            max_source_bytes: config.max_source_bytes,
        }
    }

    async fn fetch(&self, source: &TextureSource) -> Result<Vec<u8>, DecodeError> {
        let limit = self.max_source_bytes;
        let too_large = |size: u64| DecodeError::TooLarge {
            source_desc: source.describe(),
            size,
            limit,
        };

        let bytes = match source {
            TextureSource::Path(path) => {
                let io_err = |e| DecodeError::Io {
                    path: path.display().to_string(),
                    source: Arc::new(e),
                };
                let meta = tokio::fs::metadata(path).await.map_err(io_err)?;
                if meta.len() > limit {
                    return Err(too_large(meta.len()));
                }
                tokio::fs::read(path).await.map_err(io_err)?
            }
            TextureSource::Url(url) => {
                let agent = self.agent.clone();
                let url = url.clone();
                tokio::task::spawn_blocking(move || fetch_http(&agent, &url, limit))
                    .await
                    .map_err(|e| DecodeError::Worker(e.to_string()))??
            }
            TextureSource::DataUri(uri) => {
                decode_data_uri(uri).map_err(DecodeError::MalformedDataUri)?
            }
            TextureSource::Bytes(bytes) => bytes.to_vec(),
        };

        if bytes.len() as u64 > limit {
            return Err(too_large(bytes.len() as u64));
        }
        Ok(bytes)
    }
}

fn fetch_http(agent: &ureq::Agent, url: &str, limit: u64) -> Result<Vec<u8>, DecodeError> {
    let http_err = |message: String| DecodeError::Http {
        url: url.to_string(),
        message,
    };
    let response = agent.get(url).call().map_err(|e| http_err(e.to_string()))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| http_err(e.to_string()))?;
    Ok(bytes)
}

impl ImageDecoder for DefaultDecoder {
    fn decode(&self, source: TextureSource) -> BoxFuture<'static, Result<RgbaImage, DecodeError>> {
        let this = self.clone();
        async move {
            let bytes = this.fetch(&source).await?;
            tokio::task::spawn_blocking(move || decode_bytes(&bytes))
                .await
                .map_err(|e| DecodeError::Worker(e.to_string()))?
        }
        .boxed()
    }
}
