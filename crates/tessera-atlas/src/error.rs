//! Error taxonomy for decoding, surface allocation, and loading.
//!
//! Load results are shared between every requester of the same key, so all
//! errors here are `Clone`; non-clonable sources are held behind [`Arc`].

use std::sync::Arc;

use thiserror::Error;

/// A texture source could not be read or decoded.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Reading a file source failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Fetching an HTTP source failed.
    #[error("failed to fetch {url}: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// Transport or status description.
        message: String,
    },

    /// The data URI is not a valid base64 image payload.
    #[error("malformed data uri: {0}")]
    MalformedDataUri(String),

    /// The source exceeds the configured size limit.
    #[error("source {source_desc} is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Source description.
        source_desc: String,
        /// Observed size.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// The bytes are not a supported image.
    #[error("image decode error: {0}")]
    Image(#[source] Arc<image::ImageError>),

    /// The blocking decode task panicked or was cancelled.
    #[error("decoder worker failed: {0}")]
    Worker(String),

    /// The decoded image has a zero dimension.
    #[error("decoded image is empty ({width}x{height})")]
    Empty {
        /// Decoded width.
        width: u32,
        /// Decoded height.
        height: u32,
    },
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(Arc::new(err))
    }
}

/// The surface has no room for a tile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The atlas cannot grow past its hard cap to fit the tile.
    #[error("no space for a {width}x{height} tile within the {max_size}px atlas limit")]
    OutOfSpace {
        /// Requested tile width including padding.
        width: u32,
        /// Requested tile height including padding.
        height: u32,
        /// Configured hard cap per dimension.
        max_size: u32,
    },

    /// Every texture-array layer is in use.
    #[error("all {max_layers} texture array layers are in use")]
    LayersExhausted {
        /// Layer capacity.
        max_layers: u32,
    },
}

/// A texture load failed.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The source was unreadable or corrupt and no placeholder was available.
    #[error("failed to decode texture '{key}': {source}")]
    Decode {
        /// Canonical key.
        key: String,
        /// Decoder failure.
        #[source]
        source: DecodeError,
    },

    /// The surface could not hold the texture.
    #[error("texture space exhausted while loading '{key}': {source}")]
    TextureSpaceExhausted {
        /// Canonical key.
        key: String,
        /// Allocation failure.
        #[source]
        source: AllocError,
    },

    /// The key is in the failure set; use `retry_missing_textures` to try again.
    #[error("texture '{key}' previously failed to load")]
    PreviouslyFailed {
        /// Canonical key.
        key: String,
    },

    /// A custom texture override replaced the key while this load was in flight.
    #[error("load of '{key}' was superseded by a newer registration")]
    Superseded {
        /// Canonical key.
        key: String,
    },

    /// The error placeholder could not be loaded; nothing can render.
    #[error("failed to initialize error texture '{key}': {source}")]
    Initialization {
        /// Placeholder key.
        key: String,
        /// The failed load.
        #[source]
        source: Box<LoadError>,
    },

    /// The load task panicked or was cancelled by runtime shutdown.
    #[error("load task for '{key}' was aborted")]
    TaskAborted {
        /// Canonical key.
        key: String,
    },
}

impl LoadError {
    /// The canonical key the error refers to.
    pub fn key(&self) -> &str {
        match self {
            Self::Decode { key, .. }
            | Self::TextureSpaceExhausted { key, .. }
            | Self::PreviouslyFailed { key }
            | Self::Superseded { key }
            | Self::Initialization { key, .. }
            | Self::TaskAborted { key } => key,
        }
    }

    /// Whether this error came from surface capacity rather than the source.
    pub fn is_space_exhausted(&self) -> bool {
        matches!(self, Self::TextureSpaceExhausted { .. })
    }
}
