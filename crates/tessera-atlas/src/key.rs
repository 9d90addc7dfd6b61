//! Typed texture keys, canonicalization, and alias derivation.
//!
//! Every raw key a consumer passes in (a file path, a URL, a numeric block id,
//! a data URI) is parsed into a [`TextureKey`] once. The index only ever sees
//! canonical strings produced here, so alias rules live in one place.

use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use sha2::{Digest, Sha256};

/// One face of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockFace {
    /// `+x`, SDK name `right`.
    PosX,
    /// `-x`, SDK name `left`.
    NegX,
    /// `+y`, SDK name `top`.
    PosY,
    /// `-y`, SDK name `bottom`.
    NegY,
    /// `+z`, SDK name `front`.
    PosZ,
    /// `-z`, SDK name `back`.
    NegZ,
}

impl BlockFace {
    /// All faces in canonical order.
    pub const ALL: [BlockFace; 6] = [
        BlockFace::PosX,
        BlockFace::NegX,
        BlockFace::PosY,
        BlockFace::NegY,
        BlockFace::PosZ,
        BlockFace::NegZ,
    ];

    /// Axis notation used in texture file names.
    pub fn as_str(self) -> &'static str {
        match self {
            BlockFace::PosX => "+x",
            BlockFace::NegX => "-x",
            BlockFace::PosY => "+y",
            BlockFace::NegY => "-y",
            BlockFace::PosZ => "+z",
            BlockFace::NegZ => "-z",
        }
    }

    /// SDK face name.
    pub fn sdk_name(self) -> &'static str {
        match self {
            BlockFace::PosX => "right",
            BlockFace::NegX => "left",
            BlockFace::PosY => "top",
            BlockFace::NegY => "bottom",
            BlockFace::PosZ => "front",
            BlockFace::NegZ => "back",
        }
    }

    /// Parses either axis notation or an SDK face name.
    pub fn parse(name: &str) -> Option<Self> {
        BlockFace::ALL
            .into_iter()
            .find(|f| f.as_str() == name || f.sdk_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for BlockFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed texture key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureKey {
    /// `.../blocks/<block>/<face>.<ext>`
    FacePath {
        /// Block type name or numeric id.
        block: String,
        /// Face the texture is drawn on.
        face: BlockFace,
    },
    /// `.../blocks/<block>.<ext>` or `blocks/<block>`
    BlockPath {
        /// Block type name or numeric id.
        block: String,
    },
    /// A numeric block id, bare (`"12"`) or prefixed (`"custom:12"`).
    CustomId {
        /// Block id.
        id: u32,
    },
    /// An embedded `data:` URI, identified by the SHA-256 of the full URI.
    DataUri {
        /// Lowercase hex digest.
        hash: String,
    },
    /// Anything else (UI textures, builtin sources), used verbatim.
    Other(String),
}

impl TextureKey {
    /// Parses a raw key into its typed form.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("data:") {
            return TextureKey::DataUri {
                hash: data_uri_hash(raw),
            };
        }
        if let Some(id) = raw.strip_prefix("custom:").and_then(|s| s.parse().ok()) {
            return TextureKey::CustomId { id };
        }
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = raw.parse() {
                return TextureKey::CustomId { id };
            }
        }

        let path = raw.split(['?', '#']).next().unwrap_or(raw);
        if let Some(rest) = block_relative(path) {
            let mut parts = rest.split('/');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(block), None, None) if !block.is_empty() => {
                    return TextureKey::BlockPath {
                        block: strip_extension(block).to_string(),
                    };
                }
                (Some(block), Some(file), None) if !block.is_empty() => {
                    if let Some(face) = BlockFace::parse(strip_extension(file)) {
                        return TextureKey::FacePath {
                            block: block.to_string(),
                            face,
                        };
                    }
                }
                _ => {}
            }
        }
        TextureKey::Other(raw.to_string())
    }

    /// The single string this key is stored under.
    pub fn canonical(&self) -> String {
        match self {
            TextureKey::FacePath { block, face } => format!("blocks/{block}/{face}.png"),
            TextureKey::BlockPath { block } => format!("blocks/{block}"),
            TextureKey::CustomId { id } => format!("custom:{id}"),
            TextureKey::DataUri { hash } => format!("data:{hash}"),
            TextureKey::Other(raw) => raw.clone(),
        }
    }

    /// Block component, if the key names a block.
    pub fn block(&self) -> Option<&str> {
        match self {
            TextureKey::FacePath { block, .. } | TextureKey::BlockPath { block } => Some(block),
            _ => None,
        }
    }

    /// Canonical keys registered when a texture loads under this key.
    ///
    /// A `+y` face also registers the bare block path so faceless lookups fall
    /// back to the top texture.
    pub fn aliases(&self) -> Vec<String> {
        let mut keys = vec![self.canonical()];
        match self {
            TextureKey::FacePath {
                block,
                face: BlockFace::PosY,
            } => keys.push(TextureKey::block_path(block).canonical()),
            TextureKey::CustomId { id } => {
                keys.push(TextureKey::block_path(&id.to_string()).canonical());
            }
            _ => {}
        }
        keys
    }

    /// Keys registered when a custom texture is applied to every face of block `id`.
    pub fn custom_block_aliases(id: u32) -> Vec<String> {
        let block = id.to_string();
        let mut keys = vec![
            TextureKey::CustomId { id }.canonical(),
            TextureKey::block_path(&block).canonical(),
        ];
        keys.extend(BlockFace::ALL.into_iter().map(|face| {
            TextureKey::FacePath {
                block: block.clone(),
                face,
            }
            .canonical()
        }));
        keys
    }

    /// Canonical keys tried on lookup, most specific first.
    pub fn lookup_chain(&self) -> Vec<String> {
        let mut chain = vec![self.canonical()];
        match self {
            TextureKey::FacePath { block, .. } => {
                chain.push(TextureKey::block_path(block).canonical());
            }
            TextureKey::CustomId { id } => {
                chain.push(TextureKey::block_path(&id.to_string()).canonical());
            }
            _ => {}
        }
        chain
    }

    fn block_path(block: &str) -> TextureKey {
        TextureKey::BlockPath {
            block: block.to_string(),
        }
    }
}

impl fmt::Display for TextureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Part of `path` after its last `blocks/` segment.
fn block_relative(path: &str) -> Option<&str> {
    if let Some(rest) = path.strip_prefix("blocks/") {
        return Some(rest);
    }
    path.rfind("/blocks/").map(|i| &path[i + "/blocks/".len()..])
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    }
}

/// Hex SHA-256 of a data URI.
pub fn data_uri_hash(uri: &str) -> String {
    let digest = Sha256::digest(uri.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes the payload of a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, String> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| "missing data: prefix".to_string())?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "missing comma".to_string())?;
    if !meta.ends_with(";base64") {
        return Err(format!("unsupported encoding '{meta}'"));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| e.to_string())
}

/// Block name -> id rewrites applied when keys are constructed.
///
/// Used when imported data carries block names that collide with existing
/// ones; the index never sees the original name.
#[derive(Clone, Debug, Default)]
pub struct BlockRemap {
    names: HashMap<String, String>,
}

impl BlockRemap {
    /// Creates an empty remap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites `from` to `to` in every block-addressed key.
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.names.insert(from.into(), to.into());
    }

    /// Number of rewrites.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no rewrites are configured.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Applies the remap to a parsed key.
    pub fn apply(&self, key: TextureKey) -> TextureKey {
        match key {
            TextureKey::FacePath { block, face } => TextureKey::FacePath {
                block: self.names.get(&block).cloned().unwrap_or(block),
                face,
            },
            TextureKey::BlockPath { block } => TextureKey::BlockPath {
                block: self.names.get(&block).cloned().unwrap_or(block),
            },
            other => other,
        }
    }
}
