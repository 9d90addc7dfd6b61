//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_NAME: &str = "tessera";

/// Top-level texture subsystem configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Surface sizing and backend selection.
    pub atlas: AtlasConfig,
    /// Texture loading pipeline settings.
    pub loader: LoaderConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Surface configuration shared by both backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AtlasConfig {
    /// Side length of the atlas surface before any growth. Power of 2.
    pub initial_size: u32,
    /// Hard cap for either atlas dimension. Power of 2.
    pub max_size: u32,
    /// Texels of clamp-to-edge border added around every atlas tile.
    pub padding: u32,
    /// Use a texture array when the capability probe allows it.
    pub prefer_texture_array: bool,
    /// Side length of every texture-array layer. Power of 2.
    pub layer_size: u32,
    /// Upper bound on texture-array layers, further clamped by the device limit.
    pub max_layers: u32,
    /// Minimum device layer count required before the array backend is chosen.
    pub min_array_layers: u32,
}

/// Loading pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory that relative texture paths are resolved against.
    pub asset_root: PathBuf,
    /// Key of the error placeholder. `builtin:error` is generated in memory.
    pub error_texture: String,
    /// Keys awaited during startup before the subsystem reports ready.
    pub essential: Vec<String>,
    /// Delay used to batch surface-replace notifications.
    pub publish_debounce_ms: u64,
    /// Timeout for HTTP texture sources.
    pub http_timeout_seconds: u64,
    /// Largest accepted encoded source, in bytes.
    pub max_source_bytes: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Emit one warning per texture key that fell back to the placeholder.
    pub warn_missing_textures: bool,
}

// --- Default implementations ---

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            initial_size: 512,
            max_size: 8192,
            padding: 2,
            prefer_texture_array: true,
            layer_size: 16,
            max_layers: 256,
            min_array_layers: 16,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            error_texture: "builtin:error".to_string(),
            essential: Vec::new(),
            publish_debounce_ms: 16,
            http_timeout_seconds: 30,
            max_source_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            warn_missing_textures: true,
        }
    }
}

// --- Validation ---

impl AtlasConfig {
    /// Validates power-of-two sizes and the ordering between them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("initial_size", self.initial_size),
            ("max_size", self.max_size),
            ("layer_size", self.layer_size),
        ] {
            if !value.is_power_of_two() {
                return Err(ConfigError::Invalid(format!(
                    "{name} {value} is not a power of 2"
                )));
            }
        }
        if self.initial_size > self.max_size {
            return Err(ConfigError::Invalid(format!(
                "initial_size {} exceeds max_size {}",
                self.initial_size, self.max_size
            )));
        }
        if self.layer_size > self.max_size {
            return Err(ConfigError::Invalid(format!(
                "layer_size {} exceeds max_size {}",
                self.layer_size, self.max_size
            )));
        }
        if self.max_layers == 0 {
            return Err(ConfigError::Invalid("max_layers must be > 0".to_string()));
        }
        if self.padding * 2 >= self.initial_size {
            return Err(ConfigError::Invalid(format!(
                "padding {} leaves no room in a {} surface",
                self.padding, self.initial_size
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.atlas.validate()?;
        if self.loader.error_texture.is_empty() {
            return Err(ConfigError::Invalid(
                "loader.error_texture must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform configuration directory (`<os config dir>/tessera`).
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join(APP_NAME))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
