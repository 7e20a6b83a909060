//! Server configuration.
//!
//! Loaded from a JSON file. Pre-declared rooms exist from startup; whether
//! apps may create additional rooms at runtime (and which settings keys they
//! may override) is policy decided here.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use turnstile_proto::{RoomId, RoomSettings};

/// Which room settings keys an app may override at creation time.
///
/// The JSON form is either a boolean (`true` = any key, `false` = none) or an
/// explicit list of allowed wire-format keys.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OverridePolicy {
    /// Allow every key (`true`) or reject any override (`false`).
    All(bool),
    /// Allow exactly these wire-format keys.
    Keys(Vec<String>),
}

impl Default for OverridePolicy {
    fn default() -> Self {
        Self::All(true)
    }
}

impl OverridePolicy {
    /// Keys from `requested` that this policy rejects.
    pub fn rejected_keys(&self, requested: &[&'static str]) -> Vec<String> {
        match self {
            Self::All(true) => Vec::new(),
            Self::All(false) => requested.iter().map(|k| (*k).to_string()).collect(),
            Self::Keys(allowed) => requested
                .iter()
                .filter(|key| !allowed.iter().any(|a| a == *key))
                .map(|k| (*k).to_string())
                .collect(),
        }
    }
}

/// A room declared in configuration, present from startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    /// Stable room id.
    pub id: RoomId,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Room tunables, falling back to defaults for missing keys.
    #[serde(flatten)]
    pub settings: RoomSettings,
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// TCP listen port.
    pub port: u16,
    /// Verbose logging.
    pub debug: bool,
    /// Maximum number of rooms, `-1` for no limit.
    pub max_rooms: i64,
    /// Whether apps may create rooms not declared in configuration.
    pub allow_new_rooms: bool,
    /// Which settings keys apps may override when creating a room.
    pub allow_settings_override: OverridePolicy,
    /// Optional regex that app-created room ids must match.
    pub new_room_id_pattern: Option<String>,
    /// Settings template for app-created rooms.
    pub default_new_room_settings: RoomSettings,
    /// Rooms that exist from startup.
    pub rooms: Vec<RoomConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3030,
            debug: false,
            max_rooms: -1,
            allow_new_rooms: true,
            allow_settings_override: OverridePolicy::default(),
            new_room_id_pattern: None,
            default_new_room_settings: RoomSettings::default(),
            rooms: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        let config: Self = serde_json::from_str(&raw)?;
        // Fail fast on a bad pattern instead of erroring on first app.announce
        config.compiled_room_id_pattern()?;
        Ok(config)
    }

    /// Compile the room id pattern, if configured.
    pub fn compiled_room_id_pattern(&self) -> Result<Option<Regex>, ConfigError> {
        self.new_room_id_pattern
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .transpose()
    }
}

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON or has wrong shape.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// `newRoomIdPattern` is not a valid regex.
    #[error("invalid newRoomIdPattern {pattern:?}: {source}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Underlying regex error.
        source: regex::Error,
    },
}
