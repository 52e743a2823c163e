use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::gazetteer::GazetteerConfig;
use crate::route::TravelMode;

/// Dataset used when neither `--data` nor the config file names one.
pub const DEFAULT_DATA_PATH: &str = "combined_schedules.csv";

/// Application configuration loaded from TOML config file.
/// All fields have defaults, so the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Schedule file (overridden by `--data`).
    pub data_path: Option<PathBuf>,
    pub llm: LlmConfig,
    pub maps: MapsConfig,
    pub route: RouteConfig,
    /// Extra venue and area names, merged with the built-in gazetteer.
    pub gazetteer: GazetteerConfig,
    /// Fixed venue coordinates, used as an offline geocoder.
    #[serde(rename = "venue")]
    pub venues: Vec<VenueCoordinates>,
}

/// Language-model settings. The key itself never lives in the file.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub model: String,
    pub endpoint: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Per-call timeout.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 20,
        }
    }
}

/// Geocoding and directions settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapsConfig {
    pub enabled: bool,
    pub api_key_env: String,
    /// Appended to venue names when geocoding.
    pub city: String,
    pub timeout_secs: u64,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: "GOOGLE_MAPS_API_KEY".to_string(),
            city: "Chennai, India".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Route sequencing defaults.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RouteConfig {
    pub mode: TravelMode,
    /// Longest hop the greedy sequencer will prefer.
    pub max_travel_minutes: f64,
    /// Assumed length of one concert.
    pub concert_minutes: i64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            mode: TravelMode::Driving,
            max_travel_minutes: 30.0,
            concert_minutes: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VenueCoordinates {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl AppConfig {
    /// Load config from `~/.config/kutcheri/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Dataset path: CLI flag, then config, then the default file name.
    pub fn resolve_data_path(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.data_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH))
    }

    /// Get the config file path.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
