use crate::models::Location;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = ".projonmo";

pub const DEFAULT_BASE_URL: &str = "https://midwife-backend.vercel.app/api/v1";
pub const DEFAULT_LOOKUP_URL: &str = "http://ip-api.com/json";

/// Map center used when there is nothing to show
pub const DEFAULT_CENTER: Location = Location {
    lat: 51.505,
    lng: -0.09,
};
pub const DEFAULT_ZOOM: u8 = 6;

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Remote API settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ApiConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(30_000)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SessionConfig {
    /// Where the session keys are stored (default ~/.projonmo/session.json)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SessionConfig {
    pub fn path(&self) -> PathBuf {
        match &self.path {
            Some(p) => expand_home(p),
            None => dirs::home_dir()
                .unwrap_or_default()
                .join(CONFIG_DIR)
                .join("session.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MapConfig {
    #[serde(default)]
    pub fallback_lat: Option<f64>,
    #[serde(default)]
    pub fallback_lng: Option<f64>,
    #[serde(default)]
    pub zoom: Option<u8>,
}

impl MapConfig {
    pub fn fallback_center(&self) -> Location {
        Location::new(
            self.fallback_lat.unwrap_or(DEFAULT_CENTER.lat),
            self.fallback_lng.unwrap_or(DEFAULT_CENTER.lng),
        )
    }

    pub fn zoom(&self) -> u8 {
        self.zoom.unwrap_or(DEFAULT_ZOOM)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeolocationProvider {
    #[default]
    Fixed,
    Ip,
}

impl GeolocationProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Ip => "ip",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeolocationConfig {
    #[serde(default)]
    pub provider: GeolocationProvider,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,
    #[serde(default = "default_geo_timeout")]
    pub timeout_ms: u64,
}

fn default_lookup_url() -> String {
    DEFAULT_LOOKUP_URL.to_string()
}

fn default_geo_timeout() -> u64 {
    10_000
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            provider: GeolocationProvider::default(),
            latitude: None,
            longitude: None,
            lookup_url: default_lookup_url(),
            timeout_ms: default_geo_timeout(),
        }
    }
}

impl GeolocationConfig {
    pub fn fixed_location(&self) -> Option<Location> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Location::new(lat, lng)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ActivityConfig {
    /// Directory for per-run activity logs (default .projonmo/activity)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub map: MapConfig,
    /// Replaced as a whole section when a later layer sets it
    #[serde(default)]
    pub geolocation: Option<GeolocationConfig>,
    #[serde(default)]
    pub activity: ActivityConfig,
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.projonmo/config.local.toml) > project (.projonmo/config.toml) > user (~/.projonmo/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(CONFIG_DIR).join("config.toml");
            if user_config.exists() {
                config.merge(Self::load_from(&user_config)?);
            }
        }

        let project_config = Path::new(CONFIG_DIR).join("config.toml");
        if project_config.exists() {
            config.merge(Self::load_from(&project_config)?);
        }

        // Should be gitignored
        let local_config = Path::new(CONFIG_DIR).join("config.local.toml");
        if local_config.exists() {
            config.merge(Self::load_from(&local_config)?);
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Merge another config into this one (other takes priority where set)
    pub fn merge(&mut self, other: Config) {
        if other.api.base_url.is_some() {
            self.api.base_url = other.api.base_url;
        }
        if other.api.timeout_ms.is_some() {
            self.api.timeout_ms = other.api.timeout_ms;
        }

        if other.session.path.is_some() {
            self.session.path = other.session.path;
        }

        if other.map.fallback_lat.is_some() {
            self.map.fallback_lat = other.map.fallback_lat;
        }
        if other.map.fallback_lng.is_some() {
            self.map.fallback_lng = other.map.fallback_lng;
        }
        if other.map.zoom.is_some() {
            self.map.zoom = other.map.zoom;
        }

        if other.geolocation.is_some() {
            self.geolocation = other.geolocation;
        }

        if other.activity.dir.is_some() {
            self.activity.dir = other.activity.dir;
        }
    }

    pub fn geolocation(&self) -> GeolocationConfig {
        self.geolocation.clone().unwrap_or_default()
    }

    pub fn activity_dir(&self, root: &Path) -> PathBuf {
        match &self.activity.dir {
            Some(dir) => expand_home(dir),
            None => root.join(CONFIG_DIR).join("activity"),
        }
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let base_url = self.api.base_url();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "api.base_url".to_string(),
                message: format!("Must start with http:// or https://, got '{}'", base_url),
            });
        }

        if self.api.timeout_ms() == 0 {
            errors.push(ValidationError {
                field: "api.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if !self.map.fallback_center().is_valid() {
            errors.push(ValidationError {
                field: "map.fallback_lat/fallback_lng".to_string(),
                message: format!(
                    "Coordinates out of range: {}",
                    self.map.fallback_center()
                ),
            });
        }

        if self.map.zoom() > 19 {
            errors.push(ValidationError {
                field: "map.zoom".to_string(),
                message: format!("Must be between 0 and 19, got {}", self.map.zoom()),
            });
        }

        let geo = self.geolocation();
        match (geo.latitude, geo.longitude) {
            (Some(_), None) | (None, Some(_)) => errors.push(ValidationError {
                field: "geolocation.latitude/longitude".to_string(),
                message: "Latitude and longitude must be set together".to_string(),
            }),
            (Some(lat), Some(lng)) if !Location::new(lat, lng).is_valid() => {
                errors.push(ValidationError {
                    field: "geolocation.latitude/longitude".to_string(),
                    message: format!("Coordinates out of range: {}, {}", lat, lng),
                })
            }
            _ => {}
        }

        if geo.provider == GeolocationProvider::Ip {
            if geo.lookup_url.is_empty() {
                errors.push(ValidationError {
                    field: "geolocation.lookup_url".to_string(),
                    message: "URL required for ip provider".to_string(),
                });
            }
            if geo.timeout_ms == 0 {
                errors.push(ValidationError {
                    field: "geolocation.timeout_ms".to_string(),
                    message: "Must be greater than 0".to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
