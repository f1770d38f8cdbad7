use std::path::PathBuf;

use serde::Deserialize;
use url::Url;

use crate::models::GeoPoint;

/// Public geocoding endpoint used when none is configured.
pub const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
/// Map center used when neither the device nor the city can be located.
pub const DEFAULT_LOCATION: GeoPoint = GeoPoint::new(21.1702, 72.8311);

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub maps: MapsConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    /// Where transient client state (the password-reset email) is kept.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    pub metrics: Option<MetricConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ApiConfig {
    /// Root of the REST API, e.g. `https://ecotrack.example/api/`.
    pub base_url: Url,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MapsConfig {
    /// Credential for the geocoding provider. Geocoding is skipped without one.
    pub api_key: Option<String>,
    #[serde(default = "default_geocode_url")]
    pub geocode_url: Url,
    #[serde(default = "default_location")]
    pub default_location: GeoPoint,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            geocode_url: default_geocode_url(),
            default_location: DEFAULT_LOCATION,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Quiet period before a typed city filter is applied.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricConfig {
    PrometheusPush(PrometheusConfig),
}

#[derive(Deserialize, Debug, Clone)]
pub struct PrometheusConfig {
    /// The push gateway endpoint.
    pub url: String,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".ecotrack")
}

fn default_geocode_url() -> Url {
    Url::parse(GEOCODE_URL).expect("should be a valid geocode URL")
}

const fn default_location() -> GeoPoint {
    DEFAULT_LOCATION
}

const fn default_page_size() -> u32 {
    10
}

const fn default_debounce_ms() -> u64 {
    300
}
