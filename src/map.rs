//! Map projection of reports and viewer location resolution.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::{
    client::Client,
    config::MapsConfig,
    models::{GeoPoint, ReportLocation, ReportStatus},
    notify::Notifier,
    Error, Result,
};

pub const DEFAULT_ZOOM: u8 = 13;
pub const VIEWER_COLOR: &str = "#10b981";
const UNKNOWN_COLOR: &str = "#9ca3af";
const NO_CITY_LOCATION: &str = "Could not find city location. Showing default.";

/// Marker color for a report status; `None` is an unrecognised status.
pub const fn status_color(status: Option<ReportStatus>) -> &'static str {
    match status {
        Some(ReportStatus::Pending) => "#f59e0b",
        Some(ReportStatus::Taken) => "#3b82f6",
        Some(ReportStatus::Completed) => "#22c55e",
        None => UNKNOWN_COLOR,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarkerKind {
    Report { id: String, status: ReportStatus },
    Viewer,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Marker {
    #[serde(flatten)]
    pub kind: MarkerKind,
    pub title: String,
    pub position: GeoPoint,
    pub color: &'static str,
}

/// Everything needed to draw the map.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapView {
    pub center: GeoPoint,
    pub zoom: u8,
    /// Report markers first, the viewer marker last.
    pub markers: Vec<Marker>,
}

impl MapView {
    /// One marker per located report plus the viewer, centered on the viewer.
    pub fn project(items: &[ReportLocation], viewer: GeoPoint) -> Self {
        let mut markers: Vec<Marker> = items
            .iter()
            .filter_map(|item| {
                let position = item.location.filter(GeoPoint::is_set)?;
                Some(Marker {
                    kind: MarkerKind::Report {
                        id: item.id.clone(),
                        status: item.status,
                    },
                    title: item.title.clone(),
                    position,
                    color: status_color(Some(item.status)),
                })
            })
            .collect();
        markers.push(Marker {
            kind: MarkerKind::Viewer,
            title: "You are here".to_owned(),
            position: viewer,
            color: VIEWER_COLOR,
        });

        Self {
            center: viewer,
            zoom: DEFAULT_ZOOM,
            markers,
        }
    }

    pub fn report_markers(&self) -> impl Iterator<Item = &Marker> {
        self.markers
            .iter()
            .filter(|m| matches!(m.kind, MarkerKind::Report { .. }))
    }

    /// The markers as a GeoJSON `FeatureCollection`.
    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self
            .markers
            .iter()
            .map(|marker| {
                let mut properties = json!({
                    "title": marker.title,
                    "color": marker.color,
                });
                if let MarkerKind::Report { id, status } = &marker.kind {
                    properties["id"] = json!(id);
                    properties["status"] = json!(status);
                } else {
                    properties["viewer"] = json!(true);
                }
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        // GeoJSON positions are longitude first.
                        "coordinates": [marker.position.lng, marker.position.lat],
                    },
                    "properties": properties,
                })
            })
            .collect();

        json!({
            "type": "FeatureCollection",
            "features": features,
        })
    }
}

/// Turns a free-form address into coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeoPoint>;
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: GeoPoint,
}

/// The Google geocoding REST API.
pub struct GoogleGeocoder {
    http: Client,
    url: Url,
    api_key: String,
}

impl GoogleGeocoder {
    /// `None` when no API key is configured.
    pub fn new(http: Client, config: &MapsConfig) -> Option<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty())?;
        Some(Self {
            http,
            url: config.geocode_url.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeoPoint> {
        let res = self
            .http
            .get(self.url.clone())
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;
        let body: GeocodeResponse = res.json().await?;

        if body.status != "OK" {
            return Err(Error::Geocode(format!("{address:?}: {}", body.status)));
        }
        body.results
            .into_iter()
            .next()
            .map(|r| r.geometry.location)
            .ok_or_else(|| Error::Geocode(format!("{address:?}: no results")))
    }
}

/// Picks where the map should look.
#[derive(Clone)]
pub struct Locator {
    geocoder: Option<Arc<dyn Geocoder>>,
    default_location: GeoPoint,
    notifier: Arc<dyn Notifier>,
}

impl Locator {
    pub fn new(
        geocoder: Option<Arc<dyn Geocoder>>,
        default_location: GeoPoint,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            geocoder,
            default_location,
            notifier,
        }
    }

    async fn geocode_city(&self, city: &str) -> Result<GeoPoint> {
        let city = city.trim();
        if city.is_empty() {
            return Err(Error::Geocode("no city given".to_owned()));
        }
        let geocoder = self
            .geocoder
            .as_ref()
            .ok_or_else(|| Error::Geocode("no geocoding credential configured".to_owned()))?;
        geocoder.geocode(city).await
    }

    /// The device location if known, else the geocoded city, else the default.
    pub async fn viewer_location(&self, device: Option<GeoPoint>, city: Option<&str>) -> GeoPoint {
        if let Some(device) = device.filter(GeoPoint::is_set) {
            return device;
        }
        match self.geocode_city(city.unwrap_or_default()).await {
            Ok(point) => point,
            Err(e) => {
                debug!("viewer location falls back to default: {e}");
                self.default_location
            }
        }
    }

    /// Where the location picker of the report form opens.
    pub async fn pick_center(&self, city: &str) -> GeoPoint {
        match self.geocode_city(city).await {
            Ok(point) => point,
            Err(e) => {
                warn!("{e}");
                self.notifier.error(NO_CITY_LOCATION);
                self.default_location
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{client::build_client, config::DEFAULT_LOCATION, notify::Level, tests::TestContext};

    fn item(id: &str, status: ReportStatus, location: Option<GeoPoint>) -> ReportLocation {
        ReportLocation {
            id: id.to_owned(),
            title: format!("Report {id}"),
            status,
            location,
        }
    }

    fn locator(ctx: &TestContext) -> anyhow::Result<Locator> {
        let geocoder = GoogleGeocoder::new(build_client()?, &ctx.config.maps)
            .map(|g| Arc::new(g) as Arc<dyn Geocoder>);
        Ok(Locator::new(geocoder, DEFAULT_LOCATION, ctx.notifier()))
    }

    #[test]
    fn skips_unlocated_reports() {
        let items = [
            item("a", ReportStatus::Pending, Some(GeoPoint::new(22.69, 72.86))),
            item("b", ReportStatus::Taken, None),
            item("c", ReportStatus::Completed, Some(GeoPoint::new(0.0, 0.0))),
            item("d", ReportStatus::Completed, Some(GeoPoint::new(21.17, 72.83))),
        ];
        let view = MapView::project(&items, DEFAULT_LOCATION);

        let colors: Vec<&str> = view.report_markers().map(|m| m.color).collect();
        assert_eq!(colors, vec!["#f59e0b", "#22c55e"]);
        assert_eq!(view.markers.len(), 3);
        assert_eq!(view.markers.last().map(|m| m.color), Some(VIEWER_COLOR));
        assert_eq!(view.center, DEFAULT_LOCATION);
        assert_eq!(view.zoom, 13);
        assert_eq!(status_color(None), "#9ca3af");
    }

    #[test]
    fn geojson_is_longitude_first() {
        let items = [item("a", ReportStatus::Taken, Some(GeoPoint::new(22.5, 72.5)))];
        let geojson = MapView::project(&items, GeoPoint::new(1.0, 2.0)).to_geojson();

        assert_eq!(geojson["type"], "FeatureCollection");
        let report = &geojson["features"][0];
        assert_eq!(report["geometry"]["coordinates"], json!([72.5, 22.5]));
        assert_eq!(report["properties"]["status"], "taken");
        assert_eq!(report["properties"]["color"], "#3b82f6");
        assert_eq!(geojson["features"][1]["properties"]["viewer"], true);
    }

    #[tokio::test]
    async fn viewer_location_fallbacks() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let locator = locator(&ctx)?;

        let device = GeoPoint::new(23.0, 72.6);
        assert_eq!(locator.viewer_location(Some(device), Some("Nadiad")).await, device);
        assert_eq!(
            locator.viewer_location(None, Some("Nadiad")).await,
            GeoPoint::new(22.6939, 72.8616)
        );
        assert_eq!(
            locator.viewer_location(None, Some("Atlantis")).await,
            DEFAULT_LOCATION
        );
        assert_eq!(locator.viewer_location(None, None).await, DEFAULT_LOCATION);
        // Quiet fallbacks.
        assert!(ctx.notifier.take().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn picker_reports_missing_city() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let locator = locator(&ctx)?;

        assert_eq!(
            locator.pick_center("Surat").await,
            GeoPoint::new(21.1702, 72.8311)
        );
        assert!(ctx.notifier.take().is_empty());

        assert_eq!(locator.pick_center("Atlantis").await, DEFAULT_LOCATION);
        assert_eq!(
            ctx.notifier.take_messages(Level::Error),
            vec![NO_CITY_LOCATION]
        );
        Ok(())
    }

    #[tokio::test]
    async fn no_key_means_no_geocoder() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let mut maps = ctx.config.maps.clone();
        maps.api_key = None;
        assert!(GoogleGeocoder::new(build_client()?, &maps).is_none());

        let geocoder = GoogleGeocoder::new(build_client()?, &ctx.config.maps).expect("key set");
        let err = geocoder.geocode("Atlantis").await.unwrap_err();
        assert!(matches!(err, Error::Geocode(_)));
        Ok(())
    }
}
