use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use super::{Coordinates, Directions, DistanceProvider, RouteStep, TravelMode};
use crate::config::{MapsConfig, VenueCoordinates};
use crate::store::normalize_venue;

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";

static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Google geocoding and directions over HTTPS.
pub struct GoogleMapsProvider {
    agent: ureq::Agent,
    api_key: String,
    /// Appended to venue names for the first geocoding attempt.
    city: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GeocodeResponse {
    status: String,
    error_message: Option<String>,
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DirectionsResponse {
    status: String,
    error_message: Option<String>,
    routes: Vec<ApiRoute>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ApiRoute {
    legs: Vec<ApiLeg>,
}

#[derive(Deserialize)]
struct ApiLeg {
    /// Metres.
    distance: TextValue,
    /// Seconds.
    duration: TextValue,
    #[serde(default)]
    steps: Vec<ApiStep>,
}

#[derive(Deserialize)]
struct ApiStep {
    #[serde(default)]
    html_instructions: String,
    distance: TextValue,
    duration: TextValue,
}

#[derive(Deserialize)]
struct TextValue {
    #[serde(default)]
    text: String,
    value: f64,
}

/// Google reports "no match" as a status, not an HTTP error.
fn check_status(status: &str, error_message: Option<&str>) -> Result<bool> {
    match status {
        "OK" => Ok(true),
        "ZERO_RESULTS" | "NOT_FOUND" => Ok(false),
        other => anyhow::bail!(
            "Maps API returned {other}: {}",
            error_message.unwrap_or("no details")
        ),
    }
}

impl GeocodeResponse {
    fn into_coordinates(self) -> Result<Option<Coordinates>> {
        if !check_status(&self.status, self.error_message.as_deref())? {
            return Ok(None);
        }
        Ok(self
            .results
            .into_iter()
            .next()
            .map(|r| Coordinates::new(r.geometry.location.lat, r.geometry.location.lng)))
    }
}

impl DirectionsResponse {
    fn into_directions(self) -> Result<Option<Directions>> {
        if !check_status(&self.status, self.error_message.as_deref())? {
            return Ok(None);
        }
        let Some(leg) = self.routes.into_iter().next().and_then(|r| r.legs.into_iter().next())
        else {
            return Ok(None);
        };
        Ok(Some(Directions {
            distance_km: leg.distance.value / 1000.0,
            duration_min: leg.duration.value / 60.0,
            steps: leg
                .steps
                .into_iter()
                .map(|s| RouteStep {
                    instruction: strip_html(&s.html_instructions),
                    distance: s.distance.text,
                    duration: s.duration.text,
                })
                .collect(),
        }))
    }
}

fn strip_html(s: &str) -> String {
    HTML_TAG_RE.replace_all(s, "").trim().to_string()
}

impl GoogleMapsProvider {
    /// The key is read from the environment variable named by `api_key_env`.
    pub fn from_config(config: &MapsConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .with_context(|| format!("Maps API key not set (expected in ${})", config.api_key_env))?;

        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self {
            agent: ureq::Agent::new_with_config(agent_config),
            api_key,
            city: config.city.clone(),
        })
    }

    fn geocode_query(&self, query: &str) -> Result<Option<Coordinates>> {
        log::debug!("Geocoding {query:?}");
        let response: GeocodeResponse = self
            .agent
            .get(GEOCODE_URL)
            .query("address", query)
            .query("key", &self.api_key)
            .call()
            .with_context(|| format!("Geocoding request failed for {query}"))?
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse geocoding JSON for {query}"))?;
        response.into_coordinates()
    }
}

impl DistanceProvider for GoogleMapsProvider {
    /// "venue, city" first, then the bare venue name.
    fn geocode(&self, venue: &str) -> Result<Option<Coordinates>> {
        if !self.city.is_empty() {
            if let Some(found) = self.geocode_query(&format!("{venue}, {}", self.city))? {
                return Ok(Some(found));
            }
        }
        self.geocode_query(venue)
    }

    fn directions(
        &self,
        from: Coordinates,
        to: Coordinates,
        mode: TravelMode,
    ) -> Result<Option<Directions>> {
        let origin = format!("{},{}", from.lat, from.lon);
        let destination = format!("{},{}", to.lat, to.lon);
        let response: DirectionsResponse = self
            .agent
            .get(DIRECTIONS_URL)
            .query("origin", &origin)
            .query("destination", &destination)
            .query("mode", mode.as_str())
            .query("key", &self.api_key)
            .call()
            .with_context(|| format!("Directions request failed ({origin} -> {destination})"))?
            .body_mut()
            .read_json()
            .context("Failed to parse directions JSON")?;
        response.into_directions()
    }
}

/// Fixed venue coordinates from config. Needs no network.
#[derive(Debug, Clone, Default)]
pub struct CoordinateTable {
    entries: Vec<(String, Coordinates)>,
}

impl CoordinateTable {
    pub fn new(venues: &[VenueCoordinates]) -> Self {
        let entries = venues
            .iter()
            .map(|v| (normalize_venue(&v.name), Coordinates::new(v.lat, v.lon)))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact normalised name, else the longest configured name contained in
    /// the venue text (schedules often append a street address).
    pub fn lookup(&self, venue: &str) -> Option<Coordinates> {
        let key = normalize_venue(venue);
        if key.is_empty() {
            return None;
        }
        if let Some((_, c)) = self.entries.iter().find(|(name, _)| *name == key) {
            return Some(*c);
        }
        let full = venue.to_lowercase();
        self.entries
            .iter()
            .filter(|(name, _)| full.contains(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, c)| *c)
    }
}

impl DistanceProvider for CoordinateTable {
    fn geocode(&self, venue: &str) -> Result<Option<Coordinates>> {
        Ok(self.lookup(venue))
    }
}

/// Tries providers in order. A failing layer is logged and skipped.
#[derive(Default)]
pub struct LayeredProvider {
    layers: Vec<Box<dyn DistanceProvider>>,
}

impl LayeredProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: impl DistanceProvider + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl DistanceProvider for LayeredProvider {
    fn geocode(&self, venue: &str) -> Result<Option<Coordinates>> {
        for layer in &self.layers {
            match layer.geocode(venue) {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                Err(e) => log::warn!("Geocoder failed for {venue:?}: {e:#}"),
            }
        }
        Ok(None)
    }

    fn directions(
        &self,
        from: Coordinates,
        to: Coordinates,
        mode: TravelMode,
    ) -> Result<Option<Directions>> {
        for layer in &self.layers {
            match layer.directions(from, to, mode) {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                Err(e) => log::warn!("Directions provider failed: {e:#}"),
            }
        }
        Ok(None)
    }
}

/// Memoises geocoding answers (including "not found") for the life of the
/// process. Errors are not cached.
pub struct CachedProvider<P> {
    inner: P,
    geocodes: RefCell<HashMap<String, Option<Coordinates>>>,
    hits: Cell<usize>,
}

impl<P: DistanceProvider> CachedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            geocodes: RefCell::new(HashMap::new()),
            hits: Cell::new(0),
        }
    }

    pub fn cache_hits(&self) -> usize {
        self.hits.get()
    }
}

impl<P: DistanceProvider> DistanceProvider for CachedProvider<P> {
    fn geocode(&self, venue: &str) -> Result<Option<Coordinates>> {
        let key = venue.trim().to_lowercase();
        if let Some(cached) = self.geocodes.borrow().get(&key) {
            self.hits.set(self.hits.get() + 1);
            return Ok(*cached);
        }
        let found = self.inner.geocode(venue)?;
        self.geocodes.borrow_mut().insert(key, found);
        Ok(found)
    }

    fn directions(
        &self,
        from: Coordinates,
        to: Coordinates,
        mode: TravelMode,
    ) -> Result<Option<Directions>> {
        self.inner.directions(from, to, mode)
    }
}
