pub mod providers;

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::store::models::ConcertRecord;

pub use providers::{CachedProvider, CoordinateTable, GoogleMapsProvider, LayeredProvider};

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Walking,
    Transit,
    #[default]
    Driving,
}

impl TravelMode {
    /// Average speed assumed when no directions service answers.
    pub fn speed_kmh(self) -> f64 {
        match self {
            TravelMode::Walking => 5.0,
            TravelMode::Transit => 20.0,
            TravelMode::Driving => 30.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Walking => "walking",
            TravelMode::Transit => "transit",
            TravelMode::Driving => "driving",
        }
    }

    /// Straight-line estimate in minutes.
    pub fn minutes_for(self, distance_km: f64) -> f64 {
        distance_km / self.speed_kmh() * 60.0
    }
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TravelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "walking" | "walk" => Ok(TravelMode::Walking),
            "transit" | "bus" | "train" => Ok(TravelMode::Transit),
            "driving" | "drive" | "car" => Ok(TravelMode::Driving),
            other => Err(format!("unknown travel mode '{other}' (walking, transit, driving)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance in km.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStep {
    pub instruction: String,
    pub distance: String,
    pub duration: String,
}

/// What a directions service reports for one origin/destination pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directions {
    pub distance_km: f64,
    pub duration_min: f64,
    pub steps: Vec<RouteStep>,
}

/// Geocoding and directions. Every call may fail or come back empty.
pub trait DistanceProvider {
    fn geocode(&self, venue: &str) -> anyhow::Result<Option<Coordinates>>;

    /// Road directions. Providers without a directions service return `None`
    /// and the caller estimates from straight-line distance.
    fn directions(
        &self,
        _from: Coordinates,
        _to: Coordinates,
        _mode: TravelMode,
    ) -> anyhow::Result<Option<Directions>> {
        Ok(None)
    }
}

impl<T: DistanceProvider + ?Sized> DistanceProvider for Box<T> {
    fn geocode(&self, venue: &str) -> anyhow::Result<Option<Coordinates>> {
        (**self).geocode(venue)
    }

    fn directions(
        &self,
        from: Coordinates,
        to: Coordinates,
        mode: TravelMode,
    ) -> anyhow::Result<Option<Directions>> {
        (**self).directions(from, to, mode)
    }
}

/// One hop between consecutive concerts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteLeg {
    pub from: String,
    pub to: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub steps: Vec<RouteStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePlan {
    /// Concerts in time order.
    pub stops: Vec<ConcertRecord>,
    pub legs: Vec<RouteLeg>,
    pub total_distance_km: f64,
    pub total_duration_min: f64,
    pub warnings: Vec<String>,
}

/// Orders concerts, finds clashes and estimates travel between venues.
pub struct RouteSequencer<P> {
    provider: P,
    concert_length: Duration,
}

impl<P: DistanceProvider> RouteSequencer<P> {
    pub fn new(provider: P, concert_minutes: i64) -> Self {
        Self {
            provider,
            concert_length: Duration::minutes(concert_minutes),
        }
    }

    /// Coordinates for a venue; provider errors are logged and treated as
    /// "not found".
    pub fn locate(&self, venue: &str) -> Option<Coordinates> {
        if venue.trim().is_empty() {
            return None;
        }
        match self.provider.geocode(venue) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Geocoding failed for {venue:?}: {e:#}");
                None
            }
        }
    }

    /// Travel between two venues: directions when the provider has them,
    /// else great-circle distance at the mode's average speed. `None` when
    /// either venue cannot be located.
    pub fn travel(&self, from: &str, to: &str, mode: TravelMode) -> Option<RouteLeg> {
        let a = self.locate(from)?;
        let b = self.locate(to)?;
        let directions = match self.provider.directions(a, b, mode) {
            Ok(Some(d)) => d,
            Ok(None) => straight_line(a, b, mode),
            Err(e) => {
                log::warn!("Directions failed for {from:?} -> {to:?}: {e:#}");
                straight_line(a, b, mode)
            }
        };
        Some(RouteLeg {
            from: from.to_string(),
            to: to.to_string(),
            distance_km: directions.distance_km,
            duration_min: directions.duration_min,
            steps: directions.steps,
        })
    }

    /// Straight-line travel estimate in minutes.
    pub fn estimate_minutes(&self, from: &str, to: &str, mode: TravelMode) -> Option<f64> {
        let a = self.locate(from)?;
        let b = self.locate(to)?;
        Some(mode.minutes_for(haversine_km(a, b)))
    }

    /// Overlaps (assuming every concert runs the configured length) and gaps
    /// too short for the estimated travel. Expects time-sorted input.
    pub fn check_conflicts(&self, sorted: &[ConcertRecord], mode: TravelMode) -> Vec<String> {
        let mut warnings = Vec::new();
        for pair in sorted.windows(2) {
            let (first, second) = (&pair[0], &pair[1]);
            let (Some(start1), Some(start2)) = (first.time_parsed, second.time_parsed) else {
                continue;
            };
            let end1 = start1 + self.concert_length;
            if start2 < end1 {
                warnings.push(format!(
                    "Time conflict: {} concert may overlap with {} concert",
                    first.venue, second.venue
                ));
            } else if let Some(travel) = self.estimate_minutes(&first.venue, &second.venue, mode) {
                let gap = (start2 - end1).num_minutes();
                if (gap as f64) < travel {
                    warnings.push(format!(
                        "Tight schedule: only {gap} min between {} and {}. \
                         Estimated travel time: {travel:.0} minutes",
                        first.venue, second.venue
                    ));
                }
            }
        }
        warnings
    }

    /// Time-ordered route with one leg per consecutive pair of locatable
    /// venues. Totals are rounded to two decimals.
    pub fn plan_route(&self, concerts: &[ConcertRecord], mode: TravelMode) -> RoutePlan {
        if concerts.len() < 2 {
            return RoutePlan {
                stops: concerts.to_vec(),
                legs: Vec::new(),
                total_distance_km: 0.0,
                total_duration_min: 0.0,
                warnings: Vec::new(),
            };
        }

        self.plan_in_order(sort_concerts(concerts), mode)
    }

    /// Legs, totals and warnings for concerts visited in the given order.
    pub fn plan_in_order(&self, stops: Vec<ConcertRecord>, mode: TravelMode) -> RoutePlan {
        let warnings = self.check_conflicts(&stops, mode);
        let legs: Vec<RouteLeg> = stops
            .windows(2)
            .filter_map(|pair| self.travel(&pair[0].venue, &pair[1].venue, mode))
            .collect();

        let total_distance_km = round2(legs.iter().map(|l| l.distance_km).sum());
        let total_duration_min = round2(legs.iter().map(|l| l.duration_min).sum());
        RoutePlan {
            stops,
            legs,
            total_distance_km,
            total_duration_min,
            warnings,
        }
    }

    /// Greedy nearest-neighbour ordering, one day at a time.
    ///
    /// Each day starts from its earliest concert, then repeatedly moves to
    /// the closest remaining venue whose estimated travel time is within
    /// `max_minutes`; when none qualifies, the chronologically next concert
    /// is taken. This is a heuristic: it does not search for the shortest
    /// possible tour.
    pub fn suggest_optimal_sequence(
        &self,
        concerts: &[ConcertRecord],
        max_minutes: f64,
        mode: TravelMode,
    ) -> Vec<ConcertRecord> {
        if concerts.len() <= 1 {
            return concerts.to_vec();
        }

        let mut by_date: BTreeMap<(bool, Option<NaiveDate>), Vec<ConcertRecord>> = BTreeMap::new();
        for concert in concerts {
            by_date
                .entry((concert.date.is_none(), concert.date))
                .or_default()
                .push(concert.clone());
        }

        by_date
            .into_values()
            .flat_map(|day| self.sequence_day(&day, max_minutes, mode))
            .collect()
    }

    fn sequence_day(
        &self,
        concerts: &[ConcertRecord],
        max_minutes: f64,
        mode: TravelMode,
    ) -> Vec<ConcertRecord> {
        let mut remaining = sort_concerts(concerts);
        if remaining.len() <= 1 {
            return remaining;
        }

        let mut ordered = vec![remaining.remove(0)];
        while !remaining.is_empty() {
            let current = &ordered[ordered.len() - 1].venue;
            let mut best: Option<(usize, f64)> = None;
            for (i, candidate) in remaining.iter().enumerate() {
                let Some(minutes) = self.estimate_minutes(current, &candidate.venue, mode) else {
                    continue;
                };
                if minutes <= max_minutes && best.is_none_or(|(_, m)| minutes < m) {
                    best = Some((i, minutes));
                }
            }
            let next = best.map_or(0, |(i, _)| i);
            ordered.push(remaining.remove(next));
        }
        ordered
    }
}

fn straight_line(a: Coordinates, b: Coordinates, mode: TravelMode) -> Directions {
    let distance_km = haversine_km(a, b);
    Directions {
        distance_km,
        duration_min: mode.minutes_for(distance_km),
        steps: Vec::new(),
    }
}

/// Sort by date then time; unknown times come after known ones on the same
/// day, undated concerts last.
pub fn sort_concerts(concerts: &[ConcertRecord]) -> Vec<ConcertRecord> {
    let mut sorted = concerts.to_vec();
    sorted.sort_by_key(|c| (c.date.is_none(), c.date, c.time_parsed.is_none(), c.time_parsed));
    sorted
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VenueCoordinates;

    fn dec(day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2025, 12, day)
    }

    fn make_table() -> CoordinateTable {
        let venue = |name: &str, lat, lon| VenueCoordinates {
            name: name.to_string(),
            lat,
            lon,
        };
        CoordinateTable::new(&[
            venue("Home Hall", 13.0, 80.0),
            // ~1.1 km from Home Hall
            venue("Near Sabha", 13.01, 80.0),
            // ~11 km from Home Hall
            venue("Far Academy", 13.1, 80.0),
        ])
    }

    fn make_sequencer() -> RouteSequencer<CoordinateTable> {
        RouteSequencer::new(make_table(), 120)
    }

    #[test]
    fn test_haversine_known_distance() {
        // one degree of latitude
        let d = haversine_km(Coordinates::new(0.0, 0.0), Coordinates::new(1.0, 0.0));
        assert!((d - 111.19).abs() < 0.1, "got {d}");
        assert_eq!(haversine_km(Coordinates::new(13.0, 80.0), Coordinates::new(13.0, 80.0)), 0.0);
    }

    #[test]
    fn test_mode_speeds() {
        assert_eq!(TravelMode::Walking.minutes_for(5.0), 60.0);
        assert_eq!(TravelMode::Transit.minutes_for(10.0), 30.0);
        assert_eq!(TravelMode::Driving.minutes_for(15.0), 30.0);
        assert_eq!("Walk".parse::<TravelMode>(), Ok(TravelMode::Walking));
        assert!("teleport".parse::<TravelMode>().is_err());
    }

    #[test]
    fn test_sort_unknown_time_last() {
        let concerts = vec![
            ConcertRecord::new(dec(15), "evening", "A", "Home Hall"),
            ConcertRecord::new(dec(15), "18:00", "B", "Home Hall"),
            ConcertRecord::new(dec(14), "20:00", "C", "Home Hall"),
        ];
        let sorted = sort_concerts(&concerts);
        let names: Vec<&str> = sorted.iter().map(|c| c.artists.as_str()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_overlap_warning() {
        let concerts = vec![
            ConcertRecord::new(dec(15), "16:00", "A", "Home Hall"),
            ConcertRecord::new(dec(15), "17:00", "B", "Far Academy"),
        ];
        let warnings = make_sequencer().check_conflicts(&concerts, TravelMode::Driving);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Time conflict"));
    }

    #[test]
    fn test_tight_schedule_warning() {
        // ends 18:00, next starts 18:10, ~22 min drive
        let concerts = vec![
            ConcertRecord::new(dec(15), "16:00", "A", "Home Hall"),
            ConcertRecord::new(dec(15), "18:10", "B", "Far Academy"),
        ];
        let sequencer = make_sequencer();
        let warnings = sequencer.check_conflicts(&concerts, TravelMode::Driving);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Tight schedule: only 10 min"));

        // a comfortable gap raises nothing
        let relaxed = vec![
            ConcertRecord::new(dec(15), "16:00", "A", "Home Hall"),
            ConcertRecord::new(dec(15), "19:00", "B", "Far Academy"),
        ];
        assert!(sequencer.check_conflicts(&relaxed, TravelMode::Driving).is_empty());
    }

    #[test]
    fn test_plan_route_legs_and_totals() {
        let concerts = vec![
            ConcertRecord::new(dec(15), "19:00", "C", "Far Academy"),
            ConcertRecord::new(dec(15), "10:00", "A", "Home Hall"),
            ConcertRecord::new(dec(15), "14:00", "B", "Unknown Place"),
        ];
        let plan = make_sequencer().plan_route(&concerts, TravelMode::Driving);
        assert_eq!(plan.stops[0].artists, "A");
        assert_eq!(plan.stops[2].artists, "C");
        // both hops touch the unlocatable venue, so no legs
        assert!(plan.legs.is_empty());
        assert_eq!(plan.total_distance_km, 0.0);

        let located = vec![
            ConcertRecord::new(dec(15), "10:00", "A", "Home Hall"),
            ConcertRecord::new(dec(15), "14:00", "B", "Far Academy"),
        ];
        let plan = make_sequencer().plan_route(&located, TravelMode::Driving);
        assert_eq!(plan.legs.len(), 1);
        assert_eq!(plan.legs[0].from, "Home Hall");
        assert!(plan.legs[0].steps.is_empty());
        assert_eq!(plan.total_distance_km, round2(plan.legs[0].distance_km));
        assert!((plan.total_duration_min - 22.24).abs() < 0.1);
    }

    #[test]
    fn test_plan_route_single_concert() {
        let one = vec![ConcertRecord::new(dec(15), "10:00", "A", "Home Hall")];
        let plan = make_sequencer().plan_route(&one, TravelMode::Walking);
        assert_eq!(plan.stops, one);
        assert!(plan.legs.is_empty());
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_nearest_neighbour_beats_chronological() {
        let concerts = vec![
            ConcertRecord::new(dec(15), "10:00", "A", "Home Hall"),
            ConcertRecord::new(dec(15), "12:00", "B", "Far Academy"),
            ConcertRecord::new(dec(15), "14:00", "C", "Near Sabha"),
        ];
        let seq = make_sequencer().suggest_optimal_sequence(&concerts, 30.0, TravelMode::Driving);
        let names: Vec<&str> = seq.iter().map(|c| c.artists.as_str()).collect();
        assert_eq!(names, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_sequence_falls_back_to_chronological() {
        let concerts = vec![
            ConcertRecord::new(dec(16), "10:00", "D", "Home Hall"),
            ConcertRecord::new(dec(15), "10:00", "A", "Home Hall"),
            ConcertRecord::new(dec(15), "12:00", "B", "Far Academy"),
            ConcertRecord::new(dec(15), "14:00", "C", "Near Sabha"),
        ];
        // nothing is reachable within 1 minute
        let seq = make_sequencer().suggest_optimal_sequence(&concerts, 1.0, TravelMode::Driving);
        let names: Vec<&str> = seq.iter().map(|c| c.artists.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
    }
}
