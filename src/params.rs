use serde::{Deserialize, Serialize};

use crate::dates::DateRange;
use crate::store::models::{Ticketed, TimeOfDay};

/// What the user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    Search,
    RoutePlanning,
    Info,
    Help,
    Unknown,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Search => "search",
            Intent::RoutePlanning => "route_planning",
            Intent::Info => "info",
            Intent::Help => "help",
            Intent::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for Intent {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "search" => Ok(Intent::Search),
            "route_planning" | "route" => Ok(Intent::RoutePlanning),
            "info" => Ok(Intent::Info),
            "help" => Ok(Intent::Help),
            "unknown" => Ok(Intent::Unknown),
            _ => Err(()),
        }
    }
}

/// Structured filters extracted from one utterance. Every dimension is
/// optional; `None` means "do not filter on this".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParameters {
    /// Date expression, resolved against the store when the filter runs.
    pub date: Option<String>,
    pub date_range: Option<DateRange>,
    pub artist: Option<String>,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub time_of_day: Option<TimeOfDay>,
    pub ticketed: Option<Ticketed>,
    pub intent: Intent,
    pub is_followup: bool,
}

impl QueryParameters {
    /// True when at least one filter dimension is set.
    pub fn has_filters(&self) -> bool {
        self.date.is_some()
            || self.date_range.is_some()
            || self.artist.is_some()
            || self.venue.is_some()
            || self.location.is_some()
            || self.time_of_day.is_some()
            || self.ticketed.is_some()
    }

    /// Human-readable list of the filters that are set, e.g.
    /// `["date Dec 15", "time of day evening"]`.
    pub fn describe_filters(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(d) = &self.date {
            out.push(format!("date {d}"));
        }
        if let Some(r) = &self.date_range {
            out.push(format!("dates {r}"));
        }
        if let Some(a) = &self.artist {
            out.push(format!("artist {a}"));
        }
        if let Some(v) = &self.venue {
            out.push(format!("venue {v}"));
        }
        if let Some(l) = &self.location {
            out.push(format!("location {l}"));
        }
        if let Some(t) = self.time_of_day {
            out.push(format!("time of day {t}"));
        }
        if let Some(t) = self.ticketed {
            out.push(format!("admission {t}"));
        }
        out
    }

    /// Blank strings count as absent.
    pub fn normalized(mut self) -> Self {
        for field in [&mut self.date, &mut self.artist, &mut self.venue, &mut self.location] {
            if let Some(s) = field.take() {
                let s = s.trim();
                if !s.is_empty() {
                    *field = Some(s.to_string());
                }
            }
        }
        self
    }
}
