use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// One scheduled performance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcertRecord {
    /// `None` when the date cell could not be parsed; such rows are kept but
    /// never match a date search.
    pub date: Option<NaiveDate>,
    /// Time exactly as it appeared in the schedule.
    pub time: String,
    /// Date + time, for ordering. `None` sorts last within a day.
    pub time_parsed: Option<NaiveDateTime>,
    pub artists: String,
    /// Accompanists and instruments. Never searched for artist names.
    pub details: Option<String>,
    pub venue: String,
    /// Which upstream schedule contributed the row.
    pub source: Option<String>,
    pub ticketed: Option<Ticketed>,
}

impl ConcertRecord {
    pub fn new(date: Option<NaiveDate>, time: &str, artists: &str, venue: &str) -> Self {
        let time = time.trim().to_string();
        let time_parsed = date.zip(parse_time(&time)).map(|(d, t)| d.and_time(t));
        Self {
            date,
            time,
            time_parsed,
            artists: artists.trim().to_string(),
            details: None,
            venue: venue.trim().to_string(),
            source: None,
            ticketed: None,
        }
    }

    pub fn with_details(mut self, details: &str) -> Self {
        self.details = non_empty(details);
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = non_empty(source);
        self
    }

    pub fn with_ticketed(mut self, ticketed: Option<Ticketed>) -> Self {
        self.ticketed = ticketed;
        self
    }

    pub fn year(&self) -> Option<i32> {
        self.date.map(|d| d.year())
    }

    pub fn month(&self) -> Option<u32> {
        self.date.map(|d| d.month())
    }

    pub fn day(&self) -> Option<u32> {
        self.date.map(|d| d.day())
    }

    pub fn weekday(&self) -> Option<Weekday> {
        self.date.map(|d| d.weekday())
    }

    /// Hour of day: from the parsed timestamp when there is one, otherwise
    /// the leading `HH` before the first `:` of the raw time.
    pub fn hour(&self) -> Option<u32> {
        if let Some(ts) = self.time_parsed {
            return Some(chrono::Timelike::hour(&ts));
        }
        let (head, _) = self.time.split_once(':')?;
        head.trim().parse().ok().filter(|h| *h < 24)
    }

    /// "Mon 15 Dec 2025" style label, or "unknown date".
    pub fn date_label(&self) -> String {
        match self.date {
            Some(d) => d.format("%a %d %b %Y").to_string(),
            None => "unknown date".to_string(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// Admission status of a concert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ticketed {
    Free,
    Ticketed,
}

impl fmt::Display for Ticketed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ticketed::Free => write!(f, "Free"),
            Ticketed::Ticketed => write!(f, "Ticketed"),
        }
    }
}

impl FromStr for Ticketed {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Ticketed::Free),
            "ticketed" | "paid" => Ok(Ticketed::Ticketed),
            _ => Err(()),
        }
    }
}

/// Coarse time-of-day buckets over the hour of the concert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// All buckets in keyword priority order.
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];

    /// Half-open hour interval `[start, end)`.
    pub fn hours(self) -> (u32, u32) {
        match self {
            TimeOfDay::Morning => (6, 12),
            TimeOfDay::Afternoon => (12, 17),
            TimeOfDay::Evening => (17, 21),
            TimeOfDay::Night => (21, 24),
        }
    }

    pub fn contains_hour(self, hour: u32) -> bool {
        let (start, end) = self.hours();
        start <= hour && hour < end
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeOfDay {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        TimeOfDay::ALL.into_iter().find(|t| t.as_str() == s).ok_or(())
    }
}

/// Parse a time cell: `HH:MM`, `HH:MM:SS`, `H:MM AM/PM` or `H:MMAM/PM`.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    const FORMATS: [&str; 4] = ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"];
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// Parse a date cell. Schedules use `DD-Mon-YYYY`; other common layouts are
/// accepted after it.
pub fn parse_date_cell(s: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 9] = [
        "%d-%b-%Y",
        "%Y-%m-%d",
        "%m/%d/%Y",
        "%d/%m/%Y",
        "%d %b %Y",
        "%d %B %Y",
        "%b %d, %Y",
        "%B %d, %Y",
        "%d-%m-%Y",
    ];
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Dataset-level statistics for help/info answers and `stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreSummary {
    pub total: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub venue_count: usize,
    pub sample_venues: Vec<String>,
    pub sources: Vec<(String, usize)>,
    pub free: usize,
    pub ticketed: usize,
    pub undated: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2025, 12, day)
    }

    #[test]
    fn test_time_formats() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0);
        assert_eq!(parse_time("18:45"), t(18, 45));
        assert_eq!(parse_time("09:30:00"), t(9, 30));
        assert_eq!(parse_time("6:45 PM"), t(18, 45));
        assert_eq!(parse_time("6:45pm"), t(18, 45));
        assert_eq!(parse_time("12:00 AM"), t(0, 0));
        assert_eq!(parse_time("12:15 PM"), t(12, 15));
        assert_eq!(parse_time("evening"), None);
        assert_eq!(parse_time(""), None);
    }

    #[test]
    fn test_date_cells() {
        assert_eq!(parse_date_cell("15-Dec-2025"), dec(15));
        assert_eq!(parse_date_cell("2025-12-15"), dec(15));
        assert_eq!(parse_date_cell("12/15/2025"), dec(15));
        assert_eq!(parse_date_cell("15 December 2025"), dec(15));
        assert_eq!(parse_date_cell("TBA"), None);
    }

    #[test]
    fn test_record_derived_fields() {
        let r = ConcertRecord::new(dec(15), " 6:45 PM ", "T.M. Krishna", "Music Academy");
        assert_eq!(r.time, "6:45 PM");
        assert_eq!(r.hour(), Some(18));
        assert_eq!(r.month(), Some(12));
        assert_eq!(r.day(), Some(15));
        assert_eq!(r.year(), Some(2025));
        assert_eq!(r.weekday(), Some(Weekday::Mon));
        assert_eq!(r.date_label(), "Mon 15 Dec 2025");
    }

    #[test]
    fn test_hour_falls_back_to_raw_time() {
        // No date: nothing to anchor the timestamp to, but the hour is still readable
        let r = ConcertRecord::new(None, "16:00", "Someone", "Somewhere");
        assert!(r.time_parsed.is_none());
        assert_eq!(r.hour(), Some(16));

        let r = ConcertRecord::new(dec(1), "TBA", "Someone", "Somewhere");
        assert_eq!(r.hour(), None);
    }

    #[test]
    fn test_optional_fields_drop_blanks() {
        let r = ConcertRecord::new(dec(1), "10:00", "A", "B")
            .with_details("  ")
            .with_source("Kutcheri Buzz");
        assert_eq!(r.details, None);
        assert_eq!(r.source.as_deref(), Some("Kutcheri Buzz"));
    }

    #[test]
    fn test_time_of_day_buckets() {
        assert!(TimeOfDay::Morning.contains_hour(6));
        assert!(!TimeOfDay::Morning.contains_hour(12));
        assert!(TimeOfDay::Afternoon.contains_hour(12));
        assert!(TimeOfDay::Evening.contains_hour(20));
        assert!(TimeOfDay::Night.contains_hour(23));
        assert!(!TimeOfDay::ALL.iter().any(|t| t.contains_hour(3)));
        assert_eq!("Evening".parse::<TimeOfDay>(), Ok(TimeOfDay::Evening));
        assert!("dusk".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn test_ticketed_parse() {
        assert_eq!("Free".parse::<Ticketed>(), Ok(Ticketed::Free));
        assert_eq!(" ticketed ".parse::<Ticketed>(), Ok(Ticketed::Ticketed));
        assert!("".parse::<Ticketed>().is_err());
        assert_eq!(Ticketed::Free.to_string(), "Free");
    }
}
