use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A resolved date expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateExpr {
    /// A calendar date with a known year.
    Exact(NaiveDate),
    /// Month and day with no year: matches that day in every year of the season.
    MonthDay { month: u32, day: u32 },
    /// An inclusive interval.
    Range(DateRange),
}

/// Inclusive date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Absolute formats, tried in this order. The first parse wins, so numeric
/// dates are read month-first: "03/04/2025" is March 4, never April 3.
const ABSOLUTE_FORMATS: &[(&str, bool)] = &[
    ("%Y-%m-%d", true),
    ("%b %d", false),
    ("%B %d", false),
    ("%d %b", false),
    ("%d %B", false),
    ("%m/%d/%Y", true),
    ("%d/%m/%Y", true),
    ("%m-%d-%Y", true),
    ("%d-%m-%Y", true),
];

/// Leap year used to validate year-less month/day pairs (so Feb 29 parses).
const LEAP_YEAR: i32 = 2000;

// "Dec 15-20", "December 15 to 20"
static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?P<month>[a-z]+)\.?\s+(?P<first>\d{1,2})\s*(?:-|–|to\b)\s*(?P<last>\d{1,2})\b")
        .unwrap()
});

static SINGLE_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?P<word>today|tomorrow|yesterday)\b").unwrap());

static IN_DAYS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bin\s+(?P<n>\d{1,3})\s+days?\b").unwrap());

static NEXT_WEEK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bnext\s+week\b").unwrap());

static WEEKEND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:(?P<next>next)\s+)?weekend\b").unwrap());

static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?P<which>next|this)\s+(?P<day>monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
    )
    .unwrap()
});

/// Resolves date expressions relative to a reference day.
///
/// `season` is the span of dates the schedule covers. When an expression
/// names a month and day but no year, the year is taken from the season if
/// that day falls inside it, otherwise from the reference day.
#[derive(Debug, Clone, Copy)]
pub struct DateResolver {
    pub today: NaiveDate,
    pub season: Option<DateRange>,
}

impl DateResolver {
    pub fn new(today: NaiveDate) -> Self {
        Self { today, season: None }
    }

    pub fn with_season(mut self, season: Option<DateRange>) -> Self {
        self.season = season;
        self
    }

    /// Resolve a date expression: range forms first, then relative forms,
    /// then the absolute formats. `None` means unparsable.
    pub fn resolve(&self, text: &str) -> Option<DateExpr> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Some(range) = self.parse_range(text) {
            return Some(DateExpr::Range(range));
        }
        if let Some(expr) = self.parse_relative(text) {
            return Some(expr);
        }
        parse_absolute(text)
    }

    /// "<Month> D1-D2" or "<Month> D1 to D2", both days in the same month and year.
    pub fn parse_range(&self, text: &str) -> Option<DateRange> {
        for caps in RANGE_RE.captures_iter(text) {
            let Some(month) = month_from_name(&caps["month"]) else {
                continue;
            };
            let (Ok(first), Ok(last)) = (caps["first"].parse::<u32>(), caps["last"].parse::<u32>())
            else {
                continue;
            };
            let year = self.infer_year(month, first);
            if let (Some(start), Some(end)) = (
                NaiveDate::from_ymd_opt(year, month, first),
                NaiveDate::from_ymd_opt(year, month, last),
            ) {
                return Some(DateRange::new(start, end));
            }
        }
        None
    }

    /// Relative expressions found anywhere in `text`.
    ///
    /// Week-level forms ("next week", weekends) resolve to ranges; the rest
    /// resolve to a single exact day.
    pub fn parse_relative(&self, text: &str) -> Option<DateExpr> {
        let today = self.today;

        if let Some(caps) = WEEKEND_RE.captures(text) {
            let anchor = if caps.name("next").is_some() { add_days(today, 7) } else { today };
            return Some(DateExpr::Range(weekend_of(anchor)));
        }
        if NEXT_WEEK_RE.is_match(text) {
            return Some(DateExpr::Range(next_week(today)));
        }
        if let Some(caps) = WEEKDAY_RE.captures(text) {
            let weekday = weekday_from_name(&caps["day"])?;
            let date = if caps["which"].eq_ignore_ascii_case("next") {
                next_weekday(today, weekday)
            } else {
                this_weekday(today, weekday)
            };
            return Some(DateExpr::Exact(date));
        }
        if let Some(caps) = IN_DAYS_RE.captures(text) {
            let n: u64 = caps["n"].parse().ok()?;
            return today.checked_add_days(Days::new(n)).map(DateExpr::Exact);
        }
        if let Some(caps) = SINGLE_DAY_RE.captures(text) {
            let date = match caps["word"].to_lowercase().as_str() {
                "today" => today,
                "tomorrow" => add_days(today, 1),
                _ => today.checked_sub_days(Days::new(1)).unwrap_or(today),
            };
            return Some(DateExpr::Exact(date));
        }
        None
    }

    /// Year for a year-less month/day: the season's year containing that day,
    /// else the reference year.
    pub fn infer_year(&self, month: u32, day: u32) -> i32 {
        if let Some(season) = self.season {
            for year in season.start.year()..=season.end.year() {
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                    if season.contains(date) {
                        return year;
                    }
                }
            }
        }
        self.today.year()
    }
}

/// Try the fixed absolute formats in priority order.
pub fn parse_absolute(text: &str) -> Option<DateExpr> {
    let text = text.trim();
    for &(fmt, has_year) in ABSOLUTE_FORMATS {
        if has_year {
            if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
                return Some(DateExpr::Exact(date));
            }
        } else {
            let dated = format!("{text} {LEAP_YEAR}");
            if let Ok(date) = NaiveDate::parse_from_str(&dated, &format!("{fmt} %Y")) {
                return Some(DateExpr::MonthDay {
                    month: date.month(),
                    day: date.day(),
                });
            }
        }
    }
    None
}

/// Month number from a full name, a three-letter abbreviation, or "sept".
pub fn month_from_name(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january", "february", "march", "april", "may", "june",
        "july", "august", "september", "october", "november", "december",
    ];
    let lower = name.trim_end_matches('.').to_lowercase();
    if lower == "sept" {
        return Some(9);
    }
    MONTHS
        .iter()
        .position(|m| lower == *m || (lower.len() == 3 && m.starts_with(lower.as_str())))
        .map(|i| i as u32 + 1)
}

pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Next strict occurrence of `target` after `from` (never `from` itself).
pub fn next_weekday(from: NaiveDate, target: Weekday) -> NaiveDate {
    let current = from.weekday().num_days_from_monday() as i64;
    let mut ahead = target.num_days_from_monday() as i64 - current;
    if ahead <= 0 {
        ahead += 7;
    }
    add_days(from, ahead as u64)
}

/// This week's occurrence of `target`, rolling into next week if already past.
/// Returns `from` when it already is `target`.
pub fn this_weekday(from: NaiveDate, target: Weekday) -> NaiveDate {
    let current = from.weekday().num_days_from_monday() as i64;
    let mut ahead = target.num_days_from_monday() as i64 - current;
    if ahead < 0 {
        ahead += 7;
    }
    add_days(from, ahead as u64)
}

/// Saturday and Sunday of the referenced week: `from` itself if it is a
/// Saturday, otherwise the next Saturday.
pub fn weekend_of(from: NaiveDate) -> DateRange {
    let saturday = this_weekday(from, Weekday::Sat);
    DateRange::new(saturday, add_days(saturday, 1))
}

/// The following Monday through Sunday.
pub fn next_week(from: NaiveDate) -> DateRange {
    let monday = next_weekday(from, Weekday::Mon);
    DateRange::new(monday, add_days(monday, 6))
}

fn add_days(date: NaiveDate, n: u64) -> NaiveDate {
    date.checked_add_days(Days::new(n)).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // 2025-12-10 is a Wednesday
    fn resolver() -> DateResolver {
        DateResolver::new(d(2025, 12, 10))
    }

    #[test]
    fn test_iso_date_is_exact() {
        assert_eq!(resolver().resolve("2025-12-15"), Some(DateExpr::Exact(d(2025, 12, 15))));
    }

    #[test]
    fn test_month_name_forms_are_yearless() {
        let r = resolver();
        let dec15 = Some(DateExpr::MonthDay { month: 12, day: 15 });
        assert_eq!(r.resolve("Dec 15"), dec15);
        assert_eq!(r.resolve("December 15"), dec15);
        assert_eq!(r.resolve("15 Dec"), dec15);
        assert_eq!(r.resolve("15 December"), dec15);
        assert_eq!(r.resolve("dec 15"), dec15);
    }

    #[test]
    fn test_numeric_dates_prefer_month_first() {
        // Known ambiguity: month-first format wins whenever it parses
        assert_eq!(parse_absolute("03/04/2025"), Some(DateExpr::Exact(d(2025, 3, 4))));
        // Day-first only when month-first is impossible
        assert_eq!(parse_absolute("15/12/2025"), Some(DateExpr::Exact(d(2025, 12, 15))));
        assert_eq!(parse_absolute("12-15-2025"), Some(DateExpr::Exact(d(2025, 12, 15))));
        assert_eq!(parse_absolute("15-12-2025"), Some(DateExpr::Exact(d(2025, 12, 15))));
    }

    #[test]
    fn test_unparsable() {
        assert_eq!(resolver().resolve("sometime soon"), None);
        assert_eq!(resolver().resolve(""), None);
        assert_eq!(parse_absolute("Margazhi 40"), None);
    }

    #[test]
    fn test_single_day_relative() {
        let r = resolver();
        assert_eq!(r.resolve("today"), Some(DateExpr::Exact(d(2025, 12, 10))));
        assert_eq!(r.resolve("tomorrow"), Some(DateExpr::Exact(d(2025, 12, 11))));
        assert_eq!(r.resolve("yesterday"), Some(DateExpr::Exact(d(2025, 12, 9))));
        assert_eq!(r.resolve("in 5 days"), Some(DateExpr::Exact(d(2025, 12, 15))));
        assert_eq!(r.resolve("in 1 day"), Some(DateExpr::Exact(d(2025, 12, 11))));
    }

    #[test]
    fn test_next_weekday_is_strict() {
        let wed = d(2025, 12, 10);
        assert_eq!(next_weekday(wed, Weekday::Fri), d(2025, 12, 12));
        assert_eq!(next_weekday(wed, Weekday::Wed), d(2025, 12, 17));
        assert_eq!(next_weekday(wed, Weekday::Mon), d(2025, 12, 15));
    }

    #[test]
    fn test_this_weekday_rolls_forward() {
        let wed = d(2025, 12, 10);
        assert_eq!(this_weekday(wed, Weekday::Wed), wed);
        assert_eq!(this_weekday(wed, Weekday::Sun), d(2025, 12, 14));
        // Monday already passed this week
        assert_eq!(this_weekday(wed, Weekday::Mon), d(2025, 12, 15));
        assert_eq!(resolver().resolve("this Friday"), Some(DateExpr::Exact(d(2025, 12, 12))));
        assert_eq!(resolver().resolve("next friday"), Some(DateExpr::Exact(d(2025, 12, 12))));
    }

    #[test]
    fn test_next_monday_round_trip() {
        let r = resolver();
        let Some(DateExpr::Exact(monday)) = r.resolve("next Monday") else {
            panic!("next Monday did not resolve to a day");
        };
        assert_eq!(monday.weekday(), Weekday::Mon);

        // From the resolved Monday, "this Monday" is that same day
        let from_monday = DateResolver::new(monday);
        assert_eq!(from_monday.resolve("this Monday"), Some(DateExpr::Exact(monday)));

        // A week before it, "next Monday" lands on it again
        let week_before = DateResolver::new(monday - Days::new(7));
        assert_eq!(week_before.resolve("next Monday"), Some(DateExpr::Exact(monday)));
    }

    #[test]
    fn test_weekend() {
        // Wednesday → the coming Saturday/Sunday
        let expected = DateRange::new(d(2025, 12, 13), d(2025, 12, 14));
        assert_eq!(resolver().resolve("this weekend"), Some(DateExpr::Range(expected)));
        assert_eq!(resolver().resolve("weekend"), Some(DateExpr::Range(expected)));

        // Saturday uses itself
        assert_eq!(weekend_of(d(2025, 12, 13)), expected);
        // Sunday moves to the next Saturday
        assert_eq!(weekend_of(d(2025, 12, 14)).start, d(2025, 12, 20));

        let next = DateRange::new(d(2025, 12, 20), d(2025, 12, 21));
        assert_eq!(resolver().resolve("next weekend"), Some(DateExpr::Range(next)));
    }

    #[test]
    fn test_next_week_is_monday_to_sunday() {
        let expected = DateRange::new(d(2025, 12, 15), d(2025, 12, 21));
        assert_eq!(resolver().resolve("next week"), Some(DateExpr::Range(expected)));

        // On a Monday, next week starts seven days later
        assert_eq!(next_week(d(2025, 12, 15)).start, d(2025, 12, 22));
    }

    #[test]
    fn test_month_day_ranges() {
        let r = resolver();
        let expected = DateRange::new(d(2025, 12, 15), d(2025, 12, 20));
        assert_eq!(r.parse_range("Dec 15-20"), Some(expected));
        assert_eq!(r.parse_range("December 15 to 20"), Some(expected));
        assert_eq!(r.parse_range("concerts dec 15 - 20 please"), Some(expected));
        assert_eq!(r.parse_range("Dec 15"), None);
        assert_eq!(r.parse_range("Foo 15-20"), None);
    }

    #[test]
    fn test_year_inferred_from_season() {
        let season = DateRange::new(d(2025, 12, 1), d(2026, 1, 20));
        let r = DateResolver::new(d(2026, 10, 18)).with_season(Some(season));
        assert_eq!(r.infer_year(12, 15), 2025);
        assert_eq!(r.infer_year(1, 5), 2026);
        // Outside the season: reference year
        assert_eq!(r.infer_year(6, 1), 2026);
        assert_eq!(
            r.parse_range("Dec 15-20"),
            Some(DateRange::new(d(2025, 12, 15), d(2025, 12, 20)))
        );
    }

    #[test]
    fn test_month_names() {
        assert_eq!(month_from_name("Dec"), Some(12));
        assert_eq!(month_from_name("december"), Some(12));
        assert_eq!(month_from_name("Sept"), Some(9));
        assert_eq!(month_from_name("Jan."), Some(1));
        assert_eq!(month_from_name("decem"), None);
        assert_eq!(month_from_name("margazhi"), None);
    }
}
