pub mod models;
pub mod queries;

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use thiserror::Error;

use crate::dates::{DateRange, DateResolver};
use crate::gazetteer::Gazetteer;
use models::{ConcertRecord, Ticketed, parse_date_cell};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Schedule file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Schedule is missing a required column: {0}")]
    MissingColumn(&'static str),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Position of a record in the store. Stable for the life of the store.
pub type RecordId = usize;

/// In-memory concert table. Read-only after construction apart from the
/// lazily derived hour column.
#[derive(Debug)]
pub struct ConcertStore {
    records: Vec<ConcertRecord>,
    resolver: DateResolver,
    gazetteer: Gazetteer,
    hours: OnceLock<Vec<Option<u32>>>,
}

/// Header aliases accepted for each column.
const DATE_COLUMNS: &[&str] = &["Date"];
const TIME_COLUMNS: &[&str] = &["Time"];
const ARTIST_COLUMNS: &[&str] = &["Artist(s)", "Artist", "Artists"];
const VENUE_COLUMNS: &[&str] = &["Venue", "Sabha"];
const DETAILS_COLUMNS: &[&str] = &["Instruments/Details", "Details", "Instruments"];
const SOURCE_COLUMNS: &[&str] = &["Source"];
const TICKETED_COLUMNS: &[&str] = &["Ticketed"];

struct ColumnMap {
    date: usize,
    time: usize,
    artist: usize,
    venue: usize,
    details: Option<usize>,
    source: Option<usize>,
    ticketed: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let find = |aliases: &[&str]| {
            aliases.iter().find_map(|alias| {
                headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(alias))
            })
        };
        Ok(Self {
            date: find(DATE_COLUMNS).ok_or(StoreError::MissingColumn("Date"))?,
            time: find(TIME_COLUMNS).ok_or(StoreError::MissingColumn("Time"))?,
            artist: find(ARTIST_COLUMNS).ok_or(StoreError::MissingColumn("Artist(s)"))?,
            venue: find(VENUE_COLUMNS).ok_or(StoreError::MissingColumn("Venue"))?,
            details: find(DETAILS_COLUMNS),
            source: find(SOURCE_COLUMNS),
            ticketed: find(TICKETED_COLUMNS),
        })
    }
}

impl ConcertStore {
    /// Load a schedule file. Tab-separated for `.txt`/`.tsv`, comma-separated
    /// otherwise. `today` anchors relative date expressions.
    pub fn load(path: &Path, today: NaiveDate) -> Result<Self> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let delimiter = if ext == "txt" || ext == "tsv" { b'\t' } else { b',' };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(file);
        let columns = ColumnMap::from_headers(reader.headers()?)?;

        let mut records = Vec::new();
        let mut undated = 0usize;
        for row in reader.records() {
            let row = row?;
            let cell = |i: usize| row.get(i).unwrap_or("").trim();
            let optional = |i: Option<usize>| i.map(|i| row.get(i).unwrap_or("").trim()).unwrap_or("");

            let date = parse_date_cell(cell(columns.date));
            if date.is_none() {
                undated += 1;
                log::debug!("Unparsable date {:?}, keeping row undated", cell(columns.date));
            }
            let record = ConcertRecord::new(date, cell(columns.time), cell(columns.artist), cell(columns.venue))
                .with_details(optional(columns.details))
                .with_source(optional(columns.source))
                .with_ticketed(optional(columns.ticketed).parse::<Ticketed>().ok());
            records.push(record);
        }

        log::info!(
            "Read {} rows from {} ({} with unparsable dates)",
            records.len(),
            path.display(),
            undated
        );
        Ok(Self::from_records(records, today))
    }

    /// Build a store from already-parsed records, removing duplicate events.
    pub fn from_records(records: Vec<ConcertRecord>, today: NaiveDate) -> Self {
        let before = records.len();
        let records = dedup(records);
        if records.len() < before {
            log::info!("Removed {} duplicate concerts", before - records.len());
        }

        let mut store = Self {
            records,
            resolver: DateResolver::new(today),
            gazetteer: Gazetteer::default(),
            hours: OnceLock::new(),
        };
        let season = store.date_span().map(|(first, last)| DateRange::new(first, last));
        store.resolver = store.resolver.with_season(season);
        store
    }

    /// Replace the built-in place names used to widen venue and area filters.
    pub fn with_gazetteer(mut self, gazetteer: Gazetteer) -> Self {
        self.gazetteer = gazetteer;
        self
    }

    pub fn gazetteer(&self) -> &Gazetteer {
        &self.gazetteer
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&ConcertRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> &[ConcertRecord] {
        &self.records
    }

    /// Resolver anchored on the store's reference day and season.
    pub fn resolver(&self) -> &DateResolver {
        &self.resolver
    }

    /// Clone the rows for a set of ids, in the given order.
    pub fn rows(&self, ids: &[RecordId]) -> Vec<ConcertRecord> {
        ids.iter().filter_map(|&id| self.get(id).cloned()).collect()
    }

    /// Hour column, derived on first use. Repeated calls see the same values.
    fn hours(&self) -> &[Option<u32>] {
        self.hours
            .get_or_init(|| self.records.iter().map(ConcertRecord::hour).collect())
    }
}

/// Loose venue identity: text before the first comma (organisational
/// suffixes such as ", The Music Academy" dropped), case and spacing folded.
pub fn normalize_venue(venue: &str) -> String {
    let head = venue.split(',').next().unwrap_or("");
    head.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Keep one record per (date, time, artists, venue) event. The first
/// occurrence keeps its position; the longest venue string among the
/// duplicates is the one retained.
fn dedup(records: Vec<ConcertRecord>) -> Vec<ConcertRecord> {
    let mut seen: HashMap<(Option<NaiveDate>, String, String, String), usize> = HashMap::new();
    let mut kept: Vec<ConcertRecord> = Vec::with_capacity(records.len());

    for record in records {
        let key = (
            record.date,
            record.time.to_lowercase(),
            record.artists.to_lowercase(),
            normalize_venue(&record.venue),
        );
        match seen.get(&key) {
            Some(&pos) => {
                if record.venue.chars().count() > kept[pos].venue.chars().count() {
                    log::debug!("Duplicate {:?}: keeping venue {:?}", record.artists, record.venue);
                    kept[pos] = record;
                }
            }
            None => {
                seen.insert(key, kept.len());
                kept.push(record);
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 10).unwrap()
    }

    fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_load_csv() {
        let f = write_file(
            ".csv",
            "Date,Time,Artist(s),Instruments/Details,Venue,Source,Ticketed\n\
             15-Dec-2025,18:45,Sanjay Subrahmanyan,\"Vocal, S. Varadarajan (violin)\",Music Academy,Academy,Ticketed\n\
             16-Dec-2025,9:30 AM,Ranjani-Gayatri,Vocal,Narada Gana Sabha,Kutcheri Buzz,Free\n",
        );
        let store = ConcertStore::load(f.path(), today()).unwrap();
        assert_eq!(store.len(), 2);
        let first = store.get(0).unwrap();
        assert_eq!(first.artists, "Sanjay Subrahmanyan");
        assert_eq!(first.details.as_deref(), Some("Vocal, S. Varadarajan (violin)"));
        assert_eq!(first.ticketed, Some(Ticketed::Ticketed));
        assert_eq!(store.get(1).unwrap().hour(), Some(9));
    }

    #[test]
    fn test_load_tsv_with_aliases() {
        let f = write_file(
            ".txt",
            "Date\tTime\tArtist\tSabha\n15-Dec-2025\t16:00\tAbhishek Raghuram\tKrishna Gana Sabha\n",
        );
        let store = ConcertStore::load(f.path(), today()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().venue, "Krishna Gana Sabha");
        assert_eq!(store.get(0).unwrap().source, None);
    }

    #[test]
    fn test_unparsable_date_kept() {
        let f = write_file(".csv", "Date,Time,Artist(s),Venue\nTBA,18:00,Someone,Somewhere\n");
        let store = ConcertStore::load(f.path(), today()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().date, None);
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = ConcertStore::load(Path::new("/nonexistent/schedule.csv"), today()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(err.to_string().contains("/nonexistent/schedule.csv"));
    }

    #[test]
    fn test_missing_column() {
        let f = write_file(".csv", "Date,Time,Venue\n15-Dec-2025,18:00,Somewhere\n");
        let err = ConcertStore::load(f.path(), today()).unwrap_err();
        assert!(matches!(err, StoreError::MissingColumn("Artist(s)")));
    }

    #[test]
    fn test_dedup_keeps_longest_venue_in_first_position() {
        let d = NaiveDate::from_ymd_opt(2025, 12, 15);
        let records = vec![
            ConcertRecord::new(d, "18:00", "Sanjay Subrahmanyan", "Main Hall"),
            ConcertRecord::new(d, "10:00", "Other Artist", "Vani Mahal"),
            ConcertRecord::new(d, "18:00", "Sanjay Subrahmanyan", "Main Hall, The Music Academy"),
        ];
        let store = ConcertStore::from_records(records, today());
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().venue, "Main Hall, The Music Academy");
        assert_eq!(store.get(1).unwrap().artists, "Other Artist");
    }

    #[test]
    fn test_dedup_distinct_times_kept() {
        let d = NaiveDate::from_ymd_opt(2025, 12, 15);
        let records = vec![
            ConcertRecord::new(d, "10:00", "A", "Vani Mahal"),
            ConcertRecord::new(d, "16:00", "A", "Vani Mahal"),
        ];
        assert_eq!(ConcertStore::from_records(records, today()).len(), 2);
    }

    #[test]
    fn test_normalize_venue() {
        assert_eq!(normalize_venue("Main  Hall, The Music Academy"), "main hall");
        assert_eq!(normalize_venue(" Vani Mahal "), "vani mahal");
    }

    #[test]
    fn test_season_from_data() {
        let records = vec![
            ConcertRecord::new(NaiveDate::from_ymd_opt(2025, 12, 1), "10:00", "A", "X"),
            ConcertRecord::new(NaiveDate::from_ymd_opt(2026, 1, 5), "10:00", "B", "Y"),
        ];
        let store = ConcertStore::from_records(records, NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        assert_eq!(store.resolver().infer_year(12, 20), 2025);
    }
}
