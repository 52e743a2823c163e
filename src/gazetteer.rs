use serde::Deserialize;

/// A known place: canonical display name plus lower-case aliases.
#[derive(Debug, Clone)]
pub struct PlaceEntry {
    pub canonical_name: String,
    pub aliases: Vec<String>,
}

/// A place added from config.
///
/// ```toml
/// [[gazetteer.locations]]
/// name = "T. Nagar"
/// aliases = ["thyagaraya nagar"]
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct CustomPlace {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Extra gazetteer entries from config, merged into the built-in lists.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GazetteerConfig {
    pub venues: Vec<CustomPlace>,
    pub locations: Vec<CustomPlace>,
}

/// Known venue and area names, matched as substrings of an utterance.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    venues: Vec<PlaceEntry>,
    locations: Vec<PlaceEntry>,
}

impl Default for Gazetteer {
    fn default() -> Self {
        Self::new(&GazetteerConfig::default())
    }
}

impl Gazetteer {
    pub fn new(custom: &GazetteerConfig) -> Self {
        let mut venues = builtin_venues();
        let mut locations = builtin_locations();
        merge(&mut venues, &custom.venues);
        merge(&mut locations, &custom.locations);
        Self { venues, locations }
    }

    /// Venue named anywhere in `text`; the longest alias wins.
    pub fn find_venue(&self, text: &str) -> Option<&str> {
        longest_match(&self.venues, text)
    }

    /// Area named anywhere in `text`; the longest alias wins, so
    /// "besant nagar" beats the "t nagar" inside it.
    pub fn find_location(&self, text: &str) -> Option<&str> {
        longest_match(&self.locations, text)
    }

    /// True when `phrase` is exactly a known area name or alias.
    pub fn is_location(&self, phrase: &str) -> bool {
        let lower = phrase.trim().to_lowercase();
        self.locations.iter().any(|e| e.aliases.contains(&lower))
    }

    /// Every lower-case spelling of the venue `name` refers to, when `name`
    /// is a known canonical name or alias.
    pub fn venue_spellings(&self, name: &str) -> Option<&[String]> {
        spellings(&self.venues, name)
    }

    /// Every lower-case spelling of the area `name` refers to.
    pub fn location_spellings(&self, name: &str) -> Option<&[String]> {
        spellings(&self.locations, name)
    }

    pub fn venues(&self) -> &[PlaceEntry] {
        &self.venues
    }

    pub fn locations(&self) -> &[PlaceEntry] {
        &self.locations
    }
}

/// Additive merge: a custom entry matching an existing canonical name
/// (case-insensitive) contributes new aliases; anything else is appended.
fn merge(entries: &mut Vec<PlaceEntry>, custom: &[CustomPlace]) {
    for place in custom {
        let name = place.name.trim();
        if name.is_empty() {
            continue;
        }
        let mut aliases: Vec<String> = std::iter::once(name)
            .chain(place.aliases.iter().map(String::as_str))
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        aliases.dedup();

        let existing = entries
            .iter_mut()
            .find(|e| e.canonical_name.eq_ignore_ascii_case(name));
        match existing {
            Some(entry) => {
                for alias in aliases {
                    if !entry.aliases.contains(&alias) {
                        entry.aliases.push(alias);
                    }
                }
            }
            None => entries.push(PlaceEntry {
                canonical_name: name.to_string(),
                aliases,
            }),
        }
    }
}

fn longest_match<'a>(entries: &'a [PlaceEntry], text: &str) -> Option<&'a str> {
    let lower = text.to_lowercase();
    let mut best: Option<(usize, &PlaceEntry)> = None;
    for entry in entries {
        for alias in &entry.aliases {
            if lower.contains(alias.as_str()) && best.is_none_or(|(len, _)| alias.len() > len) {
                best = Some((alias.len(), entry));
            }
        }
    }
    best.map(|(_, e)| e.canonical_name.as_str())
}

fn spellings<'a>(entries: &'a [PlaceEntry], name: &str) -> Option<&'a [String]> {
    let lower = name.trim().to_lowercase();
    entries
        .iter()
        .find(|e| e.aliases.contains(&lower))
        .map(|e| e.aliases.as_slice())
}

fn entry(name: &str, aliases: &[&str]) -> PlaceEntry {
    let mut all = vec![name.to_lowercase()];
    all.extend(aliases.iter().map(|a| a.to_lowercase()));
    PlaceEntry {
        canonical_name: name.to_string(),
        aliases: all,
    }
}

fn builtin_venues() -> Vec<PlaceEntry> {
    vec![
        entry("Music Academy", &["madras music academy"]),
        entry("Krishna Gana Sabha", &[]),
        entry("Mylapore Fine Arts", &["mylapore fine arts club"]),
        entry("Narada Gana Sabha", &[]),
        entry("Bharatiya Vidya Bhavan", &["bharathiya vidya bhavan"]),
        entry("Vani Mahal", &[]),
        entry("Kalakshetra", &[]),
        entry("Arkay Convention", &["arkay convention center", "arkay convention centre"]),
        entry("Sri YGP Auditorium", &["ygp auditorium"]),
    ]
}

fn builtin_locations() -> Vec<PlaceEntry> {
    vec![
        entry("Mylapore", &[]),
        entry("T. Nagar", &["t nagar", "t.nagar", "thyagaraya nagar"]),
        entry("Adyar", &[]),
        entry("Besant Nagar", &[]),
        entry("Alwarpet", &[]),
        entry("Abhiramapuram", &[]),
        entry("West Mambalam", &[]),
        entry("Nungambakkam", &[]),
    ]
}
