//! Dashboard filter state and the rules that turn it into a record predicate

use chrono::{DateTime, Months, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::notams::{NotamCategory, NotamRecord};

/// Minimum trimmed length at which a search term replaces the structured fetch
pub const MIN_SEARCH_LEN: usize = 3;

/// World region, selected by ICAO location prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    #[default]
    All,
    NorthAmerica,
    Europe,
    Asia,
    Africa,
    Oceania,
    SouthAmerica,
}

impl Region {
    pub const ALL: [Region; 7] = [
        Region::All,
        Region::NorthAmerica,
        Region::Europe,
        Region::Asia,
        Region::Africa,
        Region::Oceania,
        Region::SouthAmerica,
    ];

    /// First letters of ICAO location codes in this region.
    ///
    /// This is a coarse grouping, not the ICAO regional allocation; `All` has none.
    pub fn icao_prefixes(&self) -> &'static [char] {
        match self {
            Region::All => &[],
            Region::NorthAmerica => &['K'],
            Region::Europe => &['E', 'L'],
            Region::Asia => &['R', 'V', 'Z'],
            Region::Africa => &['F', 'D'],
            Region::Oceania => &['Y'],
            Region::SouthAmerica => &['S'],
        }
    }

    pub fn matches(&self, location: &str) -> bool {
        let prefixes = self.icao_prefixes();
        if prefixes.is_empty() {
            return true;
        }
        location
            .trim()
            .chars()
            .next()
            .map(|c| prefixes.contains(&c.to_ascii_uppercase()))
            .unwrap_or(false)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::All => "all",
            Region::NorthAmerica => "north-america",
            Region::Europe => "europe",
            Region::Asia => "asia",
            Region::Africa => "africa",
            Region::Oceania => "oceania",
            Region::SouthAmerica => "south-america",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown region '{}'", s))
    }
}

/// How far back the effective date may lie
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    #[default]
    Current,
    Today,
    Week,
    Month,
}

impl DateRange {
    /// Earliest effective timestamp admitted, relative to `now`. `Current` has no floor.
    pub fn floor(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start_of_today = now.date_naive().and_time(NaiveTime::default()).and_utc();
        match self {
            DateRange::Current => None,
            DateRange::Today => Some(start_of_today),
            DateRange::Week => Some(start_of_today - chrono::Duration::days(7)),
            DateRange::Month => start_of_today.checked_sub_months(Months::new(1)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DateRange::Current => "current",
            DateRange::Today => "today",
            DateRange::Week => "week",
            DateRange::Month => "month",
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "current" => Ok(DateRange::Current),
            "today" => Ok(DateRange::Today),
            "week" => Ok(DateRange::Week),
            "month" => Ok(DateRange::Month),
            other => Err(format!("unknown date range '{}'", other)),
        }
    }
}

/// Altitude band in feet; either end may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AltitudeBand {
    #[serde(default)]
    pub min_ft: Option<i32>,
    #[serde(default)]
    pub max_ft: Option<i32>,
}

impl AltitudeBand {
    pub fn new(min_ft: Option<i32>, max_ft: Option<i32>) -> Self {
        Self { min_ft, max_ft }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min_ft.is_none() && self.max_ft.is_none()
    }

    /// Records without an altitude range always pass
    pub fn admits(&self, record: &NotamRecord) -> bool {
        if self.is_unbounded() {
            return true;
        }
        record
            .altitude
            .map(|range| range.overlaps(self.min_ft, self.max_ft))
            .unwrap_or(true)
    }
}

/// What a change to the search box means for the working set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchIntent {
    /// Run a search with this (trimmed) term
    Search(String),
    /// Box emptied: go back to the structured fetch
    Clear,
    /// One or two characters: not a search yet, leave results alone
    Incomplete,
}

pub fn classify_search(term: &str) -> SearchIntent {
    let trimmed = term.trim();
    match trimmed.chars().count() {
        0 => SearchIntent::Clear,
        n if n < MIN_SEARCH_LEN => SearchIntent::Incomplete,
        _ => SearchIntent::Search(trimmed.to_string()),
    }
}

/// Everything the user can filter by
///
/// `category: None` means all categories. The search term, once it is long enough,
/// takes over from the structured fields until it is cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterState {
    pub region: Region,
    #[serde(rename = "type", with = "category_filter")]
    pub category: Option<NotamCategory>,
    pub date_range: DateRange,
    pub altitude: AltitudeBand,
    pub search: String,
}

impl FilterState {
    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn with_category(mut self, category: Option<NotamCategory>) -> Self {
        self.category = category;
        self
    }

    pub fn with_date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = date_range;
        self
    }

    pub fn with_altitude(mut self, altitude: AltitudeBand) -> Self {
        self.altitude = altitude;
        self
    }

    /// The search term if it is long enough to supersede the structured filters
    pub fn active_search(&self) -> Option<&str> {
        let trimmed = self.search.trim();
        (trimmed.chars().count() >= MIN_SEARCH_LEN).then_some(trimmed)
    }

    /// Structured predicate: region, category, date floor and altitude band
    pub fn matches(&self, record: &NotamRecord, now: DateTime<Utc>) -> bool {
        if !self.region.matches(&record.location) {
            return false;
        }
        if self.category.is_some_and(|c| c != record.category) {
            return false;
        }
        if let Some(floor) = self.date_range.floor(now)
            && record.effective < floor
        {
            return false;
        }
        self.altitude.admits(record)
    }
}

/// `"all"` (or nothing) on the wire is `None`
mod category_filter {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::notams::NotamCategory;

    pub fn serialize<S>(value: &Option<NotamCategory>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.map(|c| c.as_str()).unwrap_or("all"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NotamCategory>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
            Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notams::AltitudeRange;
    use chrono::TimeZone;

    fn record(location: &str, category: NotamCategory, effective: DateTime<Utc>) -> NotamRecord {
        NotamRecord::new("X1", location, category, effective, "")
    }

    #[test]
    fn test_region_prefixes() {
        assert!(Region::NorthAmerica.matches("KJFK"));
        assert!(Region::Europe.matches("EGLL"));
        assert!(Region::Europe.matches("LFPG"));
        assert!(Region::Asia.matches("rjtt"));
        assert!(!Region::Oceania.matches("EHAM"));
        assert!(Region::All.matches(""));
        assert!(!Region::Africa.matches(""));
        assert_eq!("south-america".parse::<Region>(), Ok(Region::SouthAmerica));
    }

    #[test]
    fn test_date_floors() {
        let now = Utc.with_ymd_and_hms(2025, 8, 12, 15, 30, 0).unwrap();
        assert_eq!(DateRange::Current.floor(now), None);
        assert_eq!(
            DateRange::Today.floor(now),
            Some(Utc.with_ymd_and_hms(2025, 8, 12, 0, 0, 0).unwrap())
        );
        assert_eq!(
            DateRange::Week.floor(now),
            Some(Utc.with_ymd_and_hms(2025, 8, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(
            DateRange::Month.floor(now),
            Some(Utc.with_ymd_and_hms(2025, 7, 12, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_structured_match() {
        let now = Utc.with_ymd_and_hms(2025, 8, 12, 12, 0, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap();
        let fresh = Utc.with_ymd_and_hms(2025, 8, 12, 6, 0, 0).unwrap();

        let filters = FilterState::default()
            .with_region(Region::Europe)
            .with_category(Some(NotamCategory::Obstacle))
            .with_date_range(DateRange::Week);

        assert!(filters.matches(&record("EGLL", NotamCategory::Obstacle, fresh), now));
        assert!(!filters.matches(&record("EGLL", NotamCategory::Obstacle, old), now));
        assert!(!filters.matches(&record("KJFK", NotamCategory::Obstacle, fresh), now));
        assert!(!filters.matches(&record("EGLL", NotamCategory::Navaid, fresh), now));
        assert!(FilterState::default().matches(&record("KJFK", NotamCategory::Navaid, old), now));
    }

    #[test]
    fn test_altitude_band() {
        let now = Utc.with_ymd_and_hms(2025, 8, 12, 12, 0, 0).unwrap();
        let filters = FilterState::default().with_altitude(AltitudeBand::new(Some(10_000), None));
        let low = record("KJFK", NotamCategory::Obstacle, now)
            .with_altitude(AltitudeRange::new(None, Some(500)));
        let high = record("KJFK", NotamCategory::Airspace, now)
            .with_altitude(AltitudeRange::new(Some(5000), Some(18_000)));
        let unknown = record("KJFK", NotamCategory::Airport, now);

        assert!(!filters.matches(&low, now));
        assert!(filters.matches(&high, now));
        assert!(filters.matches(&unknown, now));
    }

    #[test]
    fn test_search_classification() {
        assert_eq!(classify_search(""), SearchIntent::Clear);
        assert_eq!(classify_search("   "), SearchIntent::Clear);
        assert_eq!(classify_search("KJ"), SearchIntent::Incomplete);
        assert_eq!(classify_search(" crane "), SearchIntent::Search("crane".to_string()));

        let mut filters = FilterState::default();
        filters.search = "ab".to_string();
        assert_eq!(filters.active_search(), None);
        filters.search = " abc".to_string();
        assert_eq!(filters.active_search(), Some("abc"));
    }

    #[test]
    fn test_filter_state_deserializes_with_defaults() {
        let filters: FilterState = serde_json::from_str(r#"{"region": "europe", "type": "navaid"}"#).unwrap();
        assert_eq!(filters.region, Region::Europe);
        assert_eq!(filters.category, Some(NotamCategory::Navaid));
        assert_eq!(filters.date_range, DateRange::Current);
        assert!(filters.altitude.is_unbounded());

        let all: FilterState = serde_json::from_str(r#"{"type": "all", "dateRange": "week"}"#).unwrap();
        assert_eq!(all.category, None);
        assert_eq!(all.date_range, DateRange::Week);
    }
}
