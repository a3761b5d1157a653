//! NOTAM records as exchanged with the data gateway

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::geometry::{Coordinate, Geometry};

/// `SFC to 5000ft`, `1500-FL120`, `GND - UNL`
static ALTITUDE_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?P<lower>SFC|SURFACE|GND|FL\s*\d+|\d+)\s*(?:FT)?\s*(?:-|TO)\s*(?P<upper>UNL|UNLIMITED|FL\s*\d+|\d+)\s*(?:FT)?\s*(?:AGL|MSL|AMSL)?\s*$")
        .expect("altitude range regex")
});

/// NOTAM subject category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotamCategory {
    Obstacle,
    Airspace,
    Procedure,
    Navaid,
    Airport,
}

impl NotamCategory {
    pub const ALL: [NotamCategory; 5] = [
        NotamCategory::Obstacle,
        NotamCategory::Airspace,
        NotamCategory::Procedure,
        NotamCategory::Navaid,
        NotamCategory::Airport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotamCategory::Obstacle => "obstacle",
            NotamCategory::Airspace => "airspace",
            NotamCategory::Procedure => "procedure",
            NotamCategory::Navaid => "navaid",
            NotamCategory::Airport => "airport",
        }
    }
}

impl fmt::Display for NotamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotamCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotamCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown NOTAM category '{}'", s))
    }
}

/// Vertical extent in feet. `None` lower means surface, `None` upper means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "AltitudeRepr")]
pub struct AltitudeRange {
    pub lower_ft: Option<i32>,
    pub upper_ft: Option<i32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AltitudeRepr {
    Text(String),
    #[serde(rename_all = "camelCase")]
    Range {
        #[serde(default)]
        lower_ft: Option<i32>,
        #[serde(default)]
        upper_ft: Option<i32>,
    },
}

impl TryFrom<AltitudeRepr> for AltitudeRange {
    type Error = String;

    fn try_from(repr: AltitudeRepr) -> Result<Self, Self::Error> {
        match repr {
            AltitudeRepr::Text(text) => text.parse(),
            AltitudeRepr::Range { lower_ft, upper_ft } => Ok(Self { lower_ft, upper_ft }),
        }
    }
}

impl AltitudeRange {
    pub fn new(lower_ft: Option<i32>, upper_ft: Option<i32>) -> Self {
        Self { lower_ft, upper_ft }
    }

    /// Whether any part of this range falls inside `[min_ft, max_ft]`
    pub fn overlaps(&self, min_ft: Option<i32>, max_ft: Option<i32>) -> bool {
        let lower = self.lower_ft.unwrap_or(0);
        let upper = self.upper_ft.unwrap_or(i32::MAX);
        upper >= min_ft.unwrap_or(i32::MIN) && lower <= max_ft.unwrap_or(i32::MAX)
    }
}

impl FromStr for AltitudeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = ALTITUDE_RANGE_RE
            .captures(s)
            .ok_or_else(|| format!("unrecognized altitude range '{}'", s))?;
        let lower = parse_altitude_token(&caps["lower"])?;
        let upper = parse_altitude_token(&caps["upper"])?;
        Ok(Self {
            lower_ft: lower,
            upper_ft: upper,
        })
    }
}

impl fmt::Display for AltitudeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lower_ft {
            None | Some(0) => write!(f, "SFC")?,
            Some(ft) => write!(f, "{}ft", ft)?,
        }
        match self.upper_ft {
            None => write!(f, " to UNL"),
            Some(ft) => write!(f, " to {}ft", ft),
        }
    }
}

/// `SFC`/`GND` → surface (`None`), `UNL` → unlimited (`None`), `FL120` → 12000
fn parse_altitude_token(token: &str) -> Result<Option<i32>, String> {
    let t = token.trim().to_ascii_uppercase();
    match t.as_str() {
        "SFC" | "SURFACE" | "GND" | "UNL" | "UNLIMITED" => Ok(None),
        _ => {
            let (digits, scale) = match t.strip_prefix("FL") {
                Some(rest) => (rest.trim(), 100),
                None => (t.as_str(), 1),
            };
            digits
                .parse::<i32>()
                .ok()
                .and_then(|v| v.checked_mul(scale))
                .map(Some)
                .ok_or_else(|| format!("invalid altitude '{}'", token))
        }
    }
}

/// Parse a timestamp given as RFC 3339 or a bare `YYYY-MM-DD` date (midnight UTC)
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::default()).and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw))),
    }
}

/// A single NOTAM
///
/// List fetches fill the summary fields; a detail fetch adds issuer, altitude,
/// radius, remarks and geometry via [`NotamRecord::merge_detail`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotamRecord {
    pub id: String,
    pub location: String,
    #[serde(default)]
    pub coordinates: Option<Coordinate>,
    #[serde(rename = "type")]
    pub category: NotamCategory,
    #[serde(rename = "effectiveDate", deserialize_with = "deserialize_timestamp")]
    pub effective: DateTime<Utc>,
    #[serde(
        rename = "expiryDate",
        alias = "validUntil",
        default,
        deserialize_with = "deserialize_optional_timestamp"
    )]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<AltitudeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

impl NotamRecord {
    pub fn new(
        id: impl Into<String>,
        location: impl Into<String>,
        category: NotamCategory,
        effective: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
            coordinates: None,
            category,
            effective,
            expiry: None,
            description: description.into(),
            issued_by: None,
            altitude: None,
            radius: None,
            remarks: None,
            geometry: None,
        }
    }

    pub fn with_coordinates(mut self, lat: f64, lng: f64) -> Self {
        self.coordinates = Some(Coordinate::new(lat, lng));
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_altitude(mut self, altitude: AltitudeRange) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Coordinates usable for a map marker
    pub fn map_position(&self) -> Option<Coordinate> {
        self.coordinates.filter(Coordinate::is_valid)
    }

    /// Effective at or before `now` and not yet expired
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.effective <= now && self.expiry.is_none_or(|expiry| expiry >= now)
    }

    pub fn is_permanent(&self) -> bool {
        self.expiry.is_none()
    }

    /// Fold the fields of a detail response into this record.
    ///
    /// Fields the detail response leaves empty keep their list values, so a
    /// partial detail never erases what the list already showed.
    pub fn merge_detail(&mut self, detail: NotamRecord) {
        if !detail.location.trim().is_empty() {
            self.location = detail.location;
        }
        if detail.coordinates.is_some() {
            self.coordinates = detail.coordinates;
        }
        self.category = detail.category;
        self.effective = detail.effective;
        if detail.expiry.is_some() {
            self.expiry = detail.expiry;
        }
        if !detail.description.trim().is_empty() {
            self.description = detail.description;
        }
        if detail.issued_by.is_some() {
            self.issued_by = detail.issued_by;
        }
        if detail.altitude.is_some() {
            self.altitude = detail.altitude;
        }
        if detail.radius.is_some() {
            self.radius = detail.radius;
        }
        if detail.remarks.is_some() {
            self.remarks = detail.remarks;
        }
        if detail.geometry.is_some() {
            self.geometry = detail.geometry;
        }
    }
}
