//! Weather minima evaluation
//!
//! Reported ceiling and visibility arrive in whatever shape the weather source
//! produced them: JSON numbers, plain strings like `"1200"`, METAR fragments like
//! `"OVC008"` or `"1 1/2SM"`. Everything here fails closed: a field that cannot be
//! read is reported as `None` and counts as below minima.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Mixed number with optional fraction, e.g. `1 1/2`, `1/4`, `3`, `2.5`
static VISIBILITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<whole>\d+)\s+(?P<num>\d+)/(?P<den>\d+)|(?P<fnum>\d+)/(?P<fden>\d+)|(?P<dec>\d+(?:\.\d+)?|\.\d+))$")
        .expect("visibility regex")
});

/// METAR ceiling layer, e.g. `BKN008` (hundreds of feet)
static CEILING_LAYER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:BKN|OVC|VV)(?P<hundreds>\d{3})").expect("ceiling layer regex"));

/// A single weather field as delivered by the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeatherValue {
    Number(f64),
    Text(String),
}

impl From<f64> for WeatherValue {
    fn from(value: f64) -> Self {
        WeatherValue::Number(value)
    }
}

impl From<i32> for WeatherValue {
    fn from(value: i32) -> Self {
        WeatherValue::Number(f64::from(value))
    }
}

impl From<&str> for WeatherValue {
    fn from(value: &str) -> Self {
        WeatherValue::Text(value.to_string())
    }
}

impl fmt::Display for WeatherValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeatherValue::Number(n) => write!(f, "{}", n),
            WeatherValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// The ceiling/visibility pair the evaluator looks at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    #[serde(default)]
    pub ceiling: Option<WeatherValue>,
    #[serde(default)]
    pub visibility: Option<WeatherValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<WeatherValue>,
}

impl WeatherReport {
    pub fn new(ceiling: Option<WeatherValue>, visibility: Option<WeatherValue>) -> Self {
        Self {
            ceiling,
            visibility,
            ..Default::default()
        }
    }
}

/// Minimum acceptable ceiling (feet) and visibility (statute miles)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimaThreshold {
    pub ceiling: i32,
    #[serde(rename = "vis", alias = "visibility")]
    pub visibility: f64,
}

impl MinimaThreshold {
    pub fn new(ceiling: i32, visibility: f64) -> Self {
        Self {
            ceiling,
            visibility,
        }
    }
}

impl Default for MinimaThreshold {
    fn default() -> Self {
        Self {
            ceiling: 1000,
            visibility: 3.0,
        }
    }
}

/// Outcome of a minima evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimaCheck {
    pub ceiling_met: bool,
    pub visibility_met: bool,
    pub overall_met: bool,
    pub parsed_ceiling: Option<f64>,
    pub parsed_visibility: Option<f64>,
}

/// Parse a visibility value in statute miles.
///
/// Accepts decimals (`2.5`), fractions (`1/2`) and mixed numbers (`1 1/2`), with an
/// optional `SM` suffix and `P`/`M` qualifier (`P6SM` reads as 6).
pub fn parse_visibility(value: &WeatherValue) -> Option<f64> {
    match value {
        WeatherValue::Number(n) => non_negative(*n),
        WeatherValue::Text(text) => {
            let mut s = text.trim().to_ascii_uppercase();
            if let Some(stripped) = s.strip_suffix("SM") {
                s = stripped.trim_end().to_string();
            }
            if let Some(stripped) = s.strip_prefix(['P', 'M']) {
                s = stripped.trim_start().to_string();
            }

            let caps = VISIBILITY_RE.captures(&s)?;
            if let Some(dec) = caps.name("dec") {
                return dec.as_str().parse::<f64>().ok().and_then(non_negative);
            }
            if let (Some(num), Some(den)) = (caps.name("fnum"), caps.name("fden")) {
                return fraction(num.as_str(), den.as_str());
            }
            let whole: f64 = caps.name("whole")?.as_str().parse().ok()?;
            let frac = fraction(caps.name("num")?.as_str(), caps.name("den")?.as_str())?;
            Some(whole + frac)
        }
    }
}

/// Parse a ceiling value in feet.
///
/// Numbers are taken as feet. Text may carry a `ft` suffix or thousands separators,
/// or be a broken/overcast/vertical-visibility layer code (`OVC012` is 1200 ft).
/// Scattered/few layers and clear-sky codes are not ceilings and yield `None`.
pub fn parse_ceiling(value: &WeatherValue) -> Option<f64> {
    match value {
        WeatherValue::Number(n) => non_negative(*n),
        WeatherValue::Text(text) => {
            let s = text.trim().to_ascii_uppercase();
            if let Some(caps) = CEILING_LAYER_RE.captures(&s) {
                let hundreds: f64 = caps["hundreds"].parse().ok()?;
                return Some(hundreds * 100.0);
            }
            let s = s.strip_suffix("FT").unwrap_or(&s).trim().replace(',', "");
            s.parse::<f64>().ok().and_then(non_negative)
        }
    }
}

fn non_negative(n: f64) -> Option<f64> {
    (n.is_finite() && n >= 0.0).then_some(n)
}

fn fraction(num: &str, den: &str) -> Option<f64> {
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 {
        return None;
    }
    non_negative(num / den)
}

/// Evaluate a report against a threshold. Missing or unreadable fields are not met.
pub fn evaluate(report: &WeatherReport, threshold: &MinimaThreshold) -> MinimaCheck {
    let parsed_ceiling = report.ceiling.as_ref().and_then(parse_ceiling);
    let parsed_visibility = report.visibility.as_ref().and_then(parse_visibility);

    let ceiling_met = parsed_ceiling.is_some_and(|c| c >= f64::from(threshold.ceiling));
    let visibility_met = parsed_visibility.is_some_and(|v| v >= threshold.visibility);

    MinimaCheck {
        ceiling_met,
        visibility_met,
        overall_met: ceiling_met && visibility_met,
        parsed_ceiling,
        parsed_visibility,
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MinimaError {
    #[error("unknown minima field '{0}' (expected 'ceiling' or 'vis')")]
    UnknownField(String),
    #[error("invalid {field} value '{value}'")]
    InvalidValue { field: MinimaField, value: String },
}

/// Which half of a threshold a tile edit targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimaField {
    Ceiling,
    Visibility,
}

impl fmt::Display for MinimaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinimaField::Ceiling => write!(f, "ceiling"),
            MinimaField::Visibility => write!(f, "visibility"),
        }
    }
}

impl FromStr for MinimaField {
    type Err = MinimaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ceiling" => Ok(MinimaField::Ceiling),
            "vis" | "visibility" => Ok(MinimaField::Visibility),
            other => Err(MinimaError::UnknownField(other.to_string())),
        }
    }
}

/// Global minima with per-entity overrides.
///
/// Keys are flight callsigns or ICAO codes, normalized to uppercase. An entity
/// without an override follows the global value, including later global changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinimaRegistry {
    global: MinimaThreshold,
    overrides: HashMap<String, MinimaThreshold>,
}

impl MinimaRegistry {
    pub fn new(global: MinimaThreshold) -> Self {
        Self {
            global,
            overrides: HashMap::new(),
        }
    }

    pub fn global(&self) -> MinimaThreshold {
        self.global
    }

    pub fn set_global(&mut self, threshold: MinimaThreshold) {
        self.global = threshold;
    }

    /// Threshold in force for `key`
    pub fn effective(&self, key: &str) -> MinimaThreshold {
        self.overrides
            .get(&normalize_key(key))
            .copied()
            .unwrap_or(self.global)
    }

    pub fn has_override(&self, key: &str) -> bool {
        self.overrides.contains_key(&normalize_key(key))
    }

    pub fn set_override(&mut self, key: &str, threshold: MinimaThreshold) {
        self.overrides.insert(normalize_key(key), threshold);
    }

    /// Apply a single-field edit from a tile input.
    ///
    /// The first edit for an entity seeds its override from the current global value.
    pub fn set_field(&mut self, key: &str, field: MinimaField, raw: &str) -> Result<(), MinimaError> {
        let invalid = || MinimaError::InvalidValue {
            field,
            value: raw.to_string(),
        };
        let mut threshold = self.effective(key);
        match field {
            MinimaField::Ceiling => {
                let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
                if !value.is_finite() || value < 0.0 || value > f64::from(i32::MAX) {
                    return Err(invalid());
                }
                threshold.ceiling = value.round() as i32;
            }
            MinimaField::Visibility => {
                let value = parse_visibility(&WeatherValue::Text(raw.to_string())).ok_or_else(invalid)?;
                threshold.visibility = value;
            }
        }
        self.set_override(key, threshold);
        Ok(())
    }

    /// Drop the override for `key` so it follows the global value again
    pub fn reset(&mut self, key: &str) {
        self.overrides.remove(&normalize_key(key));
    }

    /// Evaluate a report against the threshold in force for `key`
    pub fn check(&self, key: &str, report: &WeatherReport) -> MinimaCheck {
        evaluate(report, &self.effective(key))
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(ceiling: Option<WeatherValue>, visibility: Option<WeatherValue>) -> WeatherReport {
        WeatherReport::new(ceiling, visibility)
    }

    #[test]
    fn test_visibility_forms() {
        assert_eq!(parse_visibility(&"10".into()), Some(10.0));
        assert_eq!(parse_visibility(&"2.5".into()), Some(2.5));
        assert_eq!(parse_visibility(&"1/2".into()), Some(0.5));
        assert_eq!(parse_visibility(&"1 1/2".into()), Some(1.5));
        assert_eq!(parse_visibility(&"2 3/4SM".into()), Some(2.75));
        assert_eq!(parse_visibility(&"P6SM".into()), Some(6.0));
        assert_eq!(parse_visibility(&"M1/4SM".into()), Some(0.25));
        assert_eq!(parse_visibility(&WeatherValue::Number(3.0)), Some(3.0));
    }

    #[test]
    fn test_visibility_garbage_is_none() {
        assert_eq!(parse_visibility(&"".into()), None);
        assert_eq!(parse_visibility(&"N/A".into()), None);
        assert_eq!(parse_visibility(&"1/0".into()), None);
        assert_eq!(parse_visibility(&"one mile".into()), None);
        assert_eq!(parse_visibility(&WeatherValue::Number(f64::NAN)), None);
        assert_eq!(parse_visibility(&WeatherValue::Number(-1.0)), None);
    }

    #[test]
    fn test_ceiling_forms() {
        assert_eq!(parse_ceiling(&WeatherValue::Number(1200.0)), Some(1200.0));
        assert_eq!(parse_ceiling(&"800".into()), Some(800.0));
        assert_eq!(parse_ceiling(&"1,500 ft".into()), Some(1500.0));
        assert_eq!(parse_ceiling(&"OVC012".into()), Some(1200.0));
        assert_eq!(parse_ceiling(&"BKN008CB".into()), Some(800.0));
        assert_eq!(parse_ceiling(&"SCT030".into()), None);
        assert_eq!(parse_ceiling(&"N/A".into()), None);
    }

    #[test]
    fn test_passing_report() {
        let check = evaluate(
            &report(Some(1000.into()), Some("1 1/2".into())),
            &MinimaThreshold::new(800, 1.0),
        );
        assert!(check.overall_met);
        assert_eq!(check.parsed_ceiling, Some(1000.0));
        assert_eq!(check.parsed_visibility, Some(1.5));
    }

    #[test]
    fn test_low_ceiling_fails_only_ceiling() {
        let check = evaluate(
            &report(Some(500.into()), Some("1".into())),
            &MinimaThreshold::new(800, 1.0),
        );
        assert!(!check.overall_met);
        assert!(!check.ceiling_met);
        assert!(check.visibility_met);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let check = evaluate(
            &report(Some(800.into()), Some("1".into())),
            &MinimaThreshold::new(800, 1.0),
        );
        assert!(check.ceiling_met && check.visibility_met && check.overall_met);
    }

    #[test]
    fn test_missing_data_fails_closed() {
        let thresholds = [
            MinimaThreshold::new(0, 0.0),
            MinimaThreshold::new(200, 0.5),
            MinimaThreshold::new(10_000, 10.0),
        ];
        for threshold in thresholds {
            let check = evaluate(&WeatherReport::default(), &threshold);
            assert!(!check.overall_met);
            assert!(!check.ceiling_met);
            assert!(!check.visibility_met);
            assert_eq!(check.parsed_ceiling, None);
            assert_eq!(check.parsed_visibility, None);
        }
    }

    #[test]
    fn test_overall_is_conjunction() {
        let reports = [
            report(Some(1000.into()), Some("5".into())),
            report(Some(100.into()), Some("5".into())),
            report(Some(1000.into()), Some("1/4".into())),
            report(None, Some("5".into())),
            report(Some("garbage".into()), None),
        ];
        let threshold = MinimaThreshold::new(500, 1.0);
        for r in &reports {
            let check = evaluate(r, &threshold);
            assert_eq!(check.overall_met, check.ceiling_met && check.visibility_met);
            assert_eq!(check, evaluate(r, &threshold));
        }
    }

    #[test]
    fn test_report_deserializes_numbers_and_strings() {
        let r: WeatherReport =
            serde_json::from_str(r#"{"ceiling": 1200, "visibility": "1 1/2", "wind": "27015KT"}"#).unwrap();
        assert_eq!(r.ceiling, Some(WeatherValue::Number(1200.0)));
        assert_eq!(r.visibility, Some(WeatherValue::Text("1 1/2".to_string())));
        assert_eq!(r.wind.as_deref(), Some("27015KT"));
    }

    #[test]
    fn test_registry_override_and_reset() {
        let global = MinimaThreshold::new(1000, 3.0);
        let mut registry = MinimaRegistry::new(global);

        registry.set_field("baw123", MinimaField::Ceiling, "250").unwrap();
        registry.set_field("BAW123", MinimaField::Visibility, "1/2").unwrap();
        assert!(registry.has_override("BAW123"));
        assert_eq!(registry.effective("BAW123"), MinimaThreshold::new(250, 0.5));

        registry.reset("BAW123");
        assert!(!registry.has_override("BAW123"));
        assert_eq!(registry.effective("BAW123"), registry.global());
    }

    #[test]
    fn test_reset_follows_current_global_not_snapshot() {
        let mut registry = MinimaRegistry::new(MinimaThreshold::new(1000, 3.0));
        registry.set_override("KJFK", MinimaThreshold::new(7, 0.1));
        registry.set_global(MinimaThreshold::new(600, 2.0));
        registry.reset("KJFK");
        assert_eq!(registry.effective("KJFK"), MinimaThreshold::new(600, 2.0));
    }

    #[test]
    fn test_rejected_edit_leaves_state_unchanged() {
        let mut registry = MinimaRegistry::new(MinimaThreshold::default());
        let err = registry
            .set_field("EGLL", MinimaField::Ceiling, "low")
            .unwrap_err();
        assert!(matches!(err, MinimaError::InvalidValue { .. }));
        assert!(!registry.has_override("EGLL"));
        assert_eq!("vis".parse::<MinimaField>(), Ok(MinimaField::Visibility));
        assert!("rvr".parse::<MinimaField>().is_err());
    }
}
