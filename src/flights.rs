//! Flight tiles: scheduled flights checked against destination weather minima

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::minima::{MinimaCheck, MinimaError, MinimaField, MinimaRegistry, MinimaThreshold, WeatherReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightStatus {
    Scheduled,
    Active,
    Completed,
}

/// One planned flight as delivered by the operations feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPlan {
    pub callsign: String,
    #[serde(rename = "depicao")]
    pub departure: String,
    #[serde(rename = "arricao")]
    pub arrival: String,
    #[serde(rename = "alticao")]
    pub alternate: String,
    /// Scheduled time of departure
    pub std: DateTime<Utc>,
    /// Scheduled time of arrival
    pub sta: DateTime<Utc>,
    /// Estimated time of arrival
    pub eta: DateTime<Utc>,
    /// Latest report per airport, keyed by ICAO
    #[serde(default)]
    pub weather: BTreeMap<String, WeatherReport>,
}

impl FlightPlan {
    /// Airport whose weather decides the tile: the arrival, or the alternate when toggled
    pub fn target_icao(&self, use_alternate: bool) -> &str {
        if use_alternate { &self.alternate } else { &self.arrival }
    }

    /// Elapsed share of STD→ETA in percent, clamped to 0..=100
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        let total = (self.eta - self.std).num_milliseconds();
        if total <= 0 {
            return 0.0;
        }
        let elapsed = (now - self.std).num_milliseconds().max(0);
        (elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn status(&self, now: DateTime<Utc>) -> FlightStatus {
        if now < self.std {
            FlightStatus::Scheduled
        } else if now <= self.eta {
            FlightStatus::Active
        } else {
            FlightStatus::Completed
        }
    }

    /// Weather at the target airport, if the feed carried any
    pub fn target_weather(&self, use_alternate: bool) -> Option<&WeatherReport> {
        let icao = self.target_icao(use_alternate);
        self.weather
            .get(icao)
            .or_else(|| self.weather.iter().find(|(k, _)| k.eq_ignore_ascii_case(icao)).map(|(_, v)| v))
    }

    /// Evaluate the target airport against this flight's minima. No weather fails.
    pub fn check_minima(&self, registry: &MinimaRegistry, use_alternate: bool) -> MinimaCheck {
        let empty = WeatherReport::default();
        let report = self.target_weather(use_alternate).unwrap_or(&empty);
        registry.check(&self.callsign, report)
    }
}

/// What a flight tile shows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightTile {
    pub callsign: String,
    pub departure: String,
    pub arrival: String,
    pub alternate: String,
    pub target_icao: String,
    pub using_alternate: bool,
    pub status: FlightStatus,
    pub progress: f64,
    pub minima: MinimaThreshold,
    pub custom_minima: bool,
    pub check: MinimaCheck,
}

/// Flights on the dashboard with their callsign-keyed minima and alternate toggles
#[derive(Debug, Clone, Default)]
pub struct FlightBoard {
    flights: Vec<FlightPlan>,
    minima: MinimaRegistry,
    use_alternate: HashSet<String>,
}

impl FlightBoard {
    pub fn new(global: MinimaThreshold) -> Self {
        Self {
            minima: MinimaRegistry::new(global),
            ..Default::default()
        }
    }

    /// Replace the flight list. Toggles and overrides for callsigns still present are kept.
    pub fn set_flights(&mut self, flights: Vec<FlightPlan>) {
        let callsigns: HashSet<String> = flights.iter().map(|f| f.callsign.to_ascii_uppercase()).collect();
        self.use_alternate.retain(|c| callsigns.contains(c));
        debug!("Flight board now holds {} flights", flights.len());
        self.flights = flights;
    }

    pub fn flights(&self) -> &[FlightPlan] {
        &self.flights
    }

    pub fn minima(&self) -> &MinimaRegistry {
        &self.minima
    }

    pub fn set_global_minima(&mut self, threshold: MinimaThreshold) {
        self.minima.set_global(threshold);
    }

    pub fn set_minima(&mut self, callsign: &str, field: MinimaField, raw: &str) -> Result<(), MinimaError> {
        self.minima.set_field(callsign, field, raw)
    }

    pub fn reset_minima(&mut self, callsign: &str) {
        self.minima.reset(callsign);
    }

    pub fn set_alternate(&mut self, callsign: &str, use_alternate: bool) {
        let key = callsign.to_ascii_uppercase();
        if use_alternate {
            self.use_alternate.insert(key);
        } else {
            self.use_alternate.remove(&key);
        }
    }

    pub fn uses_alternate(&self, callsign: &str) -> bool {
        self.use_alternate.contains(&callsign.to_ascii_uppercase())
    }

    pub fn flight(&self, callsign: &str) -> Option<&FlightPlan> {
        self.flights.iter().find(|f| f.callsign.eq_ignore_ascii_case(callsign))
    }

    pub fn tile(&self, flight: &FlightPlan, now: DateTime<Utc>) -> FlightTile {
        let using_alternate = self.uses_alternate(&flight.callsign);
        let minima = self.minima.effective(&flight.callsign);
        let check = flight.check_minima(&self.minima, using_alternate);
        FlightTile {
            callsign: flight.callsign.clone(),
            departure: flight.departure.clone(),
            arrival: flight.arrival.clone(),
            alternate: flight.alternate.clone(),
            target_icao: flight.target_icao(using_alternate).to_string(),
            using_alternate,
            status: flight.status(now),
            progress: flight.progress(now),
            minima,
            custom_minima: self.minima.has_override(&flight.callsign),
            check,
        }
    }

    pub fn tiles(&self, now: DateTime<Utc>) -> Vec<FlightTile> {
        self.flights.iter().map(|f| self.tile(f, now)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn flight() -> FlightPlan {
        serde_json::from_str(
            r#"{
                "callsign": "BAW117",
                "depicao": "EGLL",
                "arricao": "KJFK",
                "alticao": "KEWR",
                "std": "2025-08-11T10:00:00Z",
                "sta": "2025-08-11T18:00:00Z",
                "eta": "2025-08-11T18:00:00Z",
                "weather": {
                    "KJFK": {"ceiling": 1200, "visibility": "5"},
                    "KEWR": {"ceiling": "OVC008", "visibility": "1 1/2"}
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_progress_and_status() {
        let flight = flight();
        let at = |h| Utc.with_ymd_and_hms(2025, 8, 11, h, 0, 0).unwrap();
        assert_eq!(flight.progress(at(8)), 0.0);
        assert_eq!(flight.status(at(8)), FlightStatus::Scheduled);
        assert_eq!(flight.progress(at(14)), 50.0);
        assert_eq!(flight.status(at(14)), FlightStatus::Active);
        assert_eq!(flight.progress(at(20)), 100.0);
        assert_eq!(flight.status(at(20)), FlightStatus::Completed);
    }

    #[test]
    fn test_zero_duration_progress() {
        let mut flight = flight();
        flight.eta = flight.std;
        assert_eq!(flight.progress(flight.std + Duration::hours(1)), 0.0);
    }

    #[test]
    fn test_alternate_toggle_changes_target() {
        let mut board = FlightBoard::new(MinimaThreshold::default());
        board.set_flights(vec![flight()]);
        let now = Utc::now();

        let tile = board.tile(&board.flights()[0], now);
        assert_eq!(tile.target_icao, "KJFK");
        assert!(tile.check.overall_met);

        board.set_alternate("baw117", true);
        let tile = board.tile(&board.flights()[0], now);
        assert_eq!(tile.target_icao, "KEWR");
        assert_eq!(tile.check.parsed_ceiling, Some(800.0));
        assert!(!tile.check.overall_met);
    }

    #[test]
    fn test_missing_weather_fails_closed() {
        let mut flight = flight();
        flight.weather.clear();
        let check = flight.check_minima(&MinimaRegistry::default(), false);
        assert!(!check.overall_met);
    }

    #[test]
    fn test_per_callsign_minima() {
        let mut board = FlightBoard::new(MinimaThreshold::default());
        board.set_flights(vec![flight()]);
        board.set_alternate("BAW117", true);
        board.set_minima("BAW117", MinimaField::Ceiling, "500").unwrap();
        board.set_minima("BAW117", MinimaField::Visibility, "1").unwrap();

        let tile = board.tile(&board.flights()[0], Utc::now());
        assert!(tile.custom_minima);
        assert!(tile.check.overall_met);

        board.reset_minima("BAW117");
        assert_eq!(board.minima().effective("BAW117"), MinimaThreshold::default());
        assert!(!board.tile(&board.flights()[0], Utc::now()).check.overall_met);
    }

    #[test]
    fn test_global_minima_applies_without_override() {
        let mut board = FlightBoard::new(MinimaThreshold::default());
        board.set_flights(vec![flight()]);
        assert!(board.tile(&board.flights()[0], Utc::now()).check.overall_met);

        board.set_global_minima(MinimaThreshold::new(1500, 3.0));
        let tile = board.tile(&board.flights()[0], Utc::now());
        assert_eq!(tile.minima, MinimaThreshold::new(1500, 3.0));
        assert!(!tile.custom_minima);
        assert!(!tile.check.ceiling_met);
    }

    #[test]
    fn test_set_flights_drops_stale_toggles() {
        let mut board = FlightBoard::default();
        board.set_flights(vec![flight()]);
        board.set_alternate("BAW117", true);
        board.set_flights(Vec::new());
        assert!(!board.uses_alternate("BAW117"));
    }
}
