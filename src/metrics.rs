//! Metric names and their zero values.
//!
//! The crate emits through the `metrics` facade only; whichever recorder the host
//! installs picks them up. Without a recorder every call is a no-op.

use metrics::{Unit, describe_counter, describe_gauge};

pub const FETCH_TOTAL: &str = "notam_fetch_total";
pub const STALE_RESPONSES_TOTAL: &str = "notam_stale_responses_total";
pub const AUTH_REFRESH_TOTAL: &str = "notam_auth_refresh_total";
pub const RECORDS: &str = "notam_records";
pub const MAP_MARKERS: &str = "notam_map_markers";

const FETCH_OPS: [&str; 3] = ["list", "search", "detail"];
const FETCH_OUTCOMES: [&str; 4] = ["ok", "auth_error", "not_found", "transport_error"];

/// Register descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(FETCH_TOTAL, "NOTAM gateway calls by operation and outcome");
    describe_counter!(
        STALE_RESPONSES_TOTAL,
        "Gateway responses discarded because a newer request superseded them"
    );
    describe_counter!(AUTH_REFRESH_TOTAL, "Credential refreshes triggered by auth failures");
    describe_gauge!(RECORDS, Unit::Count, "NOTAM records in the working set");
    describe_gauge!(MAP_MARKERS, Unit::Count, "NOTAM markers on the map");
}

/// Initialize dashboard metrics to zero/default values
/// This ensures metrics always appear in queries even if no events have occurred
pub fn initialize_dashboard_metrics() {
    describe_metrics();

    for op in FETCH_OPS {
        for outcome in FETCH_OUTCOMES {
            metrics::counter!(FETCH_TOTAL, "op" => op, "outcome" => outcome).absolute(0);
        }
    }
    metrics::counter!(STALE_RESPONSES_TOTAL).absolute(0);
    metrics::counter!(AUTH_REFRESH_TOTAL).absolute(0);
    metrics::gauge!(RECORDS).set(0.0);
    metrics::gauge!(MAP_MARKERS).set(0.0);
}

/// Recorder that keeps the names it sees, for checking emitters against [`describe_metrics`]
#[cfg(test)]
pub(crate) mod testing {
    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct NameRecorder {
        described: Mutex<Vec<String>>,
        emitted: Mutex<Vec<String>>,
    }

    impl NameRecorder {
        pub fn described(&self) -> Vec<String> {
            self.described.lock().unwrap().clone()
        }

        pub fn emitted(&self) -> Vec<String> {
            self.emitted.lock().unwrap().clone()
        }

        fn describe(&self, key: KeyName) {
            self.described.lock().unwrap().push(key.as_str().to_string());
        }

        fn emit(&self, key: &Key) {
            self.emitted.lock().unwrap().push(key.name().to_string());
        }
    }

    impl Recorder for NameRecorder {
        fn describe_counter(&self, key: KeyName, _unit: Option<Unit>, _description: SharedString) {
            self.describe(key);
        }

        fn describe_gauge(&self, key: KeyName, _unit: Option<Unit>, _description: SharedString) {
            self.describe(key);
        }

        fn describe_histogram(&self, key: KeyName, _unit: Option<Unit>, _description: SharedString) {
            self.describe(key);
        }

        fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
            self.emit(key);
            Counter::noop()
        }

        fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
            self.emit(key);
            Gauge::noop()
        }

        fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
            self.emit(key);
            Histogram::noop()
        }
    }
}
