//! Summary counts over the current NOTAM working set

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::notams::{NotamCategory, NotamRecord};

/// Bucket for records whose location is empty
const UNKNOWN_REGION: &str = "?";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotamStats {
    pub total: usize,
    pub by_category: BTreeMap<NotamCategory, usize>,
    /// Keyed by the first character of the location code
    pub by_region: BTreeMap<String, usize>,
    pub active_today: usize,
}

impl NotamStats {
    pub fn category_count(&self, category: NotamCategory) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    pub fn region_count(&self, key: &str) -> usize {
        self.by_region.get(key).copied().unwrap_or(0)
    }
}

/// Region key used for the counts: the first character of the ICAO location.
///
/// Deliberately coarse ("E" lumps northern Europe together, "K" is the contiguous
/// US). Real ICAO regional allocation is out of scope.
pub fn region_key(location: &str) -> String {
    location
        .trim()
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase().to_string())
        .unwrap_or_else(|| UNKNOWN_REGION.to_string())
}

/// Single pass over `records`; always returns freshly built maps
pub fn aggregate(records: &[NotamRecord], now: DateTime<Utc>) -> NotamStats {
    let mut stats = NotamStats {
        total: records.len(),
        ..Default::default()
    };

    for record in records {
        *stats.by_category.entry(record.category).or_insert(0) += 1;
        *stats.by_region.entry(region_key(&record.location)).or_insert(0) += 1;
        if record.is_active_at(now) {
            stats.active_today += 1;
        }
    }

    stats
}
