//! Plan and ItineraryStop types
//!
//! The JSON shape follows the planner output: an `itinerary` array of stops and
//! a `totals` object.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::geo::LatLng;

/// Offset applied to itinerary times that carry no zone
const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Longest time window (in days) expanded when checking date overlap
const MAX_WINDOW_DAYS: i64 = 31;

/// Korea Standard Time
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Parse an itinerary timestamp into a KST calendar date
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (read as KST), or anything
/// starting with `YYYY-MM-DD`.
pub fn parse_itinerary_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&kst()).date_naive());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.date());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Category of an itinerary stop
///
/// Serialized as the plain `type` string used by the planner. Unknown values
/// are preserved in [`StopKind::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StopKind {
    #[default]
    Place,
    Travel,
    Festival,
    Cafe,
    Restaurant,
    Parking,
    Other(String),
}

impl StopKind {
    pub fn as_str(&self) -> &str {
        match self {
            StopKind::Place => "place",
            StopKind::Travel => "travel",
            StopKind::Festival => "festival",
            StopKind::Cafe => "cafe",
            StopKind::Restaurant => "restaurant",
            StopKind::Parking => "parking",
            StopKind::Other(s) => s,
        }
    }

    /// Kinds that are never swapped for a rain alternative
    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            StopKind::Festival | StopKind::Cafe | StopKind::Restaurant | StopKind::Parking
        )
    }
}

impl From<String> for StopKind {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "place" => StopKind::Place,
            "travel" | "move" | "transit" => StopKind::Travel,
            "festival" => StopKind::Festival,
            "cafe" => StopKind::Cafe,
            "restaurant" => StopKind::Restaurant,
            "parking" => StopKind::Parking,
            _ => StopKind::Other(s),
        }
    }
}

impl From<StopKind> for String {
    fn from(kind: StopKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parking lot near a stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingLot {
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub distance_km: f64,
}

/// One entry in the itinerary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryStop {
    /// 1-based position in the plan
    #[serde(default)]
    pub index: usize,

    #[serde(rename = "type", default)]
    pub kind: StopKind,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Nearby parking, nearest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parking: Vec<ParkingLot>,
}

impl ItineraryStop {
    /// Create a place stop with only a title
    pub fn new(index: usize, title: impl Into<String>) -> Self {
        Self {
            index,
            kind: StopKind::Place,
            title: title.into(),
            description: None,
            start_time: None,
            end_time: None,
            lat: None,
            lng: None,
            place_id: None,
            rating: None,
            address: None,
            parking: Vec::new(),
        }
    }

    /// Coordinates, when both components are present
    pub fn location(&self) -> Option<LatLng> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
            _ => None,
        }
    }

    /// Calendar dates (KST) covered by the stop's time window
    ///
    /// A stop with only a start time covers that single date. Stops without a
    /// parseable start time cover nothing.
    pub fn scheduled_dates(&self) -> Vec<NaiveDate> {
        let Some(start) = self.start_time.as_deref().and_then(parse_itinerary_date) else {
            return Vec::new();
        };
        let end = self
            .end_time
            .as_deref()
            .and_then(parse_itinerary_date)
            .filter(|end| *end >= start)
            .unwrap_or(start);

        let mut span = (end - start).num_days();
        if span > MAX_WINDOW_DAYS {
            warn!(
                index = self.index,
                title = %self.title,
                span,
                max = MAX_WINDOW_DAYS,
                "scheduled_dates: window capped"
            );
            span = MAX_WINDOW_DAYS;
        }
        (0..=span).filter_map(|d| start.checked_add_days(chrono::Days::new(d as u64))).collect()
    }

    /// Whether the time window touches any of the given dates
    pub fn overlaps_any(&self, dates: &BTreeSet<NaiveDate>) -> bool {
        self.scheduled_dates().iter().any(|d| dates.contains(d))
    }

    /// Title and description joined and lowercased, for keyword checks
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.description.as_deref().unwrap_or("")).to_lowercase()
    }
}

/// Aggregate estimates for a plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(default)]
    pub estimated_cost_krw: i64,
    #[serde(default)]
    pub estimated_travel_time_minutes: i64,
}

/// An itinerary plus totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub itinerary: Vec<ItineraryStop>,
    #[serde(default)]
    pub totals: Totals,
}

impl Plan {
    pub fn new(itinerary: Vec<ItineraryStop>) -> Self {
        Self {
            itinerary,
            totals: Totals::default(),
        }
        .normalized()
    }

    /// Renumber stops 1..=n in itinerary order
    pub fn normalized(mut self) -> Self {
        debug!(len = self.itinerary.len(), "Plan::normalized: called");
        for (pos, stop) in self.itinerary.iter_mut().enumerate() {
            stop.index = pos + 1;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.itinerary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itinerary.is_empty()
    }

    /// Look up a stop by its 1-based index
    pub fn stop(&self, index: usize) -> Option<&ItineraryStop> {
        index.checked_sub(1).and_then(|pos| self.itinerary.get(pos))
    }

    pub(crate) fn stop_mut(&mut self, index: usize) -> Option<&mut ItineraryStop> {
        index.checked_sub(1).and_then(|pos| self.itinerary.get_mut(pos))
    }

    /// Titles of every stop in the plan
    pub fn titles(&self) -> HashSet<&str> {
        self.itinerary.iter().map(|s| s.title.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop_with_times(start: Option<&str>, end: Option<&str>) -> ItineraryStop {
        let mut stop = ItineraryStop::new(1, "경포호");
        stop.start_time = start.map(String::from);
        stop.end_time = end.map(String::from);
        stop
    }

    #[test]
    fn test_parse_itinerary_date_forms() {
        let d = NaiveDate::from_ymd_opt(2025, 8, 20).unwrap();
        assert_eq!(parse_itinerary_date("2025-08-20T10:00:00+09:00"), Some(d));
        assert_eq!(parse_itinerary_date("2025-08-20T10:00:00"), Some(d));
        assert_eq!(parse_itinerary_date("2025-08-20"), Some(d));
        assert_eq!(parse_itinerary_date(""), None);
        assert_eq!(parse_itinerary_date("soon"), None);
    }

    #[test]
    fn test_utc_time_converts_to_kst_date() {
        // 16:00 UTC is 01:00 the next day in Seoul
        assert_eq!(
            parse_itinerary_date("2025-08-19T16:00:00Z"),
            NaiveDate::from_ymd_opt(2025, 8, 20)
        );
    }

    #[test]
    fn test_scheduled_dates_spans_window() {
        let stop = stop_with_times(Some("2025-08-20T22:00:00+09:00"), Some("2025-08-22T01:00:00+09:00"));
        let dates = stop.scheduled_dates();
        assert_eq!(dates.len(), 3);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2025, 8, 20).unwrap());
        assert_eq!(dates[2], NaiveDate::from_ymd_opt(2025, 8, 22).unwrap());
    }

    #[test]
    fn test_long_window_is_capped() {
        let stop = stop_with_times(Some("2025-08-01"), Some("2025-12-31"));
        let dates = stop.scheduled_dates();
        assert_eq!(dates.len() as i64, MAX_WINDOW_DAYS + 1);
        assert_eq!(dates.last(), NaiveDate::from_ymd_opt(2025, 9, 1).as_ref());
    }

    #[test]
    fn test_scheduled_dates_without_start() {
        assert!(stop_with_times(None, Some("2025-08-20")).scheduled_dates().is_empty());
    }

    #[test]
    fn test_end_before_start_is_ignored() {
        let stop = stop_with_times(Some("2025-08-20T10:00:00+09:00"), Some("2025-08-19T10:00:00+09:00"));
        assert_eq!(stop.scheduled_dates().len(), 1);
    }

    #[test]
    fn test_overlaps_any() {
        let stop = stop_with_times(Some("2025-08-20T10:00:00+09:00"), Some("2025-08-20T12:00:00+09:00"));
        let mut rainy = BTreeSet::new();
        rainy.insert(NaiveDate::from_ymd_opt(2025, 8, 21).unwrap());
        assert!(!stop.overlaps_any(&rainy));
        rainy.insert(NaiveDate::from_ymd_opt(2025, 8, 20).unwrap());
        assert!(stop.overlaps_any(&rainy));
    }

    #[test]
    fn test_stop_kind_serde() {
        let json = r#"{"index": 1, "type": "cafe", "title": "Cafe A"}"#;
        let stop: ItineraryStop = serde_json::from_str(json).unwrap();
        assert_eq!(stop.kind, StopKind::Cafe);

        let json = r#"{"index": 1, "type": "tourist_attraction", "title": "X"}"#;
        let stop: ItineraryStop = serde_json::from_str(json).unwrap();
        assert_eq!(stop.kind, StopKind::Other("tourist_attraction".to_string()));
        let back = serde_json::to_value(&stop).unwrap();
        assert_eq!(back["type"], "tourist_attraction");
    }

    #[test]
    fn test_plan_parses_planner_output() {
        let json = r#"{
            "itinerary": [
                {"index": 1, "type": "festival", "title": "강릉 단오제", "start_time": "2025-08-20T09:00:00+09:00"},
                {"index": 2, "type": "place", "title": "경포호", "lat": 37.7956, "lng": 128.9081, "rating": 4.5}
            ],
            "totals": {"estimated_cost_krw": 50000, "estimated_travel_time_minutes": 90}
        }"#;
        let plan: Plan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.stop(2).unwrap().title, "경포호");
        assert!(plan.stop(2).unwrap().location().is_some());
        assert!(plan.stop(0).is_none());
        assert!(plan.stop(3).is_none());
        assert_eq!(plan.totals.estimated_cost_krw, 50000);
    }

    #[test]
    fn test_normalized_renumbers() {
        let plan = Plan::new(vec![ItineraryStop::new(7, "a"), ItineraryStop::new(3, "b")]);
        assert_eq!(plan.itinerary[0].index, 1);
        assert_eq!(plan.itinerary[1].index, 2);
    }
}
