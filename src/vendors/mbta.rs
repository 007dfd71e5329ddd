//! MBTA performance API: observed travel times between adjacent stops.
//!
//! One request per [`AdjacencyPair`] covering the trailing 24 hours. Each
//! trip reports the benchmark (scheduled) and actual travel time in seconds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::int_from_str_or_num;
use crate::System;
use crate::fetch::{HttpClient, fetch_json};
use crate::lines::LineIdResolver;
use crate::pairing::AdjacencyPair;
use crate::record::{ArrivalRecord, StationKey};

pub const BASE_URL: &str = "https://performanceapi.mbta.com/developer/api/v2.1/traveltimes";
pub const API_KEY_PARAM: &str = "api_key";
pub const WINDOW_SECS: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Unix seconds.
    pub start: i64,
    /// Unix seconds.
    pub end: i64,
}

impl TimeWindow {
    pub fn trailing_day(now: DateTime<Utc>) -> Self {
        let end = now.timestamp();
        Self {
            start: end - WINDOW_SECS,
            end,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TravelTimesResponse {
    #[serde(default)]
    pub travel_times: Vec<TravelTime>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TravelTime {
    pub route_id: String,
    #[serde(deserialize_with = "int_from_str_or_num")]
    pub benchmark_travel_time_sec: i64,
    #[serde(deserialize_with = "int_from_str_or_num")]
    pub travel_time_sec: i64,
}

/// Source of travel time measurements between two stops.
#[async_trait]
pub trait TravelTimeApi: Send + Sync {
    async fn travel_times(&self, from: i64, to: i64, window: TimeWindow) -> Result<Vec<TravelTime>>;
}

/// HTTP implementation. The API key is expected to be injected by the
/// client (see [`UrlParam`](crate::fetch::auth::UrlParam)).
pub struct MbtaClient<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> MbtaClient<C> {
    pub fn new(client: C) -> Self {
        Self::with_base_url(client, BASE_URL)
    }

    pub fn with_base_url(client: C, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> TravelTimeApi for MbtaClient<C> {
    #[tracing::instrument(skip(self, window))]
    async fn travel_times(&self, from: i64, to: i64, window: TimeWindow) -> Result<Vec<TravelTime>> {
        let url = travel_times_url(&self.base_url, from, to, window);
        let response: TravelTimesResponse = fetch_json(&self.client, &url)
            .await
            .with_context(|| format!("travel times {from} -> {to}"))?;

        debug!(trips = response.travel_times.len(), "Travel times received");
        Ok(response.travel_times)
    }
}

pub fn travel_times_url(base_url: &str, from: i64, to: i64, window: TimeWindow) -> String {
    format!(
        "{base_url}?format=json&from_stop={from}&to_stop={to}&from_datetime={}&to_datetime={}",
        window.start, window.end
    )
}

/// `Green-B` and friends are branches of one line.
pub fn base_route(route_id: &str) -> &str {
    route_id.split('-').next().unwrap_or(route_id)
}

/// Turns the trips measured for `pair` into records, resolving each trip's
/// route to a line id. Any unresolvable route aborts with an error.
pub async fn normalize(
    resolver: &LineIdResolver,
    pair: &AdjacencyPair,
    trips: &[TravelTime],
) -> Result<Vec<ArrivalRecord>> {
    let mut records = Vec::with_capacity(trips.len());

    for trip in trips {
        let line_id = resolver
            .resolve_route(System::Boston, base_route(&trip.route_id))
            .await?;

        records.push(ArrivalRecord::new(
            line_id,
            StationKey::Pair {
                from: pair.from.id,
                to: pair.to.id,
            },
            trip.benchmark_travel_time_sec,
            trip.travel_time_sec,
        ));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineTables;
    use crate::stops::Station;
    use crate::store::Store;
    use chrono::TimeZone;

    const PAYLOAD: &str = r#"{
        "travel_times": [
            {"route_id": "Red", "direction": "0", "dep_dt": "2024-04-05 08:00:00",
             "arr_dt": "2024-04-05 08:02:10", "travel_time_sec": "130",
             "benchmark_travel_time_sec": "120"},
            {"route_id": "Green-B", "direction": "1", "travel_time_sec": "95",
             "benchmark_travel_time_sec": "110"}
        ]
    }"#;

    fn station(id: i64) -> Station {
        Station {
            id,
            name: format!("Stop {id}"),
            line: Some("Red".to_string()),
            destination: Some("Alewife".to_string()),
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    #[test]
    fn test_window_is_trailing_day() {
        let now = Utc.with_ymd_and_hms(2024, 4, 5, 12, 0, 0).unwrap();
        let window = TimeWindow::trailing_day(now);

        assert_eq!(window.end, now.timestamp());
        assert_eq!(window.end - window.start, 86_400);
    }

    #[test]
    fn test_url_layout() {
        let window = TimeWindow { start: 100, end: 200 };
        assert_eq!(
            travel_times_url("https://example.test/traveltimes", 70063, 70061, window),
            "https://example.test/traveltimes?format=json&from_stop=70063&to_stop=70061&from_datetime=100&to_datetime=200"
        );
    }

    #[test]
    fn test_base_route() {
        assert_eq!(base_route("Green-B"), "Green");
        assert_eq!(base_route("Red"), "Red");
    }

    #[test]
    fn test_payload_decodes_string_numbers() {
        let response: TravelTimesResponse = serde_json::from_str(PAYLOAD).unwrap();

        assert_eq!(response.travel_times.len(), 2);
        assert_eq!(response.travel_times[0].travel_time_sec, 130);
        assert_eq!(response.travel_times[1].benchmark_travel_time_sec, 110);
    }

    #[test]
    fn test_payload_without_trips_is_empty() {
        let response: TravelTimesResponse = serde_json::from_str("{}").unwrap();
        assert!(response.travel_times.is_empty());
    }

    #[tokio::test]
    async fn test_normalize_resolves_lines_and_offsets() {
        let store = Store::in_memory().await.unwrap();
        let resolver = LineIdResolver::new(store, LineTables::builtin());
        resolver.seed(System::Boston).await.unwrap();

        let response: TravelTimesResponse = serde_json::from_str(PAYLOAD).unwrap();
        let pair = AdjacencyPair {
            from: station(70063),
            to: station(70061),
        };

        let records = normalize(&resolver, &pair, &response.travel_times).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line_id, 8);
        assert_eq!(records[0].offset, 10);
        assert_eq!(records[1].line_id, 9);
        assert_eq!(records[1].predicted, 110);
        assert_eq!(records[1].actual, 95);
        assert_eq!(records[1].offset, 15);
        assert_eq!(records[1].stations, StationKey::Pair { from: 70063, to: 70061 });
    }

    #[tokio::test]
    async fn test_normalize_before_seeding_fails() {
        let store = Store::in_memory().await.unwrap();
        let resolver = LineIdResolver::new(store, LineTables::builtin());

        let response: TravelTimesResponse = serde_json::from_str(PAYLOAD).unwrap();
        let pair = AdjacencyPair {
            from: station(1),
            to: station(2),
        };

        assert!(normalize(&resolver, &pair, &response.travel_times).await.is_err());
    }
}
