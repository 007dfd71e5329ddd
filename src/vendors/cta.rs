//! CTA train tracker: live arrival predictions at one station.
//!
//! Each prediction carries a generated (`prdt`) and an arrival (`arrT`)
//! timestamp. Both are condensed to seconds since the start of the month,
//! which only compares correctly when both fall in the same month.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Deserialize;
use tracing::debug;

use super::int_from_str_or_num;
use crate::System;
use crate::fetch::{HttpClient, fetch_json};
use crate::lines::LineIdResolver;
use crate::record::{ArrivalRecord, StationKey};

pub const BASE_URL: &str = "http://lapi.transitchicago.com/api/1.0/ttarrivals.aspx";
pub const API_KEY_PARAM: &str = "key";
pub const MAX_RESULTS: u32 = 25;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Deserialize)]
pub struct ArrivalsResponse {
    pub ctatt: ArrivalBoard,
}

#[derive(Debug, Deserialize)]
pub struct ArrivalBoard {
    #[serde(rename = "errCd", default)]
    pub err_cd: Option<String>,
    #[serde(rename = "errNm", default)]
    pub err_nm: Option<String>,
    #[serde(default)]
    pub eta: Vec<Prediction>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Prediction {
    #[serde(rename = "staId", deserialize_with = "int_from_str_or_num")]
    pub station_id: i64,
    /// Run number, unique per train in service.
    #[serde(rename = "rn", deserialize_with = "int_from_str_or_num")]
    pub run: i64,
    /// Route code, e.g. `Red`, `Brn`, `G`.
    #[serde(rename = "rt")]
    pub route: String,
    #[serde(rename = "prdt")]
    pub predicted_at: String,
    #[serde(rename = "arrT")]
    pub arrival_at: String,
}

/// Source of live predictions for one station.
#[async_trait]
pub trait ArrivalBoardApi: Send + Sync {
    async fn arrivals(&self, station_id: i64) -> Result<Vec<Prediction>>;
}

/// HTTP implementation. The API key is expected to be injected by the
/// client (see [`UrlParam`](crate::fetch::auth::UrlParam)).
pub struct CtaClient<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> CtaClient<C> {
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
impl<C: HttpClient> ArrivalBoardApi for CtaClient<C> {
    #[tracing::instrument(skip(self))]
    async fn arrivals(&self, station_id: i64) -> Result<Vec<Prediction>> {
        let url = arrivals_url(&self.base_url, station_id);
        let response: ArrivalsResponse = fetch_json(&self.client, &url)
            .await
            .with_context(|| format!("arrivals for station {station_id}"))?;

        let predictions = response.ctatt.into_predictions()?;
        debug!(predictions = predictions.len(), "Arrivals received");
        Ok(predictions)
    }
}

impl ArrivalBoard {
    /// Fails if the tracker reported an error instead of predictions.
    pub fn into_predictions(self) -> Result<Vec<Prediction>> {
        match self.err_cd.as_deref() {
            None | Some("0") => Ok(self.eta),
            Some(code) => bail!(
                "train tracker error {code}: {}",
                self.err_nm.unwrap_or_default()
            ),
        }
    }
}

pub fn arrivals_url(base_url: &str, station_id: i64) -> String {
    format!("{base_url}?mapid={station_id}&outputType=JSON&max={MAX_RESULTS}")
}

/// Seconds since the start of the month.
pub fn condense(day: u32, hour: u32, minute: u32, second: u32) -> i64 {
    day as i64 * 86_400 + hour as i64 * 3_600 + minute as i64 * 60 + second as i64
}

/// Condenses a tracker timestamp such as `2024-04-05T08:30:00`.
pub fn condense_timestamp(raw: &str) -> Result<i64> {
    let t = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .with_context(|| format!("malformed timestamp '{raw}'"))?;
    Ok(condense(t.day(), t.hour(), t.minute(), t.second()))
}

/// Turns predictions into records keyed by station and run number.
pub async fn normalize(
    resolver: &LineIdResolver,
    predictions: &[Prediction],
) -> Result<Vec<ArrivalRecord>> {
    let mut records = Vec::with_capacity(predictions.len());

    for prediction in predictions {
        let line_id = resolver
            .resolve_route(System::Chicago, &prediction.route)
            .await?;
        let predicted = condense_timestamp(&prediction.predicted_at)?;
        let actual = condense_timestamp(&prediction.arrival_at)?;

        records.push(ArrivalRecord::new(
            line_id,
            StationKey::Train {
                station: prediction.station_id,
                train: prediction.run,
            },
            predicted,
            actual,
        ));
    }

    Ok(records)
}

/// Line id to back-fill onto the queried station's location row: the line
/// of the last prediction, if there was one.
pub fn station_line(records: &[ArrivalRecord]) -> Option<i64> {
    records.last().map(|r| r.line_id)
}
