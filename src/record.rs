//! The normalized arrival measurement both vendors are reduced to.

use crate::System;

/// How a measurement is tied to the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationKey {
    /// Travel between two adjacent stations.
    Pair { from: i64, to: i64 },
    /// One train arriving at one station.
    Train { station: i64, train: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalRecord {
    pub line_id: i64,
    pub stations: StationKey,
    /// Seconds.
    pub predicted: i64,
    /// Seconds.
    pub actual: i64,
    /// `|actual - predicted|`.
    pub offset: i64,
}

impl ArrivalRecord {
    pub fn new(line_id: i64, stations: StationKey, predicted: i64, actual: i64) -> Self {
        Self {
            line_id,
            stations,
            predicted,
            actual,
            offset: offset(predicted, actual),
        }
    }

    /// The system whose table holds this record.
    pub fn system(&self) -> System {
        match self.stations {
            StationKey::Pair { .. } => System::Boston,
            StationKey::Train { .. } => System::Chicago,
        }
    }

    /// Natural key used to detect whether this record is already stored.
    ///
    /// Matches the uniqueness the destination table enforces: the whole row
    /// for pair measurements, station and train for arrivals.
    pub fn key(&self) -> String {
        match self.stations {
            StationKey::Pair { from, to } => format!(
                "{}:{}:{}:{}:{}",
                self.line_id, from, to, self.predicted, self.actual
            ),
            StationKey::Train { station, train } => format!("{station}:{train}"),
        }
    }
}

/// Punctuality offset in seconds, never negative.
pub fn offset(predicted: i64, actual: i64) -> i64 {
    (actual - predicted).abs()
}
