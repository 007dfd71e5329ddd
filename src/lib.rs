//! Ingests arrival punctuality from the MBTA and CTA rapid transit APIs into
//! one SQLite database so the two systems can be compared.

pub mod config;
pub mod fetch;
pub mod lines;
pub mod pairing;
pub mod persist;
pub mod pipeline;
pub mod record;
pub mod ridership;
pub mod stops;
pub mod store;
pub mod vendors;

use serde::Deserialize;
use std::fmt;

/// A transit system with its own stop feed, vendor API and id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum System {
    /// MBTA (pair-based travel times)
    Boston,
    /// CTA (station-based arrival predictions)
    Chicago,
}

impl System {
    pub const ALL: [System; 2] = [System::Chicago, System::Boston];

    pub fn as_str(self) -> &'static str {
        match self {
            System::Boston => "boston",
            System::Chicago => "chicago",
        }
    }

    /// Table holding this system's arrival rows.
    pub fn arrivals_table(self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
