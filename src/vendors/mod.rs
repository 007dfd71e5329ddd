//! Vendor arrival APIs, each reduced to [`ArrivalRecord`](crate::record::ArrivalRecord)s.
//!
//! - [`mbta`]: travel time between two adjacent stations over the last day
//! - [`cta`]: live arrival predictions at one station

pub mod cta;
pub mod mbta;

use serde::{Deserialize, Deserializer, de};

/// Both vendors send integers as JSON strings (`"93"`) and occasionally as
/// numbers; accept either.
pub(crate) fn int_from_str_or_num<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected an integer, got '{s}'"))),
    }
}
