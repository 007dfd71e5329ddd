//! MBTA stop feed: rapid-transit platforms grouped by line and destination.
//!
//! A feed line is a rail platform when it starts with `7` and mentions
//! `RapidTransit`. The description field reads `<stop> - <Color> Line - <destination>`.

use regex::Regex;
use std::io::BufRead;
use std::sync::LazyLock;
use tracing::{debug, trace};

use super::{Station, StopCatalog, deg_to_secs};

const RAIL_TYPE_CODE: char = '7';
const RAIL_MODE_TAG: &str = "RapidTransit";
const EXCLUDED_LINE: &str = "Mattapan Trolley";
const NO_BOARDING: &str = "Drop-off Only";
const TERMINAL: &str = "Exit Only";

static LATITUDE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"42\.\d+").unwrap());
static LONGITUDE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-7[01]\.\d+").unwrap());
static DIRECTIONAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"& (\w{4,5})").unwrap());
static BRANCH_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\w\)").unwrap());

/// Reads every line of `reader` and groups the accepted platforms.
///
/// Lines that are not rail platforms, or that cannot be parsed, are skipped.
pub fn parse_stop_feed<R: BufRead>(reader: R) -> std::io::Result<StopCatalog> {
    let mut catalog = StopCatalog::new();
    let mut scanned = 0usize;

    for line in reader.lines() {
        let line = line?;
        scanned += 1;

        if let Some(station) = parse_line(&line) {
            // both are always set by parse_line
            if let (Some(color), Some(dest)) = (station.line.clone(), station.destination.clone()) {
                catalog.insert(&color, &dest, station);
            }
        }
    }

    debug!(
        scanned,
        stations = catalog.station_count(),
        lines = catalog.lines().len(),
        "Parsed MBTA stop feed"
    );
    Ok(catalog)
}

/// Parses one feed line into a platform, or `None` if it is not one we keep.
pub fn parse_line(line: &str) -> Option<Station> {
    if !line.starts_with(RAIL_TYPE_CODE) || !line.contains(RAIL_MODE_TAG) {
        return None;
    }

    let fields: Vec<&str> = line.split(',').collect();
    let id = fields.first()?.trim().parse::<i64>().ok()?;
    let name = fields.get(2)?.to_string();

    let segments: Vec<&str> = fields.get(3)?.split(" - ").collect();
    let color = segments.get(1)?.trim_end_matches("Line").trim().to_string();
    let raw_dest = *segments.last()?;

    let latitude = LATITUDE.find(line)?.as_str().parse::<f64>().ok()?;
    let longitude = LONGITUDE.find(line)?.as_str().parse::<f64>().ok()?;

    if color == EXCLUDED_LINE || raw_dest == NO_BOARDING {
        trace!(id, %color, raw_dest, "Skipping excluded platform");
        return None;
    }

    let destination = normalize_destination(raw_dest, &name);

    Some(Station {
        id,
        name,
        line: Some(color),
        destination: Some(destination),
        latitude: deg_to_secs(latitude),
        longitude: deg_to_secs(longitude),
    })
}

/// Applies the destination rules in a fixed order:
///
/// 1. `& North` style suffixes collapse to the direction word
/// 2. the terminal marker becomes the station's own name
/// 3. a parenthesised branch code prefix such as `(B) ` is cut off
/// 4. an appended `from ...` qualifier truncates to the first word
///
/// The rules interact; reordering them changes results.
pub fn normalize_destination(raw: &str, station_name: &str) -> String {
    let mut dest = raw.to_string();

    if let Some(caps) = DIRECTIONAL.captures(&dest) {
        dest = caps[1].to_string();
    }

    if dest == TERMINAL {
        dest = station_name.to_string();
    }

    // fixed width: "(X) ", counted in characters
    if BRANCH_CODE.is_match(&dest) {
        dest = dest.chars().skip(4).collect();
    }

    if dest.contains("from") {
        dest = dest.split(' ').next().unwrap_or_default().to_string();
    }

    dest
}
