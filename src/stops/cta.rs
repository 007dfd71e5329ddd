//! CTA stop feed: parent rail stations only.
//!
//! Parent stations carry five-digit ids starting with `4`; everything else
//! in the feed (bus stops, platforms) is ignored.

use std::io::Read;
use tracing::debug;

use super::{Station, deg_to_secs};

/// Line id written to a new station row until its arrivals reveal the real one.
pub const PLACEHOLDER_LINE_ID: i64 = 50;

/// Reads the CTA stop feed and returns its parent stations in feed order.
pub fn parse_station_list<R: Read>(reader: R) -> csv::Result<Vec<Station>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut stations = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if let Some(station) = parse_record(&record) {
            stations.push(station);
        }
    }

    debug!(stations = stations.len(), "Parsed CTA station list");
    Ok(stations)
}

fn parse_record(record: &csv::StringRecord) -> Option<Station> {
    let raw_id = record.get(0)?.trim();
    if raw_id.len() != 5 || !raw_id.starts_with('4') {
        return None;
    }

    let id = raw_id.parse::<i64>().ok()?;
    let name = clean_name(record.get(2)?);
    let latitude = record.get(4)?.trim().parse::<f64>().ok()?;
    let longitude = record.get(5)?.trim().parse::<f64>().ok()?;

    Some(Station {
        id,
        name,
        line: None,
        destination: None,
        latitude: deg_to_secs(latitude).round(),
        longitude: deg_to_secs(longitude).round(),
    })
}

/// Drops surrounding quotes and a trailing parenthetical such as `(Loop)`.
pub fn clean_name(raw: &str) -> String {
    let name = raw.trim_matches('"');
    if !name.ends_with(')') {
        return name.to_string();
    }

    let parts: Vec<&str> = name.split('(').collect();
    parts[..parts.len() - 1].join(" ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "\
stop_id,stop_code,stop_name,stop_desc,stop_lat,stop_lon,location_type,parent_station
1,1,Jackson & Austin Terminal,,41.87632184,-87.77410482,0,
30162,30162,18th (54th/Cermak-bound),,41.857908,-87.669147,0,40830
40830,,18th,,41.857908,-87.669147,1,
41400,,Roosevelt (Red/Green/Orange),,41.867368,-87.627402,1,
40380,,\"Clark/Lake\",,41.885737,-87.630886,1,
4999,,Too Short,,41.0,-87.0,1,
40999,,No Coordinates,,,,1,
";

    #[test]
    fn test_only_parent_stations_kept() {
        let stations = parse_station_list(FEED.as_bytes()).unwrap();
        let ids: Vec<_> = stations.iter().map(|s| s.id).collect();

        assert_eq!(ids, [40830, 41400, 40380]);
    }

    #[test]
    fn test_names_cleaned() {
        let stations = parse_station_list(FEED.as_bytes()).unwrap();

        assert_eq!(stations[0].name, "18th");
        assert_eq!(stations[1].name, "Roosevelt");
        assert_eq!(stations[2].name, "Clark/Lake");
    }

    #[test]
    fn test_coordinates_rounded_to_whole_seconds() {
        let stations = parse_station_list(FEED.as_bytes()).unwrap();

        assert_eq!(stations[0].latitude, (41.857908f64 * 3600.0).round());
        assert_eq!(stations[0].longitude.fract(), 0.0);
        assert!(stations[0].line.is_none());
    }

    #[test]
    fn test_clean_name_drops_trailing_parenthetical() {
        assert_eq!(clean_name("\"Harlem (Forest Park Branch)\""), "Harlem");
        assert_eq!(clean_name("Addison"), "Addison");
    }
}
