//! Station records parsed from each system's stop feed.
//!
//! The MBTA feed is grouped by line and destination branch into a
//! [`StopCatalog`]; the CTA feed is a flat list of parent stations.

pub mod cta;
pub mod mbta;

/// Converts degrees of latitude/longitude to arc-seconds. One arc-second is
/// roughly 80 ft, enough to tell adjacent stops apart.
pub fn deg_to_secs(deg: f64) -> f64 {
    deg * 3600.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: i64,
    pub name: String,
    /// Line (color). Absent for feeds that do not carry it per stop.
    pub line: Option<String>,
    /// Normalized destination branch label.
    pub destination: Option<String>,
    /// Arc-seconds.
    pub latitude: f64,
    /// Arc-seconds.
    pub longitude: f64,
}

/// Stations sharing a line and destination, in feed order.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub destination: String,
    pub stations: Vec<Station>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineGroup {
    pub line: String,
    pub branches: Vec<Branch>,
}

/// Line → destination → stations, with every level kept in first-seen order
/// so repeated runs over the same feed iterate identically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopCatalog {
    lines: Vec<LineGroup>,
}

impl StopCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files `station` under `line`/`destination`, creating either on first sight.
    pub fn insert(&mut self, line: &str, destination: &str, station: Station) {
        let index = match self.lines.iter().position(|g| g.line == line) {
            Some(i) => i,
            None => {
                self.lines.push(LineGroup {
                    line: line.to_string(),
                    branches: Vec::new(),
                });
                self.lines.len() - 1
            }
        };
        let group = &mut self.lines[index];

        match group
            .branches
            .iter_mut()
            .find(|b| b.destination == destination)
        {
            Some(branch) => branch.stations.push(station),
            None => group.branches.push(Branch {
                destination: destination.to_string(),
                stations: vec![station],
            }),
        }
    }

    pub fn lines(&self) -> &[LineGroup] {
        &self.lines
    }

    pub fn line(&self, line: &str) -> Option<&LineGroup> {
        self.lines.iter().find(|g| g.line == line)
    }

    /// Total number of stations across all branches.
    pub fn station_count(&self) -> usize {
        self.lines
            .iter()
            .flat_map(|g| &g.branches)
            .map(|b| b.stations.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
