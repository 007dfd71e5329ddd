//! Runtime configuration.
//!
//! [`Config`] is read from the environment (after `.env` is loaded by the
//! binary). [`LineTables`] describes every transit system's lines and is
//! validated before anything touches the database, so seeding can never
//! start from an inconsistent table.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::System;

/// Default number of new arrival rows written per run.
pub const DEFAULT_BATCH_CAP: usize = 25;

/// Settings for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub mbta_api_key: Option<String>,
    pub cta_api_key: Option<String>,
    pub mbta_stops_path: String,
    pub cta_stops_path: String,
    pub batch_cap: usize,
    pub line_tables_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let batch_cap = match std::env::var("INGEST_BATCH_CAP") {
            Ok(raw) => parse_batch_cap(&raw)?,
            Err(_) => DEFAULT_BATCH_CAP,
        };

        Ok(Self {
            database_url: env_or("DATABASE_URL", "sqlite://chicago_vs_boston.db"),
            mbta_api_key: std::env::var("MBTA_API_KEY").ok(),
            cta_api_key: std::env::var("CTA_API_KEY").ok(),
            mbta_stops_path: env_or("MBTA_STOPS_PATH", "boston_stops.txt"),
            cta_stops_path: env_or("CTA_STOPS_PATH", "chicago_stops.txt"),
            batch_cap,
            line_tables_path: std::env::var("LINE_TABLES_PATH").ok(),
        })
    }

    /// API key for `system`, required before any fetch is attempted.
    pub fn api_key(&self, system: System) -> Result<&str> {
        let (key, var) = match system {
            System::Boston => (&self.mbta_api_key, "MBTA_API_KEY"),
            System::Chicago => (&self.cta_api_key, "CTA_API_KEY"),
        };
        key.as_deref()
            .with_context(|| format!("{var} must be set to ingest {system}"))
    }

    /// Loads line tables from `LINE_TABLES_PATH` if set, otherwise the built-ins.
    /// Either way the result is validated.
    pub fn line_tables(&self) -> Result<LineTables> {
        let tables = match &self.line_tables_path {
            Some(path) => LineTables::load(path)?,
            None => LineTables::builtin(),
        };
        tables.validate()?;
        Ok(tables)
    }
}

/// A cap of zero would store nothing and never catch up.
fn parse_batch_cap(raw: &str) -> Result<usize> {
    let cap = raw
        .parse::<usize>()
        .with_context(|| format!("INGEST_BATCH_CAP must be an integer, got '{raw}'"))?;
    if cap == 0 {
        bail!("INGEST_BATCH_CAP must be at least 1");
    }
    Ok(cap)
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LineTableError {
    #[error("no line table configured for {0}")]
    MissingSystem(System),
    #[error("{0} has no lines")]
    Empty(System),
    #[error("prefix '{0}' is used by more than one system")]
    DuplicatePrefix(String),
    #[error("{system} lists line '{name}' twice")]
    DuplicateName { system: System, name: String },
    #[error("{system} ids must be contiguous, found {found} where {expected} was expected")]
    NonContiguous {
        system: System,
        expected: i64,
        found: i64,
    },
    #[error("line id {0} is assigned in more than one system")]
    OverlappingIds(i64),
    #[error("{system} route code '{code}' points at unknown line '{name}'")]
    UnknownRouteTarget {
        system: System,
        code: String,
        name: String,
    },
}

/// One line and the id it is seeded with.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LineSeed {
    pub name: String,
    pub id: i64,
}

/// Everything needed to resolve one system's route identifiers to line ids.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SystemLines {
    pub system: System,
    /// Prepended to every line name in `line_ids`, e.g. `b_` or `c_`.
    pub prefix: String,
    pub lines: Vec<LineSeed>,
    /// Short vendor route codes that do not already equal a line name.
    #[serde(default)]
    pub route_codes: HashMap<String, String>,
}

impl SystemLines {
    /// Prefixed key as stored in `line_ids.name`.
    pub fn key(&self, line_name: &str) -> String {
        format!("{}{}", self.prefix, line_name)
    }

    /// Maps a vendor route code to a line name. Unmapped codes pass through.
    pub fn line_name<'a>(&'a self, route_code: &'a str) -> &'a str {
        self.route_codes
            .get(route_code)
            .map(String::as_str)
            .unwrap_or(route_code)
    }
}

/// Line configuration for every system, loaded once at startup.
///
/// Stored as JSON when overridden:
/// ```json
/// [
///   { "system": "chicago", "prefix": "c_",
///     "lines": [{ "name": "Blue", "id": 0 }],
///     "route_codes": { "G": "Green" } }
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTables {
    systems: Vec<SystemLines>,
}

impl LineTables {
    pub fn new(systems: Vec<SystemLines>) -> Self {
        Self { systems }
    }

    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read line tables from '{path}'"))?;
        let systems: Vec<SystemLines> = serde_json::from_str(&content)
            .with_context(|| format!("malformed line tables in '{path}'"))?;
        Ok(Self { systems })
    }

    /// Chicago takes ids 0..=7 and Boston continues at 8.
    pub fn builtin() -> Self {
        fn seeds(names: &[&str], first_id: i64) -> Vec<LineSeed> {
            names
                .iter()
                .zip(first_id..)
                .map(|(name, id)| LineSeed {
                    name: name.to_string(),
                    id,
                })
                .collect()
        }

        let chicago = SystemLines {
            system: System::Chicago,
            prefix: "c_".to_string(),
            lines: seeds(
                &["Blue", "Brown", "Green", "Orange", "Pink", "Purple", "Red", "Yellow"],
                0,
            ),
            route_codes: [
                ("G", "Green"),
                ("P", "Purple"),
                ("Org", "Orange"),
                ("Brn", "Brown"),
                ("Y", "Yellow"),
            ]
            .into_iter()
            .map(|(code, name)| (code.to_string(), name.to_string()))
            .collect(),
        };

        let boston = SystemLines {
            system: System::Boston,
            prefix: "b_".to_string(),
            lines: seeds(&["Red", "Green", "Orange", "Blue"], 8),
            route_codes: HashMap::new(),
        };

        Self {
            systems: vec![chicago, boston],
        }
    }

    pub fn get(&self, system: System) -> Result<&SystemLines, LineTableError> {
        self.systems
            .iter()
            .find(|s| s.system == system)
            .ok_or(LineTableError::MissingSystem(system))
    }

    /// Checks every system is present and internally consistent, and that
    /// no id or prefix is shared across systems.
    pub fn validate(&self) -> Result<(), LineTableError> {
        for system in System::ALL {
            self.get(system)?;
        }

        let mut prefixes = HashSet::new();
        let mut ids = HashSet::new();

        for table in &self.systems {
            if !prefixes.insert(table.prefix.as_str()) {
                return Err(LineTableError::DuplicatePrefix(table.prefix.clone()));
            }
            if table.lines.is_empty() {
                return Err(LineTableError::Empty(table.system));
            }

            let mut names = HashSet::new();
            let mut sorted: Vec<i64> = Vec::with_capacity(table.lines.len());
            for line in &table.lines {
                if !names.insert(line.name.as_str()) {
                    return Err(LineTableError::DuplicateName {
                        system: table.system,
                        name: line.name.clone(),
                    });
                }
                if !ids.insert(line.id) {
                    return Err(LineTableError::OverlappingIds(line.id));
                }
                sorted.push(line.id);
            }

            sorted.sort_unstable();
            for pair in sorted.windows(2) {
                if pair[1] != pair[0] + 1 {
                    return Err(LineTableError::NonContiguous {
                        system: table.system,
                        expected: pair[0] + 1,
                        found: pair[1],
                    });
                }
            }

            for (code, name) in &table.route_codes {
                if !names.contains(name.as_str()) {
                    return Err(LineTableError::UnknownRouteTarget {
                        system: table.system,
                        code: code.clone(),
                        name: name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_are_valid() {
        assert_eq!(LineTables::builtin().validate(), Ok(()));
    }

    #[test]
    fn test_builtin_ids_are_disjoint_and_adjacent() {
        let tables = LineTables::builtin();
        let chicago = tables.get(System::Chicago).unwrap();
        let boston = tables.get(System::Boston).unwrap();

        let chicago_max = chicago.lines.iter().map(|l| l.id).max().unwrap();
        let boston_min = boston.lines.iter().map(|l| l.id).min().unwrap();
        assert_eq!(boston_min, chicago_max + 1);
    }

    #[test]
    fn test_route_code_lookup() {
        let tables = LineTables::builtin();
        let chicago = tables.get(System::Chicago).unwrap();

        assert_eq!(chicago.line_name("Brn"), "Brown");
        assert_eq!(chicago.line_name("Red"), "Red");
        assert_eq!(chicago.key(chicago.line_name("Org")), "c_Orange");
    }

    #[test]
    fn test_overlapping_ids_rejected() {
        let mut tables = LineTables::builtin();
        tables.systems[1].lines[0].id = 3;

        assert_eq!(tables.validate(), Err(LineTableError::OverlappingIds(3)));
    }

    #[test]
    fn test_gap_in_ids_rejected() {
        let mut tables = LineTables::builtin();
        tables.systems[1].lines[3].id = 20;

        assert!(matches!(
            tables.validate(),
            Err(LineTableError::NonContiguous { system: System::Boston, .. })
        ));
    }

    #[test]
    fn test_route_code_to_unknown_line_rejected() {
        let mut tables = LineTables::builtin();
        tables.systems[0]
            .route_codes
            .insert("Pnk".to_string(), "Magenta".to_string());

        assert!(matches!(
            tables.validate(),
            Err(LineTableError::UnknownRouteTarget { .. })
        ));
    }

    #[test]
    fn test_missing_system_rejected() {
        let tables = LineTables::new(vec![LineTables::builtin().systems[0].clone()]);

        assert_eq!(
            tables.validate(),
            Err(LineTableError::MissingSystem(System::Boston))
        );
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let mut tables = LineTables::builtin();
        tables.systems[1].prefix = "c_".to_string();

        assert_eq!(
            tables.validate(),
            Err(LineTableError::DuplicatePrefix("c_".to_string()))
        );
    }

    #[test]
    fn test_duplicate_line_name_rejected() {
        let mut tables = LineTables::builtin();
        tables.systems[1].lines[3].name = "Red".to_string();

        assert_eq!(
            tables.validate(),
            Err(LineTableError::DuplicateName {
                system: System::Boston,
                name: "Red".to_string(),
            })
        );
    }

    #[test]
    fn test_empty_system_rejected() {
        let mut tables = LineTables::builtin();
        tables.systems[1].lines.clear();

        assert_eq!(tables.validate(), Err(LineTableError::Empty(System::Boston)));
    }

    fn config_without_keys() -> Config {
        Config {
            database_url: "sqlite::memory:".to_string(),
            mbta_api_key: None,
            cta_api_key: Some("cta-secret".to_string()),
            mbta_stops_path: "boston_stops.txt".to_string(),
            cta_stops_path: "chicago_stops.txt".to_string(),
            batch_cap: DEFAULT_BATCH_CAP,
            line_tables_path: None,
        }
    }

    #[test]
    fn test_missing_api_key_is_error() {
        let config = config_without_keys();

        let err = config.api_key(System::Boston).unwrap_err();
        assert!(err.to_string().contains("MBTA_API_KEY"));
        assert_eq!(config.api_key(System::Chicago).unwrap(), "cta-secret");
    }

    #[test]
    fn test_batch_cap_parsing() {
        assert_eq!(parse_batch_cap("40").unwrap(), 40);
        assert!(parse_batch_cap("0").is_err());
        assert!(parse_batch_cap("-3").is_err());
        assert!(parse_batch_cap("lots").is_err());
    }

    #[test]
    fn test_load_from_json() {
        let path = format!("{}/transit_offsets_lines.json", std::env::temp_dir().display());
        std::fs::write(
            &path,
            r#"[
                {"system": "chicago", "prefix": "c_", "lines": [{"name": "Blue", "id": 0}]},
                {"system": "boston", "prefix": "b_", "lines": [{"name": "Red", "id": 1}]}
            ]"#,
        )
        .unwrap();

        let tables = LineTables::load(&path).unwrap();
        assert_eq!(tables.validate(), Ok(()));
        assert!(tables.get(System::Chicago).unwrap().route_codes.is_empty());

        std::fs::remove_file(&path).unwrap();
    }
}
