//! Average weekday ridership per line, joined with arrival offsets at
//! analysis time.
//!
//! The counts themselves come from outside (a table export); this module
//! computes each line's share and stores the rows against seeded line ids.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::Read;
use tracing::info;

use crate::System;
use crate::lines::LineIdResolver;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct RidershipEntry {
    pub line_id: i64,
    pub ridership: i64,
    /// Percentage of the system total, from a share rounded to 4 decimals.
    pub share: f64,
}

/// One row of the ridership export: `line,ridership`.
#[derive(Debug, Deserialize)]
struct RidershipRow {
    line: String,
    ridership: String,
}

/// Reads `(line name, count)` rows. Counts may use thousands separators.
pub fn read_counts<R: Read>(reader: R) -> Result<Vec<(String, i64)>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut counts = Vec::new();

    for result in rdr.deserialize() {
        let row: RidershipRow = result?;
        let count = row
            .ridership
            .replace(',', "")
            .trim()
            .parse::<i64>()
            .with_context(|| format!("bad ridership '{}' for {}", row.ridership, row.line))?;
        counts.push((row.line.trim().to_string(), count));
    }

    Ok(counts)
}

/// Attaches each line's share of the combined total.
pub fn with_shares(counts: &[(i64, i64)]) -> Vec<RidershipEntry> {
    let total: i64 = counts.iter().map(|(_, c)| c).sum();

    counts
        .iter()
        .map(|&(line_id, ridership)| {
            let share = if total == 0 {
                0.0
            } else {
                let fraction = ridership as f64 / total as f64;
                (fraction * 10_000.0).round() / 10_000.0 * 100.0
            };
            RidershipEntry {
                line_id,
                ridership,
                share,
            }
        })
        .collect()
}

/// Resolves every line in `counts`, then stores the entries. Returns the
/// number of new rows.
#[tracing::instrument(skip(resolver, store, counts), fields(lines = counts.len()))]
pub async fn import(
    resolver: &LineIdResolver,
    store: &Store,
    system: System,
    counts: &[(String, i64)],
) -> Result<usize> {
    let mut resolved = Vec::with_capacity(counts.len());
    for (line, count) in counts {
        resolved.push((resolver.resolve(system, line).await?, *count));
    }

    let mut inserted = 0;
    for entry in with_shares(&resolved) {
        if store.insert_ridership(&entry).await? {
            inserted += 1;
        }
    }

    info!(inserted, "Ridership stored");
    Ok(inserted)
}
