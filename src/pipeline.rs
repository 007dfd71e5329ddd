//! One ingestion run per system.
//!
//! Parse → group → pair/select → fetch → normalize → cap-and-persist, in
//! that order, strictly sequentially. The first fetch or resolution error
//! ends the run; records normalized before it are not written.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::System;
use crate::lines::LineIdResolver;
use crate::pairing::{BranchSequencer, adjacency_pairs};
use crate::persist::{IncrementalPersister, PersistOutcome};
use crate::record::ArrivalRecord;
use crate::stops::cta::PLACEHOLDER_LINE_ID;
use crate::stops::{Station, StopCatalog};
use crate::store::Store;
use crate::vendors::cta::{self, ArrivalBoardApi};
use crate::vendors::mbta::{self, TimeWindow, TravelTimeApi};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub system: System,
    /// Pairs or stations queried.
    pub queries: usize,
    pub persisted: PersistOutcome,
}

/// Fetches travel times for every adjacent pair in `catalog` and persists
/// the next capped slice of them.
#[tracing::instrument(skip_all, fields(lines = catalog.lines().len()))]
pub async fn run_boston<A, S>(
    api: &A,
    catalog: &StopCatalog,
    sequencer: &S,
    resolver: &LineIdResolver,
    persister: &IncrementalPersister,
    now: DateTime<Utc>,
) -> Result<RunSummary>
where
    A: TravelTimeApi + ?Sized,
    S: BranchSequencer + ?Sized,
{
    let window = TimeWindow::trailing_day(now);
    let mut records: Vec<ArrivalRecord> = Vec::new();
    let mut queries = 0;

    for group in catalog.lines() {
        let pairs = adjacency_pairs(group, sequencer);
        debug!(line = %group.line, pairs = pairs.len(), "Querying line");

        for pair in &pairs {
            let trips = api.travel_times(pair.from.id, pair.to.id, window).await?;
            records.extend(mbta::normalize(resolver, pair, &trips).await?);
            queries += 1;
        }
    }

    info!(queries, records = records.len(), "Boston fetch complete");
    let persisted = persister.persist(System::Boston, &records).await?;

    Ok(RunSummary {
        system: System::Boston,
        queries,
        persisted,
    })
}

/// Records each station's location, fetches its arrivals, back-fills the
/// station's line, then persists the next capped slice of arrivals.
#[tracing::instrument(skip_all, fields(stations = stations.len()))]
pub async fn run_chicago<A>(
    api: &A,
    stations: &[Station],
    resolver: &LineIdResolver,
    store: &Store,
    persister: &IncrementalPersister,
) -> Result<RunSummary>
where
    A: ArrivalBoardApi + ?Sized,
{
    let mut records: Vec<ArrivalRecord> = Vec::new();

    for station in stations {
        store.insert_station(station, PLACEHOLDER_LINE_ID).await?;

        let predictions = api.arrivals(station.id).await?;
        let normalized = cta::normalize(resolver, &predictions).await?;

        if let Some(line_id) = cta::station_line(&normalized) {
            store.set_station_line(station.id, line_id).await?;
        }

        debug!(station = station.id, arrivals = normalized.len(), "Station done");
        records.extend(normalized);
    }

    info!(
        queries = stations.len(),
        records = records.len(),
        "Chicago fetch complete"
    );
    let persisted = persister.persist(System::Chicago, &records).await?;

    Ok(RunSummary {
        system: System::Chicago,
        queries: stations.len(),
        persisted,
    })
}
