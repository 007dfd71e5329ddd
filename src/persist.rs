//! Capped, resumable persistence of arrival records.
//!
//! Vendor quotas limit how much a single run may write. Each run stores at
//! most `cap` records that are not already in the database; the rest wait
//! for the next run. Whether a record is "already in" is decided by its
//! natural key, so the outcome does not depend on the order records were
//! fetched in or on how many rows the table happens to hold.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::System;
use crate::config::DEFAULT_BATCH_CAP;
use crate::record::ArrivalRecord;
use crate::store::Store;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to write arrivals: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record {key} belongs to {found}, not {expected}")]
    WrongSystem {
        expected: System,
        found: System,
        key: String,
    },
}

/// What one persistence pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Records handed in.
    pub fetched: usize,
    /// Records skipped because an identical key appeared earlier in the same batch.
    pub duplicates: usize,
    /// Records skipped because they were stored by an earlier run.
    pub already_present: usize,
    pub inserted: usize,
    /// New records left for later runs.
    pub remaining: usize,
}

impl PersistOutcome {
    pub fn caught_up(&self) -> bool {
        self.remaining == 0
    }
}

/// At most `cap` items from the front of `items`.
pub fn bounded_take<T>(items: &[T], cap: usize) -> &[T] {
    &items[..items.len().min(cap)]
}

pub struct IncrementalPersister {
    store: Store,
    cap: usize,
}

impl IncrementalPersister {
    pub fn new(store: Store) -> Self {
        Self::with_cap(store, DEFAULT_BATCH_CAP)
    }

    pub fn with_cap(store: Store, cap: usize) -> Self {
        Self { store, cap }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Writes up to `cap` not-yet-stored records, in the order given, and
    /// advances the system's watermark past the last one written.
    #[tracing::instrument(skip(self, records), fields(records = records.len(), cap = self.cap))]
    pub async fn persist(
        &self,
        system: System,
        records: &[ArrivalRecord],
    ) -> Result<PersistOutcome, PersistError> {
        if let Some(stray) = records.iter().find(|r| r.system() != system) {
            return Err(PersistError::WrongSystem {
                expected: system,
                found: stray.system(),
                key: stray.key(),
            });
        }

        let mut outcome = PersistOutcome {
            fetched: records.len(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for record in records {
            if !seen.insert(record.key()) {
                outcome.duplicates += 1;
            } else if self.store.contains_arrival(record).await? {
                outcome.already_present += 1;
            } else {
                pending.push(record);
            }
        }

        let batch = bounded_take(&pending, self.cap);
        let mut last_key = None;

        for record in batch {
            if self.store.insert_arrival(record).await? {
                outcome.inserted += 1;
                last_key = Some(record.key());
            }
        }
        outcome.remaining = pending.len() - batch.len();

        if let Some(key) = last_key {
            self.store
                .advance_watermark(system, &key, outcome.inserted as i64)
                .await?;
            debug!(last_key = %key, "Watermark advanced");
        }

        if outcome.caught_up() {
            info!(inserted = outcome.inserted, "All fetched arrivals are stored");
        } else {
            info!(
                inserted = outcome.inserted,
                remaining = outcome.remaining,
                "Batch cap reached, remaining arrivals deferred"
            );
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StationKey;

    fn records(n: i64) -> Vec<ArrivalRecord> {
        (0..n)
            .map(|i| ArrivalRecord::new(0, StationKey::Train { station: 40380, train: i }, 100, 100 + i))
            .collect()
    }

    #[test]
    fn test_bounded_take() {
        let items = [1, 2, 3];
        assert_eq!(bounded_take(&items, 2), [1, 2]);
        assert_eq!(bounded_take(&items, 25), [1, 2, 3]);
        assert!(bounded_take::<i32>(&[], 25).is_empty());
    }

    #[tokio::test]
    async fn test_cap_limits_each_run() {
        let store = Store::in_memory().await.unwrap();
        let persister = IncrementalPersister::new(store.clone());
        let fetched = records(60);

        let first = persister.persist(System::Chicago, &fetched).await.unwrap();
        assert_eq!(first.inserted, 25);
        assert_eq!(first.remaining, 35);
        assert!(!first.caught_up());
        assert_eq!(store.arrival_count(System::Chicago).await.unwrap(), 25);

        let second = persister.persist(System::Chicago, &fetched).await.unwrap();
        assert_eq!(second.already_present, 25);
        assert_eq!(second.inserted, 25);
        assert_eq!(second.remaining, 10);

        let third = persister.persist(System::Chicago, &fetched).await.unwrap();
        assert_eq!(third.inserted, 10);
        assert!(third.caught_up());

        let fourth = persister.persist(System::Chicago, &fetched).await.unwrap();
        assert_eq!(fourth.inserted, 0);
        assert_eq!(fourth.already_present, 60);
        assert_eq!(store.arrival_count(System::Chicago).await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_resume_ignores_fetch_order() {
        let store = Store::in_memory().await.unwrap();
        let persister = IncrementalPersister::with_cap(store.clone(), 3);
        let mut fetched = records(5);

        persister.persist(System::Chicago, &fetched).await.unwrap();
        fetched.reverse();
        let second = persister.persist(System::Chicago, &fetched).await.unwrap();

        assert_eq!(second.inserted, 2);
        assert!(second.caught_up());
        assert_eq!(store.arrival_count(System::Chicago).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_duplicates_in_batch_skipped() {
        let store = Store::in_memory().await.unwrap();
        let persister = IncrementalPersister::new(store);
        let mut fetched = records(2);
        fetched.push(fetched[0].clone());

        let outcome = persister.persist(System::Chicago, &fetched).await.unwrap();

        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.inserted, 2);
    }

    #[tokio::test]
    async fn test_watermark_tracks_last_insert() {
        let store = Store::in_memory().await.unwrap();
        let persister = IncrementalPersister::with_cap(store.clone(), 2);

        persister.persist(System::Chicago, &records(3)).await.unwrap();

        let mark = store.watermark(System::Chicago).await.unwrap().unwrap();
        assert_eq!(mark.last_key, "40380:1");
        assert_eq!(mark.total_inserted, 2);
    }

    #[tokio::test]
    async fn test_records_for_other_system_rejected() {
        let store = Store::in_memory().await.unwrap();
        let persister = IncrementalPersister::new(store.clone());
        let mut fetched = records(2);
        fetched.push(ArrivalRecord::new(8, StationKey::Pair { from: 70063, to: 70061 }, 120, 150));

        let result = persister.persist(System::Chicago, &fetched).await;

        assert!(matches!(
            result,
            Err(PersistError::WrongSystem { expected: System::Chicago, found: System::Boston, .. })
        ));
        assert_eq!(store.arrival_count(System::Boston).await.unwrap(), 0);
        assert_eq!(store.arrival_count(System::Chicago).await.unwrap(), 0);
        assert!(store.watermark(System::Chicago).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_fetch_is_caught_up() {
        let store = Store::in_memory().await.unwrap();
        let persister = IncrementalPersister::new(store.clone());

        let outcome = persister.persist(System::Boston, &[]).await.unwrap();

        assert_eq!(outcome, PersistOutcome::default());
        assert!(store.watermark(System::Boston).await.unwrap().is_none());
    }
}
