//! Stable integer ids for (system, line) pairs.
//!
//! Ids live in the `line_ids` table so analysis queries can join on them.
//! Each system must be seeded from its [`SystemLines`] before any of its
//! arrivals are resolved; resolving earlier is an error, not a silent miss.

use tracing::{debug, info};

use crate::System;
use crate::config::{LineTableError, LineTables, SystemLines};
use crate::store::Store;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("line ids for {0} have not been seeded")]
    Unseeded(System),
    #[error("no line id for '{0}'")]
    UnknownLine(String),
    #[error(transparent)]
    Table(#[from] LineTableError),
    #[error("line id lookup failed: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct LineIdResolver {
    store: Store,
    tables: LineTables,
}

impl LineIdResolver {
    /// `tables` is expected to have passed [`LineTables::validate`].
    pub fn new(store: Store, tables: LineTables) -> Self {
        Self { store, tables }
    }

    pub fn lines(&self, system: System) -> Result<&SystemLines, ResolveError> {
        Ok(self.tables.get(system)?)
    }

    /// Writes every line of `system` into `line_ids`. Existing rows are left
    /// alone, so seeding is safe to repeat. Returns the number of new rows.
    #[tracing::instrument(skip(self))]
    pub async fn seed(&self, system: System) -> Result<usize, ResolveError> {
        let table = self.lines(system)?;
        let mut inserted = 0;

        for line in &table.lines {
            if self.store.insert_line_id(&table.key(&line.name), line.id).await? {
                inserted += 1;
            }
        }

        info!(inserted, lines = table.lines.len(), "Line ids seeded");
        Ok(inserted)
    }

    pub async fn is_seeded(&self, system: System) -> Result<bool, ResolveError> {
        let table = self.lines(system)?;
        let count = self.store.line_count(&table.prefix).await?;
        Ok(count >= table.lines.len() as i64)
    }

    /// Looks up the id of `line_name` (unprefixed) in `system`.
    pub async fn resolve(&self, system: System, line_name: &str) -> Result<i64, ResolveError> {
        if !self.is_seeded(system).await? {
            return Err(ResolveError::Unseeded(system));
        }

        let key = self.lines(system)?.key(line_name);
        let id = self
            .store
            .line_id(&key)
            .await?
            .ok_or_else(|| ResolveError::UnknownLine(key.clone()))?;

        debug!(%key, id, "Resolved line id");
        Ok(id)
    }

    /// Like [`resolve`](Self::resolve) but first maps a vendor route code
    /// (e.g. `Brn`) to its line name.
    pub async fn resolve_route(&self, system: System, route_code: &str) -> Result<i64, ResolveError> {
        let name = self.lines(system)?.line_name(route_code).to_string();
        self.resolve(system, &name).await
    }
}
