use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lattice_common::Entity;

use crate::differ::diff;
use crate::resolver::IdentityResolver;
use crate::store::{EdgeKind, EntityStore};

/// Chunk size for bulk merges, bounding the size of any one server-side
/// statement.
pub const DEFAULT_CHUNK_SIZE: usize = 25;

/// Result of a bulk upsert. Never an error for per-item failures: callers
/// inspect `errors`. created + updated + skipped + errors always equals the
/// number of inputs.
#[derive(Debug, Default)]
pub struct UpsertReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// (handle, error) per failed item.
    pub errors: Vec<(String, String)>,
}

impl UpsertReport {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.errors.len()
    }
}

impl std::fmt::Display for UpsertReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Upsert: {} created, {} updated, {} skipped, {} errored",
            self.created,
            self.updated,
            self.skipped,
            self.errors.len(),
        )
    }
}

/// Drives bulk node upserts and edge writes. Chunked declarative merges do
/// the heavy lifting server-side; a failed chunk falls back to per-item
/// resolution so one malformed record cannot fail an entire batch. Chunks
/// are not atomic relative to each other; at-least-once semantics are safe
/// because every write is an idempotent merge by handle key.
pub struct BatchSynchronizer {
    store: EntityStore,
    resolver: IdentityResolver,
    chunk_size: usize,
}

impl BatchSynchronizer {
    pub fn new(store: EntityStore, resolver: IdentityResolver) -> Self {
        Self {
            store,
            resolver,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Upsert a batch of entities. Entities already present and not stale
    /// are skipped before any write is dispatched. On cancellation the
    /// in-flight chunk completes and the remaining inputs are counted as
    /// skipped.
    pub async fn upsert_batch(
        &self,
        entities: Vec<Entity>,
        cancel: &CancellationToken,
    ) -> Result<UpsertReport, neo4rs::Error> {
        let mut report = UpsertReport::default();
        if entities.is_empty() {
            return Ok(report);
        }

        let keys: Vec<String> = entities.iter().map(|e| e.handle_key()).collect();
        let existing: HashMap<String, DateTime<Utc>> = self
            .store
            .existing_profiles(&keys)
            .await?
            .into_iter()
            .collect();

        let (to_write, skipped) = partition_stale(entities, &existing, Utc::now());
        report.skipped = skipped;
        info!(
            writing = to_write.len(),
            skipped,
            "Batch upsert: staleness pre-filter applied"
        );

        let mut chunks = to_write.chunks(self.chunk_size);
        let mut remaining = to_write.len();
        for chunk in chunks.by_ref() {
            if cancel.is_cancelled() {
                warn!(remaining, "Batch upsert cancelled; skipping remaining chunks");
                report.skipped += remaining;
                break;
            }
            remaining -= chunk.len();

            match self.store.bulk_upsert_chunk(chunk).await {
                Ok((created, updated)) => {
                    report.created += created;
                    report.updated += updated;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        chunk_size = chunk.len(),
                        "Bulk merge failed; falling back to per-item resolution"
                    );
                    for entity in chunk {
                        match self.resolver.resolve(entity).await {
                            Ok(resolved) if resolved.created => report.created += 1,
                            Ok(_) => report.updated += 1,
                            Err(e) => {
                                warn!(
                                    handle = entity.handle.as_str(),
                                    error = %e,
                                    "Per-item upsert failed"
                                );
                                report.errors.push((entity.handle.clone(), e.to_string()));
                            }
                        }
                    }
                }
            }
        }

        info!(%report, "Batch upsert complete");
        Ok(report)
    }

    /// Reconcile an account's FOLLOWS edges against a freshly fetched
    /// target set, writing only the difference. Adds run before removes so
    /// an edge present in both sets never has an absence window. Returns
    /// (added, removed).
    pub async fn sync_follow_edges(
        &self,
        handle: &str,
        fresh_targets: &[String],
    ) -> Result<(usize, usize), neo4rs::Error> {
        let src = lattice_common::handle_key(handle);
        let current = self.store.follow_targets(&src).await?;
        let fresh: Vec<String> = fresh_targets
            .iter()
            .map(|h| lattice_common::handle_key(h))
            .collect();

        let d = diff(&current, &fresh);
        if d.is_empty() {
            return Ok((0, 0));
        }

        let add_pairs: Vec<(String, String)> =
            d.to_add.iter().map(|t| (src.clone(), t.clone())).collect();
        let remove_pairs: Vec<(String, String)> =
            d.to_remove.iter().map(|t| (src.clone(), t.clone())).collect();

        self.store.add_edges(EdgeKind::Follows, &add_pairs).await?;
        self.store
            .remove_edges(EdgeKind::Follows, &remove_pairs)
            .await?;

        info!(
            handle = src.as_str(),
            added = add_pairs.len(),
            removed = remove_pairs.len(),
            "Follow edges reconciled"
        );
        Ok((add_pairs.len(), remove_pairs.len()))
    }

    /// Write only the candidate pairs that do not already have an edge of
    /// this kind. Returns how many edges were created.
    pub async fn create_missing_edges(
        &self,
        kind: EdgeKind,
        pairs: &[(String, String)],
    ) -> Result<usize, neo4rs::Error> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let existing = self.store.existing_edges(kind, pairs).await?;
        let missing: Vec<(String, String)> = pairs
            .iter()
            .filter(|p| !existing.contains(*p))
            .cloned()
            .collect();
        self.store.add_edges(kind, &missing).await?;
        Ok(missing.len())
    }
}

/// Partition inputs into (to-write, skipped-count): entities with no node
/// are missing, entities with a node older than the staleness threshold are
/// stale, the rest are up-to-date and skipped.
fn partition_stale(
    entities: Vec<Entity>,
    existing: &HashMap<String, DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (Vec<Entity>, usize) {
    let mut to_write = Vec::new();
    let mut skipped = 0;
    for entity in entities {
        match existing.get(&entity.handle_key()) {
            None => to_write.push(entity),
            Some(last_updated) => {
                let stored_age = now - *last_updated;
                if stored_age
                    > chrono::Duration::hours(lattice_common::PROFILE_STALE_HOURS)
                {
                    to_write.push(entity);
                } else {
                    skipped += 1;
                }
            }
        }
    }
    (to_write, skipped)
}
