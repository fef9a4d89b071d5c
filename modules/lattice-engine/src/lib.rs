pub mod migrate;

use anyhow::Result;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use directory_client::{DirectoryClient, DirectoryError, Profile};
use lattice_classify::{CategoryMapper, Classifier, ClassifyStats, ProfileBrief};
use lattice_common::{Config, Entity, LatticeError, Vibe};
use lattice_graph::{BatchSynchronizer, EntityStore, GraphClient, IdentityResolver, UpsertReport};
use llm_client::LlmClient;

pub use migrate::migrate;

#[derive(Debug, Default)]
pub struct EngineStats {
    pub looked_up: usize,
    pub lookup_failures: usize,
    pub upsert: UpsertReport,
    pub classify: ClassifyStats,
    pub follows_added: usize,
    pub follows_removed: usize,
    pub follow_failures: usize,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} looked up ({} failed) | {} | {} | follows: {} added, {} removed, {} failed",
            self.looked_up,
            self.lookup_failures,
            self.upsert,
            self.classify,
            self.follows_added,
            self.follows_removed,
            self.follow_failures,
        )
    }
}

/// One full synchronization pass over a seed list of handles: directory
/// lookup, graph upsert, classification of the missing/stale cohort,
/// employment and affiliation linking, then follow-edge reconciliation.
pub struct Engine {
    directory: DirectoryClient,
    sync: BatchSynchronizer,
    classifier: Classifier,
}

impl Engine {
    pub fn new(client: GraphClient, config: &Config) -> Self {
        let store = EntityStore::new(client);
        let resolver = IdentityResolver::new(store.clone());
        let llm = LlmClient::new(&config.anthropic_api_key, &config.llm_model);
        let classifier = Classifier::new(
            llm,
            resolver.clone(),
            BatchSynchronizer::new(store.clone(), resolver.clone()),
            CategoryMapper::new(),
        );
        Self {
            directory: DirectoryClient::new(&config.directory_api_url, &config.directory_api_key),
            sync: BatchSynchronizer::new(store, resolver),
            classifier,
        }
    }

    pub async fn run(
        &self,
        seed_handles: &[String],
        cancel: &CancellationToken,
    ) -> Result<EngineStats> {
        let mut stats = EngineStats::default();
        info!(handles = seed_handles.len(), "Engine run starting");

        // 1. Fetch fresh profile data. Dead handles are logged and dropped;
        // they never abort the run.
        let mut entities = Vec::new();
        for (handle, result) in self.directory.lookup_many(seed_handles).await {
            match result {
                Ok(profile) => {
                    stats.looked_up += 1;
                    entities.push(entity_from_profile(profile));
                }
                Err(DirectoryError::NotFound(_)) => {
                    warn!(handle = handle.as_str(), "Handle not found in directory");
                    stats.lookup_failures += 1;
                }
                Err(e) => {
                    warn!(handle = handle.as_str(), error = %e, "Directory lookup failed");
                    stats.lookup_failures += 1;
                }
            }
        }

        // 2. Merge profile data into the graph.
        stats.upsert = self
            .sync
            .upsert_batch(entities.clone(), cancel)
            .await
            .map_err(|e| LatticeError::Database(e.to_string()))?;

        if cancel.is_cancelled() {
            info!(%stats, "Engine run cancelled after upsert");
            return Ok(stats);
        }

        // 3. Classify whatever is missing or stale, then link org mentions.
        let briefs: Vec<ProfileBrief> = entities.iter().map(ProfileBrief::from_entity).collect();
        stats.classify = self.classifier.classify_and_persist(&briefs, cancel).await?;

        // 4. Reconcile follow edges per profile.
        for entity in &entities {
            if cancel.is_cancelled() {
                info!("Engine run cancelled during follow sync");
                break;
            }
            match self.directory.following(&entity.handle).await {
                Ok(targets) => {
                    match self.sync.sync_follow_edges(&entity.handle, &targets).await {
                        Ok((added, removed)) => {
                            stats.follows_added += added;
                            stats.follows_removed += removed;
                        }
                        Err(e) => {
                            warn!(handle = entity.handle.as_str(), error = %e, "Follow sync failed");
                            stats.follow_failures += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(handle = entity.handle.as_str(), error = %e, "Follow fetch failed");
                    stats.follow_failures += 1;
                }
            }
        }

        info!(%stats, "Engine run complete");
        Ok(stats)
    }
}

/// Directory profiles arrive unclassified; classification is decided later
/// against whatever the graph already holds.
fn entity_from_profile(p: Profile) -> Entity {
    let display_name = if p.name.is_empty() {
        p.handle.clone()
    } else {
        p.name
    };
    Entity {
        entity_id: p.id,
        handle: p.handle,
        display_name,
        bio: p.bio,
        location: p.location,
        followers: p.followers_count,
        following: p.following_count,
        verified: p.verified,
        vibe: Vibe::Unclassified,
        classified_at: None,
        last_updated: Utc::now(),
        implied: false,
    }
}
