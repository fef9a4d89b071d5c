use tracing::{debug, info, warn};

use lattice_common::Entity;

use crate::store::EntityStore;

/// Outcome of resolving one candidate: the authoritative id for downstream
/// edge creation, and whether a node was created.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub entity_id: String,
    pub created: bool,
}

/// The single authorized path for creating or updating an entity node.
///
/// Handle is the semantic identity of an account; the external entity id is
/// volatile and may drift between ingestions. Resolution reads both matches,
/// then performs exactly one write:
///
/// - handle and id match different nodes: the handle match is canonical,
///   the candidate's data and id are applied to it, and the stale id claim
///   is stripped from the other node first
/// - only the handle matches: update in place, adopt the candidate's id
/// - only the id matches: the handle changed upstream; rename that node
/// - neither matches: create
///
/// Within one candidate the conflict check and the write are strictly
/// sequential. No retries happen here; store errors propagate to the
/// caller (retrying is a batch-synchronizer concern).
#[derive(Clone)]
pub struct IdentityResolver {
    store: EntityStore,
}

impl IdentityResolver {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub async fn resolve(&self, candidate: &Entity) -> Result<Resolved, neo4rs::Error> {
        let key = candidate.handle_key();

        let by_handle = self.store.find_by_handle(&candidate.handle).await?;
        let by_id = if candidate.entity_id.is_empty() {
            None
        } else {
            self.store.find_by_entity_id(&candidate.entity_id).await?
        };

        match (by_handle, by_id) {
            (Some(h), Some(i)) if h.handle_key() != i.handle_key() => {
                // The incoming id has drifted onto a different node than the
                // handle points at. The handle match wins; if the handles
                // were genuinely reused by different accounts this silently
                // merges them, which is why it is logged loudly.
                warn!(
                    handle = candidate.handle.as_str(),
                    entity_id = candidate.entity_id.as_str(),
                    displaced_handle = i.handle.as_str(),
                    "Handle and entity id point at different nodes; keeping handle match as canonical"
                );
                self.store
                    .clear_stale_id_claim(&candidate.entity_id, &key)
                    .await?;
                self.store.update_entity(&key, candidate).await?;
                Ok(Resolved {
                    entity_id: candidate.entity_id.clone(),
                    created: false,
                })
            }
            (Some(_), _) => {
                debug!(handle = candidate.handle.as_str(), "Updating entity in place");
                self.store.update_entity(&key, candidate).await?;
                Ok(Resolved {
                    entity_id: candidate.entity_id.clone(),
                    created: false,
                })
            }
            (None, Some(existing)) => {
                info!(
                    old_handle = existing.handle.as_str(),
                    new_handle = candidate.handle.as_str(),
                    "Handle changed upstream; renaming node"
                );
                self.store
                    .update_entity(&existing.handle_key(), candidate)
                    .await?;
                Ok(Resolved {
                    entity_id: candidate.entity_id.clone(),
                    created: false,
                })
            }
            (None, None) => {
                debug!(handle = candidate.handle.as_str(), "Creating new entity");
                self.store.create_entity(candidate).await?;
                Ok(Resolved {
                    entity_id: candidate.entity_id.clone(),
                    created: true,
                })
            }
        }
    }
}
