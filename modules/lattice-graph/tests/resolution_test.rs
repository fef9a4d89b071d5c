//! Integration tests for identity resolution and batch sync against a real
//! Neo4j instance started via testcontainers. Requires Docker.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use lattice_common::{Department, Entity, OrgType, Vibe, Web3Focus};
use lattice_graph::testutil::neo4j_container;
use lattice_graph::{BatchSynchronizer, EdgeKind, EntityStore, IdentityResolver};

fn profile(entity_id: &str, handle: &str) -> Entity {
    Entity {
        entity_id: entity_id.to_string(),
        handle: handle.to_string(),
        display_name: handle.to_string(),
        bio: format!("{handle} bio"),
        location: None,
        followers: 100,
        following: 50,
        verified: false,
        vibe: Vibe::Unclassified,
        classified_at: None,
        last_updated: Utc::now(),
        implied: false,
    }
}

fn individual(entity_id: &str, handle: &str, current: &[&str]) -> Entity {
    let mut e = profile(entity_id, handle);
    e.vibe = Vibe::Individual {
        current_orgs: current.iter().map(|s| s.to_string()).collect(),
        past_orgs: vec![],
        affiliations: vec![],
        department: Department::Engineering,
    };
    e.classified_at = Some(Utc::now());
    e
}

fn organization(entity_id: &str, handle: &str) -> Entity {
    let mut e = profile(entity_id, handle);
    e.vibe = Vibe::Organization {
        org_type: Some(OrgType::DefiProtocol),
        org_subtypes: vec!["lending".to_string()],
        web3_focus: Some(Web3Focus::Native),
    };
    e.classified_at = Some(Utc::now());
    e
}

async fn count_entities(store: &EntityStore, handle_key: &str) -> i64 {
    let q = lattice_graph::query("MATCH (e:Entity {handle_key: $key}) RETURN count(e) AS n")
        .param("key", handle_key);
    let mut stream = store.client().inner().execute(q).await.unwrap();
    let row = stream.next().await.unwrap().unwrap();
    row.get("n").unwrap()
}

#[tokio::test]
async fn uniqueness_under_entity_id_churn() {
    let (_container, client) = neo4j_container().await;
    let store = EntityStore::new(client);
    let resolver = IdentityResolver::new(store.clone());

    // Same handle ingested repeatedly with varying ids, varying case.
    resolver.resolve(&profile("1", "bob")).await.unwrap();
    resolver.resolve(&profile("2", "Bob")).await.unwrap();
    resolver.resolve(&profile("3", "BOB")).await.unwrap();

    assert_eq!(count_entities(&store, "bob").await, 1);
    let e = store.find_by_handle("bob").await.unwrap().unwrap();
    assert_eq!(e.entity_id, "3");
}

#[tokio::test]
async fn category_exclusivity_after_reclassification() {
    let (_container, client) = neo4j_container().await;
    let store = EntityStore::new(client);
    let resolver = IdentityResolver::new(store.clone());

    resolver
        .resolve(&individual("1", "acme", &["somewhere"]))
        .await
        .unwrap();
    let e = store.find_by_handle("acme").await.unwrap().unwrap();
    assert!(matches!(e.vibe, Vibe::Individual { .. }));

    // Reclassify as organization: individual-only fields must be gone.
    resolver.resolve(&organization("1", "acme")).await.unwrap();
    let e = store.find_by_handle("acme").await.unwrap().unwrap();
    match e.vibe {
        Vibe::Organization {
            org_type,
            org_subtypes,
            web3_focus,
        } => {
            assert_eq!(org_type, Some(OrgType::DefiProtocol));
            assert_eq!(org_subtypes, vec!["lending".to_string()]);
            assert_eq!(web3_focus, Some(Web3Focus::Native));
        }
        other => panic!("expected organization, got {other:?}"),
    }

    // And back: organization fields must be gone.
    resolver
        .resolve(&individual("1", "acme", &["elsewhere"]))
        .await
        .unwrap();
    let e = store.find_by_handle("acme").await.unwrap().unwrap();
    match e.vibe {
        Vibe::Individual { current_orgs, .. } => {
            assert_eq!(current_orgs, vec!["elsewhere".to_string()]);
        }
        other => panic!("expected individual, got {other:?}"),
    }
}

#[tokio::test]
async fn rename_follows_entity_id() {
    let (_container, client) = neo4j_container().await;
    let store = EntityStore::new(client);
    let resolver = IdentityResolver::new(store.clone());

    resolver.resolve(&profile("77", "old_name")).await.unwrap();
    // Same external id, new handle: the node is renamed, not duplicated.
    resolver.resolve(&profile("77", "new_name")).await.unwrap();

    assert_eq!(count_entities(&store, "old_name").await, 0);
    let e = store.find_by_handle("new_name").await.unwrap().unwrap();
    assert_eq!(e.entity_id, "77");
}

#[tokio::test]
async fn conflict_prefers_handle_match() {
    let (_container, client) = neo4j_container().await;
    let store = EntityStore::new(client);
    let resolver = IdentityResolver::new(store.clone());

    resolver.resolve(&profile("1", "alice")).await.unwrap();
    resolver.resolve(&profile("2", "carol")).await.unwrap();

    // Candidate: alice's handle but carol's id. Handle match is canonical;
    // the id migrates onto alice, carol keeps her node.
    resolver.resolve(&profile("2", "alice")).await.unwrap();

    let alice = store.find_by_handle("alice").await.unwrap().unwrap();
    assert_eq!(alice.entity_id, "2");
    let carol = store.find_by_handle("carol").await.unwrap().unwrap();
    assert!(carol.entity_id.is_empty(), "stale id claim must be stripped");
    assert_eq!(count_entities(&store, "alice").await, 1);
}

#[tokio::test]
async fn bulk_upsert_counts_and_skips() {
    let (_container, client) = neo4j_container().await;
    let store = EntityStore::new(client);
    let resolver = IdentityResolver::new(store.clone());
    let sync = BatchSynchronizer::new(store.clone(), resolver);
    let cancel = CancellationToken::new();

    let batch: Vec<Entity> = ["a", "b", "c"].iter().map(|h| profile("x", h)).collect();
    let report = sync.upsert_batch(batch.clone(), &cancel).await.unwrap();
    assert_eq!(report.created, 3);
    assert_eq!(report.total(), 3);

    // Second run: everything is fresh, nothing is written.
    let report = sync.upsert_batch(batch, &cancel).await.unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.skipped, 3);
    assert_eq!(report.total(), 3);
}

#[tokio::test]
async fn bulk_upsert_respects_handle_uniqueness() {
    let (_container, client) = neo4j_container().await;
    let store = EntityStore::new(client);
    let resolver = IdentityResolver::new(store.clone());
    let sync = BatchSynchronizer::new(store.clone(), resolver)
        .with_chunk_size(2);
    let cancel = CancellationToken::new();

    // Two records for the same handle with different ids, same batch. The
    // duplicate pair lands in one chunk and produces exactly one node, and
    // the counts reflect nodes, not input rows.
    let batch = vec![profile("1", "bob"), profile("2", "BOB"), profile("9", "eve")];
    let report = sync.upsert_batch(batch, &cancel).await.unwrap();
    assert_eq!(report.errors.len(), 0);
    assert_eq!(report.created, 2);
    assert_eq!(report.updated, 0);

    assert_eq!(count_entities(&store, "bob").await, 1);
    let bob = store.find_by_handle("bob").await.unwrap().unwrap();
    assert_eq!(bob.entity_id, "2");
}

#[tokio::test]
async fn follow_sync_writes_only_the_difference() {
    let (_container, client) = neo4j_container().await;
    let store = EntityStore::new(client);
    let resolver = IdentityResolver::new(store.clone());
    let sync = BatchSynchronizer::new(store.clone(), resolver);
    let cancel = CancellationToken::new();

    let batch: Vec<Entity> = ["src", "a", "b", "c"].iter().map(|h| profile("x", h)).collect();
    sync.upsert_batch(batch, &cancel).await.unwrap();

    let (added, removed) = sync
        .sync_follow_edges("src", &["a".into(), "b".into()])
        .await
        .unwrap();
    assert_eq!((added, removed), (2, 0));

    // One new follower, one unfollow.
    let (added, removed) = sync
        .sync_follow_edges("src", &["a".into(), "c".into()])
        .await
        .unwrap();
    assert_eq!((added, removed), (1, 1));

    let mut targets = store.follow_targets("src").await.unwrap();
    targets.sort();
    assert_eq!(targets, vec!["a".to_string(), "c".to_string()]);

    // Identical fresh set: nothing to write.
    let (added, removed) = sync
        .sync_follow_edges("src", &["a".into(), "c".into()])
        .await
        .unwrap();
    assert_eq!((added, removed), (0, 0));
}

#[tokio::test]
async fn employment_edges_are_idempotent() {
    let (_container, client) = neo4j_container().await;
    let store = EntityStore::new(client);
    let resolver = IdentityResolver::new(store.clone());
    let sync = BatchSynchronizer::new(store.clone(), resolver);
    let cancel = CancellationToken::new();

    let batch: Vec<Entity> = ["dev", "acme"].iter().map(|h| profile("x", h)).collect();
    sync.upsert_batch(batch, &cancel).await.unwrap();

    let pairs = vec![("dev".to_string(), "acme".to_string())];
    let created = sync
        .create_missing_edges(EdgeKind::WorksAt, &pairs)
        .await
        .unwrap();
    assert_eq!(created, 1);

    // Same call again creates nothing.
    let created = sync
        .create_missing_edges(EdgeKind::WorksAt, &pairs)
        .await
        .unwrap();
    assert_eq!(created, 0);

    let existing = store
        .existing_edges(EdgeKind::WorksAt, &pairs)
        .await
        .unwrap();
    assert_eq!(existing.len(), 1);
}
