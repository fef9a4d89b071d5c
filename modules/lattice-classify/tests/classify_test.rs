//! Integration tests for the classification pipeline and relationship
//! linker against a real Neo4j instance started via testcontainers.
//! Requires Docker. No LLM endpoint is needed: the client points at an
//! unroutable address, exercising the cancellation and fallback paths.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use lattice_classify::{linker, CategoryMapper, Classifier, ProfileBrief};
use lattice_common::{Department, Entity, Vibe};
use lattice_graph::testutil::neo4j_container;
use lattice_graph::{BatchSynchronizer, EdgeKind, EntityStore, IdentityResolver};
use llm_client::LlmClient;

fn person(handle: &str) -> Entity {
    Entity {
        entity_id: "1".to_string(),
        handle: handle.to_string(),
        display_name: handle.to_string(),
        bio: String::new(),
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

fn individual_vibe(current: &[&str], past: &[&str]) -> Vibe {
    Vibe::Individual {
        current_orgs: current.iter().map(|s| s.to_string()).collect(),
        past_orgs: past.iter().map(|s| s.to_string()).collect(),
        affiliations: vec![],
        department: Department::Engineering,
    }
}

fn brief(handle: &str, bio: &str) -> ProfileBrief {
    ProfileBrief {
        handle: handle.to_string(),
        bio: bio.to_string(),
        followers: 100,
        following: 100,
    }
}

fn unreachable_classifier(
    resolver: IdentityResolver,
    sync: BatchSynchronizer,
) -> Classifier {
    let llm = LlmClient::new("test-key", "test-model").with_base_url("http://127.0.0.1:9");
    Classifier::new(llm, resolver, sync, CategoryMapper::new())
}

#[tokio::test]
async fn linking_twice_creates_nothing_new() {
    let (_container, client) = neo4j_container().await;
    let store = EntityStore::new(client);
    let resolver = IdentityResolver::new(store.clone());
    let sync = BatchSynchronizer::new(store.clone(), resolver.clone());

    resolver.resolve(&person("alice")).await.unwrap();
    let outcomes = vec![(
        "alice".to_string(),
        individual_vibe(&["@acme"], &["@oldco"]),
    )];

    let first = linker::extract_and_link(&resolver, &sync, &outcomes).await;
    assert_eq!(first.orgs_created, 2);
    assert_eq!(first.edges_created, 2);
    assert_eq!(first.dropped, 0);

    // Mentioned orgs get minimal implied nodes pending enrichment.
    let acme = store.find_by_handle("acme").await.unwrap().unwrap();
    assert!(acme.implied);
    assert!(matches!(acme.vibe, Vibe::Organization { .. }));

    // Re-running the same batch adds nothing.
    let second = linker::extract_and_link(&resolver, &sync, &outcomes).await;
    assert_eq!(second.orgs_created, 0);
    assert_eq!(second.edges_created, 0);

    let works = store
        .existing_edges(
            EdgeKind::WorksAt,
            &[("alice".to_string(), "acme".to_string())],
        )
        .await
        .unwrap();
    assert_eq!(works.len(), 1);
    let worked = store
        .existing_edges(
            EdgeKind::WorkedAt,
            &[("alice".to_string(), "oldco".to_string())],
        )
        .await
        .unwrap();
    assert_eq!(worked.len(), 1);
}

#[tokio::test]
async fn cancelled_classification_starts_no_llm_batches() {
    let (_container, client) = neo4j_container().await;
    let store = EntityStore::new(client);
    let resolver = IdentityResolver::new(store.clone());
    let sync = BatchSynchronizer::new(store.clone(), resolver.clone());
    let classifier = unreachable_classifier(resolver, sync);

    let briefs = vec![
        brief("alice", "building things"),
        brief("bob", "more things"),
    ];
    let cancel = CancellationToken::new();
    cancel.cancel();

    // The endpoint is unroutable, so any attempted batch would burn the
    // full retry budget; a cancelled token must not start one.
    let stats = classifier
        .classify_and_persist(&briefs, &cancel)
        .await
        .unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.classified, 0);
    assert_eq!(stats.fallback, 0);

    // Nothing was written.
    assert!(store.find_by_handle("alice").await.unwrap().is_none());
}

#[tokio::test]
async fn exhausted_retries_fall_back_without_double_counting() {
    let (_container, client) = neo4j_container().await;
    let store = EntityStore::new(client);
    let resolver = IdentityResolver::new(store.clone());
    let sync = BatchSynchronizer::new(store.clone(), resolver.clone());
    let classifier = unreachable_classifier(resolver, sync);

    let briefs = vec![
        brief("acme", "The leading DeFi protocol. Join us!"),
        brief("carol", "Engineer building things"),
    ];
    let cancel = CancellationToken::new();

    let stats = classifier
        .classify_and_persist(&briefs, &cancel)
        .await
        .unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.fallback, 2);
    assert_eq!(stats.classified, 0, "fallback results must not also count as classified");
    assert_eq!(stats.errors, 0);

    // Keyword-evidence classifications are persisted like any other.
    let acme = store.find_by_handle("acme").await.unwrap().unwrap();
    assert!(matches!(acme.vibe, Vibe::Organization { .. }));
    let carol = store.find_by_handle("carol").await.unwrap().unwrap();
    assert!(matches!(carol.vibe, Vibe::Individual { .. }));
}
