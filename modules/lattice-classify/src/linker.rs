use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use lattice_common::{handle_key, Entity, Vibe};
use lattice_graph::{BatchSynchronizer, EdgeKind, IdentityResolver};

#[derive(Debug, Default)]
pub struct LinkStats {
    pub orgs_created: usize,
    pub edges_created: usize,
    /// Org mentions whose node could not be resolved; their edges were
    /// skipped, everything else proceeded.
    pub dropped: usize,
}

impl std::fmt::Display for LinkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Link: {} orgs created, {} edges created, {} dropped",
            self.orgs_created, self.edges_created, self.dropped,
        )
    }
}

/// Org mentions gathered from a batch of individual classifications,
/// normalized to handle keys and deduplicated.
#[derive(Debug, Default, PartialEq)]
struct Candidates {
    /// Every distinct org key mentioned anywhere in the batch.
    orgs: BTreeSet<String>,
    /// (person key, org key) pairs per relationship kind.
    works_at: BTreeSet<(String, String)>,
    worked_at: BTreeSet<(String, String)>,
    affiliated: BTreeSet<(String, String)>,
}

fn collect_candidates(outcomes: &[(String, Vibe)]) -> Candidates {
    let mut c = Candidates::default();
    for (handle, vibe) in outcomes {
        let Vibe::Individual {
            current_orgs,
            past_orgs,
            affiliations,
            ..
        } = vibe
        else {
            continue;
        };
        let person = handle_key(handle);
        for (mentions, pairs) in [
            (current_orgs, &mut c.works_at),
            (past_orgs, &mut c.worked_at),
            (affiliations, &mut c.affiliated),
        ] {
            for mention in mentions {
                let org = handle_key(mention);
                if org.is_empty() {
                    continue;
                }
                c.orgs.insert(org.clone());
                pairs.insert((person.clone(), org));
            }
        }
    }
    c
}

/// Translate individual classifications into employment and affiliation
/// edges. Mentioned orgs with no node yet are created as minimal implied
/// nodes through the resolver; edge writes are idempotent, so re-running
/// the same batch adds nothing. A single unresolvable org drops only its
/// own edges.
pub async fn extract_and_link(
    resolver: &IdentityResolver,
    sync: &BatchSynchronizer,
    outcomes: &[(String, Vibe)],
) -> LinkStats {
    let mut stats = LinkStats::default();
    let candidates = collect_candidates(outcomes);
    if candidates.orgs.is_empty() {
        return stats;
    }

    // Resolve every mentioned org to a node before any edge is written.
    let mut resolved: BTreeMap<String, bool> = BTreeMap::new();
    for org in &candidates.orgs {
        let outcome = match resolver.store().find_by_handle(org).await {
            Ok(Some(_)) => Ok(false),
            Ok(None) => resolver
                .resolve(&Entity::implied_org(org))
                .await
                .map(|r| r.created),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(created) => {
                if created {
                    stats.orgs_created += 1;
                }
                resolved.insert(org.clone(), true);
            }
            Err(e) => {
                warn!(org = org.as_str(), error = %e, "Failed to resolve mentioned org; dropping its edges");
                stats.dropped += 1;
            }
        }
    }

    for (kind, pairs) in [
        (EdgeKind::WorksAt, &candidates.works_at),
        (EdgeKind::WorkedAt, &candidates.worked_at),
        (EdgeKind::AffiliatedWith, &candidates.affiliated),
    ] {
        let linkable: Vec<(String, String)> = pairs
            .iter()
            .filter(|(_, org)| resolved.contains_key(org))
            .cloned()
            .collect();
        match sync.create_missing_edges(kind, &linkable).await {
            Ok(n) => stats.edges_created += n,
            Err(e) => warn!(kind = kind.label(), error = %e, "Failed to write relationship edges"),
        }
    }

    info!(
        orgs = candidates.orgs.len(),
        created = stats.orgs_created,
        edges = stats.edges_created,
        "Org mentions linked"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_common::Department;

    fn individual(current: &[&str], past: &[&str], affiliations: &[&str]) -> Vibe {
        Vibe::Individual {
            current_orgs: current.iter().map(|s| s.to_string()).collect(),
            past_orgs: past.iter().map(|s| s.to_string()).collect(),
            affiliations: affiliations.iter().map(|s| s.to_string()).collect(),
            department: Department::Other,
        }
    }

    #[test]
    fn mentions_are_normalized_and_deduplicated() {
        let outcomes = vec![
            ("Alice".to_string(), individual(&["@Acme_Labs"], &[], &[])),
            ("bob".to_string(), individual(&["acme_labs"], &["@OldCo"], &[])),
        ];
        let c = collect_candidates(&outcomes);
        assert_eq!(
            c.orgs,
            BTreeSet::from(["acme_labs".to_string(), "oldco".to_string()])
        );
        assert_eq!(
            c.works_at,
            BTreeSet::from([
                ("alice".to_string(), "acme_labs".to_string()),
                ("bob".to_string(), "acme_labs".to_string()),
            ])
        );
        assert_eq!(
            c.worked_at,
            BTreeSet::from([("bob".to_string(), "oldco".to_string())])
        );
    }

    #[test]
    fn affiliations_stay_separate_from_employment() {
        let outcomes = vec![(
            "carol".to_string(),
            individual(&["@acme"], &[], &["@stanford", "@acme"]),
        )];
        let c = collect_candidates(&outcomes);
        assert_eq!(
            c.works_at,
            BTreeSet::from([("carol".to_string(), "acme".to_string())])
        );
        assert_eq!(
            c.affiliated,
            BTreeSet::from([
                ("carol".to_string(), "acme".to_string()),
                ("carol".to_string(), "stanford".to_string()),
            ])
        );
    }

    #[test]
    fn empty_and_bare_at_mentions_are_skipped() {
        let outcomes = vec![("dave".to_string(), individual(&["@", ""], &[], &[]))];
        let c = collect_candidates(&outcomes);
        assert!(c.orgs.is_empty());
        assert!(c.works_at.is_empty());
    }

    #[test]
    fn non_individual_outcomes_contribute_nothing() {
        let outcomes = vec![
            ("spammy".to_string(), Vibe::Spam),
            (
                "acme".to_string(),
                Vibe::Organization {
                    org_type: None,
                    org_subtypes: vec![],
                    web3_focus: None,
                },
            ),
        ];
        assert_eq!(collect_candidates(&outcomes), Candidates::default());
    }
}
