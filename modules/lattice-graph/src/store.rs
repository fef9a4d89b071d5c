use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use neo4rs::{query, Query};

use lattice_common::{Department, Entity, OrgType, Vibe, Web3Focus};

use crate::GraphClient;

/// Relationship types between entity nodes. All edge writes go through
/// MERGE, so edges behave as idempotent sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Follows,
    WorksAt,
    WorkedAt,
    AffiliatedWith,
}

impl EdgeKind {
    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::Follows => "FOLLOWS",
            EdgeKind::WorksAt => "WORKS_AT",
            EdgeKind::WorkedAt => "WORKED_AT",
            EdgeKind::AffiliatedWith => "AFFILIATED_WITH",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Primitive read/write operations against the entity graph. Nodes are keyed
/// by `handle_key` (lowercased handle); `entity_id` carries a secondary
/// index but is never the identity of a node.
#[derive(Clone)]
pub struct EntityStore {
    client: GraphClient,
}

impl EntityStore {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    // --- Reads ---

    /// Case-insensitive lookup by handle.
    pub async fn find_by_handle(&self, handle: &str) -> Result<Option<Entity>, neo4rs::Error> {
        let q = query("MATCH (e:Entity {handle_key: $key}) RETURN e LIMIT 1")
            .param("key", lattice_common::handle_key(handle));
        self.fetch_one(q).await
    }

    /// Lookup by external platform id.
    pub async fn find_by_entity_id(&self, entity_id: &str) -> Result<Option<Entity>, neo4rs::Error> {
        let q = query("MATCH (e:Entity {entity_id: $id}) RETURN e LIMIT 1").param("id", entity_id);
        self.fetch_one(q).await
    }

    async fn fetch_one(&self, q: Query) -> Result<Option<Entity>, neo4rs::Error> {
        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            if let Ok(node) = row.get::<neo4rs::Node>("e") {
                return Ok(entity_from_node(&node));
            }
        }
        Ok(None)
    }

    /// Bulk existence lookup: which of these handle keys already have nodes,
    /// and when were they last written.
    pub async fn existing_profiles(
        &self,
        handle_keys: &[String],
    ) -> Result<Vec<(String, DateTime<Utc>)>, neo4rs::Error> {
        let q = query(
            "UNWIND $keys AS key
             MATCH (e:Entity {handle_key: key})
             RETURN key, e.last_updated AS last_updated",
        )
        .param("keys", handle_keys.to_vec());

        let mut stream = self.client.graph.execute(q).await?;
        let mut out = Vec::new();
        while let Some(row) = stream.next().await? {
            let key: String = row.get("key").unwrap_or_default();
            let last_updated: String = row.get("last_updated").unwrap_or_default();
            if key.is_empty() {
                continue;
            }
            let ts = parse_datetime(&last_updated).unwrap_or_else(Utc::now);
            out.push((key, ts));
        }
        Ok(out)
    }

    // --- Single-entity writes ---

    /// Create a fresh node for a candidate no existing node matches.
    pub async fn create_entity(&self, entity: &Entity) -> Result<(), neo4rs::Error> {
        let vibe_sets = vibe_set_clause(&entity.vibe);
        let cypher = format!(
            "CREATE (e:Entity {{
                handle_key: $handle_key,
                handle: $handle,
                entity_id: $entity_id,
                display_name: $display_name,
                bio: $bio,
                location: $location,
                followers: $followers,
                following: $following,
                verified: $verified,
                implied: $implied,
                classification: '{}',
                first_seen: $last_updated,
                last_updated: $last_updated
            }}){}",
            entity.vibe.label(),
            if vibe_sets.is_empty() {
                String::new()
            } else {
                format!(" SET {vibe_sets}")
            },
        );
        let q = base_params(query(&cypher), entity);
        let q = vibe_params(q, entity);
        self.client.graph.run(q).await
    }

    /// Apply the candidate's data to the node currently stored under
    /// `target_key`, adopting the candidate's handle, handle key and
    /// entity id. Fields of the other classification category are cleared
    /// in the same statement whenever the candidate carries a
    /// classification (cleanup-on-reclassify).
    pub async fn update_entity(&self, target_key: &str, entity: &Entity) -> Result<(), neo4rs::Error> {
        let vibe_sets = vibe_set_clause(&entity.vibe);
        let cypher = format!(
            "MATCH (e:Entity {{handle_key: $target_key}})
             SET e.handle_key = $handle_key,
                 e.handle = $handle,
                 e.entity_id = $entity_id,
                 e.display_name = $display_name,
                 e.bio = $bio,
                 e.location = $location,
                 e.followers = $followers,
                 e.following = $following,
                 e.verified = $verified,
                 e.implied = $implied,
                 e.last_updated = $last_updated{}",
            if vibe_sets.is_empty() {
                String::new()
            } else {
                format!(", {vibe_sets}")
            },
        );
        let q = base_params(query(&cypher), entity).param("target_key", target_key);
        let q = vibe_params(q, entity);
        self.client.graph.run(q).await
    }

    /// Strip a stale entity_id claim from any node other than the one under
    /// `keep_key`. Run before an id migration so the id index never yields
    /// two nodes for the same external id.
    pub async fn clear_stale_id_claim(
        &self,
        entity_id: &str,
        keep_key: &str,
    ) -> Result<(), neo4rs::Error> {
        let q = query(
            "MATCH (e:Entity {entity_id: $id})
             WHERE e.handle_key <> $keep
             SET e.entity_id = null",
        )
        .param("id", entity_id)
        .param("keep", keep_key);
        self.client.graph.run(q).await
    }

    // --- Bulk writes ---

    /// Server-side merge of one chunk, mirroring the identity resolution
    /// policy: a rename pass for id-matches whose handle is new, a strip
    /// pass for id claims that drifted onto a different handle, then the
    /// MERGE pass keyed by handle. Returns (created, updated). The merge
    /// preserves any stored classification; classification writes go
    /// through the resolver.
    pub async fn bulk_upsert_chunk(&self, chunk: &[Entity]) -> Result<(usize, usize), neo4rs::Error> {
        let now = format_datetime(&Utc::now());
        let keys: Vec<String> = chunk.iter().map(|e| e.handle_key()).collect();
        let ids: Vec<String> = chunk.iter().map(|e| e.entity_id.clone()).collect();
        let handles: Vec<String> = chunk.iter().map(|e| e.handle.clone()).collect();
        let names: Vec<String> = chunk.iter().map(|e| e.display_name.clone()).collect();
        let bios: Vec<String> = chunk.iter().map(|e| e.bio.clone()).collect();
        let locations: Vec<String> = chunk
            .iter()
            .map(|e| e.location.clone().unwrap_or_default())
            .collect();
        let followers: Vec<i64> = chunk.iter().map(|e| e.followers).collect();
        let following: Vec<i64> = chunk.iter().map(|e| e.following).collect();
        let verified: Vec<bool> = chunk.iter().map(|e| e.verified).collect();

        // Pass 1: upstream renames. An id-match whose incoming handle has no
        // node yet keeps its node and takes the new handle.
        let rename = query(
            "UNWIND range(0, size($keys) - 1) AS x
             MATCH (i:Entity {entity_id: $ids[x]})
             WHERE NOT EXISTS { MATCH (:Entity {handle_key: $keys[x]}) }
             SET i.handle_key = $keys[x], i.handle = $handles[x]",
        )
        .param("keys", keys.clone())
        .param("ids", ids.clone())
        .param("handles", handles.clone());
        self.client.graph.run(rename).await?;

        // Pass 2: id drift. When the id sits on a different node than the
        // handle match, the handle match is canonical and the stale claim
        // is cleared.
        let strip = query(
            "UNWIND range(0, size($keys) - 1) AS x
             MATCH (i:Entity {entity_id: $ids[x]})
             MATCH (h:Entity {handle_key: $keys[x]})
             WHERE i <> h
             SET i.entity_id = null",
        )
        .param("keys", keys.clone())
        .param("ids", ids.clone());
        self.client.graph.run(strip).await?;

        // Pass 3: merge by handle key.
        let merge = query(
            "UNWIND range(0, size($keys) - 1) AS x
             MERGE (e:Entity {handle_key: $keys[x]})
             ON CREATE SET e.first_seen = $now, e.classification = 'unclassified', e.implied = false
             SET e.entity_id = $ids[x],
                 e.handle = $handles[x],
                 e.display_name = $names[x],
                 e.bio = $bios[x],
                 e.location = CASE WHEN $locations[x] = '' THEN null ELSE $locations[x] END,
                 e.followers = $followers[x],
                 e.following = $following[x],
                 e.verified = $verified[x],
                 e.implied = false,
                 e.last_updated = $now
             RETURN count(DISTINCT CASE WHEN e.first_seen = $now THEN e END) AS created,
                    count(DISTINCT e) AS total",
        )
        .param("keys", keys)
        .param("ids", ids)
        .param("handles", handles)
        .param("names", names)
        .param("bios", bios)
        .param("locations", locations)
        .param("followers", followers)
        .param("following", following)
        .param("verified", verified)
        .param("now", now);

        let mut stream = self.client.graph.execute(merge).await?;
        if let Some(row) = stream.next().await? {
            let created: i64 = row.get("created").unwrap_or(0);
            let total: i64 = row.get("total").unwrap_or(0);
            let created = created.max(0) as usize;
            let updated = (total.max(0) as usize).saturating_sub(created);
            return Ok((created, updated));
        }
        Ok((0, 0))
    }

    // --- Edges ---

    /// Handle keys of every entity the given account follows.
    pub async fn follow_targets(&self, src_key: &str) -> Result<Vec<String>, neo4rs::Error> {
        let q = query(
            "MATCH (:Entity {handle_key: $src})-[:FOLLOWS]->(t:Entity)
             RETURN t.handle_key AS key",
        )
        .param("src", src_key);

        let mut stream = self.client.graph.execute(q).await?;
        let mut out = Vec::new();
        while let Some(row) = stream.next().await? {
            let key: String = row.get("key").unwrap_or_default();
            if !key.is_empty() {
                out.push(key);
            }
        }
        Ok(out)
    }

    /// Create edges for the given endpoint-key pairs. MERGE keeps this a
    /// no-op for edges that already exist; endpoints with no node are
    /// silently skipped by the MATCH.
    pub async fn add_edges(
        &self,
        kind: EdgeKind,
        pairs: &[(String, String)],
    ) -> Result<(), neo4rs::Error> {
        if pairs.is_empty() {
            return Ok(());
        }
        let (srcs, dsts) = split_pairs(pairs);
        let cypher = format!(
            "UNWIND range(0, size($srcs) - 1) AS x
             MATCH (a:Entity {{handle_key: $srcs[x]}})
             MATCH (b:Entity {{handle_key: $dsts[x]}})
             MERGE (a)-[:{}]->(b)",
            kind.label(),
        );
        let q = query(&cypher).param("srcs", srcs).param("dsts", dsts);
        self.client.graph.run(q).await
    }

    /// Delete edges for the given endpoint-key pairs.
    pub async fn remove_edges(
        &self,
        kind: EdgeKind,
        pairs: &[(String, String)],
    ) -> Result<(), neo4rs::Error> {
        if pairs.is_empty() {
            return Ok(());
        }
        let (srcs, dsts) = split_pairs(pairs);
        let cypher = format!(
            "UNWIND range(0, size($srcs) - 1) AS x
             MATCH (a:Entity {{handle_key: $srcs[x]}})-[r:{}]->(b:Entity {{handle_key: $dsts[x]}})
             DELETE r",
            kind.label(),
        );
        let q = query(&cypher).param("srcs", srcs).param("dsts", dsts);
        self.client.graph.run(q).await
    }

    /// Which of exactly these candidate pairs already have an edge. A
    /// targeted probe, not a graph scan.
    pub async fn existing_edges(
        &self,
        kind: EdgeKind,
        pairs: &[(String, String)],
    ) -> Result<HashSet<(String, String)>, neo4rs::Error> {
        if pairs.is_empty() {
            return Ok(HashSet::new());
        }
        let (srcs, dsts) = split_pairs(pairs);
        let cypher = format!(
            "UNWIND range(0, size($srcs) - 1) AS x
             MATCH (:Entity {{handle_key: $srcs[x]}})-[:{}]->(:Entity {{handle_key: $dsts[x]}})
             RETURN $srcs[x] AS src, $dsts[x] AS dst",
            kind.label(),
        );
        let q = query(&cypher).param("srcs", srcs).param("dsts", dsts);

        let mut stream = self.client.graph.execute(q).await?;
        let mut out = HashSet::new();
        while let Some(row) = stream.next().await? {
            let src: String = row.get("src").unwrap_or_default();
            let dst: String = row.get("dst").unwrap_or_default();
            if !src.is_empty() && !dst.is_empty() {
                out.insert((src, dst));
            }
        }
        Ok(out)
    }
}

fn split_pairs(pairs: &[(String, String)]) -> (Vec<String>, Vec<String>) {
    let srcs = pairs.iter().map(|(s, _)| s.clone()).collect();
    let dsts = pairs.iter().map(|(_, d)| d.clone()).collect();
    (srcs, dsts)
}

// --- Parameter binding ---

fn base_params(q: Query, entity: &Entity) -> Query {
    q.param("handle_key", entity.handle_key())
        .param("handle", entity.handle.as_str())
        .param("entity_id", entity.entity_id.as_str())
        .param("display_name", entity.display_name.as_str())
        .param("bio", entity.bio.as_str())
        .param("location", entity.location.clone().unwrap_or_default())
        .param("followers", entity.followers)
        .param("following", entity.following)
        .param("verified", entity.verified)
        .param("implied", entity.implied)
        .param("last_updated", format_datetime(&entity.last_updated))
}

/// SET assignments for the classification-dependent fields. Each branch
/// clears the other category's properties (invariant: an organization never
/// carries individual-only fields and vice versa). An unclassified
/// candidate leaves stored classification untouched so profile refreshes
/// never wipe an earlier classification.
fn vibe_set_clause(vibe: &Vibe) -> &'static str {
    match vibe {
        Vibe::Individual { .. } => {
            "e.classification = 'individual',
             e.classified_at = CASE WHEN $classified_at = '' THEN null ELSE $classified_at END,
             e.department = $department,
             e.current_orgs = $current_orgs,
             e.past_orgs = $past_orgs,
             e.affiliations = $affiliations,
             e.org_type = null, e.org_subtypes = null, e.web3_focus = null"
        }
        Vibe::Organization { .. } => {
            "e.classification = 'organization',
             e.classified_at = CASE WHEN $classified_at = '' THEN null ELSE $classified_at END,
             e.org_type = CASE WHEN $org_type = '' THEN null ELSE $org_type END,
             e.org_subtypes = $org_subtypes,
             e.web3_focus = CASE WHEN $web3_focus = '' THEN null ELSE $web3_focus END,
             e.department = null, e.current_orgs = null, e.past_orgs = null, e.affiliations = null"
        }
        Vibe::Spam => {
            "e.classification = 'spam',
             e.classified_at = CASE WHEN $classified_at = '' THEN null ELSE $classified_at END,
             e.department = null, e.current_orgs = null, e.past_orgs = null, e.affiliations = null,
             e.org_type = null, e.org_subtypes = null, e.web3_focus = null"
        }
        Vibe::Unclassified => "",
    }
}

fn vibe_params(q: Query, entity: &Entity) -> Query {
    let classified_at = entity
        .classified_at
        .as_ref()
        .map(format_datetime)
        .unwrap_or_default();
    match &entity.vibe {
        Vibe::Individual {
            current_orgs,
            past_orgs,
            affiliations,
            department,
        } => q
            .param("classified_at", classified_at)
            .param("department", department.to_string())
            .param("current_orgs", json_blob(current_orgs))
            .param("past_orgs", json_blob(past_orgs))
            .param("affiliations", json_blob(affiliations)),
        Vibe::Organization {
            org_type,
            org_subtypes,
            web3_focus,
        } => q
            .param("classified_at", classified_at)
            .param("org_type", org_type.map(|t| t.to_string()).unwrap_or_default())
            .param("org_subtypes", json_blob(org_subtypes))
            .param(
                "web3_focus",
                web3_focus.map(|f| f.to_string()).unwrap_or_default(),
            ),
        Vibe::Spam => q.param("classified_at", classified_at),
        Vibe::Unclassified => q,
    }
}

/// Multi-valued fields are stored as serialized JSON text blobs.
fn json_blob(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

// --- Row parsing ---

/// Build an Entity from a stored node. Returns None only when the node has
/// no handle at all; every other missing or malformed property degrades to
/// a default rather than failing the read.
pub(crate) fn entity_from_node(n: &neo4rs::Node) -> Option<Entity> {
    let handle: String = n.get("handle").ok()?;
    let entity_id: String = n.get("entity_id").unwrap_or_default();
    let display_name: String = n.get("display_name").unwrap_or_default();
    let bio: String = n.get("bio").unwrap_or_default();
    let location: Option<String> = n.get::<String>("location").ok().filter(|s| !s.is_empty());
    let followers: i64 = n.get("followers").unwrap_or(0);
    let following: i64 = n.get("following").unwrap_or(0);
    let verified: bool = n.get("verified").unwrap_or(false);
    let implied: bool = n.get("implied").unwrap_or(false);

    let classification: String = n.get("classification").unwrap_or_default();
    let vibe = match classification.as_str() {
        "individual" => Vibe::Individual {
            current_orgs: blob_list(n, "current_orgs"),
            past_orgs: blob_list(n, "past_orgs"),
            affiliations: blob_list(n, "affiliations"),
            department: n
                .get::<String>("department")
                .ok()
                .and_then(|s| Department::parse(&s))
                .unwrap_or(Department::Other),
        },
        "organization" => Vibe::Organization {
            org_type: n
                .get::<String>("org_type")
                .ok()
                .and_then(|s| OrgType::parse(&s)),
            org_subtypes: blob_list(n, "org_subtypes"),
            web3_focus: n
                .get::<String>("web3_focus")
                .ok()
                .and_then(|s| Web3Focus::parse(&s)),
        },
        "spam" => Vibe::Spam,
        _ => Vibe::Unclassified,
    };

    let classified_at = n
        .get::<String>("classified_at")
        .ok()
        .and_then(|s| parse_datetime(&s));
    let last_updated = n
        .get::<String>("last_updated")
        .ok()
        .and_then(|s| parse_datetime(&s))
        .unwrap_or_else(Utc::now);

    Some(Entity {
        entity_id,
        handle,
        display_name,
        bio,
        location,
        followers,
        following,
        verified,
        vibe,
        classified_at,
        last_updated,
        implied,
    })
}

/// Parse a JSON text blob property into a string list. Malformed stored
/// JSON must not crash reads; it is treated as empty.
fn blob_list(n: &neo4rs::Node, prop: &str) -> Vec<String> {
    n.get::<String>(prop)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_roundtrip() {
        let now = Utc::now();
        let parsed = parse_datetime(&format_datetime(&now)).unwrap();
        assert!((now - parsed).num_milliseconds().abs() < 1);
    }

    #[test]
    fn parse_datetime_rejects_garbage() {
        assert!(parse_datetime("").is_none());
        assert!(parse_datetime("not a date").is_none());
    }

    #[test]
    fn json_blob_encodes_lists() {
        assert_eq!(json_blob(&[]), "[]");
        assert_eq!(
            json_blob(&["a".to_string(), "b".to_string()]),
            r#"["a","b"]"#
        );
    }

    #[test]
    fn edge_kind_labels() {
        assert_eq!(EdgeKind::Follows.label(), "FOLLOWS");
        assert_eq!(EdgeKind::WorksAt.label(), "WORKS_AT");
        assert_eq!(EdgeKind::WorkedAt.label(), "WORKED_AT");
        assert_eq!(EdgeKind::AffiliatedWith.label(), "AFFILIATED_WITH");
    }

    #[test]
    fn unclassified_vibe_has_no_set_clause() {
        assert!(vibe_set_clause(&Vibe::Unclassified).is_empty());
        assert!(vibe_set_clause(&Vibe::Spam).contains("'spam'"));
    }
}
