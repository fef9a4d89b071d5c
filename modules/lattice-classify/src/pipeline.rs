use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lattice_common::{handle_key, Entity, LatticeError, Vibe};
use lattice_graph::{BatchSynchronizer, IdentityResolver};
use llm_client::{Completion, LlmClient};

use crate::category::CategoryMapper;
use crate::heuristics::{self, fallback_profile_vibe};
use crate::linker;
use crate::repair::parse_with_repair;
use crate::schema::ClassificationResponse;

/// One logical LLM call covers this many profiles.
const LLM_BATCH_SIZE: usize = 10;
/// One request plus two retries, fixed backoff between attempts.
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

const SYSTEM_PROMPT: &str = r#"You classify social profiles from a web3 people directory. For each profile you are given a handle and a bio. Classify each as one of:

- **individual**: a person. Extract:
  - current_organizations: org handles they currently work at (keep the leading @)
  - past_organizations: org handles they used to work at (bios often mark these "ex-@handle", "prev @handle", "formerly @handle")
  - affiliations: non-employment associations (education, investments, communities, e.g. "@university alum", "angel @fund")
  - department: one of engineering, product, design, marketing, business_development, operations, founder, investor, research, community, other
- **organization**: a company, protocol, DAO, fund, or other collective. Extract:
  - org_type: one of defi_protocol, layer1, infrastructure, dao, venture_fund, exchange, nft_project, gaming_studio, dev_tooling, media_outlet, community, traditional_company, other
  - org_subtypes: one or more short free-form descriptors, e.g. "lending", "derivatives", "modular"
  - web3_focus: "native" (crypto-first), "adjacent" (serves the space), or "traditional" (legacy company)
- **spam**: throwaway, bot, or promotional junk accounts.

Return one result per input profile, in the same order, echoing each profile's handle exactly. Respond with ONLY the JSON object, no prose."#;

/// Input to the classifier: just enough of a profile to build the prompt
/// and run the spam short-circuit.
#[derive(Debug, Clone)]
pub struct ProfileBrief {
    pub handle: String,
    pub bio: String,
    pub followers: i64,
    pub following: i64,
}

impl ProfileBrief {
    pub fn from_entity(e: &Entity) -> Self {
        Self {
            handle: e.handle.clone(),
            bio: e.bio.clone(),
            followers: e.followers,
            following: e.following,
        }
    }
}

#[derive(Debug, Default)]
pub struct ClassifyStats {
    pub processed: usize,
    pub cached: usize,
    pub spam: usize,
    /// Profiles classified from an LLM response (including repaired ones).
    pub classified: usize,
    /// Profiles classified by keyword heuristics after all retries failed.
    pub fallback: usize,
    /// Profiles left unclassified because the run was cancelled.
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for ClassifyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Classify: {} processed, {} cached, {} spam, {} classified, {} fallback, {} skipped, {} errors",
            self.processed,
            self.cached,
            self.spam,
            self.classified,
            self.fallback,
            self.skipped,
            self.errors,
        )
    }
}

/// The classification pipeline: cache check, spam short-circuit, batched
/// LLM calls with bounded retry, the parse-repair ladder, normalization,
/// persistence through the identity resolver, and relationship linking.
/// The pipeline always produces some classification for every profile it
/// processes; it degrades to heuristics rather than failing.
pub struct Classifier {
    llm: LlmClient,
    resolver: IdentityResolver,
    sync: BatchSynchronizer,
    mapper: CategoryMapper,
}

impl Classifier {
    pub fn new(
        llm: LlmClient,
        resolver: IdentityResolver,
        sync: BatchSynchronizer,
        mapper: CategoryMapper,
    ) -> Self {
        Self {
            llm,
            resolver,
            sync,
            mapper,
        }
    }

    /// Classify a batch of profiles and persist the results. Per-item
    /// failures are counted and logged; only an unreachable store aborts
    /// the whole operation. On cancellation the in-flight LLM batch
    /// completes and the remaining profiles are counted as skipped.
    pub async fn classify_and_persist(
        &self,
        briefs: &[ProfileBrief],
        cancel: &CancellationToken,
    ) -> Result<ClassifyStats> {
        let mut stats = ClassifyStats::default();
        let now = Utc::now();

        // Cache check and spam short-circuit before any LLM spend.
        let mut to_classify: Vec<(&ProfileBrief, Option<Entity>)> = Vec::new();
        let mut outcomes: Vec<(String, Vibe)> = Vec::new();

        for brief in briefs {
            stats.processed += 1;

            let existing = self
                .resolver
                .store()
                .find_by_handle(&brief.handle)
                .await
                .map_err(|e| LatticeError::Database(e.to_string()))?;

            if let Some(e) = &existing {
                if e.classification_fresh(now) {
                    stats.cached += 1;
                    continue;
                }
            }

            if heuristics::is_spam_signal(brief.followers, brief.following) {
                stats.spam += 1;
                self.persist(brief, existing, Vibe::Spam, &mut stats).await;
                continue;
            }

            to_classify.push((brief, existing));
        }

        let mut remaining = to_classify.len();
        for batch in to_classify.chunks(LLM_BATCH_SIZE) {
            if cancel.is_cancelled() {
                warn!(remaining, "Classification cancelled; skipping remaining batches");
                stats.skipped += remaining;
                break;
            }
            remaining -= batch.len();

            let batch_briefs: Vec<ProfileBrief> =
                batch.iter().map(|(b, _)| (*b).clone()).collect();

            let (response, llm_derived) = match self.request_batch(&batch_briefs).await {
                Some(completion) => (parse_with_repair(&completion.text, &batch_briefs), true),
                None => {
                    stats.fallback += batch.len();
                    let response = ClassificationResponse {
                        results: batch_briefs
                            .iter()
                            .map(|b| fallback_profile_vibe(&b.handle, &b.bio))
                            .collect(),
                    };
                    (response, false)
                }
            };

            let mut by_key: HashMap<String, _> = response
                .results
                .into_iter()
                .map(|pv| (handle_key(&pv.handle), pv))
                .collect();

            for &(brief, ref existing) in batch {
                let pv = by_key
                    .remove(&handle_key(&brief.handle))
                    .unwrap_or_else(|| fallback_profile_vibe(&brief.handle, &brief.bio));

                let vibe = match pv.normalize(&self.mapper) {
                    Some(v) => v,
                    // The model invented a classification label; fall back
                    // to bio keyword evidence.
                    None => fallback_profile_vibe(&brief.handle, &brief.bio)
                        .normalize(&self.mapper)
                        .unwrap_or(Vibe::Unclassified),
                };

                if llm_derived {
                    stats.classified += 1;
                }
                if matches!(vibe, Vibe::Individual { .. }) {
                    outcomes.push((brief.handle.clone(), vibe.clone()));
                }
                self.persist(brief, existing.clone(), vibe, &mut stats)
                    .await;
            }
        }

        let link_stats = linker::extract_and_link(&self.resolver, &self.sync, &outcomes).await;
        info!(%stats, %link_stats, "Classification pass complete");
        Ok(stats)
    }

    /// Write one classification through the identity resolver, carrying
    /// forward stored profile data when the entity already exists.
    async fn persist(
        &self,
        brief: &ProfileBrief,
        existing: Option<Entity>,
        vibe: Vibe,
        stats: &mut ClassifyStats,
    ) {
        let now = Utc::now();
        let candidate = match existing {
            Some(mut e) => {
                e.vibe = vibe;
                e.classified_at = Some(now);
                e.last_updated = now;
                e
            }
            None => Entity {
                entity_id: String::new(),
                handle: brief.handle.clone(),
                display_name: brief.handle.clone(),
                bio: brief.bio.clone(),
                location: None,
                followers: brief.followers,
                following: brief.following,
                verified: false,
                vibe,
                classified_at: Some(now),
                last_updated: now,
                implied: false,
            },
        };

        if let Err(e) = self.resolver.resolve(&candidate).await {
            warn!(
                handle = brief.handle.as_str(),
                error = %e,
                "Failed to persist classification"
            );
            stats.errors += 1;
        }
    }

    /// One logical LLM call for a batch, retried on transport failures and
    /// empty responses. Returns None when every attempt failed; the caller
    /// falls back to heuristics.
    async fn request_batch(&self, batch: &[ProfileBrief]) -> Option<Completion> {
        let schema = serde_json::to_string_pretty(&schemars::schema_for!(ClassificationResponse))
            .unwrap_or_default();
        let system = format!("{SYSTEM_PROMPT}\n\nOutput JSON schema:\n{schema}");
        let user = build_user_prompt(batch);

        for attempt in 1..=MAX_ATTEMPTS {
            match self.llm.complete(&system, &user).await {
                Ok(completion) if !completion.text.trim().is_empty() => {
                    if completion.truncated() {
                        warn!("LLM response hit the token ceiling; repair ladder will close it");
                    }
                    return Some(completion);
                }
                Ok(_) => warn!(attempt, "Empty LLM response"),
                Err(e) => warn!(attempt, error = %e, "LLM request failed"),
            }
            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
        None
    }
}

fn build_user_prompt(batch: &[ProfileBrief]) -> String {
    let mut prompt = String::from("Classify these profiles:\n\n");
    for brief in batch {
        prompt.push_str(&format!(
            "--- @{} ---\n{}\n\n",
            brief.handle.trim_start_matches('@'),
            brief.bio,
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ProfileVibe;
    use lattice_common::Department;

    #[test]
    fn user_prompt_lists_each_profile_once() {
        let batch = vec![
            ProfileBrief {
                handle: "@acme_labs".into(),
                bio: "building things".into(),
                followers: 10,
                following: 10,
            },
            ProfileBrief {
                handle: "bob".into(),
                bio: "".into(),
                followers: 10,
                following: 10,
            },
        ];
        let prompt = build_user_prompt(&batch);
        assert_eq!(prompt.matches("--- @acme_labs ---").count(), 1);
        assert_eq!(prompt.matches("--- @bob ---").count(), 1);
    }

    #[test]
    fn scenario_bio_with_current_and_past_orgs() {
        // The classifier wire result for a bio like
        // "ex-@oldco building @acme_labs protocol".
        let pv = ProfileVibe {
            handle: "acme_labs".into(),
            classification: "individual".into(),
            current_organizations: vec!["@acme_labs".into()],
            past_organizations: vec!["@oldco".into()],
            department: Some("founder".into()),
            ..Default::default()
        };
        let vibe = pv.normalize(&CategoryMapper::new()).unwrap();
        match vibe {
            Vibe::Individual {
                current_orgs,
                past_orgs,
                department,
                ..
            } => {
                assert_eq!(current_orgs, vec!["@acme_labs".to_string()]);
                assert_eq!(past_orgs, vec!["@oldco".to_string()]);
                assert_eq!(department, Department::Founder);
            }
            other => panic!("expected individual, got {other:?}"),
        }
    }
}
