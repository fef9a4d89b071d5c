use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Classification results are considered fresh for this many days.
pub const CLASSIFICATION_FRESH_DAYS: i64 = 30;

/// Profile records older than this are re-fetched and re-written on sync.
pub const PROFILE_STALE_HOURS: i64 = 1080;

/// Case-insensitive key form of a handle. This is the true primary key of
/// the graph: at most one Entity node exists per handle key.
pub fn handle_key(handle: &str) -> String {
    handle.trim_start_matches('@').to_lowercase()
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrgType {
    DefiProtocol,
    Layer1,
    Infrastructure,
    Dao,
    VentureFund,
    Exchange,
    NftProject,
    GamingStudio,
    DevTooling,
    MediaOutlet,
    Community,
    TraditionalCompany,
    Other,
}

impl std::fmt::Display for OrgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrgType::DefiProtocol => "defi_protocol",
            OrgType::Layer1 => "layer1",
            OrgType::Infrastructure => "infrastructure",
            OrgType::Dao => "dao",
            OrgType::VentureFund => "venture_fund",
            OrgType::Exchange => "exchange",
            OrgType::NftProject => "nft_project",
            OrgType::GamingStudio => "gaming_studio",
            OrgType::DevTooling => "dev_tooling",
            OrgType::MediaOutlet => "media_outlet",
            OrgType::Community => "community",
            OrgType::TraditionalCompany => "traditional_company",
            OrgType::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl OrgType {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "defi_protocol" => OrgType::DefiProtocol,
            "layer1" => OrgType::Layer1,
            "infrastructure" => OrgType::Infrastructure,
            "dao" => OrgType::Dao,
            "venture_fund" => OrgType::VentureFund,
            "exchange" => OrgType::Exchange,
            "nft_project" => OrgType::NftProject,
            "gaming_studio" => OrgType::GamingStudio,
            "dev_tooling" => OrgType::DevTooling,
            "media_outlet" => OrgType::MediaOutlet,
            "community" => OrgType::Community,
            "traditional_company" => OrgType::TraditionalCompany,
            "other" => OrgType::Other,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Web3Focus {
    Native,
    Adjacent,
    Traditional,
}

impl std::fmt::Display for Web3Focus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Web3Focus::Native => "native",
            Web3Focus::Adjacent => "adjacent",
            Web3Focus::Traditional => "traditional",
        };
        write!(f, "{s}")
    }
}

impl Web3Focus {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "native" => Web3Focus::Native,
            "adjacent" => Web3Focus::Adjacent,
            "traditional" => Web3Focus::Traditional,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Engineering,
    Product,
    Design,
    Marketing,
    BusinessDevelopment,
    Operations,
    Founder,
    Investor,
    Research,
    Community,
    Other,
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Department::Engineering => "engineering",
            Department::Product => "product",
            Department::Design => "design",
            Department::Marketing => "marketing",
            Department::BusinessDevelopment => "business_development",
            Department::Operations => "operations",
            Department::Founder => "founder",
            Department::Investor => "investor",
            Department::Research => "research",
            Department::Community => "community",
            Department::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl Department {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "engineering" => Department::Engineering,
            "product" => Department::Product,
            "design" => Department::Design,
            "marketing" => Department::Marketing,
            "business_development" => Department::BusinessDevelopment,
            "operations" => Department::Operations,
            "founder" => Department::Founder,
            "investor" => Department::Investor,
            "research" => Department::Research,
            "community" => Department::Community,
            "other" => Department::Other,
            _ => return None,
        })
    }
}

// --- Classification payload ---

/// Classification of an entity with category-dependent payload. Individual
/// and organization fields are mutually exclusive by construction; the
/// store clears the other branch's properties on every reclassifying write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "classification", rename_all = "snake_case")]
pub enum Vibe {
    Individual {
        /// Org handles the person currently works at (leading @ stripped).
        current_orgs: Vec<String>,
        past_orgs: Vec<String>,
        /// Non-employment associations: education, investments, communities.
        affiliations: Vec<String>,
        department: Department,
    },
    Organization {
        /// None when a prior writer never filled the field; an organization
        /// classification missing any sub-field is always treated as stale.
        org_type: Option<OrgType>,
        org_subtypes: Vec<String>,
        web3_focus: Option<Web3Focus>,
    },
    Spam,
    Unclassified,
}

impl Vibe {
    pub fn label(&self) -> &'static str {
        match self {
            Vibe::Individual { .. } => "individual",
            Vibe::Organization { .. } => "organization",
            Vibe::Spam => "spam",
            Vibe::Unclassified => "unclassified",
        }
    }

    /// True when an organization vibe carries all three sub-fields.
    pub fn is_complete_org(&self) -> bool {
        match self {
            Vibe::Organization {
                org_type,
                org_subtypes,
                web3_focus,
            } => org_type.is_some() && !org_subtypes.is_empty() && web3_focus.is_some(),
            _ => false,
        }
    }
}

// --- Entity ---

/// A person, organization, or spam node in the relationship graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// External-platform identifier. Volatile: a later ingestion may present
    /// a different id for the same handle, and resolution migrates it.
    pub entity_id: String,
    /// Human-readable unique name, display casing preserved.
    pub handle: String,
    pub display_name: String,
    pub bio: String,
    pub location: Option<String>,
    pub followers: i64,
    pub following: i64,
    pub verified: bool,
    pub vibe: Vibe,
    pub classified_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    /// Set on minimal org nodes created from bio mentions, pending
    /// enrichment with real profile data.
    pub implied: bool,
}

impl Entity {
    pub fn handle_key(&self) -> String {
        handle_key(&self.handle)
    }

    /// Minimal node for an organization mentioned in someone's bio with no
    /// profile data of its own.
    pub fn implied_org(handle: &str) -> Self {
        let key = handle_key(handle);
        Self {
            entity_id: format!("implied:{key}"),
            handle: key.clone(),
            display_name: handle.trim_start_matches('@').to_string(),
            bio: String::new(),
            location: None,
            followers: 0,
            following: 0,
            verified: false,
            vibe: Vibe::Organization {
                org_type: None,
                org_subtypes: Vec::new(),
                web3_focus: None,
            },
            classified_at: None,
            last_updated: Utc::now(),
            implied: true,
        }
    }

    /// Whether the stored classification can be served from cache: present,
    /// not older than 30 days, and complete when it is an organization.
    pub fn classification_fresh(&self, now: DateTime<Utc>) -> bool {
        let classified_at = match self.classified_at {
            Some(t) => t,
            None => return false,
        };
        if now - classified_at > Duration::days(CLASSIFICATION_FRESH_DAYS) {
            return false;
        }
        match &self.vibe {
            Vibe::Unclassified => false,
            Vibe::Organization { .. } => self.vibe.is_complete_org(),
            _ => true,
        }
    }

    /// Whether the profile record itself needs re-fetching.
    pub fn profile_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_updated > Duration::hours(PROFILE_STALE_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org_entity(
        org_type: Option<OrgType>,
        org_subtypes: Vec<String>,
        web3_focus: Option<Web3Focus>,
        classified_at: Option<DateTime<Utc>>,
    ) -> Entity {
        Entity {
            entity_id: "1".into(),
            handle: "Acme".into(),
            display_name: "Acme".into(),
            bio: String::new(),
            location: None,
            followers: 100,
            following: 100,
            verified: false,
            vibe: Vibe::Organization {
                org_type,
                org_subtypes,
                web3_focus,
            },
            classified_at,
            last_updated: Utc::now(),
            implied: false,
        }
    }

    #[test]
    fn handle_key_lowercases_and_strips_at() {
        assert_eq!(handle_key("@Acme_Labs"), "acme_labs");
        assert_eq!(handle_key("BOB"), "bob");
    }

    #[test]
    fn fresh_complete_org_is_cache_hit() {
        let e = org_entity(
            Some(OrgType::DefiProtocol),
            vec!["lending".into()],
            Some(Web3Focus::Native),
            Some(Utc::now() - Duration::days(5)),
        );
        assert!(e.classification_fresh(Utc::now()));
    }

    #[test]
    fn org_older_than_thirty_days_is_stale() {
        let e = org_entity(
            Some(OrgType::DefiProtocol),
            vec!["lending".into()],
            Some(Web3Focus::Native),
            Some(Utc::now() - Duration::days(31)),
        );
        assert!(!e.classification_fresh(Utc::now()));
    }

    #[test]
    fn org_missing_any_subfield_is_stale_regardless_of_age() {
        let now = Utc::now();
        let recent = Some(now - Duration::days(1));
        let missing_type = org_entity(
            None,
            vec!["lending".into()],
            Some(Web3Focus::Native),
            recent,
        );
        let missing_subtypes = org_entity(
            Some(OrgType::Dao),
            vec![],
            Some(Web3Focus::Native),
            recent,
        );
        let missing_focus = org_entity(Some(OrgType::Dao), vec!["grants".into()], None, recent);
        assert!(!missing_type.classification_fresh(now));
        assert!(!missing_subtypes.classification_fresh(now));
        assert!(!missing_focus.classification_fresh(now));
    }

    #[test]
    fn unclassified_is_never_fresh() {
        let mut e = org_entity(None, vec![], None, Some(Utc::now()));
        e.vibe = Vibe::Unclassified;
        assert!(!e.classification_fresh(Utc::now()));
    }

    #[test]
    fn individual_freshness_needs_only_timestamp() {
        let mut e = org_entity(None, vec![], None, Some(Utc::now() - Duration::days(29)));
        e.vibe = Vibe::Individual {
            current_orgs: vec![],
            past_orgs: vec![],
            affiliations: vec![],
            department: Department::Other,
        };
        assert!(e.classification_fresh(Utc::now()));
        e.classified_at = None;
        assert!(!e.classification_fresh(Utc::now()));
    }

    #[test]
    fn profile_staleness_threshold() {
        let mut e = org_entity(None, vec![], None, None);
        e.last_updated = Utc::now() - Duration::hours(PROFILE_STALE_HOURS + 1);
        assert!(e.profile_stale(Utc::now()));
        e.last_updated = Utc::now() - Duration::hours(PROFILE_STALE_HOURS - 1);
        assert!(!e.profile_stale(Utc::now()));
    }
}
