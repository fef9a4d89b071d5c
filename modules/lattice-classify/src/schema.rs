use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use lattice_common::{Department, OrgType, Vibe, Web3Focus};

use crate::category::CategoryMapper;

/// The full classification response we ask the LLM for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClassificationResponse {
    #[serde(default)]
    pub results: Vec<ProfileVibe>,
}

/// What the LLM returns for each profile. Everything is stringly typed at
/// the wire; `normalize` coerces values outside the declared enums to
/// documented defaults instead of rejecting them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProfileVibe {
    pub handle: String,
    /// "individual", "organization", or "spam"
    pub classification: String,
    /// Org handles the person currently works at, e.g. "@acme_labs"
    #[serde(default)]
    pub current_organizations: Vec<String>,
    /// Org handles the person used to work at
    #[serde(default)]
    pub past_organizations: Vec<String>,
    /// Non-employment associations: education, investments, communities
    #[serde(default)]
    pub affiliations: Vec<String>,
    /// Department for individuals, e.g. "engineering", "founder"
    #[serde(default)]
    pub department: Option<String>,
    /// Canonical org type for organizations, e.g. "defi_protocol"
    #[serde(default)]
    pub org_type: Option<String>,
    /// Free-form org sub-attributes, e.g. "lending", "derivatives"
    #[serde(default)]
    pub org_subtypes: Vec<String>,
    /// "native", "adjacent", or "traditional"
    #[serde(default)]
    pub web3_focus: Option<String>,
    /// Free-text category tags when the org type is unclear
    #[serde(default)]
    pub categories: Vec<String>,
}

impl ProfileVibe {
    /// Coerce the wire shape into a typed classification. Unknown
    /// departments become `other`; an org type outside the enum goes
    /// through the category mapper; an unknown web3 focus defaults to
    /// `adjacent`. An unrecognized classification string yields None and
    /// the caller falls back to the bio heuristic.
    pub fn normalize(&self, mapper: &CategoryMapper) -> Option<Vibe> {
        match self.classification.as_str() {
            "individual" => Some(Vibe::Individual {
                current_orgs: self.current_organizations.clone(),
                past_orgs: self.past_organizations.clone(),
                affiliations: self.affiliations.clone(),
                department: self
                    .department
                    .as_deref()
                    .and_then(Department::parse)
                    .unwrap_or(Department::Other),
            }),
            "organization" => {
                let org_type = match self.org_type.as_deref().and_then(OrgType::parse) {
                    Some(t) => t,
                    None => {
                        let mut raw = self.categories.clone();
                        if let Some(t) = &self.org_type {
                            raw.push(t.clone());
                        }
                        mapper.map(&raw)
                    }
                };
                let web3_focus = self
                    .web3_focus
                    .as_deref()
                    .and_then(Web3Focus::parse)
                    .unwrap_or(Web3Focus::Adjacent);
                let mut org_subtypes = self.org_subtypes.clone();
                if org_subtypes.is_empty() {
                    // A populated subtype list is part of a complete org
                    // classification; reuse the raw categories when the
                    // model put its evidence there instead.
                    org_subtypes = self.categories.clone();
                }
                Some(Vibe::Organization {
                    org_type: Some(org_type),
                    org_subtypes,
                    web3_focus: Some(web3_focus),
                })
            }
            "spam" => Some(Vibe::Spam),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn individual_with_unknown_department_defaults_to_other() {
        let pv = ProfileVibe {
            handle: "bob".into(),
            classification: "individual".into(),
            department: Some("wizardry".into()),
            current_organizations: vec!["@acme".into()],
            ..Default::default()
        };
        let vibe = pv.normalize(&CategoryMapper::new()).unwrap();
        match vibe {
            Vibe::Individual {
                department,
                current_orgs,
                ..
            } => {
                assert_eq!(department, Department::Other);
                assert_eq!(current_orgs, vec!["@acme".to_string()]);
            }
            other => panic!("expected individual, got {other:?}"),
        }
    }

    #[test]
    fn organization_with_enum_org_type_passes_through() {
        let pv = ProfileVibe {
            handle: "acme".into(),
            classification: "organization".into(),
            org_type: Some("defi_protocol".into()),
            org_subtypes: vec!["lending".into()],
            web3_focus: Some("native".into()),
            ..Default::default()
        };
        let vibe = pv.normalize(&CategoryMapper::new()).unwrap();
        assert!(vibe.is_complete_org());
        match vibe {
            Vibe::Organization { org_type, .. } => {
                assert_eq!(org_type, Some(OrgType::DefiProtocol))
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn organization_with_free_text_type_goes_through_mapper() {
        let pv = ProfileVibe {
            handle: "acme".into(),
            classification: "organization".into(),
            org_type: Some("decentralized exchange".into()),
            categories: vec!["DEX".into()],
            web3_focus: Some("galactic".into()),
            ..Default::default()
        };
        let vibe = pv.normalize(&CategoryMapper::new()).unwrap();
        match vibe {
            Vibe::Organization {
                org_type,
                web3_focus,
                org_subtypes,
            } => {
                assert_eq!(org_type, Some(OrgType::Exchange));
                // Unknown focus coerced to the documented default.
                assert_eq!(web3_focus, Some(Web3Focus::Adjacent));
                assert_eq!(org_subtypes, vec!["DEX".to_string()]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn unknown_classification_yields_none() {
        let pv = ProfileVibe {
            handle: "x".into(),
            classification: "robot".into(),
            ..Default::default()
        };
        assert!(pv.normalize(&CategoryMapper::new()).is_none());
    }

    #[test]
    fn spam_normalizes_to_spam() {
        let pv = ProfileVibe {
            handle: "x".into(),
            classification: "spam".into(),
            ..Default::default()
        };
        assert_eq!(pv.normalize(&CategoryMapper::new()), Some(Vibe::Spam));
    }
}
