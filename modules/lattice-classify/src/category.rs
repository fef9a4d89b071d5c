use std::collections::HashMap;

use regex::Regex;

use lattice_common::OrgType;

/// Static lookup translating free-text category tags into the canonical
/// org-type enum. Three matching tiers: exact normalized match, then
/// pluralization/punctuation-insensitive match, then regex patterns over
/// whitespace/hyphen variants. Built once at startup and shared by
/// reference; all lookups are read-only.
pub struct CategoryMapper {
    exact: HashMap<&'static str, OrgType>,
    patterns: Vec<(Regex, OrgType)>,
}

const EXACT: &[(&str, OrgType)] = &[
    ("defi", OrgType::DefiProtocol),
    ("defi protocol", OrgType::DefiProtocol),
    ("protocol", OrgType::DefiProtocol),
    ("lending", OrgType::DefiProtocol),
    ("dex", OrgType::Exchange),
    ("cex", OrgType::Exchange),
    ("exchange", OrgType::Exchange),
    ("trading", OrgType::Exchange),
    ("dao", OrgType::Dao),
    ("layer 1", OrgType::Layer1),
    ("l1", OrgType::Layer1),
    ("blockchain", OrgType::Layer1),
    ("smart contract platform", OrgType::Layer1),
    ("infrastructure", OrgType::Infrastructure),
    ("node provider", OrgType::Infrastructure),
    ("oracle", OrgType::Infrastructure),
    ("bridge", OrgType::Infrastructure),
    ("wallet", OrgType::Infrastructure),
    ("venture capital", OrgType::VentureFund),
    ("vc", OrgType::VentureFund),
    ("fund", OrgType::VentureFund),
    ("investment", OrgType::VentureFund),
    ("nft", OrgType::NftProject),
    ("nft collection", OrgType::NftProject),
    ("pfp", OrgType::NftProject),
    ("gaming", OrgType::GamingStudio),
    ("game studio", OrgType::GamingStudio),
    ("gamefi", OrgType::GamingStudio),
    ("media", OrgType::MediaOutlet),
    ("news", OrgType::MediaOutlet),
    ("newsletter", OrgType::MediaOutlet),
    ("podcast", OrgType::MediaOutlet),
    ("research", OrgType::MediaOutlet),
    ("dev tooling", OrgType::DevTooling),
    ("developer tools", OrgType::DevTooling),
    ("tooling", OrgType::DevTooling),
    ("sdk", OrgType::DevTooling),
    ("community", OrgType::Community),
    ("collective", OrgType::Community),
    ("education", OrgType::Community),
    ("bank", OrgType::TraditionalCompany),
    ("fintech", OrgType::TraditionalCompany),
    ("enterprise", OrgType::TraditionalCompany),
];

const PATTERNS: &[(&str, OrgType)] = &[
    (r"(?i)de\s*-?\s*fi", OrgType::DefiProtocol),
    (r"(?i)\blayer\s*-?\s*1\b|\bl\s*-?\s*1\b", OrgType::Layer1),
    (r"(?i)venture|capital", OrgType::VentureFund),
    (r"(?i)non\s*-?\s*fungible", OrgType::NftProject),
    (r"(?i)dev(eloper)?\s*-?\s*tool", OrgType::DevTooling),
    (r"(?i)infra", OrgType::Infrastructure),
    (r"(?i)game|gaming|metaverse", OrgType::GamingStudio),
    (r"(?i)exchange|market\s*-?\s*place", OrgType::Exchange),
];

impl CategoryMapper {
    pub fn new() -> Self {
        let exact = EXACT.iter().copied().collect();
        let patterns = PATTERNS
            .iter()
            .map(|(p, t)| (Regex::new(p).expect("static pattern must compile"), *t))
            .collect();
        Self { exact, patterns }
    }

    /// Map free-text category tags to a canonical org type. Falls back to
    /// `Other` when nothing matches.
    pub fn map(&self, raw_categories: &[String]) -> OrgType {
        // Tier 1: exact normalized match.
        for raw in raw_categories {
            if let Some(t) = self.exact.get(normalize(raw).as_str()) {
                return *t;
            }
        }
        // Tier 2: strip punctuation and a trailing plural before retrying.
        for raw in raw_categories {
            if let Some(t) = self.exact.get(depluralize(&normalize(raw)).as_str()) {
                return *t;
            }
        }
        // Tier 3: pattern match.
        for raw in raw_categories {
            for (re, t) in &self.patterns {
                if re.is_match(raw) {
                    return *t;
                }
            }
        }
        OrgType::Other
    }
}

impl Default for CategoryMapper {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace(['-', '_', '/'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn depluralize(s: &str) -> String {
    let stripped: String = s.chars().filter(|c| c.is_alphanumeric() || *c == ' ').collect();
    let stripped = stripped.trim();
    stripped.strip_suffix('s').unwrap_or(stripped).to_string()
}
