use crate::schema::ProfileVibe;

/// Accounts with both counts below this are classified spam without
/// spending an LLM call.
pub const SPAM_FOLLOW_THRESHOLD: i64 = 5;

pub fn is_spam_signal(followers: i64, following: i64) -> bool {
    followers < SPAM_FOLLOW_THRESHOLD && following < SPAM_FOLLOW_THRESHOLD
}

const ORG_MARKERS: &[&str] = &[
    "protocol",
    "dao",
    "labs",
    "foundation",
    "official",
    "we're",
    "we are",
    "our mission",
    "our team",
    "platform",
    "network",
    "exchange",
    "studio",
    "ecosystem",
    "join us",
    "the home of",
];

const ROLE_MARKERS: &[&str] = &[
    "engineer",
    "founder",
    "co-founder",
    "cofounder",
    "dev ",
    "developer",
    "building",
    "working on",
    "ex-",
    "prev ",
    "formerly",
    "investor",
    "researcher",
    "designer",
    "head of",
    "lead ",
    "phd",
    "he/him",
    "she/her",
    "they/them",
];

/// Keyword-evidence classification used both as the last rung of the parse
/// ladder and when all LLM retries are exhausted. Organization-indicating
/// words win over role words; the default is an individual with an unknown
/// department. Always produces a result.
pub fn fallback_profile_vibe(handle: &str, bio: &str) -> ProfileVibe {
    let lower = bio.to_lowercase();
    let org_score = ORG_MARKERS.iter().filter(|m| lower.contains(*m)).count();
    let role_score = ROLE_MARKERS.iter().filter(|m| lower.contains(*m)).count();

    if org_score > role_score {
        ProfileVibe {
            handle: handle.to_string(),
            classification: "organization".to_string(),
            org_type: Some("other".to_string()),
            ..Default::default()
        }
    } else {
        ProfileVibe {
            handle: handle.to_string(),
            classification: "individual".to_string(),
            department: Some("other".to_string()),
            ..Default::default()
        }
    }
}
