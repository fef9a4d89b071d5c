use serde::Deserialize;

/// One profile as returned by the directory API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// External-platform identifier. Not stable across data sources.
    pub id: String,
    pub handle: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub followers_count: i64,
    #[serde(default)]
    pub following_count: i64,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FollowPage {
    #[serde(default)]
    pub handles: Vec<String>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}
