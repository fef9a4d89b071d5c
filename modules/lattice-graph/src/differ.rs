use std::collections::HashSet;

/// Minimal edge changes between the graph's current edge set and a freshly
/// fetched one. A profile with 10,000 existing follow edges and one new
/// follower results in exactly one edge write.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EdgeDiff {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl EdgeDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Pure set difference over edge target keys: `to_add = fresh - current`,
/// `to_remove = current - fresh`. Callers apply adds before removes so an
/// edge present in both sets never has an absence window.
pub fn diff(current: &[String], fresh: &[String]) -> EdgeDiff {
    let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
    let fresh_set: HashSet<&str> = fresh.iter().map(String::as_str).collect();

    let mut to_add: Vec<String> = fresh
        .iter()
        .filter(|t| !current_set.contains(t.as_str()))
        .cloned()
        .collect();
    let mut to_remove: Vec<String> = current
        .iter()
        .filter(|t| !fresh_set.contains(t.as_str()))
        .cloned()
        .collect();

    // Deterministic output regardless of input order.
    to_add.sort();
    to_add.dedup();
    to_remove.sort();
    to_remove.dedup();

    EdgeDiff { to_add, to_remove }
}
