//! Parse-repair ladder for LLM classification output.
//!
//! The model is asked for schema-conformant JSON but the response is free
//! text and may be malformed in practice: truncated mid-structure, wrapped
//! in markdown fences, peppered with control characters or smart quotes,
//! or not JSON at all. Each rung is tried in order and the first that
//! yields a schema-valid, non-empty result wins. The final rung
//! synthesizes one result per profile from keyword evidence, so the ladder
//! as a whole never fails.

use tracing::{debug, warn};

use crate::heuristics::fallback_profile_vibe;
use crate::pipeline::ProfileBrief;
use crate::schema::{ClassificationResponse, ProfileVibe};

pub fn parse_with_repair(raw: &str, profiles: &[ProfileBrief]) -> ClassificationResponse {
    let cleaned = strip_fences(raw).trim().to_string();

    // Rung 1: direct decode.
    if let Some(r) = try_decode(&cleaned) {
        return r;
    }

    // Rung 2: strip control characters, normalize smart quotes.
    let scrubbed = scrub(&cleaned);
    if let Some(r) = try_decode(&scrubbed) {
        debug!("Classification response decoded after scrubbing");
        return r;
    }

    // Rung 3: auto-close truncated structures.
    if let Some(r) = try_decode(&close_truncated(&scrubbed)) {
        warn!("Classification response was truncated; auto-closed");
        return r;
    }

    // Rung 4: the outer envelope is malformed; pull out the results array.
    if let Some(r) = extract_results(&scrubbed) {
        warn!("Classification envelope malformed; extracted results array");
        return r;
    }

    // Rung 5: keyword synthesis, one result per profile.
    warn!(
        profiles = profiles.len(),
        "Classification response unparseable; synthesizing from keyword evidence"
    );
    ClassificationResponse {
        results: profiles
            .iter()
            .map(|p| fallback_profile_vibe(&p.handle, &p.bio))
            .collect(),
    }
}

fn try_decode(s: &str) -> Option<ClassificationResponse> {
    let parsed: Option<ClassificationResponse> = if s.starts_with('[') {
        serde_json::from_str::<Vec<ProfileVibe>>(s)
            .ok()
            .map(|results| ClassificationResponse { results })
    } else {
        serde_json::from_str(s).ok()
    };
    parsed.filter(|r| !r.results.is_empty())
}

/// Strip a markdown code fence if the payload is wrapped in one.
pub fn strip_fences(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw;
    };
    let after_open = &raw[open + 3..];
    // Skip the language tag on the fence line.
    let body = match after_open.find('\n') {
        Some(nl) => &after_open[nl + 1..],
        None => return raw,
    };
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

/// Remove control characters (newlines and tabs survive) and normalize
/// typographic quotes to ASCII.
pub fn scrub(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .map(|c| match c {
            '\u{201c}' | '\u{201d}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            _ => c,
        })
        .collect()
}

/// Close unterminated strings and balance braces/brackets by counting
/// openers outside string literals. Dangling separators before a closer
/// are trimmed so the result has a chance of decoding.
pub fn close_truncated(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in raw.chars() {
        out.push(c);
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    if in_string {
        out.push('"');
    }
    loop {
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        if out.ends_with(',') {
            out.pop();
        } else {
            break;
        }
    }
    if out.ends_with(':') {
        out.push_str(" null");
    }
    for closer in stack.into_iter().rev() {
        out.push(closer);
    }
    out
}

/// Targeted pattern search for the results array when the outer envelope
/// is broken. Finds `"results"`, takes the array that follows, auto-closes
/// it if needed, and decodes it on its own.
fn extract_results(raw: &str) -> Option<ClassificationResponse> {
    let idx = raw.find("\"results\"")?;
    let rest = &raw[idx..];
    let start = rest.find('[')?;
    let tail = &rest[start..];

    let candidate = match balanced_prefix(tail) {
        Some(prefix) => prefix.to_string(),
        None => close_truncated(tail),
    };
    let results: Vec<ProfileVibe> = serde_json::from_str(&candidate).ok()?;
    if results.is_empty() {
        return None;
    }
    Some(ClassificationResponse { results })
}

/// The prefix of `s` up to and including the bracket that balances its
/// first character, or None if the structure never closes.
fn balanced_prefix(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&s[..i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
