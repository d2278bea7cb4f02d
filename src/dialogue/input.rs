//! Gateway input normalization
//!
//! The gateway resends the whole keystroke buffer on every hop
//! (`"V0042*2*0"`). Only the segment after the last delimiter is the answer
//! to the screen currently shown.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Separator the gateway puts between hops
pub const SEGMENT_DELIMITER: char = '*';

static ACCESS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^V[0-9]{4}$").expect("access code pattern is valid"));

/// The answer to the current screen, trimmed
pub fn latest_segment(text: &str) -> &str {
    text.rsplit(SEGMENT_DELIMITER).next().unwrap_or_default().trim()
}

/// A menu choice made of ASCII digits only, written without leading zeros
pub fn parse_choice(token: &str) -> Option<usize> {
    if token.is_empty() || token.len() > 3 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    token.parse().ok()
}

/// Anonymous learner access code, always uppercase (`V0042`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessCode(String);

impl AccessCode {
    /// Accepts exactly `V` followed by four digits, in either case
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        ACCESS_CODE
            .is_match(&normalized)
            .then_some(AccessCode(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
