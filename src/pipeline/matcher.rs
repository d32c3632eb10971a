//! Identifier matching: page text → roster entry.
//!
//! One case-insensitive pattern is compiled per roster entry when the batch
//! starts:
//!
//! ```text
//! IPPIS\s*Number[\s:]*12345
//! ```
//!
//! Whitespace inside the label is optional and any run of spaces or colons
//! may separate label and value, which absorbs most OCR noise around the
//! label.

use crate::config::MatchPolicy;
use crate::error::BatchError;
use crate::pipeline::roster::RosterEntry;
use regex::{Regex, RegexBuilder};

/// Compiled patterns for every roster entry, in roster order.
pub struct IdentifierMatcher {
    entries: Vec<(RosterEntry, Regex)>,
    policy: MatchPolicy,
}

impl IdentifierMatcher {
    pub fn new(label: &str, roster: &[RosterEntry], policy: MatchPolicy) -> Result<Self, BatchError> {
        let label = label_pattern(label);
        let entries = roster
            .iter()
            .map(|entry| {
                let pattern = format!(r"{}[\s:]*{}", label, regex::escape(&entry.identifier));
                RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (entry.clone(), re))
                    .map_err(|e| {
                        BatchError::InvalidConfig(format!(
                            "cannot build pattern for identifier '{}': {}",
                            entry.identifier, e
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries, policy })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The roster entry that owns this page, if any.
    pub fn find(&self, text: &str) -> Option<&RosterEntry> {
        if text.is_empty() {
            return None;
        }
        let mut hits = self
            .entries
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(entry, _)| entry);

        match self.policy {
            MatchPolicy::FirstMatch => hits.next(),
            // `max_by_key` keeps the last maximum; fold keeps the first.
            MatchPolicy::LongestIdentifier => hits.fold(None, |best: Option<&RosterEntry>, e| {
                match best {
                    Some(b) if b.identifier.len() >= e.identifier.len() => Some(b),
                    _ => Some(e),
                }
            }),
        }
    }
}

/// Escape each word of the label and allow optional whitespace between them.
fn label_pattern(label: &str) -> String {
    label
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s*")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str, email: &str) -> RosterEntry {
        RosterEntry {
            identifier: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }

    fn matcher(roster: &[RosterEntry], policy: MatchPolicy) -> IdentifierMatcher {
        IdentifierMatcher::new("IPPIS Number", roster, policy).unwrap()
    }

    #[test]
    fn matches_label_and_identifier() {
        let roster = vec![entry("12345", "Jane Doe", "jane@x.com")];
        let m = matcher(&roster, MatchPolicy::FirstMatch);
        let hit = m.find("PAYSLIP IPPIS Number: 12345 Jane Doe").unwrap();
        assert_eq!(hit.email, "jane@x.com");
    }

    #[test]
    fn tolerates_ocr_separators_and_case() {
        let roster = vec![entry("A77", "X", "x@x.com")];
        let m = matcher(&roster, MatchPolicy::FirstMatch);
        assert!(m.find("ippisnumber::a77").is_some());
        assert!(m.find("IPPIS  NUMBER  :  A77").is_some());
        assert!(m.find("IPPIS Number A77").is_some());
    }

    #[test]
    fn identifier_without_label_does_not_match() {
        let roster = vec![entry("12345", "Jane", "jane@x.com")];
        let m = matcher(&roster, MatchPolicy::FirstMatch);
        assert!(m.find("Employee 12345 Net Pay").is_none());
        assert!(m.find("IPPIS Number: 99999").is_none());
        assert!(m.find("").is_none());
    }

    #[test]
    fn first_match_follows_roster_order_not_text_position() {
        // Both identifiers satisfy the pattern; the second one appears
        // earlier in the text but the first roster row must win.
        let roster = vec![entry("222", "Second On Page", "a@x.com"), entry("111", "First On Page", "b@x.com")];
        let m = matcher(&roster, MatchPolicy::FirstMatch);
        let hit = m
            .find("IPPIS Number: 111 ... IPPIS Number: 222")
            .unwrap();
        assert_eq!(hit.identifier, "222");
    }

    #[test]
    fn first_match_lets_a_prefix_claim_the_page() {
        let roster = vec![entry("1234", "Short", "s@x.com"), entry("12345", "Long", "l@x.com")];
        let m = matcher(&roster, MatchPolicy::FirstMatch);
        assert_eq!(m.find("IPPIS Number: 12345").unwrap().identifier, "1234");
    }

    #[test]
    fn longest_identifier_policy_prefers_the_full_number() {
        let roster = vec![entry("1234", "Short", "s@x.com"), entry("12345", "Long", "l@x.com")];
        let m = matcher(&roster, MatchPolicy::LongestIdentifier);
        assert_eq!(m.find("IPPIS Number: 12345").unwrap().identifier, "12345");
    }

    #[test]
    fn longest_identifier_ties_go_to_roster_order() {
        let roster = vec![entry("111", "A", "a@x.com"), entry("222", "B", "b@x.com")];
        let m = matcher(&roster, MatchPolicy::LongestIdentifier);
        assert_eq!(
            m.find("IPPIS Number: 222 IPPIS Number: 111").unwrap().name,
            "A"
        );
    }

    #[test]
    fn regex_metacharacters_in_identifiers_are_literal() {
        let roster = vec![entry("12.5+", "Meta", "m@x.com")];
        let m = matcher(&roster, MatchPolicy::FirstMatch);
        assert!(m.find("IPPIS Number: 12.5+").is_some());
        assert!(m.find("IPPIS Number: 1225").is_none());
    }

    #[test]
    fn custom_label() {
        let roster = vec![entry("PR-9", "P", "p@x.com")];
        let m = IdentifierMatcher::new("Staff No.", &roster, MatchPolicy::FirstMatch).unwrap();
        assert!(m.find("Staff No.: PR-9").is_some());
        assert!(m.find("Staff Nox PR-9").is_none());
        assert_eq!(m.len(), 1);
    }
}
