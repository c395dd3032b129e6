//! Corresponding-author resolution.
//!
//! Papers may flag several corresponding authors; the senior one is listed
//! last by convention, so the *last* flagged author wins. With nothing
//! flagged, the last author of the list stands in.
//!
//! `corresponding_author` follows the same rule, except for partner API
//! records, where it is the first flagged author or else the first author.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{AffiliationEntry, AuthorEntry};

lazy_static! {
    static ref CORRESPONDING_MARKER: Regex = Regex::new(r"(?i)\(corresponding\)").unwrap();
}

/// Which author fills `corresponding_author`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadAuthor {
    /// First flagged author, else the first author in the list.
    FirstFlagged,
    /// Same as `last_corresponding_author`.
    LastCorresponding,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub corresponding_author: String,
    pub last_corresponding_author: String,
    pub last_corresponding_affiliation: String,
}

struct Candidate<'a> {
    position: Option<usize>,
    entry: &'a AuthorEntry,
}

fn is_marked(entry: &AuthorEntry) -> bool {
    let flagged = matches!(entry, AuthorEntry::Structured { is_corresponding: true, .. });
    let name = entry.raw_name();
    flagged || name.contains('*') || CORRESPONDING_MARKER.is_match(name)
}

/// Display name with `*` and "(corresponding)" markers removed.
pub fn clean_name(raw: &str) -> String {
    let name = CORRESPONDING_MARKER.replace_all(raw, "").replace('*', "");
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn affiliation_for(candidate: &Candidate<'_>, affiliations: &[AffiliationEntry]) -> String {
    let Some(last) = affiliations.last() else {
        return String::new();
    };
    let explicit = match candidate.entry {
        AuthorEntry::Structured { affiliation_index, .. } => *affiliation_index,
        AuthorEntry::Plain(_) => None,
    };
    explicit
        .or(candidate.position)
        .and_then(|i| affiliations.get(i))
        .unwrap_or(last)
        .text()
        .to_string()
}

/// Resolve the corresponding authors of one record with the
/// `LastCorresponding` lead rule.
pub fn resolve(authors: &[AuthorEntry], affiliations: &[AffiliationEntry]) -> Resolution {
    resolve_with(authors, affiliations, LeadAuthor::LastCorresponding)
}

/// Pure: equal inputs give equal outputs, and an empty author list yields
/// empty strings.
pub fn resolve_with(authors: &[AuthorEntry], affiliations: &[AffiliationEntry], lead: LeadAuthor) -> Resolution {
    let marked: Vec<Candidate<'_>> = authors
        .iter()
        .enumerate()
        .filter(|(_, a)| is_marked(a) && !clean_name(a.raw_name()).is_empty())
        .map(|(i, entry)| Candidate { position: Some(i), entry })
        .collect();

    let first_flagged = match marked.first() {
        Some(c) => clean_name(c.entry.raw_name()),
        None => authors.first().map(|a| clean_name(a.raw_name())).unwrap_or_default(),
    };

    let candidates = if marked.is_empty() {
        match authors.last() {
            Some(entry) => vec![Candidate { position: None, entry }],
            None => return Resolution::default(),
        }
    } else {
        marked
    };

    let last = &candidates[candidates.len() - 1];
    let last_name = clean_name(last.entry.raw_name());

    Resolution {
        corresponding_author: match lead {
            LeadAuthor::FirstFlagged => first_flagged,
            LeadAuthor::LastCorresponding => last_name.clone(),
        },
        last_corresponding_author: last_name,
        last_corresponding_affiliation: affiliation_for(last, affiliations),
    }
}

/// `(name, affiliation)` of the last corresponding author.
pub fn resolve_last(authors: &[AuthorEntry], affiliations: &[AffiliationEntry]) -> (String, String) {
    let r = resolve(authors, affiliations);
    (r.last_corresponding_author, r.last_corresponding_affiliation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(names: &[&str]) -> Vec<AuthorEntry> {
        names.iter().map(|n| AuthorEntry::plain(*n)).collect()
    }

    fn affs(names: &[&str]) -> Vec<AffiliationEntry> {
        names.iter().map(|n| AffiliationEntry::Plain(n.to_string())).collect()
    }

    #[test]
    fn test_last_marked_author_wins() {
        let authors = plain(&["A", "B*", "C*"]);
        let (name, aff) = resolve_last(&authors, &affs(&["Inst A", "Inst B", "Inst C"]));
        assert_eq!(name, "C");
        assert_eq!(aff, "Inst C");
    }

    #[test]
    fn test_unmarked_falls_back_to_last_author() {
        let authors = plain(&["A", "B", "C"]);
        let (name, aff) = resolve_last(&authors, &affs(&["Inst A", "Inst B", "Inst C"]));
        assert_eq!(name, "C");
        assert_eq!(aff, "Inst C");
    }

    #[test]
    fn test_empty_authors() {
        assert_eq!(resolve_last(&[], &affs(&["Inst"])), (String::new(), String::new()));
        assert_eq!(resolve(&[], &[]), Resolution::default());
    }

    #[test]
    fn test_corresponding_text_marker() {
        let authors = plain(&["A (Corresponding)", "B"]);
        let r = resolve(&authors, &affs(&["Inst A", "Inst B"]));
        assert_eq!(r.last_corresponding_author, "A");
        assert_eq!(r.last_corresponding_affiliation, "Inst A");
        assert_eq!(r.corresponding_author, "A");
    }

    #[test]
    fn test_first_flagged_lead_differs_from_last() {
        let authors = plain(&["A*", "B", "C*"]);
        let r = resolve_with(&authors, &[], LeadAuthor::FirstFlagged);
        assert_eq!(r.corresponding_author, "A");
        assert_eq!(r.last_corresponding_author, "C");
        assert_eq!(r.last_corresponding_affiliation, "");

        assert_eq!(resolve(&authors, &[]).corresponding_author, "C");
    }

    #[test]
    fn test_first_flagged_lead_falls_back_to_first_author() {
        let authors = plain(&["A", "B", "C"]);
        let r = resolve_with(&authors, &affs(&["Inst A", "Inst B", "Inst C"]), LeadAuthor::FirstFlagged);
        assert_eq!(r.corresponding_author, "A");
        assert_eq!(r.last_corresponding_author, "C");
        assert_eq!(r.last_corresponding_affiliation, "Inst C");

        let r = resolve(&authors, &[]);
        assert_eq!(r.corresponding_author, "C");
    }

    #[test]
    fn test_position_out_of_range_uses_last_affiliation() {
        let authors = plain(&["A", "B", "C*"]);
        let (_, aff) = resolve_last(&authors, &affs(&["Only Inst", "Second Inst"]));
        assert_eq!(aff, "Second Inst");
    }

    #[test]
    fn test_structured_flag_and_explicit_index() {
        let authors = vec![
            AuthorEntry::Structured { name: "Ann".into(), is_corresponding: true, affiliation_index: Some(1) },
            AuthorEntry::plain("Bo"),
        ];
        let r = resolve(&authors, &affs(&["Inst 0", "Inst 1"]));
        assert_eq!(r.last_corresponding_author, "Ann");
        assert_eq!(r.last_corresponding_affiliation, "Inst 1");
    }

    #[test]
    fn test_synthesized_author_keeps_explicit_index() {
        let authors = vec![
            AuthorEntry::plain("Ann"),
            AuthorEntry::Structured { name: "Bo".into(), is_corresponding: false, affiliation_index: Some(0) },
        ];
        let (name, aff) = resolve_last(&authors, &affs(&["Inst 0", "Inst 1"]));
        assert_eq!(name, "Bo");
        assert_eq!(aff, "Inst 0");
    }

    #[test]
    fn test_marker_only_name_is_ignored() {
        let authors = plain(&["*", "Zoe"]);
        assert_eq!(resolve_last(&authors, &[]).0, "Zoe");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let authors = plain(&["A", "B*", "C*"]);
        let affiliations = affs(&["X", "Y"]);
        assert_eq!(resolve(&authors, &affiliations), resolve(&authors, &affiliations));
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("  Jane  Doe* "), "Jane Doe");
        assert_eq!(clean_name("Jane Doe (corresponding)"), "Jane Doe");
    }
}
