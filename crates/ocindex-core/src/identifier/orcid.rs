use once_cell::sync::Lazy;
use regex::Regex;

use super::{IdentifierManager, Scheme, ValidityFuture};

static ORCID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{4}-[0-9]{4}-[0-9]{3}[0-9X]$").unwrap());

/// Four dash-separated groups of four, from any input carrying 16 symbols.
pub fn normalise(raw: &str) -> Option<String> {
    let kept: String = raw
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X')
        .collect();
    if kept.len() != 16 {
        return None;
    }
    Some(format!(
        "{}-{}-{}-{}",
        &kept[..4],
        &kept[4..8],
        &kept[8..12],
        &kept[12..]
    ))
}

/// ISO 7064 11,2 checksum over the first fifteen digits.
pub fn has_valid_check_digit(orcid: &str) -> bool {
    if !ORCID_RE.is_match(orcid) {
        return false;
    }
    let symbols: Vec<char> = orcid.chars().filter(|c| *c != '-').collect();
    let total = symbols[..15]
        .iter()
        .fold(0u32, |total, c| (total + c.to_digit(10).unwrap_or(0)) * 2);
    let result = (12 - total % 11) % 11;
    let expected = if result == 10 {
        'X'
    } else {
        char::from_digit(result, 10).unwrap_or('?')
    };
    symbols[15] == expected
}

pub fn is_valid(raw: &str) -> bool {
    normalise(raw).is_some_and(|orcid| has_valid_check_digit(&orcid))
}

pub struct OrcidManager;

impl IdentifierManager for OrcidManager {
    fn scheme(&self) -> Scheme {
        Scheme::Orcid
    }

    fn normalise(&self, raw: &str, include_prefix: bool) -> Option<String> {
        normalise(raw).map(|body| Scheme::Orcid.with_prefix(body, include_prefix))
    }

    fn is_valid<'a>(&'a self, raw: &'a str) -> ValidityFuture<'a> {
        Box::pin(std::future::ready(is_valid(raw)))
    }
}
