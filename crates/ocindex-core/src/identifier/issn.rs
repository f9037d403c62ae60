use once_cell::sync::Lazy;
use regex::Regex;

use super::{IdentifierManager, Scheme, ValidityFuture};

static ISSN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{3}[0-9X]$").unwrap());

/// Canonical `NNNN-NNNX` form, or `None` unless exactly eight symbols remain.
pub fn normalise(raw: &str) -> Option<String> {
    let kept: String = raw
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X')
        .collect();
    if kept.len() != 8 {
        return None;
    }
    Some(format!("{}-{}", &kept[..4], &kept[4..]))
}

/// Mod-11 check with weights 8..2; a check value of 10 is written `X`.
pub fn has_valid_check_digit(issn: &str) -> bool {
    if !ISSN_RE.is_match(issn) {
        return false;
    }
    let symbols: Vec<char> = issn.chars().filter(|c| *c != '-').collect();
    let sum: u32 = symbols[..7]
        .iter()
        .zip((2..=8).rev())
        .map(|(c, weight)| c.to_digit(10).unwrap_or(0) * weight)
        .sum();
    let check = match sum % 11 {
        0 => 0,
        r => 11 - r,
    };
    let expected = if check == 10 {
        'X'
    } else {
        char::from_digit(check, 10).unwrap_or('?')
    };
    symbols[7] == expected
}

pub fn is_valid(raw: &str) -> bool {
    normalise(raw).is_some_and(|issn| has_valid_check_digit(&issn))
}

pub struct IssnManager;

impl IdentifierManager for IssnManager {
    fn scheme(&self) -> Scheme {
        Scheme::Issn
    }

    fn normalise(&self, raw: &str, include_prefix: bool) -> Option<String> {
        normalise(raw).map(|body| Scheme::Issn.with_prefix(body, include_prefix))
    }

    fn is_valid<'a>(&'a self, raw: &'a str) -> ValidityFuture<'a> {
        Box::pin(std::future::ready(is_valid(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_separators() {
        assert_eq!(normalise("0317-8471"), Some("0317-8471".into()));
        assert_eq!(normalise("issn:0317 8471"), Some("0317-8471".into()));
        assert_eq!(normalise("2049-363x"), Some("2049-363X".into()));
    }

    #[test]
    fn requires_eight_symbols() {
        assert_eq!(normalise("0317-847"), None);
        assert_eq!(normalise("0317-84711"), None);
    }

    #[test]
    fn check_digit() {
        assert!(is_valid("0317-8471"));
        assert!(!is_valid("0317-8472"));
        assert!(is_valid("2049-3630"));
        assert!(is_valid("0000-006X"));
    }

    #[test]
    fn x_only_in_last_position() {
        assert!(!is_valid("031X-8471"));
    }

    #[tokio::test]
    async fn manager_agrees_with_free_functions() {
        let m = IssnManager;
        assert!(m.is_valid("0317-8471").await);
        assert!(!m.is_valid("0317-8472").await);
        assert_eq!(m.normalise("03178471", true), Some("issn:0317-8471".into()));
    }
}
