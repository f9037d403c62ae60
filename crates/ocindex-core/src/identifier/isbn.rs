use super::{IdentifierManager, Scheme, ValidityFuture};

/// Upper-cased digits and `X`, provided there are 10 or 13 of them.
pub fn normalise(raw: &str) -> Option<String> {
    let kept: String = raw
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X')
        .collect();
    matches!(kept.len(), 10 | 13).then_some(kept)
}

/// ISBN-10: weights 10..1, sum divisible by 11, `X` (=10) only as check digit.
fn isbn10_ok(isbn: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in isbn.chars().enumerate() {
        let value = match c {
            'X' if i == 9 => 10,
            _ => match c.to_digit(10) {
                Some(d) => d,
                None => return false,
            },
        };
        sum += value * (10 - i as u32);
    }
    sum.is_multiple_of(11)
}

/// ISBN-13: weights alternate 1, 3; sum divisible by 10.
fn isbn13_ok(isbn: &str) -> bool {
    let digits: Option<Vec<u32>> = isbn.chars().map(|c| c.to_digit(10)).collect();
    let Some(digits) = digits else {
        return false;
    };
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { *d } else { d * 3 })
        .sum();
    sum.is_multiple_of(10)
}

pub fn has_valid_check_digit(isbn: &str) -> bool {
    match isbn.len() {
        10 => isbn10_ok(isbn),
        13 => isbn13_ok(isbn),
        _ => false,
    }
}

pub fn is_valid(raw: &str) -> bool {
    normalise(raw).is_some_and(|isbn| has_valid_check_digit(&isbn))
}

pub struct IsbnManager;

impl IdentifierManager for IsbnManager {
    fn scheme(&self) -> Scheme {
        Scheme::Isbn
    }

    fn normalise(&self, raw: &str, include_prefix: bool) -> Option<String> {
        normalise(raw).map(|body| Scheme::Isbn.with_prefix(body, include_prefix))
    }

    fn is_valid<'a>(&'a self, raw: &'a str) -> ValidityFuture<'a> {
        Box::pin(std::future::ready(is_valid(raw)))
    }
}
