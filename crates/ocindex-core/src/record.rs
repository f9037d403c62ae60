//! The metadata the glob keeps for every identifier it has seen.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Tri-state validity of an identifier.
///
/// Serialised as JSON `true` / `false` / `null` in the network cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Validity {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

impl Validity {
    pub fn is_known(self) -> bool {
        self != Validity::Unknown
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Validity::Unknown => None,
            Validity::Valid => Some(true),
            Validity::Invalid => Some(false),
        }
    }
}

impl From<Option<bool>> for Validity {
    fn from(v: Option<bool>) -> Self {
        match v {
            None => Validity::Unknown,
            Some(true) => Validity::Valid,
            Some(false) => Validity::Invalid,
        }
    }
}

impl From<Validity> for Option<bool> {
    fn from(v: Validity) -> Self {
        v.as_bool()
    }
}

impl From<bool> for Validity {
    fn from(v: bool) -> Self {
        if v { Validity::Valid } else { Validity::Invalid }
    }
}

/// Resolved metadata for one identifier.
///
/// Facts only accumulate: [`merge`](ResolutionRecord::merge) unions the sets
/// and lets validity move from unknown to a concrete value, never back and
/// never between `true` and `false`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolutionRecord {
    #[serde(default)]
    pub valid: Validity,
    #[serde(default, deserialize_with = "nullable_set")]
    pub date: BTreeSet<String>,
    #[serde(default, deserialize_with = "nullable_set")]
    pub issn: BTreeSet<String>,
    #[serde(default, deserialize_with = "nullable_set")]
    pub orcid: BTreeSet<String>,
}

/// Older cache dumps store a missing date as `null` rather than `[]`.
fn nullable_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<BTreeSet<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// What happened when a record was merged into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Unchanged,
    Changed,
    /// The incoming validity contradicted the stored one and was ignored.
    Conflict,
}

impl ResolutionRecord {
    /// The empty record handed out by a data source's `new()`.
    pub fn empty() -> Self {
        Self {
            valid: Validity::Invalid,
            ..Default::default()
        }
    }

    pub fn invalid() -> Self {
        Self::empty()
    }

    pub fn valid() -> Self {
        Self {
            valid: Validity::Valid,
            ..Default::default()
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date.insert(date.into());
        self
    }

    pub fn with_issn(mut self, issn: impl Into<String>) -> Self {
        self.issn.insert(issn.into());
        self
    }

    pub fn with_orcid(mut self, orcid: impl Into<String>) -> Self {
        self.orcid.insert(orcid.into());
        self
    }

    pub fn is_valid(&self) -> bool {
        self.valid == Validity::Valid
    }

    /// The earliest known date, which is what citation tuples carry.
    pub fn first_date(&self) -> Option<&str> {
        self.date.iter().next().map(String::as_str)
    }

    /// Fold `other` into `self` with union semantics.
    pub fn merge(&mut self, other: &ResolutionRecord) -> MergeOutcome {
        let mut outcome = MergeOutcome::Unchanged;

        match (self.valid, other.valid) {
            (_, Validity::Unknown) => {}
            (Validity::Unknown, v) => {
                self.valid = v;
                outcome = MergeOutcome::Changed;
            }
            (a, b) if a != b => outcome = MergeOutcome::Conflict,
            _ => {}
        }

        if self.valid == Validity::Invalid {
            let had_facts = !(self.date.is_empty() && self.issn.is_empty() && self.orcid.is_empty());
            self.date.clear();
            self.issn.clear();
            self.orcid.clear();
            if had_facts && outcome == MergeOutcome::Unchanged {
                outcome = MergeOutcome::Changed;
            }
            return outcome;
        }

        let before = self.date.len() + self.issn.len() + self.orcid.len();
        self.date.extend(other.date.iter().cloned());
        self.issn.extend(other.issn.iter().cloned());
        self.orcid.extend(other.orcid.iter().cloned());
        let after = self.date.len() + self.issn.len() + self.orcid.len();

        if after != before && outcome == MergeOutcome::Unchanged {
            outcome = MergeOutcome::Changed;
        }
        outcome
    }

    /// `merge` by value, for folding several records together.
    pub fn merged(mut self, other: &ResolutionRecord) -> Self {
        self.merge(other);
        self
    }
}
