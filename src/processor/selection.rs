// src/processor/selection.rs

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::errors::{Result, SchedError};
use crate::repo::Artefact;

/// How many of a slot's matching artefacts are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    #[default]
    All,
    First,
    Last,
    /// 1-based position in the ordered candidate list.
    Nth(usize),
}

/// Parse the `k` out of `nth(k)`.
fn parse_nth(statement: &str) -> Option<usize> {
    let pattern = Regex::new(r"^nth\(\s*(\d+)\s*\)$").ok()?;
    pattern
        .captures(statement)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "all" => Ok(SelectionPolicy::All),
            "first" => Ok(SelectionPolicy::First),
            "last" => Ok(SelectionPolicy::Last),
            other => {
                let k = parse_nth(other).ok_or_else(|| {
                    format!("invalid selection: {other} (expected all, first, last or nth(k))")
                })?;
                if k == 0 {
                    return Err("nth(k) is 1-based; nth(0) is not allowed".to_string());
                }
                Ok(SelectionPolicy::Nth(k))
            }
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::All => write!(f, "all"),
            SelectionPolicy::First => write!(f, "first"),
            SelectionPolicy::Last => write!(f, "last"),
            SelectionPolicy::Nth(k) => write!(f, "nth({k})"),
        }
    }
}

impl SelectionPolicy {
    pub fn keeps_all(&self) -> bool {
        matches!(self, SelectionPolicy::All)
    }

    /// Apply the policy to already ordered candidates.
    ///
    /// An empty candidate list stays empty for every policy; `nth(k)` past a
    /// non-empty list is an error.
    pub fn apply<'a>(&self, slot: &str, mut candidates: Vec<&'a Artefact>) -> Result<Vec<&'a Artefact>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }
        match *self {
            SelectionPolicy::All => Ok(candidates),
            SelectionPolicy::First => {
                candidates.truncate(1);
                Ok(candidates)
            }
            SelectionPolicy::Last => Ok(candidates.pop().into_iter().collect()),
            SelectionPolicy::Nth(k) => {
                if k > candidates.len() {
                    return Err(SchedError::SelectionError {
                        slot: slot.to_string(),
                        reason: format!("nth({k}) but only {} candidate(s) matched", candidates.len()),
                    });
                }
                Ok(vec![candidates[k - 1]])
            }
        }
    }
}
