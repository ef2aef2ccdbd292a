//! Roster filter criteria.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::persona::Gender;

/// Gender criterion; `Any` bypasses the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderFilter {
    #[default]
    Any,
    Male,
    Female,
}

impl GenderFilter {
    pub fn matches(&self, gender: Gender) -> bool {
        match self {
            GenderFilter::Any => true,
            GenderFilter::Male => gender == Gender::Male,
            GenderFilter::Female => gender == Gender::Female,
        }
    }
}

impl fmt::Display for GenderFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenderFilter::Any => write!(f, "any"),
            GenderFilter::Male => write!(f, "male"),
            GenderFilter::Female => write!(f, "female"),
        }
    }
}

impl FromStr for GenderFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" => Ok(GenderFilter::Any),
            other => other.parse::<Gender>().map(|g| match g {
                Gender::Male => GenderFilter::Male,
                Gender::Female => GenderFilter::Female,
            }),
        }
    }
}

/// Structured roster filters, applied together with a free-text search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterFilter {
    #[serde(default)]
    pub gender: GenderFilter,
    /// Inclusive lower age bound.
    #[serde(default = "default_min_age")]
    pub min_age: u8,
    /// Inclusive upper age bound.
    #[serde(default = "default_max_age")]
    pub max_age: u8,
    /// Country codes or names; empty means any country.
    #[serde(default)]
    pub countries: Vec<String>,
}

fn default_min_age() -> u8 {
    18
}

fn default_max_age() -> u8 {
    99
}

impl Default for RosterFilter {
    fn default() -> Self {
        Self {
            gender: GenderFilter::Any,
            min_age: default_min_age(),
            max_age: default_max_age(),
            countries: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gender_filter_any_bypasses() {
        assert!(GenderFilter::Any.matches(Gender::Male));
        assert!(GenderFilter::Any.matches(Gender::Female));
        assert!(!GenderFilter::Male.matches(Gender::Female));
    }

    #[test]
    fn test_gender_filter_parse() {
        assert_eq!("ANY".parse::<GenderFilter>().unwrap(), GenderFilter::Any);
        assert_eq!("female".parse::<GenderFilter>().unwrap(), GenderFilter::Female);
        assert!("x".parse::<GenderFilter>().is_err());
    }

    #[test]
    fn test_roster_filter_deserialize_defaults() {
        let filter: RosterFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(filter, RosterFilter::default());
    }
}
