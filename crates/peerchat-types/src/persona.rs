//! Persona (scripted bot counterpart) types.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Stable identifier of a roster persona (e.g. `"p1"`).
///
/// Persona ids come from the static roster, so they are plain strings rather
/// than generated UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaId(pub String);

impl PersonaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PersonaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PersonaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Declared gender of a persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            other => Err(format!("invalid gender: '{other}'")),
        }
    }
}

/// Country a persona claims to be from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// Display name ("Japan").
    pub name: String,
    /// ISO 3166-1 alpha-2 code ("JP").
    pub code: String,
}

impl Country {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }
}

/// A scripted chat counterpart.
///
/// Personas are immutable once the roster is built. `reply_pool` is never
/// empty; the roster constructor rejects personas without replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: PersonaId,
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub country: Country,
    /// Premium persona, badged in listings.
    pub vip: bool,
    pub interests: Vec<String>,
    /// Opaque avatar reference (URL or asset key).
    pub avatar: String,
    pub reply_pool: Vec<String>,
}

impl Persona {
    /// Greeting seeded into a fresh conversation with this persona.
    pub fn greeting(&self) -> String {
        format!("Start a conversation with {}", self.name)
    }
}
