//! Identity records.

use core_contacts::IdentifierType;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// How an identity came to be linked, or that it is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Manual,
    Unmatched,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Manual => "manual",
            MatchType::Unmatched => "unmatched",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(MatchType::Exact),
            "fuzzy" => Ok(MatchType::Fuzzy),
            "manual" => Ok(MatchType::Manual),
            "unmatched" => Ok(MatchType::Unmatched),
            other => Err(format!("unknown match type: {}", other)),
        }
    }
}

/// An identifier observed from a source, optionally linked to a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ExternalIdentity {
    pub id: String,
    /// Normalized identifier
    pub identifier: String,
    pub identifier_type: IdentifierType,
    /// Identifier as the source reported it
    pub raw_identifier: String,
    pub source: String,
    pub source_id: Option<String>,
    pub contact_id: Option<String>,
    pub match_type: MatchType,
    pub match_confidence: Option<f64>,
    pub display_name: Option<String>,
    pub last_seen_at: i64,
    pub message_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ExternalIdentity {
    pub fn is_linked(&self) -> bool {
        self.contact_id.is_some()
    }
}

/// Write model for an identity observation.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertIdentity {
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub raw_identifier: String,
    pub source: String,
    pub source_id: Option<String>,
    pub display_name: Option<String>,
    /// `None` leaves an existing link in place
    pub contact_id: Option<String>,
    pub match_type: MatchType,
    pub match_confidence: Option<f64>,
    pub seen_at: i64,
    /// Added to the stored message count
    pub message_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_type_round_trip() {
        for match_type in [
            MatchType::Exact,
            MatchType::Fuzzy,
            MatchType::Manual,
            MatchType::Unmatched,
        ] {
            assert_eq!(match_type.as_str().parse::<MatchType>().unwrap(), match_type);
        }
        assert!("guess".parse::<MatchType>().is_err());
    }
}
