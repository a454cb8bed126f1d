//! Domain models for the contact store
//!
//! Contacts and their identifying methods, source-side external contacts and
//! the enrichment audit trail. Timestamps are Unix seconds, ids are UUID v4
//! strings and dates are stored as `YYYY-MM-DD` text.

use crate::normalize::{identifier_type_for_method, normalize, ContactMethodType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Storage format of date-only columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

fn decode_date(value: Option<String>) -> sqlx::Result<Option<NaiveDate>> {
    value
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| sqlx::Error::Decode(Box::new(e)))
        })
        .transpose()
}

pub(crate) fn encode_date(value: Option<NaiveDate>) -> Option<String> {
    value.map(|date| date.format(DATE_FORMAT).to_string())
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &str) -> sqlx::Result<T> {
    serde_json::from_str(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

// =============================================================================
// Contacts
// =============================================================================

/// A user-owned contact record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub full_name: String,
    pub location: Option<String>,
    pub birthday: Option<NaiveDate>,
    /// URL of the profile photo
    pub profile_photo: Option<String>,
    pub notes: Option<String>,
    pub last_contacted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Identifying methods. Loaded on demand; empty when fetched without them.
    #[serde(default)]
    pub methods: Vec<ContactMethod>,
}

impl Contact {
    pub fn new(full_name: impl Into<String>) -> Self {
        let now = now_timestamp();
        Self {
            id: new_id(),
            full_name: full_name.into(),
            location: None,
            birthday: None,
            profile_photo: None,
            notes: None,
            last_contacted_at: None,
            created_at: now,
            updated_at: now,
            methods: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.full_name.trim().is_empty() {
            return Err("Contact name cannot be empty".to_string());
        }
        Ok(())
    }

    /// Method stored in the given type slot, if any.
    pub fn method(&self, method_type: ContactMethodType) -> Option<&ContactMethod> {
        self.methods.iter().find(|m| m.method_type == method_type)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Contact {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            full_name: row.try_get("full_name")?,
            location: row.try_get("location")?,
            birthday: decode_date(row.try_get("birthday")?)?,
            profile_photo: row.try_get("profile_photo")?,
            notes: row.try_get("notes")?,
            last_contacted_at: row.try_get("last_contacted_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            methods: Vec::new(),
        })
    }
}

/// Contact profile fields that enrichment may fill while they are empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    ProfilePhoto,
    Birthday,
    Location,
}

impl ProfileField {
    /// Column name, also used as the enrichment audit field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileField::ProfilePhoto => "profile_photo",
            ProfileField::Birthday => "birthday",
            ProfileField::Location => "location",
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One identifying method (email, phone, handle) of a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContactMethod {
    pub id: String,
    pub contact_id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub method_type: ContactMethodType,
    /// Value as entered or imported
    pub value: String,
    /// Value after normalization; the resolver matches on this
    pub normalized_value: String,
    pub is_primary: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Method to attach when creating or replacing a contact's methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContactMethod {
    pub method_type: ContactMethodType,
    pub value: String,
    pub is_primary: bool,
}

impl NewContactMethod {
    pub fn new(method_type: ContactMethodType, value: impl Into<String>) -> Self {
        Self {
            method_type,
            value: value.into(),
            is_primary: false,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Normalized value, or an error message when nothing usable is left.
    pub fn normalized(&self) -> Result<String, String> {
        let normalized = normalize(&self.value, identifier_type_for_method(self.method_type));
        if normalized.is_empty() {
            return Err(format!(
                "{} value '{}' is not a usable identifier",
                self.method_type, self.value
            ));
        }
        Ok(normalized)
    }
}

/// A contact returned by fuzzy name search, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMatch {
    pub contact: Contact,
    pub similarity: f64,
}

// =============================================================================
// External Contacts
// =============================================================================

/// Review state of an external contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    Unmatched,
    Ignored,
    Imported,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Matched => "matched",
            MatchStatus::Unmatched => "unmatched",
            MatchStatus::Ignored => "ignored",
            MatchStatus::Imported => "imported",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matched" => Ok(MatchStatus::Matched),
            "unmatched" => Ok(MatchStatus::Unmatched),
            "ignored" => Ok(MatchStatus::Ignored),
            "imported" => Ok(MatchStatus::Imported),
            other => Err(format!("unknown match status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmailEntry {
    pub value: String,
    /// Source-side label such as `home` or `work`
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhoneEntry {
    pub value: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddressEntry {
    pub formatted: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

/// A contact-like record pulled from an external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalContact {
    pub id: String,
    pub source: String,
    /// Record id on the source side
    pub source_id: String,
    pub account_id: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub emails: Vec<EmailEntry>,
    pub phones: Vec<PhoneEntry>,
    pub addresses: Vec<AddressEntry>,
    pub organization: Option<String>,
    pub job_title: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub photo_url: Option<String>,
    /// Local contact this record was matched or imported to
    pub crm_contact_id: Option<String>,
    pub match_status: MatchStatus,
    /// Older record from the same source that carries the same email
    pub duplicate_of_id: Option<String>,
    pub etag: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub synced_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ExternalContact {
    /// Name to search existing contacts with: the display name, else
    /// `first last`, else the first name alone.
    pub fn candidate_name(&self) -> Option<String> {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty())
        }

        if let Some(display) = present(&self.display_name) {
            return Some(display.to_string());
        }

        match (present(&self.first_name), present(&self.last_name)) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.to_string()),
            _ => None,
        }
    }

    /// The record carries nothing a contact could be built or matched from.
    pub fn is_empty(&self) -> bool {
        self.candidate_name().is_none() && self.emails.is_empty() && self.phones.is_empty()
    }
}

impl<'r> FromRow<'r, SqliteRow> for ExternalContact {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        let emails: String = row.try_get("emails")?;
        let phones: String = row.try_get("phones")?;
        let addresses: String = row.try_get("addresses")?;
        let metadata: String = row.try_get("metadata")?;

        Ok(Self {
            id: row.try_get("id")?,
            source: row.try_get("source")?,
            source_id: row.try_get("source_id")?,
            account_id: row.try_get("account_id")?,
            display_name: row.try_get("display_name")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            emails: decode_json(&emails)?,
            phones: decode_json(&phones)?,
            addresses: decode_json(&addresses)?,
            organization: row.try_get("organization")?,
            job_title: row.try_get("job_title")?,
            birthday: decode_date(row.try_get("birthday")?)?,
            photo_url: row.try_get("photo_url")?,
            crm_contact_id: row.try_get("crm_contact_id")?,
            match_status: row.try_get("match_status")?,
            duplicate_of_id: row.try_get("duplicate_of_id")?,
            etag: row.try_get("etag")?,
            metadata: decode_json(&metadata)?,
            synced_at: row.try_get("synced_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fields written when a source reports a record. Review state
/// (`match_status`, `crm_contact_id`, `duplicate_of_id`) is never touched by an upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertExternalContact {
    pub source: String,
    pub source_id: String,
    pub account_id: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub emails: Vec<EmailEntry>,
    pub phones: Vec<PhoneEntry>,
    pub addresses: Vec<AddressEntry>,
    pub organization: Option<String>,
    pub job_title: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub photo_url: Option<String>,
    pub etag: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub synced_at: Option<i64>,
}

// =============================================================================
// Enrichment Audit
// =============================================================================

/// Provenance of one field or method filled from an external record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContactEnrichment {
    pub id: String,
    pub contact_id: String,
    pub source: String,
    pub account_id: Option<String>,
    /// `profile_photo`, `birthday`, `location` or `method:{type}:{value}`
    pub field: String,
    pub external_contact_id: Option<String>,
    pub original_value: Option<String>,
    pub enriched_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEnrichment {
    pub contact_id: String,
    pub source: String,
    pub account_id: Option<String>,
    pub field: String,
    pub external_contact_id: Option<String>,
    pub original_value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn external(display: Option<&str>, first: Option<&str>, last: Option<&str>) -> ExternalContact {
        ExternalContact {
            id: new_id(),
            source: "gcontacts".to_string(),
            source_id: "people/1".to_string(),
            account_id: None,
            display_name: display.map(String::from),
            first_name: first.map(String::from),
            last_name: last.map(String::from),
            emails: Vec::new(),
            phones: Vec::new(),
            addresses: Vec::new(),
            organization: None,
            job_title: None,
            birthday: None,
            photo_url: None,
            crm_contact_id: None,
            match_status: MatchStatus::Unmatched,
            duplicate_of_id: None,
            etag: None,
            metadata: serde_json::Map::new(),
            synced_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_candidate_name_preference() {
        assert_eq!(
            external(Some("Dr. Jane Doe"), Some("Jane"), Some("Doe")).candidate_name(),
            Some("Dr. Jane Doe".to_string())
        );
        assert_eq!(
            external(None, Some("Jane"), Some("Doe")).candidate_name(),
            Some("Jane Doe".to_string())
        );
        assert_eq!(
            external(Some("  "), Some("Jane"), None).candidate_name(),
            Some("Jane".to_string())
        );
        assert_eq!(external(None, None, Some("Doe")).candidate_name(), None);
        assert!(external(None, None, None).is_empty());
    }

    #[test]
    fn test_contact_validation() {
        let mut contact = Contact::new("Jane Doe");
        assert!(contact.validate().is_ok());

        contact.full_name = "   ".to_string();
        assert!(contact.validate().is_err());
    }

    #[test]
    fn test_new_method_normalization() {
        let method = NewContactMethod::new(ContactMethodType::Phone, "(555) 123-4567");
        assert_eq!(method.normalized().unwrap(), "+15551234567");
        assert!(!method.is_primary);

        let unusable = NewContactMethod::new(ContactMethodType::Phone, "unknown");
        assert!(unusable.normalized().is_err());
    }

    #[test]
    fn test_email_entry_json_shape() {
        let entry: EmailEntry =
            serde_json::from_str(r#"{"value":"a@b.com","type":"work"}"#).unwrap();
        assert_eq!(entry.kind, "work");
        assert!(!entry.primary);

        let json = serde_json::to_string(&EmailEntry {
            value: "a@b.com".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json, r#"{"value":"a@b.com","primary":false}"#);
    }

    #[test]
    fn test_match_status_round_trip() {
        for status in [
            MatchStatus::Matched,
            MatchStatus::Unmatched,
            MatchStatus::Ignored,
            MatchStatus::Imported,
        ] {
            assert_eq!(status.as_str().parse::<MatchStatus>().unwrap(), status);
        }
    }
}
