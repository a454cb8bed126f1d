//! People API response types
//!
//! Data structures for deserializing `people.connections.list` responses and
//! converting persons into external contact records.

use chrono::NaiveDate;
use core_contacts::{AddressEntry, EmailEntry, PhoneEntry, UpsertExternalContact};
use serde::Deserialize;

/// People API connections.list response
///
/// See: https://developers.google.com/people/api/rest/v1/people.connections/list
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsResponse {
    #[serde(default)]
    pub connections: Vec<Person>,

    /// Token for the next page
    pub next_page_token: Option<String>,

    /// Token for the next incremental sync, present on the last page
    pub next_sync_token: Option<String>,

    pub total_people: Option<u32>,
}

/// People API person resource
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub resource_name: String,
    pub etag: Option<String>,
    pub metadata: Option<PersonMetadata>,
    #[serde(default)]
    pub names: Vec<Name>,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub phone_numbers: Vec<PhoneNumber>,
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub birthdays: Vec<Birthday>,
    #[serde(default)]
    pub photos: Vec<Photo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonMetadata {
    /// Set on incremental responses for removed connections
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub metadata: Option<FieldMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumber {
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub metadata: Option<FieldMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub formatted_value: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub name: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Birthday {
    pub date: Option<PartialDate>,
}

/// Calendar date whose parts may be missing or zero.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PartialDate {
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub month: u32,
    #[serde(default)]
    pub day: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Photo {
    pub url: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn is_primary(metadata: &Option<FieldMetadata>) -> bool {
    metadata.as_ref().is_some_and(|m| m.primary)
}

impl Person {
    pub fn is_deleted(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.deleted)
    }

    /// Whether the person has anything to match on.
    pub fn has_identifying_data(&self) -> bool {
        !self.names.is_empty() || !self.email_addresses.is_empty() || !self.phone_numbers.is_empty()
    }

    /// Only complete birthdays are kept; year-less dates are dropped.
    pub fn birthday(&self) -> Option<NaiveDate> {
        let date = self.birthdays.first()?.date?;
        if date.year <= 0 || date.month == 0 || date.day == 0 {
            return None;
        }
        NaiveDate::from_ymd_opt(date.year, date.month, date.day)
    }

    /// Build the upsert for this person under `source` and `account_id`.
    pub fn to_record(&self, source: &str, account_id: &str, synced_at: i64) -> UpsertExternalContact {
        let name = self.names.first();
        let organization = self.organizations.first();

        UpsertExternalContact {
            source: source.to_string(),
            source_id: self.resource_name.clone(),
            account_id: Some(account_id.to_string()),
            display_name: name.and_then(|n| non_empty(&n.display_name)),
            first_name: name.and_then(|n| non_empty(&n.given_name)),
            last_name: name.and_then(|n| non_empty(&n.family_name)),
            emails: self
                .email_addresses
                .iter()
                .filter_map(|e| {
                    Some(EmailEntry {
                        value: non_empty(&e.value)?,
                        kind: e.kind.clone().unwrap_or_default(),
                        primary: is_primary(&e.metadata),
                    })
                })
                .collect(),
            phones: self
                .phone_numbers
                .iter()
                .filter_map(|p| {
                    Some(PhoneEntry {
                        value: non_empty(&p.value)?,
                        kind: p.kind.clone().unwrap_or_default(),
                        primary: is_primary(&p.metadata),
                    })
                })
                .collect(),
            addresses: self
                .addresses
                .iter()
                .filter_map(|a| {
                    Some(AddressEntry {
                        formatted: non_empty(&a.formatted_value)?,
                        kind: a.kind.clone().unwrap_or_default(),
                    })
                })
                .collect(),
            organization: organization.and_then(|o| non_empty(&o.name)),
            job_title: organization.and_then(|o| non_empty(&o.title)),
            birthday: self.birthday(),
            photo_url: self.photos.first().and_then(|p| non_empty(&p.url)),
            etag: self.etag.clone(),
            metadata: Default::default(),
            synced_at: Some(synced_at),
        }
    }
}
