//! Identifier normalization.
//!
//! Every identifier that is stored, compared or searched goes through
//! [`normalize`] first. The functions are pure and idempotent; an empty result
//! means the input carried nothing usable and must be rejected by the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of external identifier observed from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum IdentifierType {
    Email,
    Phone,
    Telegram,
    ImessageEmail,
    ImessagePhone,
    Whatsapp,
}

impl IdentifierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierType::Email => "email",
            IdentifierType::Phone => "phone",
            IdentifierType::Telegram => "telegram",
            IdentifierType::ImessageEmail => "imessage_email",
            IdentifierType::ImessagePhone => "imessage_phone",
            IdentifierType::Whatsapp => "whatsapp",
        }
    }
}

impl fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(IdentifierType::Email),
            "phone" => Ok(IdentifierType::Phone),
            "telegram" => Ok(IdentifierType::Telegram),
            "imessage_email" => Ok(IdentifierType::ImessageEmail),
            "imessage_phone" => Ok(IdentifierType::ImessagePhone),
            "whatsapp" => Ok(IdentifierType::Whatsapp),
            other => Err(format!("unknown identifier type: {}", other)),
        }
    }
}

/// Type slot of a contact's identifying method. A contact holds at most one
/// method per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ContactMethodType {
    EmailPersonal,
    EmailWork,
    Phone,
    Telegram,
    Whatsapp,
}

impl ContactMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactMethodType::EmailPersonal => "email_personal",
            ContactMethodType::EmailWork => "email_work",
            ContactMethodType::Phone => "phone",
            ContactMethodType::Telegram => "telegram",
            ContactMethodType::Whatsapp => "whatsapp",
        }
    }

    pub fn is_email(&self) -> bool {
        matches!(
            self,
            ContactMethodType::EmailPersonal | ContactMethodType::EmailWork
        )
    }
}

impl fmt::Display for ContactMethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactMethodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_personal" => Ok(ContactMethodType::EmailPersonal),
            "email_work" => Ok(ContactMethodType::EmailWork),
            "phone" => Ok(ContactMethodType::Phone),
            "telegram" => Ok(ContactMethodType::Telegram),
            "whatsapp" => Ok(ContactMethodType::Whatsapp),
            other => Err(format!("unknown contact method type: {}", other)),
        }
    }
}

/// Canonical form of `raw` for the given identifier type.
pub fn normalize(raw: &str, identifier_type: IdentifierType) -> String {
    match identifier_type {
        IdentifierType::Email | IdentifierType::ImessageEmail => normalize_email(raw),
        IdentifierType::Phone | IdentifierType::ImessagePhone | IdentifierType::Whatsapp => {
            normalize_phone_e164(raw)
        }
        IdentifierType::Telegram => normalize_telegram(raw),
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// E.164-style phone number.
///
/// Ten bare digits are treated as a North American number. Anything else
/// keeps its digits behind a `+`.
///
/// ```
/// use core_contacts::normalize::normalize_phone_e164;
///
/// assert_eq!(normalize_phone_e164("(555) 123-4567"), "+15551234567");
/// assert_eq!(normalize_phone_e164("+44 20 7946 0958"), "+442079460958");
/// assert_eq!(normalize_phone_e164("n/a"), "");
/// ```
pub fn normalize_phone_e164(raw: &str) -> String {
    let trimmed = raw.trim();
    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        return String::new();
    }

    if digits.len() == 10 && !has_plus {
        return format!("+1{}", digits);
    }

    format!("+{}", digits)
}

/// Digits only, keeping a leading `+`. Used for overlap scoring where the
/// country code is not inferred.
pub fn normalize_phone_loose(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        if (c == '+' && i == 0) || c.is_ascii_digit() {
            normalized.push(c);
        }
    }
    normalized
}

/// Handle without the `@` prefix, lowercased.
pub fn normalize_telegram(raw: &str) -> String {
    raw.trim_start_matches(|c: char| c == '@' || c.is_whitespace())
        .trim_end()
        .to_lowercase()
}

/// Method types an identifier of this type may match against.
pub fn method_types_for(identifier_type: IdentifierType) -> &'static [ContactMethodType] {
    match identifier_type {
        IdentifierType::Email | IdentifierType::ImessageEmail => {
            &[ContactMethodType::EmailPersonal, ContactMethodType::EmailWork]
        }
        IdentifierType::Phone | IdentifierType::ImessagePhone => &[ContactMethodType::Phone],
        IdentifierType::Telegram => &[ContactMethodType::Telegram],
        IdentifierType::Whatsapp => &[ContactMethodType::Whatsapp, ContactMethodType::Phone],
    }
}

/// Identifier type whose rules normalize a stored method of this type.
pub fn identifier_type_for_method(method_type: ContactMethodType) -> IdentifierType {
    match method_type {
        ContactMethodType::EmailPersonal | ContactMethodType::EmailWork => IdentifierType::Email,
        ContactMethodType::Phone => IdentifierType::Phone,
        ContactMethodType::Telegram => IdentifierType::Telegram,
        ContactMethodType::Whatsapp => IdentifierType::Whatsapp,
    }
}

/// Best guess at the type of a bare identifier.
pub fn detect_identifier_type(raw: &str) -> IdentifierType {
    let trimmed = raw.trim();

    if trimmed.contains('@') {
        return IdentifierType::Email;
    }

    if trimmed.starts_with('+') {
        return IdentifierType::Phone;
    }

    let digit_count = trimmed.chars().filter(|c| c.is_ascii_digit()).count();
    let char_count = trimmed.chars().count();
    if digit_count >= 7 && (digit_count as f64) / (char_count as f64) > 0.5 {
        return IdentifierType::Phone;
    }

    IdentifierType::Email
}
