//! Emergency profile types for safescan.
//!
//! This module defines the canonical [`Profile`] record owned by the profile
//! store, and the [`EmergencyProfile`] view that a responder sees after a
//! scan has been resolved.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::error::{Error, Result};

/// Milliseconds in one day.
const MS_PER_DAY: i64 = 86_400_000;

/// The fixed set of blood groups a profile may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodGroup {
    /// A positive.
    #[serde(rename = "A+")]
    APositive,
    /// A negative.
    #[serde(rename = "A-")]
    ANegative,
    /// B positive.
    #[serde(rename = "B+")]
    BPositive,
    /// B negative.
    #[serde(rename = "B-")]
    BNegative,
    /// AB positive.
    #[serde(rename = "AB+")]
    AbPositive,
    /// AB negative.
    #[serde(rename = "AB-")]
    AbNegative,
    /// O positive.
    #[serde(rename = "O+")]
    OPositive,
    /// O negative.
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodGroup {
    /// All blood groups, in the order the profile form offers them.
    pub const ALL: [Self; 8] = [
        Self::APositive,
        Self::ANegative,
        Self::BPositive,
        Self::BNegative,
        Self::AbPositive,
        Self::AbNegative,
        Self::OPositive,
        Self::ONegative,
    ];

    /// The conventional label, e.g. `"AB-"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::APositive => "A+",
            Self::ANegative => "A-",
            Self::BPositive => "B+",
            Self::BNegative => "B-",
            Self::AbPositive => "AB+",
            Self::AbNegative => "AB-",
            Self::OPositive => "O+",
            Self::ONegative => "O-",
        }
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string that is not one of the eight blood groups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown blood group '{0}' (expected one of A+, A-, B+, B-, AB+, AB-, O+, O-)")]
pub struct InvalidBloodGroup(pub String);

impl FromStr for BloodGroup {
    type Err = InvalidBloodGroup;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|group| group.as_str() == wanted)
            .ok_or_else(|| InvalidBloodGroup(s.to_string()))
    }
}

/// Someone to call in an emergency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact name.
    pub name: String,
    /// Phone number. Any non-empty string is accepted.
    pub phone: String,
    /// How the contact relates to the profile owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
}

impl Contact {
    /// Create a contact without a relationship.
    #[must_use]
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            relationship: None,
        }
    }

    /// Attach a relationship label.
    #[must_use]
    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }
}

/// The canonical emergency profile.
///
/// Stored wholesale by the profile store; every save replaces the previous
/// record entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Full name of the profile owner.
    pub full_name: String,
    /// Blood group.
    pub blood_group: BloodGroup,
    /// Date of birth, used only to show an age.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,
    /// Insurance details, free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<String>,
    /// Registered organ donor.
    #[serde(default)]
    pub organ_donor: bool,
    /// Allergies in entry order.
    #[serde(default)]
    pub allergies: Vec<String>,
    /// Medications in entry order.
    #[serde(default)]
    pub medications: Vec<String>,
    /// Emergency contacts in entry order.
    #[serde(default)]
    pub contacts: Vec<Contact>,
    /// When this record was saved.
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Create a minimal profile stamped with the current time.
    #[must_use]
    pub fn new(full_name: impl Into<String>, blood_group: BloodGroup, contacts: Vec<Contact>) -> Self {
        Self {
            full_name: full_name.into(),
            blood_group,
            dob: None,
            insurance: None,
            organ_donor: false,
            allergies: Vec::new(),
            medications: Vec::new(),
            contacts,
            created_at: Utc::now(),
        }
    }

    /// Check that the profile can be saved and turned into a QR code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProfile`] if the name is blank, there are no
    /// contacts, or a contact lacks a name or phone.
    pub fn validate(&self) -> Result<()> {
        if self.full_name.trim().is_empty() {
            return Err(Error::invalid_profile("full name is required"));
        }
        if self.contacts.is_empty() {
            return Err(Error::invalid_profile(
                "at least one emergency contact is required",
            ));
        }
        for (i, contact) in self.contacts.iter().enumerate() {
            if contact.name.trim().is_empty() || contact.phone.trim().is_empty() {
                return Err(Error::invalid_profile(format!(
                    "contact {} needs both a name and a phone number",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    /// Whether [`Profile::validate`] would succeed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// How much of the identity section is filled in, as a percentage.
    ///
    /// Counts name, blood group and date of birth.
    #[must_use]
    pub fn completeness_percent(&self) -> u8 {
        let filled = [
            !self.full_name.trim().is_empty(),
            true,
            self.dob.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();
        match filled {
            3 => 100,
            2 => 67,
            1 => 33,
            _ => 0,
        }
    }
}

/// A contact as shown on the responder view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCard {
    /// Contact name.
    pub name: String,
    /// Phone number.
    pub phone: String,
    /// Relationship, when the source carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
}

/// The profile data a responder sees, from either a token lookup or an
/// embedded offline payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyProfile {
    /// Full name.
    pub full_name: String,
    /// Blood group label. The lookup service may answer `"Unknown"`.
    #[serde(default)]
    pub blood_group: String,
    /// Date of birth as sent by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    /// Organ donor flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organ_donor: Option<bool>,
    /// Insurance details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<String>,
    /// Allergies.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub allergies: Vec<String>,
    /// Medications.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub medications: Vec<String>,
    /// Medical conditions (only the lookup service provides these).
    #[serde(default, deserialize_with = "nullable_vec")]
    pub conditions: Vec<String>,
    /// Emergency contacts.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub contacts: Vec<ContactCard>,
}

impl EmergencyProfile {
    /// Parse the date of birth, accepting `YYYY-MM-DD` or an RFC 3339
    /// timestamp.
    #[must_use]
    pub fn dob_date(&self) -> Option<NaiveDate> {
        let raw = self.dob.as_deref()?.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
    }

    /// Age in years at `now`, if a date of birth is known.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.dob_date().map(|dob| age_in_years(dob, now))
    }
}

impl From<&Profile> for EmergencyProfile {
    /// The full projection published to the backing store. Unlike the
    /// offline payload this keeps dob, insurance and relationships.
    fn from(profile: &Profile) -> Self {
        Self {
            full_name: profile.full_name.clone(),
            blood_group: profile.blood_group.to_string(),
            dob: profile.dob.map(|d| d.format("%Y-%m-%d").to_string()),
            organ_donor: Some(profile.organ_donor),
            insurance: profile.insurance.clone(),
            allergies: profile.allergies.clone(),
            medications: profile.medications.clone(),
            conditions: Vec::new(),
            contacts: profile
                .contacts
                .iter()
                .map(|c| ContactCard {
                    name: c.name.clone(),
                    phone: c.phone.clone(),
                    relationship: c.relationship.clone(),
                })
                .collect(),
        }
    }
}

/// Age as `floor((now - dob) / 365.25 days)`, with `dob` at midnight UTC.
///
/// This is an approximation that ignores exact leap-year placement; it is
/// computed in whole milliseconds so the result matches the formula exactly.
#[must_use]
pub fn age_in_years(dob: NaiveDate, now: DateTime<Utc>) -> i64 {
    let born = dob.and_time(chrono::NaiveTime::MIN).and_utc();
    let elapsed_ms = (now - born).num_milliseconds();
    // 365.25 days == 1461 / 4 days
    (elapsed_ms * 4).div_euclid(1461 * MS_PER_DAY)
}

/// Treat JSON `null` like a missing list.
fn nullable_vec<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
