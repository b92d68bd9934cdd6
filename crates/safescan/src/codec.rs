//! Payload codec for QR codes and share links.
//!
//! Two encodings of the same lossy projection of a [`Profile`]:
//!
//! - the **compact** form, short-keyed JSON placed directly inside a QR code
//!   so any generic reader can show it;
//! - the **fragment** form, full-keyed JSON that is URL-escaped and then
//!   base64 encoded so it can ride in the `#fragment` of an emergency link.
//!
//! Neither form carries the date of birth, insurance, relationships or the
//! save timestamp. Decoding returns a [`CodecError`] instead of panicking, so
//! the resolver can treat a bad payload as absent.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::{ContactCard, EmergencyProfile, Profile};

/// Characters escaped by `encodeURIComponent`: everything except
/// `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Errors from decoding a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The payload was empty.
    #[error("payload is empty")]
    Empty,

    /// The base64 layer could not be decoded.
    #[error("invalid base64 payload: {0}")]
    Base64(String),

    /// The escaped text was not valid UTF-8 once unescaped.
    #[error("payload is not valid UTF-8")]
    Utf8,

    /// The JSON layer could not be parsed.
    #[error("invalid payload JSON: {0}")]
    Json(String),

    /// A required field was absent or empty.
    #[error("payload is missing required field '{0}'")]
    MissingField(&'static str),
}

/// A contact as carried in the offline payload: name and phone only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadContact {
    /// Contact name.
    pub name: String,
    /// Phone number.
    pub phone: String,
}

/// The offline payload: the subset of a profile that fits in a QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    /// Full name.
    pub full_name: String,
    /// Blood group label.
    pub blood_group: String,
    /// Allergies in entry order.
    pub allergies: Vec<String>,
    /// Medications in entry order.
    pub medications: Vec<String>,
    /// Contacts in entry order.
    pub contacts: Vec<PayloadContact>,
    /// Organ donor flag.
    pub organ_donor: bool,
}

impl From<&Profile> for QrPayload {
    fn from(profile: &Profile) -> Self {
        Self {
            full_name: profile.full_name.clone(),
            blood_group: profile.blood_group.to_string(),
            allergies: profile.allergies.clone(),
            medications: profile.medications.clone(),
            contacts: profile
                .contacts
                .iter()
                .map(|c| PayloadContact {
                    name: c.name.clone(),
                    phone: c.phone.clone(),
                })
                .collect(),
            organ_donor: profile.organ_donor,
        }
    }
}

impl From<QrPayload> for EmergencyProfile {
    fn from(payload: QrPayload) -> Self {
        Self {
            full_name: payload.full_name,
            blood_group: payload.blood_group,
            dob: None,
            organ_donor: Some(payload.organ_donor),
            insurance: None,
            allergies: payload.allergies,
            medications: payload.medications,
            conditions: Vec::new(),
            contacts: payload
                .contacts
                .into_iter()
                .map(|c| ContactCard {
                    name: c.name,
                    phone: c.phone,
                    relationship: None,
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CompactContact {
    n: String,
    p: String,
}

#[derive(Serialize)]
struct CompactOut<'a> {
    n: &'a str,
    b: &'a str,
    a: &'a [String],
    m: &'a [String],
    c: Vec<CompactContact>,
    od: bool,
}

#[derive(Deserialize)]
struct CompactIn {
    n: Option<String>,
    b: Option<String>,
    #[serde(default)]
    a: Option<Vec<String>>,
    #[serde(default)]
    m: Option<Vec<String>>,
    c: Option<Vec<CompactContact>>,
    #[serde(default)]
    od: Option<bool>,
}

/// Lenient view of a fragment body; required fields are checked afterwards.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FragmentIn {
    full_name: Option<String>,
    blood_group: Option<String>,
    #[serde(default)]
    allergies: Option<Vec<String>>,
    #[serde(default)]
    medications: Option<Vec<String>>,
    contacts: Option<Vec<PayloadContact>>,
    #[serde(default)]
    organ_donor: Option<bool>,
}

/// Encode a profile as the compact text placed directly in a QR code.
#[must_use]
pub fn encode_compact(profile: &Profile) -> String {
    let payload = QrPayload::from(profile);
    let out = CompactOut {
        n: &payload.full_name,
        b: &payload.blood_group,
        a: &payload.allergies,
        m: &payload.medications,
        c: payload
            .contacts
            .iter()
            .map(|c| CompactContact {
                n: c.name.clone(),
                p: c.phone.clone(),
            })
            .collect(),
        od: payload.organ_donor,
    };
    // A struct of strings, lists and bools always serializes.
    serde_json::to_string(&out).unwrap_or_default()
}

/// Decode compact QR text back into a displayable profile.
///
/// # Errors
///
/// Returns a [`CodecError`] if the text is not JSON or lacks the name,
/// blood group or contacts.
pub fn decode_compact(text: &str) -> Result<EmergencyProfile, CodecError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CodecError::Empty);
    }
    let raw: CompactIn = serde_json::from_str(text).map_err(|e| CodecError::Json(e.to_string()))?;
    let payload = QrPayload {
        full_name: require_text(raw.n, "n")?,
        blood_group: require_text(raw.b, "b")?,
        allergies: raw.a.unwrap_or_default(),
        medications: raw.m.unwrap_or_default(),
        contacts: raw
            .c
            .ok_or(CodecError::MissingField("c"))?
            .into_iter()
            .map(|c| PayloadContact {
                name: c.n,
                phone: c.p,
            })
            .collect(),
        organ_donor: raw.od.unwrap_or(false),
    };
    Ok(payload.into())
}

/// Encode a profile as a URL fragment blob: base64 of the URL-escaped JSON.
#[must_use]
pub fn encode_fragment(profile: &Profile) -> String {
    let payload = QrPayload::from(profile);
    let json = serde_json::to_string(&payload).unwrap_or_default();
    let escaped = utf8_percent_encode(&json, COMPONENT).to_string();
    STANDARD.encode(escaped.as_bytes())
}

/// Decode a URL fragment blob produced by [`encode_fragment`].
///
/// A leading `#` is ignored, and a fragment whose base64 characters were
/// themselves percent-escaped in transit is accepted.
///
/// # Errors
///
/// Returns a [`CodecError`] if any layer is malformed, or if the full name,
/// blood group or contacts are missing.
pub fn decode_fragment(fragment: &str) -> Result<EmergencyProfile, CodecError> {
    let fragment = fragment.trim().trim_start_matches('#');
    if fragment.is_empty() {
        return Err(CodecError::Empty);
    }

    // '%' is not in the base64 alphabet, so unescaping first is harmless.
    let blob = percent_decode_str(fragment)
        .decode_utf8()
        .map_err(|_| CodecError::Utf8)?;
    let escaped = STANDARD
        .decode(blob.as_bytes())
        .map_err(|e| CodecError::Base64(e.to_string()))?;
    let escaped = String::from_utf8(escaped).map_err(|_| CodecError::Utf8)?;
    let json = percent_decode_str(&escaped)
        .decode_utf8()
        .map_err(|_| CodecError::Utf8)?;

    let raw: FragmentIn =
        serde_json::from_str(&json).map_err(|e| CodecError::Json(e.to_string()))?;
    let payload = QrPayload {
        full_name: require_text(raw.full_name, "fullName")?,
        blood_group: require_text(raw.blood_group, "bloodGroup")?,
        allergies: raw.allergies.unwrap_or_default(),
        medications: raw.medications.unwrap_or_default(),
        contacts: raw.contacts.ok_or(CodecError::MissingField("contacts"))?,
        organ_donor: raw.organ_donor.unwrap_or(false),
    };
    Ok(payload.into())
}

fn require_text(value: Option<String>, field: &'static str) -> Result<String, CodecError> {
    match value {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(CodecError::MissingField(field)),
    }
}
