//! Terminal rendering of a resolved profile for a responder.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::DisplayConfig;
use crate::profile::EmergencyProfile;
use crate::share::tel_href;

/// Search link for the nearest hospital.
pub const HOSPITAL_SEARCH_URL: &str = "https://www.google.com/maps/search/hospital+near+me";

/// What a responder sees after a successful resolution.
#[derive(Debug, Clone)]
pub struct EmergencyCard<'a> {
    profile: &'a EmergencyProfile,
    display: &'a DisplayConfig,
    now: DateTime<Utc>,
}

impl<'a> EmergencyCard<'a> {
    /// A card for `profile` as of now.
    #[must_use]
    pub fn new(profile: &'a EmergencyProfile, display: &'a DisplayConfig) -> Self {
        Self::at(profile, display, Utc::now())
    }

    /// A card for `profile`, computing the age at `now`.
    #[must_use]
    pub fn at(profile: &'a EmergencyProfile, display: &'a DisplayConfig, now: DateTime<Utc>) -> Self {
        Self {
            profile,
            display,
            now,
        }
    }

    /// `DOB: 14 October 2014 · 10 yrs`, or nothing without a date of birth.
    #[must_use]
    pub fn dob_line(&self) -> Option<String> {
        let dob = self.profile.dob_date()?;
        let age = self.profile.age_at(self.now).unwrap_or_default();
        Some(format!("DOB: {} · {} yrs", dob.format("%-d %B %Y"), age))
    }
}

impl fmt::Display for EmergencyCard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.profile;
        writeln!(f, "🚨 Emergency Profile")?;
        writeln!(f, "SafeScan Emergency Access")?;
        writeln!(f)?;
        writeln!(f, "{}", p.full_name)?;
        if let Some(line) = self.dob_line() {
            writeln!(f, "{line}")?;
        }
        writeln!(f)?;
        writeln!(f, "Blood group: {}", p.blood_group)?;
        if !p.allergies.is_empty() {
            writeln!(f, "Allergies:   {}", p.allergies.join(", "))?;
        }
        if !p.medications.is_empty() {
            writeln!(f, "Medications: {}", p.medications.join(", "))?;
        }
        if !p.conditions.is_empty() {
            writeln!(f, "Conditions:  {}", p.conditions.join(", "))?;
        }
        if p.organ_donor == Some(true) {
            writeln!(f, "Organ donor")?;
        }
        if let Some(insurance) = p.insurance.as_deref().filter(|i| !i.trim().is_empty()) {
            writeln!(f, "Insurance:   {insurance}")?;
        }

        writeln!(f)?;
        writeln!(f, "Emergency contacts")?;
        for contact in &p.contacts {
            match contact.relationship.as_deref().filter(|r| !r.is_empty()) {
                Some(rel) => writeln!(
                    f,
                    "  {} ({} · {})  {}",
                    contact.name,
                    rel,
                    contact.phone,
                    tel_href(&contact.phone)
                )?,
                None => writeln!(
                    f,
                    "  {} ({})  {}",
                    contact.name,
                    contact.phone,
                    tel_href(&contact.phone)
                )?,
            }
        }

        writeln!(f)?;
        writeln!(f, "Emergency services")?;
        writeln!(f, "  Nearest hospital  {HOSPITAL_SEARCH_URL}")?;
        writeln!(
            f,
            "  Ambulance         {}",
            tel_href(&self.display.ambulance_number)
        )?;
        write!(f, "  Police            {}", tel_href(&self.display.police_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ContactCard;
    use chrono::TimeZone;

    fn profile() -> EmergencyProfile {
        EmergencyProfile {
            full_name: "Jane Doe".into(),
            blood_group: "O-".into(),
            dob: Some("2014-10-14".into()),
            organ_donor: Some(true),
            insurance: Some("ACME 123".into()),
            allergies: vec!["Peanuts".into()],
            medications: vec![],
            conditions: vec!["Asthma".into()],
            contacts: vec![ContactCard {
                name: "Sam".into(),
                phone: "555-1234".into(),
                relationship: Some("Brother".into()),
            }],
        }
    }

    #[test]
    fn test_dob_line_on_birthday() {
        let display = DisplayConfig::default();
        let profile = profile();
        let now = Utc.with_ymd_and_hms(2024, 10, 14, 9, 0, 0).unwrap();
        let card = EmergencyCard::at(&profile, &display, now);
        assert_eq!(card.dob_line().unwrap(), "DOB: 14 October 2014 · 10 yrs");
    }

    #[test]
    fn test_card_contents() {
        let display = DisplayConfig::default();
        let profile = profile();
        let now = Utc.with_ymd_and_hms(2024, 10, 13, 9, 0, 0).unwrap();
        let text = EmergencyCard::at(&profile, &display, now).to_string();

        assert!(text.contains("Jane Doe"));
        assert!(text.contains("· 9 yrs"));
        assert!(text.contains("Blood group: O-"));
        assert!(text.contains("Allergies:   Peanuts"));
        assert!(!text.contains("Medications"));
        assert!(text.contains("Conditions:  Asthma"));
        assert!(text.contains("Organ donor"));
        assert!(text.contains("Insurance:   ACME 123"));
        assert!(text.contains("Sam (Brother · 555-1234)  tel:5551234"));
        assert!(text.contains("tel:108"));
        assert!(text.contains("tel:100"));
    }

    #[test]
    fn test_card_without_dob() {
        let display = DisplayConfig::default();
        let mut profile = profile();
        profile.dob = None;
        let card = EmergencyCard::new(&profile, &display);
        assert!(card.dob_line().is_none());
        assert!(!card.to_string().contains("DOB"));
    }
}
