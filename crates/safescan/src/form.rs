//! Profile editing.
//!
//! [`ProfileForm`] collects the fields of an emergency profile one at a time,
//! optionally starting from a previously saved profile, and produces a fresh
//! [`Profile`] on submit.

use chrono::{NaiveDate, Utc};

use crate::error::Result;
use crate::profile::{BloodGroup, Contact, Profile};

/// An in-progress emergency profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileForm {
    /// Full name.
    pub full_name: String,
    /// Blood group, if chosen.
    pub blood_group: Option<BloodGroup>,
    /// Date of birth.
    pub dob: Option<NaiveDate>,
    /// Insurance details.
    pub insurance: Option<String>,
    /// Organ donor flag.
    pub organ_donor: bool,
    allergies: Vec<String>,
    medications: Vec<String>,
    contacts: Vec<Contact>,
}

impl ProfileForm {
    /// Start an empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a form prefilled from a saved profile.
    #[must_use]
    pub fn from_saved(profile: &Profile) -> Self {
        Self {
            full_name: profile.full_name.clone(),
            blood_group: Some(profile.blood_group),
            dob: profile.dob,
            insurance: profile.insurance.clone(),
            organ_donor: profile.organ_donor,
            allergies: profile.allergies.clone(),
            medications: profile.medications.clone(),
            contacts: profile.contacts.clone(),
        }
    }

    /// Add an allergy. Blank input is ignored; duplicates are kept.
    ///
    /// Returns whether anything was added.
    pub fn add_allergy(&mut self, allergy: &str) -> bool {
        push_trimmed(&mut self.allergies, allergy)
    }

    /// Add a medication. Blank input is ignored; duplicates are kept.
    ///
    /// Returns whether anything was added.
    pub fn add_medication(&mut self, medication: &str) -> bool {
        push_trimmed(&mut self.medications, medication)
    }

    /// Add a contact if both name and phone are non-blank.
    ///
    /// Returns whether the contact was added.
    pub fn add_contact(&mut self, name: &str, phone: &str, relationship: Option<&str>) -> bool {
        let name = name.trim();
        let phone = phone.trim();
        if name.is_empty() || phone.is_empty() {
            return false;
        }
        let relationship = relationship
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(ToString::to_string);
        self.contacts.push(Contact {
            name: name.to_string(),
            phone: phone.to_string(),
            relationship,
        });
        true
    }

    /// Remove the contact at `index`, returning it if it existed.
    pub fn remove_contact(&mut self, index: usize) -> Option<Contact> {
        (index < self.contacts.len()).then(|| self.contacts.remove(index))
    }

    /// Allergies entered so far.
    #[must_use]
    pub fn allergies(&self) -> &[String] {
        &self.allergies
    }

    /// Medications entered so far.
    #[must_use]
    pub fn medications(&self) -> &[String] {
        &self.medications
    }

    /// Contacts entered so far.
    #[must_use]
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Whether the form can be submitted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.full_name.trim().is_empty() && self.blood_group.is_some() && !self.contacts.is_empty()
    }

    /// Build the profile, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidProfile`] if a required field is missing.
    pub fn submit(self) -> Result<Profile> {
        let Some(blood_group) = self.blood_group else {
            return Err(crate::Error::invalid_profile("blood group is required"));
        };
        let profile = Profile {
            full_name: self.full_name.trim().to_string(),
            blood_group,
            dob: self.dob,
            insurance: self.insurance.filter(|s| !s.trim().is_empty()),
            organ_donor: self.organ_donor,
            allergies: self.allergies,
            medications: self.medications,
            contacts: self.contacts,
            created_at: Utc::now(),
        };
        profile.validate()?;
        Ok(profile)
    }
}

fn push_trimmed(list: &mut Vec<String>, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    list.push(value.to_string());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> ProfileForm {
        let mut form = ProfileForm::new();
        form.full_name = "Jane Doe".into();
        form.blood_group = Some(BloodGroup::ONegative);
        form.add_contact("Sam", "555-1234", None);
        form
    }

    #[test]
    fn test_empty_form_is_invalid() {
        assert!(!ProfileForm::new().is_valid());
    }

    #[test]
    fn test_add_allergy_trims_and_ignores_blank() {
        let mut form = ProfileForm::new();
        assert!(form.add_allergy("  Penicillin "));
        assert!(!form.add_allergy("   "));
        assert!(form.add_allergy("Penicillin"));
        assert_eq!(form.allergies(), ["Penicillin", "Penicillin"]);
    }

    #[test]
    fn test_add_medication_keeps_order() {
        let mut form = ProfileForm::new();
        form.add_medication("Metformin");
        form.add_medication("Aspirin");
        assert_eq!(form.medications(), ["Metformin", "Aspirin"]);
    }

    #[test]
    fn test_add_contact_requires_name_and_phone() {
        let mut form = ProfileForm::new();
        assert!(!form.add_contact("Sam", " ", None));
        assert!(!form.add_contact("", "555", None));
        assert!(form.add_contact("Sam", "555", Some("  ")));
        assert_eq!(form.contacts()[0].relationship, None);
        assert!(form.add_contact("Ana", "556", Some("Sister")));
        assert_eq!(form.contacts()[1].relationship.as_deref(), Some("Sister"));
    }

    #[test]
    fn test_remove_contact() {
        let mut form = filled();
        form.add_contact("Ana", "556", None);
        assert_eq!(form.remove_contact(0).unwrap().name, "Sam");
        assert!(form.remove_contact(5).is_none());
        assert_eq!(form.contacts().len(), 1);
    }

    #[test]
    fn test_submit_builds_profile() {
        let mut form = filled();
        form.insurance = Some("  ".into());
        let profile = form.submit().unwrap();
        assert_eq!(profile.full_name, "Jane Doe");
        assert_eq!(profile.blood_group, BloodGroup::ONegative);
        assert!(profile.insurance.is_none());
        assert!(profile.is_valid());
    }

    #[test]
    fn test_submit_without_blood_group_fails() {
        let mut form = filled();
        form.blood_group = None;
        assert!(!form.is_valid());
        assert!(form.submit().is_err());
    }

    #[test]
    fn test_submit_without_contacts_fails() {
        let mut form = filled();
        form.remove_contact(0);
        assert!(form.submit().is_err());
    }

    #[test]
    fn test_from_saved_prefills_everything() {
        let mut form = filled();
        form.add_allergy("Latex");
        let saved = form.submit().unwrap();

        let mut again = ProfileForm::from_saved(&saved);
        assert!(again.is_valid());
        again.add_allergy("Peanuts");
        let resaved = again.submit().unwrap();
        assert_eq!(resaved.allergies, ["Latex", "Peanuts"]);
        assert!(resaved.created_at >= saved.created_at);
    }
}
