//! Sharing the profile as text, and `tel:` links for calling contacts.

use clipboard_rs::{Clipboard, ClipboardContext};
use tracing::debug;

use crate::error::{Error, Result};
use crate::profile::Profile;

/// A contact reachable with one tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialLink {
    /// Who is called.
    pub name: String,
    /// The `tel:` URI.
    pub href: String,
}

/// A `tel:` URI for `phone`, keeping only dialable characters.
#[must_use]
pub fn tel_href(phone: &str) -> String {
    let digits: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '+' | '*' | '#'))
        .collect();
    format!("tel:{digits}")
}

/// The plain text summary shared with others.
#[must_use]
pub fn share_text(profile: &Profile) -> String {
    let mut text = format!(
        "🚨 Emergency Profile - {}\nBlood: {}\n",
        profile.full_name, profile.blood_group
    );
    if !profile.allergies.is_empty() {
        text.push_str(&format!("Allergies: {}\n", profile.allergies.join(", ")));
    }
    let contacts: Vec<String> = profile
        .contacts
        .iter()
        .map(|c| format!("📞 {}: {}", c.name, c.phone))
        .collect();
    text.push_str(&contacts.join("\n"));
    text
}

/// Dial links for every emergency contact, in order.
#[must_use]
pub fn dial_links(profile: &Profile) -> Vec<DialLink> {
    profile
        .contacts
        .iter()
        .map(|c| DialLink {
            name: c.name.clone(),
            href: tel_href(&c.phone),
        })
        .collect()
}

/// Put `text` on the system clipboard.
///
/// # Errors
///
/// Returns [`Error::Clipboard`] if the clipboard cannot be reached.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let ctx = ClipboardContext::new().map_err(|e| Error::clipboard(e.to_string()))?;
    ctx.set_text(text.to_string())
        .map_err(|e| Error::clipboard(e.to_string()))?;
    debug!("Copied {} bytes to the clipboard", text.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{BloodGroup, Contact};

    fn jane() -> Profile {
        Profile::new(
            "Jane Doe",
            BloodGroup::ONegative,
            vec![
                Contact::new("Sam", "555-1234"),
                Contact::new("Ana", "+1 (555) 987 6543"),
            ],
        )
    }

    #[test]
    fn test_share_text_without_allergies() {
        let text = share_text(&jane());
        assert_eq!(
            text,
            "🚨 Emergency Profile - Jane Doe\nBlood: O-\n📞 Sam: 555-1234\n📞 Ana: +1 (555) 987 6543"
        );
    }

    #[test]
    fn test_share_text_with_allergies() {
        let mut profile = jane();
        profile.allergies = vec!["Peanuts".into(), "Latex".into()];
        let text = share_text(&profile);
        assert!(text.contains("Blood: O-\nAllergies: Peanuts, Latex\n📞 Sam"));
    }

    #[test]
    fn test_dial_links() {
        let links = dial_links(&jane());
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].href, "tel:5551234");
        assert_eq!(links[1].name, "Ana");
        assert_eq!(links[1].href, "tel:+15559876543");
    }

    #[test]
    fn test_tel_href_emergency_number() {
        assert_eq!(tel_href("108"), "tel:108");
    }
}
