//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};

use crate::config::MAX_TOKEN_TTL_HOURS;
use crate::profile::{BloodGroup, Contact};
use crate::qr::{ErrorCorrection, QrMode};

/// Profile management commands.
#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    /// Show the saved profile
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Replace the saved profile
    Set(SetProfileArgs),

    /// Add an emergency contact
    AddContact {
        /// Contact name
        name: String,
        /// Phone number
        phone: String,
        /// Relationship to you
        #[arg(short, long)]
        relationship: Option<String>,
    },

    /// Remove an emergency contact by its number in `profile show`
    RemoveContact {
        /// Contact number, starting at 1
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        index: u16,
    },

    /// Add an allergy
    AddAllergy {
        /// Allergy to add
        allergy: String,
    },

    /// Add a medication
    AddMedication {
        /// Medication to add
        medication: String,
    },
}

/// Arguments for `profile set`.
#[derive(Debug, Args)]
pub struct SetProfileArgs {
    /// Full name
    #[arg(short, long)]
    pub name: String,

    /// Blood group, e.g. "O-" or "AB+"
    #[arg(short, long)]
    pub blood_group: BloodGroup,

    /// Date of birth (YYYY-MM-DD)
    #[arg(long)]
    pub dob: Option<NaiveDate>,

    /// Insurance provider and policy
    #[arg(long)]
    pub insurance: Option<String>,

    /// Registered organ donor
    #[arg(long)]
    pub organ_donor: bool,

    /// Allergy (repeatable)
    #[arg(short, long = "allergy")]
    pub allergies: Vec<String>,

    /// Medication (repeatable)
    #[arg(short, long = "medication")]
    pub medications: Vec<String>,

    /// Emergency contact as "Name:Phone[:Relationship]" (repeatable, at least one)
    #[arg(long = "contact", required = true, value_parser = parse_contact)]
    pub contacts: Vec<Contact>,
}

/// Publish command arguments.
#[derive(Debug, Args)]
pub struct PublishCommand {
    /// Token lifetime in hours, at most one year (defaults to `service.token_ttl_hours`)
    #[arg(
        long,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_TOKEN_TTL_HOURS))
    )]
    pub ttl_hours: Option<u32>,
}

/// Link command arguments.
#[derive(Debug, Args)]
pub struct LinkCommand {
    /// Only embed the offline profile, without issuing a token
    #[arg(long)]
    pub offline: bool,
}

/// QR command arguments.
#[derive(Debug, Args)]
pub struct QrCommand {
    /// Barcode content (defaults to `qr.mode`)
    #[arg(short, long, value_enum)]
    pub mode: Option<QrMode>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "terminal")]
    pub format: QrFormat,

    /// Write to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Minimum SVG size in pixels (defaults to `qr.size`)
    #[arg(short, long)]
    pub size: Option<u32>,

    /// Error correction level (defaults to `qr.error_correction`)
    #[arg(short, long = "ec", value_enum, ignore_case = true)]
    pub error_correction: Option<ErrorCorrection>,

    /// Linked mode without issuing a token
    #[arg(long)]
    pub offline: bool,
}

/// Resolve command arguments.
#[derive(Debug, Args)]
pub struct ResolveCommand {
    /// Scanned link, absolute or a bare path like "/emergency?token=…#…"
    pub url: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to listen on (defaults to `server.bind_address`)
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Scans command arguments.
#[derive(Debug, Args)]
pub struct ScansCommand {
    /// Maximum number of scans to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Share command arguments.
#[derive(Debug, Args)]
pub struct ShareCommand {
    /// Copy to the clipboard instead of printing
    #[arg(long)]
    pub clipboard: bool,
}

/// SOS command arguments.
#[derive(Debug, Args)]
pub struct SosCommand {
    /// Seconds before SOS activates; Ctrl-C cancels
    #[arg(long, default_value = "5")]
    pub countdown: u64,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// QR output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum QrFormat {
    /// Unicode blocks for a terminal
    #[default]
    Terminal,
    /// SVG document
    Svg,
    /// The encoded text only
    Text,
}

/// Parse `Name:Phone[:Relationship]`.
fn parse_contact(raw: &str) -> Result<Contact, String> {
    let mut parts = raw.splitn(3, ':').map(str::trim);
    let name = parts.next().unwrap_or_default();
    let phone = parts.next().unwrap_or_default();
    if name.is_empty() || phone.is_empty() {
        return Err(format!(
            "expected \"Name:Phone[:Relationship]\", got \"{raw}\""
        ));
    }
    let contact = Contact::new(name, phone);
    Ok(match parts.next().filter(|r| !r.is_empty()) {
        Some(relationship) => contact.with_relationship(relationship),
        None => contact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_contact() {
        let contact = parse_contact("Sam:555-1234").unwrap();
        assert_eq!(contact, Contact::new("Sam", "555-1234"));

        let contact = parse_contact(" Ana : +1 555 : Sister ").unwrap();
        assert_eq!(contact.name, "Ana");
        assert_eq!(contact.phone, "+1 555");
        assert_eq!(contact.relationship.as_deref(), Some("Sister"));
    }

    #[test]
    fn test_parse_contact_rejects_missing_parts() {
        assert!(parse_contact("Sam").is_err());
        assert!(parse_contact("Sam:").is_err());
        assert!(parse_contact(":555").is_err());
    }

    #[test]
    fn test_qr_format_default() {
        assert_eq!(QrFormat::default(), QrFormat::Terminal);
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
