//! Command-line interface for safescan.
//!
//! This module provides the CLI structure for the `safescan` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, LinkCommand, ProfileCommand, PublishCommand, QrCommand, QrFormat,
    ResolveCommand, ScansCommand, ServeCommand, SetProfileArgs, ShareCommand, SosCommand,
    StatusCommand,
};

/// safescan - Emergency medical profiles behind a QR code
///
/// Keeps one emergency profile, publishes it behind expiring tokens, and
/// resolves scanned links online with an offline fallback.
#[derive(Debug, Parser)]
#[command(name = "safescan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// View or edit the emergency profile
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Publish the profile and issue a scan token
    Publish(PublishCommand),

    /// Print the emergency view link
    Link(LinkCommand),

    /// Render the emergency QR code
    Qr(QrCommand),

    /// Resolve a scanned link as a responder would
    Resolve(ResolveCommand),

    /// Serve the token lookup endpoint
    Serve(ServeCommand),

    /// List recent scans of the profile
    Scans(ScansCommand),

    /// Show profile and store status
    Status(StatusCommand),

    /// Share the profile as text
    Share(ShareCommand),

    /// Activate SOS mode and list who to call
    Sos(SosCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
