//! `safescan` - Emergency medical profiles behind a QR code
//!
//! A profile is kept in a local store, published behind expiring tokens,
//! and carried in a QR link that also embeds an offline copy. A responder's
//! scan is resolved online when possible and from the embedded copy
//! otherwise.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod form;
pub mod logging;
pub mod profile;
pub mod qr;
pub mod resolver;
pub mod service;
pub mod share;
pub mod storage;
pub mod view;

pub use codec::{decode_compact, decode_fragment, encode_compact, encode_fragment, CodecError};
pub use config::Config;
pub use error::{Error, Result};
pub use form::ProfileForm;
pub use logging::init_logging;
pub use profile::{BloodGroup, Contact, EmergencyProfile, Profile};
pub use qr::{QrContent, QrMode, QrOptions, ShareLink};
pub use resolver::{EmergencyResolver, FailureReason, Resolution, ResolverState, ScanInput};
pub use service::{HttpResolutionService, LocalResolutionService, LookupError, ResolutionService};
pub use storage::{ProfileRepository, Storage, StorageStats};
