//! QR carrier: what goes into the barcode, and rendering it.
//!
//! Two kinds of content exist. A link (`<view>?token=<token>#<fragment>`)
//! tries the resolution service first and always carries the offline
//! fragment. Compact content is the short-key JSON payload itself, readable
//! by any generic scanner without a network.

use std::fmt;

use clap::ValueEnum;
use qrcode::render::{svg, unicode};
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::codec::{encode_compact, encode_fragment};
use crate::error::Result;
use crate::profile::Profile;

/// Redundancy level of the barcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ErrorCorrection {
    /// About 7% recoverable.
    L,
    /// About 15% recoverable.
    #[default]
    M,
    /// About 25% recoverable.
    Q,
    /// About 30% recoverable.
    H,
}

impl From<ErrorCorrection> for EcLevel {
    fn from(level: ErrorCorrection) -> Self {
        match level {
            ErrorCorrection::L => EcLevel::L,
            ErrorCorrection::M => EcLevel::M,
            ErrorCorrection::Q => EcLevel::Q,
            ErrorCorrection::H => EcLevel::H,
        }
    }
}

/// Which content to put in the barcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QrMode {
    /// A link carrying a token (when available) and the offline fragment.
    #[default]
    Linked,
    /// The compact payload, no link.
    Direct,
}

impl fmt::Display for QrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Linked => "linked",
            Self::Direct => "direct",
        })
    }
}

/// Rendering options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrOptions {
    /// Minimum width and height of SVG output, in pixels.
    pub size: u32,
    /// Redundancy level.
    pub error_correction: ErrorCorrection,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            size: 200,
            error_correction: ErrorCorrection::M,
        }
    }
}

/// Builds the emergency view link.
#[derive(Debug, Clone, Copy)]
pub struct ShareLink;

impl ShareLink {
    /// `<view_url>?token=<token>#<fragment>`, omitting the token when absent.
    #[must_use]
    pub fn build(view_url: &Url, token: Option<&str>, fragment: &str) -> Url {
        let mut url = view_url.clone();
        url.set_fragment(None);
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            url.query_pairs_mut().append_pair("token", token);
        }
        url.set_fragment(Some(fragment));
        url
    }

    /// The link for `profile`, with its fragment encoded.
    #[must_use]
    pub fn for_profile(view_url: &Url, token: Option<&str>, profile: &Profile) -> Url {
        Self::build(view_url, token, &encode_fragment(profile))
    }
}

/// The text encoded in a barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrContent {
    /// An emergency view link.
    Link(Url),
    /// The compact JSON payload.
    Compact(String),
}

impl QrContent {
    /// Build content for `profile` in the given mode. `token` is only used
    /// by [`QrMode::Linked`].
    #[must_use]
    pub fn for_profile(profile: &Profile, mode: QrMode, view_url: &Url, token: Option<&str>) -> Self {
        match mode {
            QrMode::Linked => Self::Link(ShareLink::for_profile(view_url, token, profile)),
            QrMode::Direct => Self::Compact(encode_compact(profile)),
        }
    }

    /// The encoded text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Link(url) => url.as_str(),
            Self::Compact(text) => text,
        }
    }

    fn code(&self, options: &QrOptions) -> Result<QrCode> {
        debug!(
            "Encoding {} bytes at error correction {:?}",
            self.as_str().len(),
            options.error_correction
        );
        Ok(QrCode::with_error_correction_level(
            self.as_str(),
            options.error_correction.into(),
        )?)
    }

    /// Render as an SVG document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Qr`] if the content does not fit in a QR code.
    pub fn render_svg(&self, options: &QrOptions) -> Result<String> {
        Ok(self
            .code(options)?
            .render::<svg::Color<'_>>()
            .min_dimensions(options.size, options.size)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build())
    }

    /// Render with Unicode half blocks for a terminal.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Qr`] if the content does not fit in a QR code.
    pub fn render_terminal(&self, options: &QrOptions) -> Result<String> {
        Ok(self
            .code(options)?
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .quiet_zone(true)
            .build())
    }
}

impl fmt::Display for QrContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
