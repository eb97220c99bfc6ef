//! Client character sets.
//!
//! Connections always talk UTF-8 to the driver and let the server convert
//! to its own character set. The configured label only restricts which
//! characters may appear in query text.

use crate::error::{Result, RunnerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Latin1,
    Ascii,
}

impl Charset {
    /// Parses a charset label, accepting the common aliases.
    pub fn parse(label: &str) -> Result<Self> {
        let normalized = label.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "iso-8859-1" | "iso8859-1" | "iso-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            "ascii" | "us-ascii" => Ok(Self::Ascii),
            _ => Err(RunnerError::configuration(format!(
                "unsupported character set '{label}'"
            ))),
        }
    }

    /// Client charset every connection is opened with.
    pub const WIRE: Charset = Charset::Utf8;

    /// Charset name as Sybase-style drivers expect it.
    pub fn driver_name(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Latin1 => "iso_1",
            Self::Ascii => "ascii_8",
        }
    }

    /// Checks that `text` can be represented in this charset.
    ///
    /// Returns the text unchanged; it is sent in [`Charset::WIRE`].
    pub fn check<'t>(&self, text: &'t str) -> Result<&'t str> {
        let limit = match self {
            Self::Utf8 => return Ok(text),
            Self::Latin1 => 0xFF,
            Self::Ascii => 0x7F,
        };

        match text.chars().find(|c| (*c as u32) > limit) {
            Some(c) => Err(RunnerError::query(format!(
                "query text contains '{c}', which cannot be encoded as {}",
                self.driver_name()
            ))),
            None => Ok(text),
        }
    }
}
