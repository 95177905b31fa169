//! Caller languages supported by the voice menu

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A language the caller can choose at the start of a call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Telugu,
}

impl Language {
    /// Every supported language, in menu order
    pub const ALL: [Self; 2] = [Self::English, Self::Telugu];

    /// Language selected by a DTMF digit in the language menu
    #[must_use]
    pub fn from_digit(digit: &str) -> Option<Self> {
        match digit {
            "1" => Some(Self::English),
            "2" => Some(Self::Telugu),
            _ => None,
        }
    }

    /// The other supported language, used as the transcription fallback
    #[must_use]
    pub const fn alternate(self) -> Self {
        match self {
            Self::English => Self::Telugu,
            Self::Telugu => Self::English,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::English => "english",
            Self::Telugu => "telugu",
        }
    }

    /// BCP-47 locale used in voice markup
    #[must_use]
    pub const fn locale(self) -> &'static str {
        match self {
            Self::English => "en-IN",
            Self::Telugu => "te-IN",
        }
    }

    /// ISO-639-1 code passed to speech back ends
    #[must_use]
    pub const fn iso_code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Telugu => "te",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" | "en-in" => Ok(Self::English),
            "telugu" | "te" | "te-in" => Ok(Self::Telugu),
            other => Err(Error::InvalidInput(format!("unsupported language: {other}"))),
        }
    }
}
