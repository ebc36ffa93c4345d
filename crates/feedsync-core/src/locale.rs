//! Currencies and languages the marketplace accepts.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Currencies the marketplace lists prices in. Anything else is skipped
/// during store discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Aed,
    Bhd,
    Kwd,
    Sar,
    Qar,
}

impl Currency {
    pub const ALL: [Currency; 5] = [
        Currency::Aed,
        Currency::Bhd,
        Currency::Kwd,
        Currency::Sar,
        Currency::Qar,
    ];

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Currency::Aed => "AED",
            Currency::Bhd => "BHD",
            Currency::Kwd => "KWD",
            Currency::Sar => "SAR",
            Currency::Qar => "QAR",
        }
    }

    /// ISO 4217 minor units. Bahraini and Kuwaiti dinars use fils (1/1000).
    #[must_use]
    pub fn minor_units(self) -> u32 {
        match self {
            Currency::Bhd | Currency::Kwd => 3,
            Currency::Aed | Currency::Sar | Currency::Qar => 2,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|c| c.code() == s)
            .ok_or_else(|| CoreError::UnsupportedCurrency(s.to_string()))
    }
}

/// Feed languages. Each language gets its own text block in a feed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Eng,
    Ara,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Eng, Language::Ara];

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Language::Eng => "eng",
            Language::Ara => "ara",
        }
    }

    /// Maps a catalog locale such as `ar_SA` or `en_US` to a feed language.
    ///
    /// Only the first two characters are considered; unrecognized locales
    /// fall back to [`Language::Eng`].
    #[must_use]
    pub fn from_locale(locale: &str) -> Self {
        match locale.get(..2) {
            Some("ar") => Language::Ara,
            _ => Language::Eng,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|l| l.code() == s)
            .ok_or_else(|| CoreError::UnknownLanguage(s.to_string()))
    }
}
