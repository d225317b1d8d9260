//! Supported languages and translation routing
//!
//! English is the hub: it translates into every other supported language,
//! and every other language translates only into English.

use crate::error::QuickTransError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel meaning "let the speech engine detect the language"
pub const AUTO_DETECT: &str = "auto";

/// Language codes accepted by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Zh,
    En,
    Ja,
    Ko,
    Fr,
    De,
    Es,
}

impl Language {
    /// All supported languages, in display order
    pub const ALL: [Language; 7] = [
        Language::Zh,
        Language::En,
        Language::Ja,
        Language::Ko,
        Language::Fr,
        Language::De,
        Language::Es,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
            Self::Ja => "ja",
            Self::Ko => "ko",
            Self::Fr => "fr",
            Self::De => "de",
            Self::Es => "es",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Zh => "Chinese",
            Self::En => "English",
            Self::Ja => "Japanese",
            Self::Ko => "Korean",
            Self::Fr => "French",
            Self::De => "German",
            Self::Es => "Spanish",
        }
    }

    /// Languages this one can be translated into
    pub fn targets(&self) -> &'static [Language] {
        match self {
            Self::En => &[
                Language::Zh,
                Language::Ja,
                Language::Ko,
                Language::Fr,
                Language::De,
                Language::Es,
            ],
            _ => &[Language::En],
        }
    }

    /// Parse a code, returning a validation error for anything unsupported
    pub fn parse(code: &str) -> Result<Self, QuickTransError> {
        code.parse()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = QuickTransError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .iter()
            .copied()
            .find(|lang| lang.code() == s)
            .ok_or_else(|| QuickTransError::validation(format!("Unsupported language code: {}", s)))
    }
}

/// Ordered (source, target) pair; the cache key for translator instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LanguagePair {
    pub source: Language,
    pub target: Language,
}

impl LanguagePair {
    /// Build a pair, rejecting combinations absent from the routing table
    pub fn new(source: Language, target: Language) -> Result<Self, QuickTransError> {
        if source.targets().contains(&target) {
            Ok(Self { source, target })
        } else {
            Err(QuickTransError::unsupported_pair(source.code(), target.code()))
        }
    }

    /// Resolve a pair from raw codes.
    ///
    /// Unknown codes are validation errors; known codes without a route are
    /// `UnsupportedLanguagePair`.
    pub fn from_codes(source: &str, target: &str) -> Result<Self, QuickTransError> {
        let source = Language::parse(source)?;
        let target = Language::parse(target)?;
        Self::new(source, target)
    }

    /// Like `from_codes`, but codes outside the supported set are also
    /// reported as an unsupported pair (used for engine-detected languages)
    pub fn route(source: &str, target: &str) -> Result<Self, QuickTransError> {
        match (source.parse::<Language>(), target.parse::<Language>()) {
            (Ok(source), Ok(target)) => Self::new(source, target),
            _ => Err(QuickTransError::unsupported_pair(source, target)),
        }
    }

    /// Every routable pair
    pub fn all() -> Vec<LanguagePair> {
        Language::ALL
            .iter()
            .flat_map(|source| {
                source.targets().iter().map(move |target| LanguagePair {
                    source: *source,
                    target: *target,
                })
            })
            .collect()
    }

    /// Backing OPUS-MT model identifier
    pub fn model_id(&self) -> String {
        format!("Helsinki-NLP/opus-mt-{}-{}", self.source, self.target)
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_table_has_twelve_pairs() {
        let pairs = LanguagePair::all();
        assert_eq!(pairs.len(), 12);
        assert!(pairs.iter().all(|p| p.source == Language::En || p.target == Language::En));
    }

    #[test]
    fn test_hub_routes() {
        assert!(LanguagePair::from_codes("zh", "en").is_ok());
        assert!(LanguagePair::from_codes("en", "es").is_ok());
        assert!(LanguagePair::from_codes("fr", "en").is_ok());
    }

    #[test]
    fn test_non_hub_pairs_rejected() {
        let err = LanguagePair::from_codes("zh", "ja").unwrap_err();
        assert!(matches!(err, QuickTransError::UnsupportedLanguagePair { .. }));

        let err = LanguagePair::from_codes("en", "en").unwrap_err();
        assert!(matches!(err, QuickTransError::UnsupportedLanguagePair { .. }));
    }

    #[test]
    fn test_unknown_code_is_validation_error() {
        let err = LanguagePair::from_codes("xx", "en").unwrap_err();
        assert!(matches!(err, QuickTransError::Validation(_)));
    }

    #[test]
    fn test_route_treats_unknown_detected_language_as_unsupported_pair() {
        let err = LanguagePair::route("it", "en").unwrap_err();
        assert!(matches!(err, QuickTransError::UnsupportedLanguagePair { .. }));
    }

    #[test]
    fn test_model_id() {
        let pair = LanguagePair::from_codes("zh", "en").unwrap();
        assert_eq!(pair.model_id(), "Helsinki-NLP/opus-mt-zh-en");
        assert_eq!(pair.to_string(), "zh-en");
    }
}
