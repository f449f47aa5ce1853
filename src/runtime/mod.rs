//! Supported runtime registry
//!
//! A [`RuntimeId`] ties a [`LanguageId`] to one concrete version. The set is
//! closed: anything not listed here is rejected during validation, before a
//! delegate method ever runs.

#[macro_use]
pub mod id_enum_macro;

use crate::error::DelegateError;

crate::define_id_enum! {
    /// Language ecosystem that can own a functions source directory
    LanguageId {
        Node => "nodejs" : "Node.js" | "node",
        Python => "python" : "Python",
        Dart => "dart" : "Dart",
    }
}

crate::define_id_enum! {
    /// Concrete runtime a source directory is deployed to
    RuntimeId {
        Nodejs18 => "nodejs18" : "Node.js 18",
        Nodejs20 => "nodejs20" : "Node.js 20",
        Nodejs22 => "nodejs22" : "Node.js 22",
        Python310 => "python310" : "Python 3.10",
        Python311 => "python311" : "Python 3.11",
        Python312 => "python312" : "Python 3.12",
        Python313 => "python313" : "Python 3.13",
        Dart3 => "dart3" : "Dart 3",
    }
}

impl RuntimeId {
    pub fn language(&self) -> LanguageId {
        match self {
            Self::Nodejs18 | Self::Nodejs20 | Self::Nodejs22 => LanguageId::Node,
            Self::Python310 | Self::Python311 | Self::Python312 | Self::Python313 => {
                LanguageId::Python
            }
            Self::Dart3 => LanguageId::Dart,
        }
    }

    /// Still deployable, but scheduled for removal
    pub fn is_deprecated(&self) -> bool {
        matches!(self, Self::Nodejs18 | Self::Python310)
    }

    /// Newest runtime of the given language.
    pub fn latest(language: LanguageId) -> RuntimeId {
        Self::all_variants()
            .iter()
            .copied()
            .filter(|r| r.language() == language)
            .max()
            .unwrap_or(match language {
                LanguageId::Node => Self::Nodejs22,
                LanguageId::Python => Self::Python313,
                LanguageId::Dart => Self::Dart3,
            })
    }

    /// Parses a declared runtime string against the registry.
    pub fn parse_supported(value: &str) -> Result<RuntimeId, DelegateError> {
        Self::from_name(value.trim()).ok_or_else(|| DelegateError::UnsupportedRuntime {
            runtime: value.to_string(),
            supported: Self::all_variants()
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
        })
    }
}
