//! Two-locale text values resolved at read time.
//!
//! Persisted entities carry every user-facing string in both the primary and
//! the alternate locale. [`Localized`] keeps the pair together and
//! [`LocaleConfig`] maps a request's locale code onto one side of it.

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Which half of a [`Localized`] pair to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    Primary,
    Alternate,
}

/// A value available in the primary and the alternate locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localized<T> {
    pub primary: T,
    pub alternate: T,
}

impl<T> Localized<T> {
    pub fn new(primary: T, alternate: T) -> Self {
        Self { primary, alternate }
    }

    /// Borrow the variant for `lang`.
    pub fn get(&self, lang: Lang) -> &T {
        match lang {
            Lang::Primary => &self.primary,
            Lang::Alternate => &self.alternate,
        }
    }
}

impl Localized<String> {
    /// Resolve to the text for `lang`.
    ///
    /// An empty alternate falls back to the primary text.
    pub fn resolve(&self, lang: Lang) -> &str {
        match lang {
            Lang::Alternate if !self.alternate.trim().is_empty() => &self.alternate,
            _ => &self.primary,
        }
    }
}

/// Locale codes the deployment serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleConfig {
    pub primary: String,
    pub alternate: String,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            primary: defaults::PRIMARY_LOCALE.to_string(),
            alternate: defaults::ALTERNATE_LOCALE.to_string(),
        }
    }
}

impl LocaleConfig {
    pub fn new(primary: impl Into<String>, alternate: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            alternate: alternate.into(),
        }
    }

    /// Map a client locale code (`"ar"`, `"ar-EG"`, `"EN"`) to a [`Lang`].
    ///
    /// Matching uses the language subtag, case-insensitively. Unknown or
    /// missing codes resolve to [`Lang::Primary`].
    pub fn lang_for(&self, code: Option<&str>) -> Lang {
        let Some(code) = code else {
            return Lang::Primary;
        };
        let language = code
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .trim();
        if language.eq_ignore_ascii_case(&self.alternate) {
            Lang::Alternate
        } else {
            Lang::Primary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(primary: &str, alternate: &str) -> Localized<String> {
        Localized::new(primary.to_string(), alternate.to_string())
    }

    #[test]
    fn test_resolve_picks_requested_side() {
        let title = pair("New article", "مقال جديد");
        assert_eq!(title.resolve(Lang::Primary), "New article");
        assert_eq!(title.resolve(Lang::Alternate), "مقال جديد");
    }

    #[test]
    fn test_resolve_empty_alternate_falls_back() {
        let title = pair("New article", "  ");
        assert_eq!(title.resolve(Lang::Alternate), "New article");
    }

    #[test]
    fn test_lang_for_codes() {
        let locales = LocaleConfig::default();
        assert_eq!(locales.lang_for(Some("ar")), Lang::Alternate);
        assert_eq!(locales.lang_for(Some("AR-eg")), Lang::Alternate);
        assert_eq!(locales.lang_for(Some("ar_SA")), Lang::Alternate);
        assert_eq!(locales.lang_for(Some("en")), Lang::Primary);
        assert_eq!(locales.lang_for(Some("fr")), Lang::Primary);
        assert_eq!(locales.lang_for(Some("")), Lang::Primary);
        assert_eq!(locales.lang_for(None), Lang::Primary);
    }

    #[test]
    fn test_localized_serializes_both_sides() {
        let json = serde_json::to_value(pair("Hi", "مرحبا")).unwrap();
        assert_eq!(json["primary"], "Hi");
        assert_eq!(json["alternate"], "مرحبا");
    }
}
