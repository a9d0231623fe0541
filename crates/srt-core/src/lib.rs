pub mod catalog;
pub mod job;
pub mod path;

pub use catalog::{WeaponCatalog, WeaponEntry, GRIZZCO_CATEGORY};
pub use job::{
    record_id, BossCount, BossTally, Job, KnownOccurrence, Player, Time, WaterLevel, Wave,
};
pub use path::{numeric, FieldPath, PathSegment};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_LOCALE: &str = "en_US";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed record: `{field}` {reason}")]
    Malformed { field: String, reason: String },
    #[error("invalid field path `{0}`")]
    InvalidPath(String),
}

impl RecordError {
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn from_json(err: serde_json::Error) -> Self {
        Self::malformed("<record>", err.to_string())
    }
}

/// Display locale used for localized-name comparisons.
///
/// Never global: every predicate that compares by localized name receives
/// one explicitly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Locale(String);

impl Locale {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self(DEFAULT_LOCALE.to_string())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err("Locale cannot be empty".to_string());
        }
        Ok(Self(trimmed.replace('-', "_")))
    }
}

/// A keyed catalog value (stage, weapon, special, boss, title...) with its
/// localized display names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Named {
    pub key: String,
    #[serde(default, deserialize_with = "deserialize_names")]
    pub name: BTreeMap<String, String>,
}

impl Named {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, locale: &Locale, text: impl Into<String>) -> Self {
        self.name.insert(locale.as_str().to_string(), text.into());
        self
    }

    pub fn name_in(&self, locale: &Locale) -> Option<&str> {
        self.name.get(locale.as_str()).map(String::as_str)
    }

    /// Localized name when known, otherwise the key.
    pub fn display(&self, locale: &Locale) -> &str {
        self.name_in(locale).unwrap_or(&self.key)
    }

    /// Key equality, or localized-name equality when a locale is supplied.
    pub fn matches(&self, needle: &str, locale: Option<&Locale>) -> bool {
        if self.key == needle {
            return true;
        }
        locale
            .and_then(|locale| self.name_in(locale))
            .is_some_and(|name| name == needle)
    }
}

fn deserialize_names<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    let mut names = BTreeMap::new();
    for (locale, value) in raw.unwrap_or_default() {
        if let Value::String(text) = value {
            names.insert(locale, text);
        }
    }
    Ok(names)
}

/// Read a catalog key from either a bare string or a `{ "key": ... }` object.
pub(crate) fn key_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(key) => Some(key.as_str()),
        Value::Object(object) => object.get("key").and_then(Value::as_str),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn named_matches_key_and_only_opted_in_locale_names() {
        let named: Named = serde_json::from_value(json!({
            "key": "kuma_charger",
            "splatnet": 20000,
            "name": { "en_US": "Grizzco Charger", "ja_JP": null }
        }))
        .expect("named");

        let en = Locale::default();
        assert!(named.matches("kuma_charger", None));
        assert!(!named.matches("Grizzco Charger", None));
        assert!(named.matches("Grizzco Charger", Some(&en)));
        assert!(!named.matches("Grizzco Charger", Some(&Locale::new("de_DE"))));
        assert_eq!(named.display(&Locale::new("ja_JP")), "kuma_charger");
    }

    #[test]
    fn locale_parses_hyphenated_codes() {
        let locale: Locale = "en-GB".parse().expect("locale");
        assert_eq!(locale.as_str(), "en_GB");
        assert!(" ".parse::<Locale>().is_err());
    }
}
