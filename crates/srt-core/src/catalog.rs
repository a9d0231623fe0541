use crate::{key_of, Locale, Named, RecordError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Category assigned to the Grizzco-only weapons, which the public weapon
/// list does not carry.
pub const GRIZZCO_CATEGORY: &str = "grizzco";

const GRIZZCO_WEAPONS: [(&str, &str); 4] = [
    ("kuma_charger", "Grizzco Charger"),
    ("kuma_brella", "Grizzco Brella"),
    ("kuma_blaster", "Grizzco Blaster"),
    ("kuma_slosher", "Grizzco Slosher"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaponEntry {
    pub weapon: Named,
    pub category: String,
}

/// Weapon key to category lookup, used by weapon-type filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeaponCatalog {
    entries: BTreeMap<String, WeaponEntry>,
}

impl WeaponCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the stat.ink weapon list: `[{ "key", "name": {..}, "type": { "key" } }]`.
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        let list = value
            .as_array()
            .ok_or_else(|| RecordError::malformed("<catalog>", "expected a list of weapons"))?;
        let mut catalog = Self::new();
        for (index, item) in list.iter().enumerate() {
            let weapon: Named = serde_json::from_value(item.clone()).map_err(|err| {
                RecordError::malformed(format!("weapons[{index}]"), err.to_string())
            })?;
            let category = item
                .get("type")
                .and_then(key_of)
                .ok_or_else(|| RecordError::malformed(format!("weapons[{index}].type"), "missing"))?
                .to_string();
            catalog.insert(weapon, category);
        }
        Ok(catalog)
    }

    pub fn with_grizzco_weapons(mut self) -> Self {
        let en = Locale::default();
        for (key, name) in GRIZZCO_WEAPONS {
            if !self.entries.contains_key(key) {
                self.insert(Named::new(key).with_name(&en, name), GRIZZCO_CATEGORY);
            }
        }
        self
    }

    pub fn insert(&mut self, weapon: Named, category: impl Into<String>) {
        let entry = WeaponEntry {
            category: category.into(),
            weapon,
        };
        self.entries.insert(entry.weapon.key.clone(), entry);
    }

    pub fn get(&self, key: &str) -> Option<&WeaponEntry> {
        self.entries.get(key)
    }

    pub fn category_of(&self, key: &str) -> Option<&str> {
        self.get(key).map(|entry| entry.category.as_str())
    }

    /// Resolve a key or, with a locale, a localized name to a weapon key.
    pub fn resolve_key(&self, needle: &str, locale: Option<&Locale>) -> Option<&str> {
        if let Some((key, _)) = self.entries.get_key_value(needle) {
            return Some(key.as_str());
        }
        self.entries
            .values()
            .find(|entry| entry.weapon.matches(needle, locale))
            .map(|entry| entry.weapon.key.as_str())
    }

    pub fn categories(&self) -> BTreeSet<&str> {
        self.entries
            .values()
            .map(|entry| entry.category.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeaponEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
