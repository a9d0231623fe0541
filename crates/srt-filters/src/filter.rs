use crate::{Comparison, FilterError, JobPredicate, Mode, Predicate};
use srt_core::{Job, KnownOccurrence, Locale, WaterLevel, WeaponCatalog};
use std::fmt;
use std::sync::Arc;

/// Filter family; names the partition directories a filter writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    PlayerIds,
    Weapons,
    UsesWeapons,
    Stages,
    Special,
    FailReasons,
    Rotations,
    ClearWaves,
    DangerRate,
    Tides,
    Events,
    WeaponTypes,
}

impl Family {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Family::PlayerIds => "playerIds",
            Family::Weapons => "weapons",
            Family::UsesWeapons => "usesWeapons",
            Family::Stages => "stages",
            Family::Special => "special",
            Family::FailReasons => "failReasons",
            Family::Rotations => "rotations",
            Family::ClearWaves => "clearWaves",
            Family::DangerRate => "dangerRate",
            Family::Tides => "tides",
            Family::Events => "events",
            Family::WeaponTypes => "weaponTypes",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A predicate paired with the canonical output key of its partition.
///
/// Multi-item keys concatenate every item followed by the mode suffix, so
/// `on_stages(["a", "b"], Mode::Or)` is keyed `aorbor`. Two filters with the
/// same family and key are assumed to select the same jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    family: Family,
    key: String,
    predicate: Predicate,
}

impl Filter {
    /// A filter from parts, for predicates the named constructors don't cover.
    pub fn custom(family: Family, key: &str, predicate: Predicate) -> Result<Self, FilterError> {
        Ok(Self {
            family,
            key: sanitize(family, key)?,
            predicate,
        })
    }

    pub fn has_players<S: AsRef<str>>(players: &[S], mode: Mode) -> Result<Self, FilterError> {
        combine(
            Family::PlayerIds,
            players
                .iter()
                .map(|player| {
                    let player = player.as_ref();
                    (player.to_string(), Predicate::HasPlayer(player.to_string()))
                })
                .collect(),
            mode,
        )
    }

    /// Jobs where any participant carried the weapon(s). Weapons match by key,
    /// or by localized name when `locale` is given.
    pub fn has_weapons<S: AsRef<str>>(
        weapons: &[S],
        mode: Mode,
        locale: Option<&Locale>,
    ) -> Result<Self, FilterError> {
        combine(
            Family::Weapons,
            weapons
                .iter()
                .map(|weapon| {
                    let weapon = weapon.as_ref();
                    (
                        weapon.to_string(),
                        Predicate::HasWeapon {
                            weapon: weapon.to_string(),
                            locale: locale.cloned(),
                        },
                    )
                })
                .collect(),
            mode,
        )
    }

    pub fn uses_weapons<S: AsRef<str>>(
        weapons: &[S],
        mode: Mode,
        locale: Option<&Locale>,
    ) -> Result<Self, FilterError> {
        combine(
            Family::UsesWeapons,
            weapons
                .iter()
                .map(|weapon| {
                    let weapon = weapon.as_ref();
                    (
                        weapon.to_string(),
                        Predicate::UsesWeapon {
                            weapon: weapon.to_string(),
                            locale: locale.cloned(),
                        },
                    )
                })
                .collect(),
            mode,
        )
    }

    pub fn on_stages<S: AsRef<str>>(stages: &[S], mode: Mode) -> Result<Self, FilterError> {
        combine(
            Family::Stages,
            stages
                .iter()
                .map(|stage| {
                    let stage = stage.as_ref();
                    (stage.to_string(), Predicate::OnStage(stage.to_string()))
                })
                .collect(),
            mode,
        )
    }

    pub fn with_special(special: &str, locale: Option<&Locale>) -> Result<Self, FilterError> {
        combine(
            Family::Special,
            vec![(
                special.to_string(),
                Predicate::WithSpecial {
                    special: special.to_string(),
                    locale: locale.cloned(),
                },
            )],
            Mode::Single,
        )
    }

    pub fn fail_reasons<S: AsRef<str>>(reasons: &[S], mode: Mode) -> Result<Self, FilterError> {
        combine(
            Family::FailReasons,
            reasons
                .iter()
                .map(|reason| {
                    let reason = reason.as_ref();
                    (reason.to_string(), Predicate::FailReason(reason.to_string()))
                })
                .collect(),
            mode,
        )
    }

    pub fn during_rotations(rotations: &[i64], mode: Mode) -> Result<Self, FilterError> {
        combine(
            Family::Rotations,
            rotations
                .iter()
                .map(|rotation| (rotation.to_string(), Predicate::DuringRotation(*rotation)))
                .collect(),
            mode,
        )
    }

    pub fn clear_waves(comparison: Comparison, waves: u8) -> Result<Self, FilterError> {
        Self::custom(
            Family::ClearWaves,
            &format!("{}{waves}", comparison.key_prefix()),
            Predicate::ClearWaves(comparison, waves),
        )
    }

    pub fn danger_rate(comparison: Comparison, rate: f64) -> Result<Self, FilterError> {
        Self::custom(
            Family::DangerRate,
            &format!("{}{rate}", comparison.key_prefix()),
            Predicate::DangerRate(comparison, rate),
        )
    }

    /// Like [`Filter::danger_rate`], keyed by the rate exactly as written
    /// (`"200.0"` keys `equal200.0`, where the parsed float would key `equal200`).
    pub fn danger_rate_literal(comparison: Comparison, rate: &str) -> Result<Self, FilterError> {
        let text = rate.trim();
        let parsed = text
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| FilterError::InvalidNumber {
                family: Family::DangerRate.to_string(),
                item: rate.to_string(),
            })?;
        Self::custom(
            Family::DangerRate,
            &format!("{}{text}", comparison.key_prefix()),
            Predicate::DangerRate(comparison, parsed),
        )
    }

    pub fn has_tides(tides: &[WaterLevel], mode: Mode) -> Result<Self, FilterError> {
        combine(
            Family::Tides,
            tides
                .iter()
                .map(|tide| (tide.to_string(), Predicate::HasTide(*tide)))
                .collect(),
            mode,
        )
    }

    /// `None` selects waves without a known occurrence and is keyed `none`.
    pub fn has_events(events: &[Option<KnownOccurrence>], mode: Mode) -> Result<Self, FilterError> {
        combine(
            Family::Events,
            events
                .iter()
                .map(|event| {
                    let key = event.map_or_else(|| "none".to_string(), |event| event.to_string());
                    (key, Predicate::HasEvent(*event))
                })
                .collect(),
            mode,
        )
    }

    /// Jobs whose participants, taken together, carried weapons of every
    /// (`And`) or any (`Or`) requested category.
    pub fn has_weapon_types<S: AsRef<str>>(
        categories: &[S],
        mode: Mode,
        catalog: Arc<WeaponCatalog>,
    ) -> Result<Self, FilterError> {
        let known = catalog.categories();
        let mut items = Vec::with_capacity(categories.len());
        for category in categories {
            let category = category.as_ref();
            if !known.contains(category) {
                return Err(FilterError::UnknownCategory(category.to_string()));
            }
            items.push((
                category.to_string(),
                Predicate::WeaponType {
                    category: category.to_string(),
                    catalog: Arc::clone(&catalog),
                },
            ));
        }
        combine(Family::WeaponTypes, items, mode)
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// `family/key`, unique per distinct filter.
    pub fn output_id(&self) -> String {
        format!("{}/{}", self.family, self.key)
    }
}

impl JobPredicate for Filter {
    fn matches(&self, job: &Job) -> bool {
        self.predicate.matches(job)
    }
}

fn combine(
    family: Family,
    items: Vec<(String, Predicate)>,
    mode: Mode,
) -> Result<Filter, FilterError> {
    if items.is_empty() {
        return Err(FilterError::EmptySelection {
            family: family.to_string(),
        });
    }
    if mode == Mode::Single && items.len() > 1 {
        return Err(FilterError::SingleModeArity {
            family: family.to_string(),
            count: items.len(),
        });
    }

    let mut key = String::new();
    let mut members = Vec::with_capacity(items.len());
    for (item, predicate) in items {
        key.push_str(&item);
        key.push_str(mode.suffix());
        members.push(predicate);
    }
    let predicate = match mode {
        Mode::Single => members.remove(0),
        Mode::And => Predicate::All(members),
        Mode::Or => Predicate::Any(members),
    };
    Filter::custom(family, &key, predicate)
}

/// Output keys become file names; path separators and control characters
/// are not allowed.
fn sanitize(family: Family, key: &str) -> Result<String, FilterError> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key
            .chars()
            .any(|ch| ch == '/' || ch == '\\' || ch.is_control());
    if invalid {
        return Err(FilterError::InvalidKey {
            family: family.to_string(),
            item: key.to_string(),
        });
    }
    Ok(key.to_string())
}
