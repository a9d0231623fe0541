use crate::Comparison;
use srt_core::{Job, KnownOccurrence, Locale, WaterLevel, WeaponCatalog};
use std::sync::Arc;

/// Anything that can decide whether a job matches.
pub trait JobPredicate {
    fn matches(&self, job: &Job) -> bool;
}

impl<F> JobPredicate for F
where
    F: Fn(&Job) -> bool,
{
    fn matches(&self, job: &Job) -> bool {
        self(job)
    }
}

/// A bound predicate: every parameter is captured by value at construction.
///
/// Absent data never matches. A missing teammate, an empty weapon slot, an
/// unrecorded danger rate or a private stage all evaluate to `false`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Acting player or any teammate, by `splatnet_id`.
    HasPlayer(String),
    /// Any participant, any weapon slot.
    HasWeapon {
        weapon: String,
        locale: Option<Locale>,
    },
    /// The acting player's own weapon slots only.
    UsesWeapon {
        weapon: String,
        locale: Option<Locale>,
    },
    /// Stage key; localized stage names are not accepted.
    OnStage(String),
    WithSpecial {
        special: String,
        locale: Option<Locale>,
    },
    FailReason(String),
    /// Exact `shift_start_at` timestamp.
    DuringRotation(i64),
    ClearWaves(Comparison, u8),
    /// Exact float comparison, equality included.
    DangerRate(Comparison, f64),
    HasTide(WaterLevel),
    /// `None` matches a wave with no known occurrence.
    HasEvent(Option<KnownOccurrence>),
    /// Any participant's weapon belongs to `category` in the catalog.
    WeaponType {
        category: String,
        catalog: Arc<WeaponCatalog>,
    },
    /// Every member matches. An empty list matches nothing.
    All(Vec<Predicate>),
    /// At least one member matches.
    Any(Vec<Predicate>),
}

impl JobPredicate for Predicate {
    fn matches(&self, job: &Job) -> bool {
        match self {
            Predicate::HasPlayer(player) => job.players().any(|p| p.splatnet_id == *player),
            Predicate::HasWeapon { weapon, locale } => job
                .players()
                .any(|player| player.has_weapon(weapon, locale.as_ref())),
            Predicate::UsesWeapon { weapon, locale } => {
                job.my_data.has_weapon(weapon, locale.as_ref())
            }
            Predicate::OnStage(stage) => job.stage_key() == Some(stage.as_str()),
            Predicate::WithSpecial { special, locale } => job
                .my_data
                .special
                .as_ref()
                .is_some_and(|named| named.matches(special, locale.as_ref())),
            Predicate::FailReason(reason) => job.fail_reason.as_deref() == Some(reason.as_str()),
            Predicate::DuringRotation(rotation) => job.rotation() == *rotation,
            Predicate::ClearWaves(comparison, waves) => job
                .clear_waves
                .is_some_and(|cleared| comparison.holds(cleared, *waves)),
            Predicate::DangerRate(comparison, rate) => job
                .danger_rate
                .is_some_and(|actual| comparison.holds(actual, *rate)),
            Predicate::HasTide(level) => job.has_tide(*level),
            Predicate::HasEvent(occurrence) => job.has_event(*occurrence),
            Predicate::WeaponType { category, catalog } => job.players().any(|player| {
                player
                    .weapons()
                    .iter()
                    .any(|weapon| catalog.category_of(&weapon.key) == Some(category.as_str()))
            }),
            Predicate::All(members) => {
                !members.is_empty() && members.iter().all(|member| member.matches(job))
            }
            Predicate::Any(members) => members.iter().any(|member| member.matches(job)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn player(id: &str, weapons: Value) -> Value {
        json!({
            "splatnet_id": id, "name": id,
            "special": { "key": "pitcher", "name": { "en_US": "Splat-Bomb Launcher" } },
            "weapons": weapons,
            "rescue": 0, "death": 0, "golden_egg_delivered": 0, "power_egg_collected": 0
        })
    }

    fn job(teammates: Value) -> Job {
        Job::from_value(json!({
            "id": 1,
            "shift_start_at": { "time": 1538460000 },
            "clear_waves": 2,
            "danger_rate": "120.4",
            "fail_reason": "time_limit",
            "stage": { "key": "polaris", "name": { "en_US": "Ruins of Ark Polaris" } },
            "my_data": player("self", json!([{ "key": "sshooter" }, { "key": "bamboo14mk1" }])),
            "teammates": teammates,
            "waves": [
                { "water_level": "low", "known_occurrence": "griller",
                  "golden_egg_quota": 10, "golden_egg_appearances": 20,
                  "golden_egg_delivered": 12, "power_egg_collected": 400 },
                { "water_level": "normal", "known_occurrence": null,
                  "golden_egg_quota": 12, "golden_egg_appearances": 22,
                  "golden_egg_delivered": 13, "power_egg_collected": 420 }
            ]
        }))
        .expect("job")
    }

    #[test]
    fn has_weapon_sees_teammates_but_uses_weapon_does_not() {
        let job = job(json!([
            player("t0", json!([{ "key": "sshooter" }])),
            player("t1", json!([
                { "key": "sshooter" }, { "key": "hokusai" }, { "key": "kuma_charger" }
            ]))
        ]));
        let has = Predicate::HasWeapon {
            weapon: "kuma_charger".to_string(),
            locale: None,
        };
        let uses = Predicate::UsesWeapon {
            weapon: "kuma_charger".to_string(),
            locale: None,
        };
        assert!(has.matches(&job));
        assert!(!uses.matches(&job));
    }

    #[test]
    fn missing_teammates_and_slots_never_match() {
        let job = job(Value::Null);
        assert!(!Predicate::HasPlayer("t0".to_string()).matches(&job));
        assert!(Predicate::HasPlayer("self".to_string()).matches(&job));
        assert!(!Predicate::HasWeapon {
            weapon: "hokusai".to_string(),
            locale: None
        }
        .matches(&job));
    }

    #[test]
    fn stage_matches_by_key_only_and_special_by_opted_in_name() {
        let job = job(json!([]));
        assert!(Predicate::OnStage("polaris".to_string()).matches(&job));
        assert!(!Predicate::OnStage("Ruins of Ark Polaris".to_string()).matches(&job));

        let by_name = |locale: Option<Locale>| Predicate::WithSpecial {
            special: "Splat-Bomb Launcher".to_string(),
            locale,
        };
        assert!(!by_name(None).matches(&job));
        assert!(by_name(Some(Locale::default())).matches(&job));
    }

    #[test]
    fn comparisons_use_exact_values() {
        let job = job(json!([]));
        assert!(Predicate::DangerRate(Comparison::Equal, 120.4).matches(&job));
        assert!(!Predicate::DangerRate(Comparison::Equal, 120.40001).matches(&job));
        assert!(Predicate::DangerRate(Comparison::GreaterThan, 120.0).matches(&job));
        assert!(Predicate::ClearWaves(Comparison::LessThan, 3).matches(&job));
        assert!(!Predicate::ClearWaves(Comparison::GreaterThan, 2).matches(&job));
    }

    #[test]
    fn tides_events_rotation_and_fail_reason() {
        let job = job(json!([]));
        assert!(Predicate::HasTide(WaterLevel::Low).matches(&job));
        assert!(!Predicate::HasTide(WaterLevel::High).matches(&job));
        assert!(Predicate::HasEvent(Some(KnownOccurrence::Griller)).matches(&job));
        assert!(Predicate::HasEvent(None).matches(&job));
        assert!(!Predicate::HasEvent(Some(KnownOccurrence::Fog)).matches(&job));
        assert!(Predicate::DuringRotation(1538460000).matches(&job));
        assert!(Predicate::FailReason("time_limit".to_string()).matches(&job));
    }

    #[test]
    fn weapon_type_uses_catalog_categories() {
        let mut catalog = WeaponCatalog::new();
        catalog.insert(srt_core::Named::new("sshooter"), "shooter");
        catalog.insert(srt_core::Named::new("bamboo14mk1"), "charger");
        let catalog = Arc::new(catalog.with_grizzco_weapons());
        let job = job(json!([player("t0", json!([{ "key": "kuma_brella" }]))]));

        let category = |name: &str| Predicate::WeaponType {
            category: name.to_string(),
            catalog: Arc::clone(&catalog),
        };
        assert!(category("charger").matches(&job));
        assert!(category("grizzco").matches(&job));
        assert!(!category("roller").matches(&job));
    }

    #[test]
    fn closures_are_predicates_and_empty_all_matches_nothing() {
        let job = job(json!([]));
        let closure = |job: &Job| job.id == 1;
        assert!(closure.matches(&job));
        assert!(!Predicate::All(Vec::new()).matches(&job));
        assert!(!Predicate::Any(Vec::new()).matches(&job));
    }
}
