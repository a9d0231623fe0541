use crate::path::{numeric, FieldPath, PathSegment};
use crate::{key_of, Locale, Named, RecordError};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const MAX_WAVES: usize = 3;
pub const MAX_TEAMMATES: usize = 3;
pub const MAX_WEAPON_SLOTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WaterLevel {
    Low,
    Normal,
    High,
}

impl WaterLevel {
    pub const ALL: [WaterLevel; 3] = [WaterLevel::Low, WaterLevel::Normal, WaterLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            WaterLevel::Low => "low",
            WaterLevel::Normal => "normal",
            WaterLevel::High => "high",
        }
    }
}

impl fmt::Display for WaterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaterLevel {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "low" => Ok(WaterLevel::Low),
            "normal" | "mid" => Ok(WaterLevel::Normal),
            "high" => Ok(WaterLevel::High),
            other => Err(format!("Unknown water level: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for WaterLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        key_of(&value)
            .ok_or_else(|| serde::de::Error::custom("expected water level key"))?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KnownOccurrence {
    Mothership,
    Fog,
    Rush,
    CohockCharge,
    Griller,
    GoldieSeeking,
}

impl KnownOccurrence {
    pub const ALL: [KnownOccurrence; 6] = [
        KnownOccurrence::Mothership,
        KnownOccurrence::Fog,
        KnownOccurrence::Rush,
        KnownOccurrence::CohockCharge,
        KnownOccurrence::Griller,
        KnownOccurrence::GoldieSeeking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KnownOccurrence::Mothership => "mothership",
            KnownOccurrence::Fog => "fog",
            KnownOccurrence::Rush => "rush",
            KnownOccurrence::CohockCharge => "cohock_charge",
            KnownOccurrence::Griller => "griller",
            KnownOccurrence::GoldieSeeking => "goldie_seeking",
        }
    }
}

impl fmt::Display for KnownOccurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnownOccurrence {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "mothership" => Ok(KnownOccurrence::Mothership),
            "fog" => Ok(KnownOccurrence::Fog),
            "rush" => Ok(KnownOccurrence::Rush),
            "cohock_charge" | "cohock-charge" => Ok(KnownOccurrence::CohockCharge),
            "griller" => Ok(KnownOccurrence::Griller),
            "goldie_seeking" | "goldie-seeking" => Ok(KnownOccurrence::GoldieSeeking),
            other => Err(format!("Unknown known occurrence: {other}")),
        }
    }
}

/// A stat.ink timestamp pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Time {
    pub time: i64,
    #[serde(default)]
    pub iso8601: Option<String>,
}

impl Time {
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.time, 0).single()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BossCount {
    pub boss: Named,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Player {
    pub splatnet_id: String,
    pub name: String,
    #[serde(default)]
    pub special: Option<Named>,
    #[serde(default)]
    pub weapons: Option<Vec<Named>>,
    #[serde(default)]
    pub special_uses: Option<Vec<u32>>,
    #[serde(default)]
    pub boss_kills: Option<Vec<BossCount>>,
    #[serde(default)]
    pub species: Option<Named>,
    #[serde(default)]
    pub gender: Option<Named>,
    pub rescue: u32,
    pub death: u32,
    pub golden_egg_delivered: u32,
    pub power_egg_collected: u32,
}

impl Player {
    /// Weapon slots in wave order; empty when weapons were not recorded.
    pub fn weapons(&self) -> &[Named] {
        self.weapons.as_deref().unwrap_or_default()
    }

    pub fn weapon_at(&self, slot: usize) -> Option<&Named> {
        self.weapons().get(slot)
    }

    pub fn has_weapon(&self, needle: &str, locale: Option<&Locale>) -> bool {
        self.weapons()
            .iter()
            .any(|weapon| weapon.matches(needle, locale))
    }

    /// `None` when kills were not tracked for this player, `Some(0)` when
    /// tracked but the boss was never killed.
    pub fn boss_kill_count(&self, boss_key: &str) -> Option<u32> {
        let kills = self.boss_kills.as_ref()?;
        Some(
            kills
                .iter()
                .filter(|entry| entry.boss.key == boss_key)
                .map(|entry| entry.count)
                .sum(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Wave {
    pub water_level: WaterLevel,
    #[serde(default, deserialize_with = "deserialize_occurrence")]
    pub known_occurrence: Option<KnownOccurrence>,
    pub golden_egg_quota: u32,
    pub golden_egg_appearances: u32,
    pub golden_egg_delivered: u32,
    pub power_egg_collected: u32,
}

/// Appearances of one boss in a job alongside per-player kills, acting
/// player first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BossTally {
    pub boss: Named,
    pub appearances: u32,
    pub kills: Vec<Option<u32>>,
}

/// One completed job. Built only through [`Job::from_value`] or
/// [`Job::from_slice`], which validate shape and keep the source tree for
/// field-path lookups.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: u64,
    #[serde(default)]
    pub uuid: Option<String>,
    pub shift_start_at: Time,
    #[serde(default)]
    pub start_at: Option<Time>,
    #[serde(default)]
    pub end_at: Option<Time>,
    #[serde(default)]
    pub clear_waves: Option<u8>,
    #[serde(default, deserialize_with = "deserialize_danger_rate")]
    pub danger_rate: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_fail_reason")]
    pub fail_reason: Option<String>,
    #[serde(default)]
    pub stage: Option<Named>,
    #[serde(default)]
    pub quota: Option<Vec<u32>>,
    pub my_data: Player,
    #[serde(default, deserialize_with = "deserialize_teammates")]
    pub teammates: Vec<Player>,
    pub waves: Vec<Wave>,
    #[serde(default)]
    pub boss_appearances: Option<Vec<BossCount>>,
    #[serde(default)]
    pub title: Option<Named>,
    #[serde(default)]
    pub title_after: Option<Named>,
    #[serde(skip)]
    source: Value,
}

impl Job {
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        if !value.is_object() {
            return Err(RecordError::malformed("<record>", "expected a JSON object"));
        }
        let mut job = Job::deserialize(&value).map_err(RecordError::from_json)?;
        job.validate()?;
        job.source = value;
        Ok(job)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_slice(bytes).map_err(RecordError::from_json)?;
        Self::from_value(value)
    }

    fn validate(&self) -> Result<(), RecordError> {
        if self.waves.is_empty() || self.waves.len() > MAX_WAVES {
            return Err(RecordError::malformed(
                "waves",
                format!("expected 1-{MAX_WAVES} waves, found {}", self.waves.len()),
            ));
        }
        if self.teammates.len() > MAX_TEAMMATES {
            return Err(RecordError::malformed(
                "teammates",
                format!(
                    "expected at most {MAX_TEAMMATES} teammates, found {}",
                    self.teammates.len()
                ),
            ));
        }
        for (index, player) in self.players().enumerate() {
            if player.weapons().len() > MAX_WEAPON_SLOTS {
                return Err(RecordError::malformed(
                    format!("players[{index}].weapons"),
                    format!("expected at most {MAX_WEAPON_SLOTS} weapon slots"),
                ));
            }
        }
        if let Some(clear_waves) = self.clear_waves {
            if usize::from(clear_waves) > MAX_WAVES {
                return Err(RecordError::malformed(
                    "clear_waves",
                    format!("expected 0-{MAX_WAVES}, found {clear_waves}"),
                ));
            }
        }
        if let Some(rate) = self.danger_rate {
            if !rate.is_finite() || rate < 0.0 {
                return Err(RecordError::malformed(
                    "danger_rate",
                    format!("expected a non-negative rate, found {rate}"),
                ));
            }
        }
        if self.quota.as_ref().is_some_and(|quota| quota.len() > MAX_WAVES) {
            return Err(RecordError::malformed(
                "quota",
                format!("expected at most {MAX_WAVES} entries"),
            ));
        }
        Ok(())
    }

    /// The decoded source object, as read.
    pub fn source(&self) -> &Value {
        &self.source
    }

    pub fn lookup(&self, path: &FieldPath) -> Option<&Value> {
        path.resolve(&self.source)
    }

    /// Rotation identity: the shift start timestamp.
    pub fn rotation(&self) -> i64 {
        self.shift_start_at.time
    }

    /// Acting player first, then teammates in recorded order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        std::iter::once(&self.my_data).chain(self.teammates.iter())
    }

    pub fn stage_key(&self) -> Option<&str> {
        self.stage.as_ref().map(|stage| stage.key.as_str())
    }

    pub fn has_tide(&self, level: WaterLevel) -> bool {
        self.waves.iter().any(|wave| wave.water_level == level)
    }

    /// `None` asks for a wave without any known occurrence.
    pub fn has_event(&self, occurrence: Option<KnownOccurrence>) -> bool {
        self.waves
            .iter()
            .any(|wave| wave.known_occurrence == occurrence)
    }

    /// Whether wave `index` (zero-based) was cleared. Recorded waves past
    /// `clear_waves` were attempted and failed.
    pub fn wave_cleared(&self, index: usize) -> bool {
        self.clear_waves
            .is_some_and(|cleared| usize::from(cleared) > index)
    }

    /// Sum of a numeric per-wave stat across recorded waves; `None` when no
    /// wave carries it.
    pub fn sum_wave_stat(&self, stat: &str) -> Option<f64> {
        let mut total = None;
        for index in 0..self.waves.len() {
            let path = FieldPath::new(vec![
                PathSegment::Key("waves".to_string()),
                PathSegment::Index(index),
                PathSegment::Key(stat.to_string()),
            ]);
            if let Some(value) = self.lookup(&path).and_then(numeric) {
                *total.get_or_insert(0.0) += value;
            }
        }
        total
    }

    /// The same relative path resolved on every player, acting player first.
    pub fn player_attribute(&self, path: &FieldPath) -> Vec<Option<&Value>> {
        let mut values = vec![path.resolve(&self.source["my_data"])];
        for index in 0..self.teammates.len() {
            values.push(path.resolve(&self.source["teammates"][index]));
        }
        values
    }

    /// Boss appearances with per-player kills. Empty when appearances were
    /// not collected.
    pub fn boss_summary(&self) -> Vec<BossTally> {
        let Some(appearances) = self.boss_appearances.as_ref() else {
            return Vec::new();
        };
        appearances
            .iter()
            .map(|entry| BossTally {
                boss: entry.boss.clone(),
                appearances: entry.count,
                kills: self
                    .players()
                    .map(|player| player.boss_kill_count(&entry.boss.key))
                    .collect(),
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct RecordId {
    id: u64,
}

/// Read only the `id` of a serialized record.
pub fn record_id(bytes: &[u8]) -> Result<u64, RecordError> {
    let record: RecordId = serde_json::from_slice(bytes).map_err(RecordError::from_json)?;
    Ok(record.id)
}

fn deserialize_occurrence<'de, D>(deserializer: D) -> Result<Option<KnownOccurrence>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    key_of(&value)
        .ok_or_else(|| serde::de::Error::custom("expected known occurrence key"))?
        .parse()
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// stat.ink sends the rate as a decimal string; older dumps use numbers.
fn deserialize_danger_rate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        Value::Number(_) | Value::String(_) => numeric(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected numeric danger_rate")),
        _ => Err(serde::de::Error::custom(
            "expected string or number for danger_rate",
        )),
    }
}

/// Fail reasons arrive as keys, keyed objects, null, or the literal "None".
fn deserialize_fail_reason<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    let key = key_of(&value)
        .ok_or_else(|| serde::de::Error::custom("expected fail reason key"))?;
    if key == "None" {
        return Ok(None);
    }
    Ok(Some(key.to_string()))
}

fn deserialize_teammates<'de, D>(deserializer: D) -> Result<Vec<Player>, D::Error>
where
    D: Deserializer<'de>,
{
    let teammates: Option<Vec<Player>> = Option::deserialize(deserializer)?;
    Ok(teammates.unwrap_or_default())
}
