mod lookup;

pub use lookup::{find_player_ids_by_name, find_rotations, job_at, rotation_loadout, Loadout};

use srt_core::{FieldPath, Job, Locale};
use srt_storage::{Jobs, RecordSource, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("cannot aggregate an empty dataset")]
    EmptyDataset,
    #[error("no record carries a value at `{0}`")]
    NoValues(String),
    #[error("weapon `{0}` was never used by the acting player")]
    WeaponNeverUsed(String),
}

/// Lazy per-record values of one field path. Absent or non-numeric values
/// are yielded as `None`, so the sequence has exactly one item per record.
pub struct StatValues<'a> {
    jobs: Jobs<'a>,
    path: FieldPath,
}

impl Iterator for StatValues<'_> {
    type Item = Result<Option<f64>, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let job = self.jobs.next()?;
        Some(job.map(|job| self.path.resolve_f64(job.source())))
    }
}

/// Start a fresh pass over `source`; call again to restart.
pub fn stat_values<'a, S>(source: &'a S, path: &FieldPath) -> Result<StatValues<'a>, StorageError>
where
    S: RecordSource + ?Sized,
{
    Ok(StatValues {
        jobs: source.jobs()?,
        path: path.clone(),
    })
}

/// Every present value of a stat, in record order.
pub fn collect_stat<S>(source: &S, path: &FieldPath) -> Result<Vec<f64>, StorageError>
where
    S: RecordSource + ?Sized,
{
    let mut values = Vec::new();
    for value in stat_values(source, path)? {
        if let Some(value) = value? {
            values.push(value);
        }
    }
    Ok(values)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatSummary {
    pub sum: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
    /// Records that carried the stat.
    pub count: usize,
    /// Records where the stat was absent.
    pub missing: usize,
}

impl StatSummary {
    pub fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Sum, min, median and max in one pass. Only the median needs the values
/// buffered.
pub fn summarize<S>(source: &S, path: &FieldPath) -> Result<StatSummary, StatsError>
where
    S: RecordSource + ?Sized,
{
    let mut values = Vec::new();
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut missing = 0;
    for value in stat_values(source, path)? {
        match value? {
            Some(value) => {
                sum += value;
                min = min.min(value);
                max = max.max(value);
                values.push(value);
            }
            None => missing += 1,
        }
    }
    if values.is_empty() {
        if missing == 0 {
            return Err(StatsError::EmptyDataset);
        }
        return Err(StatsError::NoValues(path.to_string()));
    }
    Ok(StatSummary {
        sum,
        min,
        median: median(&mut values),
        max,
        count: values.len(),
        missing,
    })
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Jobs where the acting player held `weapon` in some wave, and how many of
/// those cleared at least one wave played with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeaponClearRate {
    pub jobs_with_weapon: usize,
    pub jobs_cleared_with_weapon: usize,
}

impl WeaponClearRate {
    pub fn rate(&self) -> f64 {
        self.jobs_cleared_with_weapon as f64 / self.jobs_with_weapon as f64
    }
}

pub fn wave_clear_rate_with_weapon<S>(
    source: &S,
    weapon: &str,
    locale: Option<&Locale>,
) -> Result<WeaponClearRate, StatsError>
where
    S: RecordSource + ?Sized,
{
    let mut rate = WeaponClearRate {
        jobs_with_weapon: 0,
        jobs_cleared_with_weapon: 0,
    };
    for job in source.jobs()? {
        let job = job?;
        let slots = weapon_slots(&job, weapon, locale);
        if slots.is_empty() {
            continue;
        }
        rate.jobs_with_weapon += 1;
        if slots.iter().any(|slot| job.wave_cleared(*slot)) {
            rate.jobs_cleared_with_weapon += 1;
        }
    }
    if rate.jobs_with_weapon == 0 {
        return Err(StatsError::WeaponNeverUsed(weapon.to_string()));
    }
    Ok(rate)
}

fn weapon_slots(job: &Job, weapon: &str, locale: Option<&Locale>) -> Vec<usize> {
    job.my_data
        .weapons()
        .iter()
        .enumerate()
        .filter(|(_, named)| named.matches(weapon, locale))
        .map(|(slot, _)| slot)
        .collect()
}
