use crate::StatsError;
use srt_core::{Job, Locale, Named};
use srt_storage::{RecordSource, StorageError};

/// Every `splatnet_id` ever seen under a display name, in first-seen order.
///
/// Display names change and collide; the result is approximate by nature and
/// must not be used as an identity match.
pub fn find_player_ids_by_name<S>(source: &S, name: &str) -> Result<Vec<String>, StatsError>
where
    S: RecordSource + ?Sized,
{
    let mut ids: Vec<String> = Vec::new();
    for job in source.jobs()? {
        let job = job?;
        for player in job.players().filter(|player| player.name == name) {
            if !ids.contains(&player.splatnet_id) {
                ids.push(player.splatnet_id.clone());
            }
        }
    }
    Ok(ids)
}

/// Rotations on `stage` whose jobs show every weapon in `weapons` among
/// the participants. Stage and weapons match by key, or by localized name
/// when `locale` is given.
pub fn find_rotations<S, W>(
    source: &S,
    weapons: &[W],
    stage: &str,
    locale: Option<&Locale>,
) -> Result<Vec<i64>, StatsError>
where
    S: RecordSource + ?Sized,
    W: AsRef<str>,
{
    let mut rotations = Vec::new();
    for job in source.jobs()? {
        let job = job?;
        let on_stage = job
            .stage
            .as_ref()
            .is_some_and(|named| named.matches(stage, locale));
        if !on_stage || rotations.contains(&job.rotation()) {
            continue;
        }
        let all_present = weapons.iter().all(|weapon| {
            job.players()
                .any(|player| player.has_weapon(weapon.as_ref(), locale))
        });
        if all_present {
            rotations.push(job.rotation());
        }
    }
    Ok(rotations)
}

/// Stage and distinct weapons seen during one rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loadout {
    pub rotation: i64,
    pub stage: Option<Named>,
    pub weapons: Vec<Named>,
}

pub fn rotation_loadout<S>(source: &S, rotation: i64) -> Result<Option<Loadout>, StatsError>
where
    S: RecordSource + ?Sized,
{
    let mut loadout: Option<Loadout> = None;
    for job in source.jobs()? {
        let job = job?;
        if job.rotation() != rotation {
            continue;
        }
        let entry = loadout.get_or_insert_with(|| Loadout {
            rotation,
            stage: None,
            weapons: Vec::new(),
        });
        if entry.stage.is_none() {
            entry.stage = job.stage.clone();
        }
        for weapon in job.players().flat_map(|player| player.weapons()) {
            if !entry.weapons.iter().any(|known| known.key == weapon.key) {
                entry.weapons.push(weapon.clone());
            }
        }
    }
    Ok(loadout)
}

/// The job at zero-based `index`, or `None` past the end.
pub fn job_at<S>(source: &S, index: usize) -> Result<Option<Job>, StorageError>
where
    S: RecordSource + ?Sized,
{
    source.jobs()?.nth(index).transpose()
}
