use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use srt_core::{FieldPath, Job, KnownOccurrence, Locale, WaterLevel};
use srt_filters::{Comparison, Filter, Mode};
use srt_partition::{PartitionConfig, PartitionEngine, PartitionOutcome};
use srt_stats::{
    find_player_ids_by_name, find_rotations, job_at, rotation_loadout, summarize,
    wave_clear_rate_with_weapon,
};
use srt_storage::{Dataset, MemoryDataset, RecordSource};
use srt_sync::{FeedMode, StatInkClient, SyncConfig, Syncer, DEFAULT_BASE_URL};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "srt")]
#[command(about = "Salmon Run job record toolkit", long_about = None)]
struct Cli {
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
    /// Directory holding the synced dataset files.
    #[arg(long, global = true, env = "SRT_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,
    /// Match weapons and specials by their name in this locale as well as by key.
    #[arg(long, global = true, env = "SRT_LOCALE")]
    locale: Option<Locale>,
    #[arg(long, global = true, env = "SRT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Dataset file to read; defaults to the feed's file in the data dir.
    #[arg(long)]
    dataset: Option<PathBuf>,
    #[arg(long, default_value_t = FeedMode::All)]
    feed: FeedMode,
}

impl SourceArgs {
    fn dataset(&self, data_dir: &Path) -> Dataset {
        match &self.dataset {
            Some(path) => Dataset::new(path),
            None => Dataset::new(data_dir.join(self.feed.file_name())),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch new jobs from stat.ink into the local dataset
    Sync {
        #[arg(long, default_value_t = FeedMode::All)]
        feed: FeedMode,
        #[arg(long, env = "SRT_STATINK_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Leave derived partitions in place after new records land.
        #[arg(long, default_value_t = false)]
        keep_partitions: bool,
    },
    /// Split a dataset into matching and non-matching jobs
    Partition {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(value_enum)]
        family: FamilyArg,
        #[arg(required = true)]
        items: Vec<String>,
        #[arg(long, default_value_t = Mode::Single)]
        mode: Mode,
        /// For clearWaves and dangerRate: =, > or <.
        #[arg(long)]
        comparison: Option<Comparison>,
        /// Partition in memory instead of writing dataset files.
        #[arg(long, default_value_t = false)]
        memory: bool,
        /// Recompute even when outputs for this filter already exist.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Sum, min, median and max of a field path, e.g. `my_data golden_egg_delivered`
    Summary {
        #[command(flatten)]
        source: SourceArgs,
        path: String,
    },
    /// Share of jobs with a weapon that cleared a wave played with it
    ClearRate {
        #[command(flatten)]
        source: SourceArgs,
        weapon: String,
    },
    /// List the player ids seen under a display name
    FindPlayer {
        #[command(flatten)]
        source: SourceArgs,
        name: String,
    },
    /// Find rotations by stage and weapons, or show one rotation's loadout
    Rotations {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        stage: Option<String>,
        #[arg(long = "weapon")]
        weapons: Vec<String>,
        /// Rotation start time (unix seconds) whose loadout to show.
        #[arg(long, conflicts_with_all = ["stage", "weapons"])]
        rotation: Option<i64>,
    },
    /// Print one job by its zero-based position in the dataset
    Show {
        #[command(flatten)]
        source: SourceArgs,
        index: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FamilyArg {
    #[value(name = "playerIds")]
    PlayerIds,
    #[value(name = "weapons")]
    Weapons,
    #[value(name = "usesWeapons")]
    UsesWeapons,
    #[value(name = "stages")]
    Stages,
    #[value(name = "special")]
    Special,
    #[value(name = "failReasons")]
    FailReasons,
    #[value(name = "rotations")]
    Rotations,
    #[value(name = "clearWaves")]
    ClearWaves,
    #[value(name = "dangerRate")]
    DangerRate,
    #[value(name = "tides")]
    Tides,
    #[value(name = "events")]
    Events,
    #[value(name = "weaponTypes")]
    WeaponTypes,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    let locale = cli.locale.as_ref();

    match &cli.command {
        Commands::Sync {
            feed,
            api_key,
            keep_partitions,
        } => {
            let config = SyncConfig {
                mode: *feed,
                base_url: cli.base_url.clone(),
                api_key: api_key.clone(),
                data_dir: cli.data_dir.clone(),
                clear_partitions: !keep_partitions,
            };
            let client = StatInkClient::new(&config).context("Failed to build stat.ink client")?;
            let report = Syncer::new(client, config)
                .sync()
                .context("Sync failed; the previous dataset file is unchanged")?;
            println!(
                "{} existing, {} appended over {} page(s), last id {}",
                report.existing_records,
                report.appended_records,
                report.pages_fetched,
                report
                    .last_id
                    .map_or_else(|| "-".to_string(), |id| id.to_string())
            );
            if report.recovered_corrupted_tail {
                println!("Recovered from a truncated dataset tail");
            }
            if report.partitions_cleared {
                println!("Removed stale partitions");
            }
        }
        Commands::Partition {
            source,
            family,
            items,
            mode,
            comparison,
            memory,
            force,
        } => {
            let dataset = source.dataset(&cli.data_dir);
            let filter = build_filter(
                *family,
                items,
                *mode,
                comparison.unwrap_or_default(),
                locale,
                &cli.base_url,
            )?;
            debug!(event = "filter_built", output = %filter.output_id());
            let mut engine = PartitionEngine::new(PartitionConfig {
                reuse_existing: !force,
            });
            if *memory {
                let loaded = MemoryDataset::load(dataset.path())
                    .with_context(|| format!("Failed to load {}", dataset.path().display()))?;
                let partition = engine.partition_memory(&loaded, &filter)?;
                println!(
                    "{}: {} matched, {} unmatched",
                    filter.output_id(),
                    partition.matched.len(),
                    partition.unmatched.len()
                );
            } else {
                let partition = engine.partition(&dataset, &filter)?;
                match partition.outcome {
                    PartitionOutcome::Reused => println!("Reused existing outputs"),
                    PartitionOutcome::Computed { matched, unmatched } => {
                        println!("{matched} matched, {unmatched} unmatched")
                    }
                }
                println!("{}", partition.matched.path().display());
                println!("{}", partition.unmatched.path().display());
            }
        }
        Commands::Summary { source, path } => {
            let dataset = source.dataset(&cli.data_dir);
            let path: FieldPath = path.parse()?;
            let summary = summarize(&dataset, &path)
                .with_context(|| format!("Failed to summarize `{path}`"))?;
            println!("records: {} ({} missing)", summary.count, summary.missing);
            println!("sum:     {}", summary.sum);
            println!("min:     {}", summary.min);
            println!("median:  {}", summary.median);
            println!("max:     {}", summary.max);
            println!("mean:    {:.3}", summary.mean());
        }
        Commands::ClearRate { source, weapon } => {
            let dataset = source.dataset(&cli.data_dir);
            let rate = wave_clear_rate_with_weapon(&dataset, weapon, locale)?;
            println!(
                "{weapon}: {}/{} jobs ({:.1}%)",
                rate.jobs_cleared_with_weapon,
                rate.jobs_with_weapon,
                rate.rate() * 100.0
            );
        }
        Commands::FindPlayer { source, name } => {
            let dataset = source.dataset(&cli.data_dir);
            let ids = find_player_ids_by_name(&dataset, name)?;
            if ids.is_empty() {
                println!("No player named {name:?}");
            }
            for id in ids {
                println!("{id}");
            }
        }
        Commands::Rotations {
            source,
            stage,
            weapons,
            rotation,
        } => {
            let dataset = source.dataset(&cli.data_dir);
            if let Some(rotation) = rotation {
                let Some(loadout) = rotation_loadout(&dataset, *rotation)? else {
                    println!("No jobs in rotation {rotation}");
                    return Ok(());
                };
                let display = cli.locale.clone().unwrap_or_default();
                println!("rotation: {}", format_time(loadout.rotation));
                if let Some(stage) = &loadout.stage {
                    println!("stage:    {}", stage.display(&display));
                }
                for weapon in &loadout.weapons {
                    println!("weapon:   {}", weapon.display(&display));
                }
                return Ok(());
            }
            let stage = stage
                .as_deref()
                .context("Pass --stage (and --weapon) or --rotation")?;
            for rotation in find_rotations(&dataset, weapons, stage, locale)? {
                println!("{rotation}\t{}", format_time(rotation));
            }
        }
        Commands::Show { source, index } => {
            let dataset = source.dataset(&cli.data_dir);
            let job = job_at(&dataset, *index)?
                .with_context(|| format!("{} has no job at index {index}", dataset.label()))?;
            print_job(&job, &cli.locale.clone().unwrap_or_default());
        }
    }

    Ok(())
}

fn init_logging(debug: bool) {
    let level = if debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("SRT_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("log_init_error: subscriber already set");
    }
}

fn build_filter(
    family: FamilyArg,
    items: &[String],
    mode: Mode,
    comparison: Comparison,
    locale: Option<&Locale>,
    base_url: &str,
) -> Result<Filter> {
    let filter = match family {
        FamilyArg::PlayerIds => Filter::has_players(items, mode)?,
        FamilyArg::Weapons => Filter::has_weapons(items, mode, locale)?,
        FamilyArg::UsesWeapons => Filter::uses_weapons(items, mode, locale)?,
        FamilyArg::Stages => Filter::on_stages(items, mode)?,
        FamilyArg::Special => Filter::with_special(single(items)?, locale)?,
        FamilyArg::FailReasons => Filter::fail_reasons(items, mode)?,
        FamilyArg::Rotations => {
            let rotations = items
                .iter()
                .map(|item| item.parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
                .context("Rotations are unix timestamps")?;
            Filter::during_rotations(&rotations, mode)?
        }
        FamilyArg::ClearWaves => {
            let waves = single(items)?
                .parse::<u8>()
                .context("Clear waves must be 0-3")?;
            Filter::clear_waves(comparison, waves)?
        }
        FamilyArg::DangerRate => Filter::danger_rate_literal(comparison, single(items)?)?,
        FamilyArg::Tides => {
            let tides = items
                .iter()
                .map(|item| item.parse::<WaterLevel>().map_err(|err| anyhow!(err)))
                .collect::<Result<Vec<_>>>()?;
            Filter::has_tides(&tides, mode)?
        }
        FamilyArg::Events => {
            let events = items
                .iter()
                .map(|item| match item.as_str() {
                    "none" => Ok(None),
                    other => other
                        .parse::<KnownOccurrence>()
                        .map(Some)
                        .map_err(|err| anyhow!(err)),
                })
                .collect::<Result<Vec<_>>>()?;
            Filter::has_events(&events, mode)?
        }
        FamilyArg::WeaponTypes => {
            let config = SyncConfig {
                base_url: base_url.to_string(),
                ..SyncConfig::default()
            };
            let catalog = StatInkClient::new(&config)?
                .fetch_weapon_catalog()
                .context("Failed to fetch the weapon catalog")?;
            info!(event = "weapon_catalog_loaded", weapons = catalog.len());
            Filter::has_weapon_types(items, mode, Arc::new(catalog))?
        }
    };
    Ok(filter)
}

fn single(items: &[String]) -> Result<&str> {
    match items {
        [item] => Ok(item),
        _ => bail!("This filter takes exactly one value, got {}", items.len()),
    }
}

fn format_time(seconds: i64) -> String {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .map_or_else(|| seconds.to_string(), |time| format_datetime(&time))
}

fn format_datetime(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn print_job(job: &Job, locale: &Locale) {
    println!("job {}", job.id);
    println!("  rotation:    {}", format_time(job.rotation()));
    if let Some(start) = job.start_at.as_ref().and_then(|time| time.as_datetime()) {
        println!("  played:      {}", format_datetime(&start));
    }
    if let Some(stage) = &job.stage {
        println!("  stage:       {}", stage.display(locale));
    }
    match job.clear_waves {
        Some(waves) => println!("  clear waves: {waves}"),
        None => println!("  clear waves: -"),
    }
    if let Some(rate) = job.danger_rate {
        println!("  danger rate: {rate}");
    }
    if let Some(reason) = &job.fail_reason {
        println!("  failed:      {reason}");
    }
    for (index, wave) in job.waves.iter().enumerate() {
        let event = wave
            .known_occurrence
            .map_or("none", |occurrence| occurrence.as_str());
        println!(
            "  wave {}: {} tide, {event}, {}/{} golden eggs",
            index + 1,
            wave.water_level,
            wave.golden_egg_delivered,
            wave.golden_egg_quota
        );
    }
    for player in job.players() {
        let weapons: Vec<&str> = player
            .weapons()
            .iter()
            .map(|weapon| weapon.display(locale))
            .collect();
        println!(
            "  {} ({}): {} | {} golden, {} power, {} rescues, {} deaths",
            player.name,
            player.splatnet_id,
            weapons.join(", "),
            player.golden_egg_delivered,
            player.power_egg_collected,
            player.rescue,
            player.death
        );
    }
    for tally in job.boss_summary() {
        let kills: Vec<String> = tally
            .kills
            .iter()
            .map(|kill| kill.map_or_else(|| "-".to_string(), |count| count.to_string()))
            .collect();
        println!(
            "  {}: {} appeared, kills {}",
            tally.boss.display(locale),
            tally.appearances,
            kills.join("/")
        );
    }
}
