use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rusqlite::types::Value;

use pitchcast::config::{self, ModelConfig, UpdateConfig};
use pitchcast::http_client::HttpFetcher;
use pitchcast::logging;
use pitchcast::model::{self, Match};
use pitchcast::payload_cache::PayloadCache;
use pitchcast::store::Store;
use pitchcast::update::{self, UpdateSummary};

#[derive(Parser)]
#[command(name = "pitchcast")]
#[command(about = "Football fixture ingestion, team statistics and match forecasts", long_about = None)]
struct Cli {
    /// SQLite store path (overrides PITCHCAST_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, reconcile, aggregate and predict every configured competition season
    Update {
        /// Payload cache directory (overrides PITCHCAST_CACHE_DIR)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// competition:season, repeatable (overrides PITCHCAST_UNITS)
        #[arg(long = "unit")]
        units: Vec<String>,
    },
    /// List stored forecasts for upcoming fixtures
    PredictShow {
        /// competition:season to show (defaults to every configured unit)
        #[arg(long = "unit")]
        units: Vec<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let cli = Cli::parse();
    let mut update_cfg = UpdateConfig::from_env()?;
    logging::init(&update_cfg.log_level, &update_cfg.log_format);

    let model_cfg = ModelConfig::from_env();
    model_cfg.validate().context("invalid model configuration")?;

    if let Some(db) = cli.db {
        update_cfg.db_path = db;
    }
    let mut store = Store::open(&update_cfg.db_path)
        .with_context(|| format!("cannot open store {}", update_cfg.db_path.display()))?;
    model::register_all(&mut store).context("cannot initialise store schema")?;

    match cli.command {
        Commands::Update { cache_dir, units } => {
            if let Some(dir) = cache_dir {
                update_cfg.cache_dir = dir;
            }
            if !units.is_empty() {
                update_cfg.units = config::parse_units(&units.join(","))?;
            }
            let fetcher = HttpFetcher::new(update_cfg.http_timeout_secs);
            let cache = PayloadCache::new(&update_cfg.cache_dir);
            let summary = update::run_update(
                &mut store,
                &fetcher,
                &cache,
                &update_cfg.units,
                update_cfg.fetch_parallelism,
                &model_cfg,
                Utc::now(),
            );
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary, &update_cfg);
            }
        }
        Commands::PredictShow { units, limit } => {
            let units = if units.is_empty() {
                update_cfg.units.clone()
            } else {
                config::parse_units(&units.join(","))?
            };
            for unit in &units {
                let upcoming = store.find_where::<Match>(
                    "competition = ?1 AND season = ?2 AND predicted_home_goals >= 0 \
                     AND home_goals < 0 AND kickoff > ?3 ORDER BY kickoff LIMIT ?4",
                    &[
                        Value::Text(unit.competition.key.to_string()),
                        Value::Text(unit.season.clone()),
                        Value::Text(Utc::now().to_rfc3339()),
                        Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)),
                    ],
                )?;
                if cli.json {
                    let rows = upcoming.iter().map(forecast_json).collect::<Vec<_>>();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    print_forecasts(&unit.label(), &upcoming);
                }
            }
        }
    }
    Ok(())
}

fn print_summary(summary: &UpdateSummary, cfg: &UpdateConfig) {
    println!("Update complete");
    println!("DB: {}", cfg.db_path.display());
    println!(
        "Units: {}/{} succeeded, {} matches predicted",
        summary.succeeded(),
        summary.units.len(),
        summary.predicted()
    );
    for unit in &summary.units {
        if let Some(err) = &unit.error {
            println!("{}: FAILED {err}", unit.unit);
            continue;
        }
        let i = &unit.ingest;
        println!(
            "{}: fixtures={} new={} kept={} refreshed={} enriched={} teams+={} rounds={} predicted={}/{}",
            unit.unit,
            i.fixtures_parsed,
            i.new,
            i.kept,
            i.refreshed,
            i.enriched,
            i.teams_created,
            unit.rounds,
            unit.predicted,
            unit.eligible
        );
        if i.fixtures_dropped + i.secondary_dropped > 0 {
            println!(
                "  dropped: {} fixtures, {} secondary rows",
                i.fixtures_dropped, i.secondary_dropped
            );
        }
    }
}

fn print_forecasts(label: &str, upcoming: &[Match]) {
    println!("{label}");
    if upcoming.is_empty() {
        println!("  no stored forecasts");
        return;
    }
    for m in upcoming {
        let pct = |p: Option<f64>| p.map(|v| format!("{:.0}%", v * 100.0)).unwrap_or_default();
        println!(
            "  {} {:>24} {}-{} {:<24} H {:>4} D {:>4} A {:>4}  o2.5 {:>4}",
            m.kickoff.format("%Y-%m-%d %H:%M"),
            m.home_team,
            m.predicted_home_goals,
            m.predicted_away_goals,
            m.away_team,
            pct(m.prob_home),
            pct(m.prob_draw),
            pct(m.prob_away),
            pct(m.prob_over_2_5),
        );
    }
}

fn forecast_json(m: &Match) -> serde_json::Value {
    serde_json::json!({
        "id": m.id,
        "kickoff": m.kickoff.to_rfc3339(),
        "round": m.round,
        "home": m.home_team,
        "away": m.away_team,
        "predicted": [m.predicted_home_goals, m.predicted_away_goals],
        "expected": [m.expected_home_goals, m.expected_away_goals],
        "prob_home": m.prob_home,
        "prob_draw": m.prob_draw,
        "prob_away": m.prob_away,
        "prob_over_1_5": m.prob_over_1_5,
        "prob_over_2_5": m.prob_over_2_5,
        "travel_factor": m.travel_factor,
    })
}
