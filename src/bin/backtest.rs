use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use rusqlite::types::Value;

use pitchcast::calibration::{self, Outcome, Prob3};
use pitchcast::config::{ModelConfig, Unit, UpdateConfig};
use pitchcast::geo;
use pitchcast::model::{self, Match, MatchStatus, Team};
use pitchcast::predict;
use pitchcast::stats;
use pitchcast::store::Store;

const DEFAULT_SWEEP_FORM_WEIGHTS: [f64; 5] = [0.0, 0.15, 0.30, 0.45, 0.60];
const DEFAULT_SWEEP_RHOS: [f64; 5] = [-0.02, -0.06, -0.10, -0.14, -0.18];
const DEFAULT_SWEEP_TOP: usize = 10;

#[derive(Debug, Clone)]
struct TrialSummary {
    form_weight: f64,
    dc_rho: f64,
    metrics: calibration::Metrics,
    skipped: usize,
}

/// Walk-forward replay of one stored unit: every finished fixture of round N is forecast from
/// the snapshots of rounds before N, then scored against its actual result.
fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let update_cfg = UpdateConfig::from_env()?;
    let db_path = parse_path_arg("--db").unwrap_or_else(|| update_cfg.db_path.clone());
    let unit = match parse_str_arg("--unit") {
        Some(raw) => Unit::parse(&raw)?,
        None => update_cfg
            .units
            .first()
            .cloned()
            .context("no unit configured; pass --unit competition:season")?,
    };

    let mut base = ModelConfig::from_env();
    // The analytic grid is exact and far cheaper than sampling for a full-season replay.
    base.simulation_trials = parse_usize_arg("--trials").unwrap_or(0).min(1_000_000) as u32;
    if let Some(w) = parse_f64_arg("--form-weight") {
        base.form_weight = w.clamp(0.0, 1.0);
    }
    if let Some(rho) = parse_f64_arg("--rho") {
        base.dc_rho = rho.clamp(-0.30, -0.001);
    }
    base.validate().context("invalid model configuration")?;

    let sweep = has_flag("--sweep");
    let sweep_top = parse_usize_arg("--sweep-top")
        .unwrap_or(DEFAULT_SWEEP_TOP)
        .clamp(1, 100);
    let sweep_form_weights = parse_f64_list_arg("--sweep-form-weights")
        .unwrap_or_else(|| DEFAULT_SWEEP_FORM_WEIGHTS.to_vec())
        .into_iter()
        .map(|v| v.clamp(0.0, 1.0))
        .collect::<Vec<_>>();
    let sweep_rhos = parse_f64_list_arg("--sweep-rhos")
        .unwrap_or_else(|| DEFAULT_SWEEP_RHOS.to_vec())
        .into_iter()
        .map(|v| v.clamp(-0.30, -0.001))
        .collect::<Vec<_>>();

    let mut store = Store::open(&db_path)
        .with_context(|| format!("cannot open store {}", db_path.display()))?;
    model::register_all(&mut store)?;

    let finished = load_finished(&store, &unit)?;
    if finished.is_empty() {
        return Err(anyhow!(
            "no finished fixtures for {} in {}",
            unit.label(),
            db_path.display()
        ));
    }
    let teams = load_teams(&store, &finished)?;

    let (probs, scored) = replay(&unit, &finished, &teams, &base)?;
    let model_metrics = calibration::evaluate_probs(&probs, &scored);

    // Baselines are scored on the same forecastable subset as the model.
    let uniform = vec![Prob3::uniform(); scored.len()];
    let uniform_metrics = calibration::evaluate_probs(&uniform, &scored);
    let empirical = vec![calibration::empirical_outcome_probs(&scored); scored.len()];
    let empirical_metrics = calibration::evaluate_probs(&empirical, &scored);

    println!("Walk-forward backtest {}", unit.label());
    println!("DB: {}", db_path.display());
    println!(
        "Finished fixtures: {} (forecast {}, no prior stats {})",
        finished.len(),
        scored.len(),
        finished.len() - scored.len()
    );
    println!(
        "Config: form_weight={:.2} rho={:+.3} trials={}",
        base.form_weight, base.dc_rho, base.simulation_trials
    );
    println!();
    print_metrics("Model", model_metrics);
    print_metrics("Uniform baseline", uniform_metrics);
    print_metrics("Empirical baseline", empirical_metrics);

    println!();
    println!("Home-win calibration:");
    for bin in calibration::calibration_bins(&probs, &scored, Outcome::Home, 10) {
        if bin.count == 0 {
            continue;
        }
        println!(
            "  {:.1}-{:.1}: n={:>4} predicted={:.3} actual={:.3}",
            bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
        );
    }

    if sweep {
        let mut ranked = Vec::new();
        for w in &sweep_form_weights {
            for rho in &sweep_rhos {
                let cfg = ModelConfig {
                    form_weight: *w,
                    dc_rho: *rho,
                    ..base.clone()
                };
                let (probs, scored) = replay(&unit, &finished, &teams, &cfg)?;
                ranked.push(TrialSummary {
                    form_weight: *w,
                    dc_rho: *rho,
                    metrics: calibration::evaluate_probs(&probs, &scored),
                    skipped: finished.len() - scored.len(),
                });
            }
        }
        ranked.sort_by(compare_trials);

        println!();
        println!(
            "Sweep results: combos={} (top {} by log loss)",
            ranked.len(),
            sweep_top.min(ranked.len())
        );
        for t in ranked.iter().take(sweep_top) {
            println!(
                "  w={:.2} rho={:+.3} ll={:.4} brier={:.4} acc={:.3} vs_emp={:+.4} skipped={}",
                t.form_weight,
                t.dc_rho,
                t.metrics.log_loss,
                t.metrics.brier,
                t.metrics.accuracy,
                empirical_metrics.log_loss - t.metrics.log_loss,
                t.skipped
            );
        }
    }

    Ok(())
}

fn load_finished(store: &Store, unit: &Unit) -> Result<Vec<Match>> {
    let rows = store
        .find_where::<Match>(
            "competition = ?1 AND season = ?2 AND status = ?3 AND home_goals >= 0 \
             ORDER BY kickoff",
            &[
                Value::Text(unit.competition.key.to_string()),
                Value::Text(unit.season.clone()),
                Value::Text(MatchStatus::Finished.as_str().to_string()),
            ],
        )
        .with_context(|| format!("load finished fixtures for {}", unit.label()))?;
    Ok(rows
        .into_iter()
        .filter(|m| m.has_result() && stats::round_of(m).is_some())
        .collect())
}

fn load_teams(store: &Store, matches: &[Match]) -> Result<Vec<Team>> {
    let ids = matches
        .iter()
        .flat_map(|m| [m.home_team_id, m.away_team_id])
        .collect::<BTreeSet<_>>();
    let mut teams = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(team) = store.find_by_primary_key::<Team>(&[("id", Value::Integer(id))])? {
            teams.push(team);
        }
    }
    Ok(teams)
}

/// Aggregates into a scratch store with `cfg` and forecasts every fixture that has prior
/// snapshots for both sides. Returns the forecasts and the matching actual outcomes.
fn replay(
    unit: &Unit,
    finished: &[Match],
    teams: &[Team],
    cfg: &ModelConfig,
) -> Result<(Vec<Prob3>, Vec<Outcome>)> {
    let competition = unit.competition.key;
    let season = unit.season.as_str();

    let mut scratch = Store::open_in_memory()?;
    model::register_all(&mut scratch)?;
    let mut copied = teams.to_vec();
    scratch.bulk_save(&mut copied)?;
    let by_id = teams.iter().map(|t| (t.id, t)).collect::<HashMap<_, _>>();

    let aggregate = stats::aggregate_unit(&mut scratch, competition, season, finished, cfg)?;

    let mut probs = Vec::with_capacity(finished.len());
    let mut outcomes = Vec::with_capacity(finished.len());
    for m in finished {
        let Some(round) = stats::round_of(m) else {
            continue;
        };
        let home = stats::latest_stats(&scratch, m.home_team_id, competition, season, round)?;
        let away = stats::latest_stats(&scratch, m.away_team_id, competition, season, round)?;
        let (Some(home), Some(away), Some(avg)) = (home, away, aggregate.average_before(round))
        else {
            continue;
        };
        if !predict::has_usable_history(&home, &away, avg) {
            continue;
        }
        let travel = match (by_id.get(&m.home_team_id), by_id.get(&m.away_team_id)) {
            (Some(h), Some(a)) => geo::fixture_multiplier(cfg, h, a),
            _ => 1.0,
        };
        let prediction = predict::predict_match(&m.id, &home, &away, avg, travel, cfg);
        probs.push(prediction.probs);
        outcomes.push(calibration::classify_outcome(m.home_goals, m.away_goals));
    }
    Ok((probs, outcomes))
}

fn compare_trials(a: &TrialSummary, b: &TrialSummary) -> Ordering {
    a.metrics
        .log_loss
        .partial_cmp(&b.metrics.log_loss)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            a.metrics
                .brier
                .partial_cmp(&b.metrics.brier)
                .unwrap_or(Ordering::Equal)
        })
}

fn print_metrics(label: &str, metrics: calibration::Metrics) {
    println!("{label}:");
    println!(
        "  samples={} brier={:.4} log_loss={:.4} accuracy={:.3}",
        metrics.samples, metrics.brier, metrics.log_loss, metrics.accuracy
    );
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}

fn parse_str_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    parse_str_arg(name).map(PathBuf::from)
}

fn parse_f64_arg(name: &str) -> Option<f64> {
    parse_str_arg(name).and_then(|raw| raw.parse::<f64>().ok())
}

fn parse_usize_arg(name: &str) -> Option<usize> {
    parse_str_arg(name).and_then(|raw| raw.parse::<usize>().ok())
}

fn parse_f64_list_arg(name: &str) -> Option<Vec<f64>> {
    let raw = parse_str_arg(name)?;
    let values = raw
        .split(',')
        .filter_map(|part| part.trim().parse::<f64>().ok())
        .collect::<Vec<_>>();
    if values.is_empty() { None } else { Some(values) }
}
