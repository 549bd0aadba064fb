use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ModelConfig, Unit};
use crate::http_client::PayloadFetcher;
use crate::ingest::{self, FetchedUnit, IngestReport};
use crate::payload_cache::PayloadCache;
use crate::predict;
use crate::stats;
use crate::store::Store;

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnitSummary {
    pub unit: String,
    pub error: Option<String>,
    pub ingest: IngestReport,
    pub rounds: usize,
    pub snapshots: usize,
    pub eligible: usize,
    pub predicted: usize,
    pub prediction_skipped: usize,
}

impl UnitSummary {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateSummary {
    pub units: Vec<UnitSummary>,
}

impl UpdateSummary {
    pub fn succeeded(&self) -> usize {
        self.units.iter().filter(|u| u.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.units.len() - self.succeeded()
    }

    pub fn predicted(&self) -> usize {
        self.units.iter().map(|u| u.predicted).sum()
    }
}

/// One full pass: fetch every unit (in parallel), then ingest, aggregate and predict each
/// unit in order on the one store. A failing unit is logged and skipped.
pub fn run_update(
    store: &mut Store,
    fetcher: &dyn PayloadFetcher,
    cache: &PayloadCache,
    units: &[Unit],
    fetch_parallelism: usize,
    cfg: &ModelConfig,
    now: DateTime<Utc>,
) -> UpdateSummary {
    let pool = build_fetch_pool(fetch_parallelism);
    let fetched: Vec<FetchedUnit> = with_fetch_pool(&pool, || {
        units
            .par_iter()
            .map(|unit| ingest::fetch_unit(fetcher, cache, unit, cfg))
            .collect()
    });

    let mut summary = UpdateSummary::default();
    for unit in fetched {
        let label = unit.unit.label();
        match update_unit(store, unit, cfg, now) {
            Ok(done) => summary.units.push(done),
            Err(err) => {
                warn!(unit = %label, error = %format!("{err:#}"), "unit failed, skipping");
                summary.units.push(UnitSummary {
                    unit: label,
                    error: Some(format!("{err:#}")),
                    ..UnitSummary::default()
                });
            }
        }
    }
    info!(
        units = summary.units.len(),
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        predicted = summary.predicted(),
        "update finished"
    );
    summary
}

/// Ingest, aggregate and predict one fetched unit as an unbroken sequence.
pub fn update_unit(
    store: &mut Store,
    fetched: FetchedUnit,
    cfg: &ModelConfig,
    now: DateTime<Utc>,
) -> Result<UnitSummary> {
    let label = fetched.unit.label();
    let competition = fetched.unit.competition.key;
    let season = fetched.unit.season.clone();

    let ingest::IngestOutcome {
        mut matches,
        report,
    } = ingest::process_unit(store, fetched)?;

    let aggregate = stats::aggregate_unit(store, competition, &season, &matches, cfg)
        .with_context(|| format!("aggregate {label}"))?;
    let counts = predict::predict_unit(store, &mut matches, &aggregate, cfg, now)
        .with_context(|| format!("predict {label}"))?;

    Ok(UnitSummary {
        unit: label,
        error: None,
        ingest: report,
        rounds: aggregate.rounds,
        snapshots: aggregate.snapshots_saved,
        eligible: counts.eligible,
        predicted: counts.predicted,
        prediction_skipped: counts.skipped,
    })
}

fn build_fetch_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.clamp(1, 16))
        .build()
        .ok()
}

fn with_fetch_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}
