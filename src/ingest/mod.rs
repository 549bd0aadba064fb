//! Fetch, cache, parse and reconcile the fixtures of one competition season.
//!
//! Fetching ([`fetch_unit`]) touches only the network and the payload cache, so units can be
//! fetched in parallel. Processing ([`process_unit`]) owns the store and runs one unit at a time.

pub mod html_embed;
pub mod merge;
pub mod primary;
pub mod secondary;
pub mod team_names;

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use rusqlite::types::Value;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ModelConfig, Unit};
use crate::geo;
use crate::http_client::PayloadFetcher;
use crate::model::{Match, Team};
use crate::payload_cache::{CachedPayload, PayloadCache, Source};
use crate::store::Store;

use self::merge::{ReconcileCounts, merge_secondary, reconcile};
use self::team_names::TeamNameTable;

/// Raw payloads of one unit. The primary one is required; the secondary one only enriches.
#[derive(Debug)]
pub struct FetchedUnit {
    pub unit: Unit,
    pub primary: Result<CachedPayload>,
    pub secondary: Result<CachedPayload>,
}

pub fn fetch_unit(
    fetcher: &dyn PayloadFetcher,
    cache: &PayloadCache,
    unit: &Unit,
    cfg: &ModelConfig,
) -> FetchedUnit {
    let key = unit.competition.key;
    let season = unit.season.as_str();
    let current = season == cfg.current_season;

    let primary_payload = cache
        .get_or_fetch(Source::Primary, key, season, current, || {
            primary::fetch_primary_payload(fetcher, unit.competition, season)
        })
        .with_context(|| format!("primary payload for {}", unit.label()));
    let secondary_payload = cache
        .get_or_fetch(Source::Secondary, key, season, current, || {
            secondary::fetch_secondary_payload(fetcher, unit.competition, season)
        })
        .with_context(|| format!("secondary payload for {}", unit.label()));

    FetchedUnit {
        unit: unit.clone(),
        primary: primary_payload,
        secondary: secondary_payload,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub primary_from_cache: bool,
    pub fixtures_parsed: usize,
    pub fixtures_dropped: usize,
    pub new: usize,
    pub kept: usize,
    pub refreshed: usize,
    pub secondary_rows: usize,
    pub secondary_dropped: usize,
    pub enriched: usize,
    pub teams_created: usize,
    pub teams_located: usize,
}

#[derive(Debug)]
pub struct IngestOutcome {
    /// Reconciled fixtures as saved, ordered by kickoff.
    pub matches: Vec<Match>,
    pub report: IngestReport,
}

/// Parses, reconciles, enriches and persists one fetched unit. Fails only when the primary
/// payload is missing or unreadable, or the store rejects a write.
pub fn process_unit(store: &mut Store, fetched: FetchedUnit) -> Result<IngestOutcome> {
    let FetchedUnit {
        unit,
        primary: primary_payload,
        secondary: secondary_payload,
    } = fetched;
    let competition = unit.competition.key;
    let season = unit.season.as_str();
    let mut report = IngestReport::default();

    let primary_payload = primary_payload?;
    report.primary_from_cache = primary_payload.from_cache;
    let parsed = primary::parse_primary_payload(&primary_payload.body, competition, season)
        .with_context(|| format!("parse primary payload for {}", unit.label()))?;
    report.fixtures_parsed = parsed.matches.len();
    report.fixtures_dropped = parsed.dropped;

    let persisted = load_persisted(store, competition, season)?;
    let fresh = dedup_by_id(parsed.matches);
    let (mut matches, counts) = reconcile(fresh, &persisted);
    let ReconcileCounts {
        new,
        kept,
        refreshed,
    } = counts;
    report.new = new;
    report.kept = kept;
    report.refreshed = refreshed;

    match secondary_payload {
        Ok(payload) => {
            match secondary::parse_secondary_payload(&payload.body, competition, season) {
                Ok(table) => {
                    let names = TeamNameTable::from_teams(matches.iter().flat_map(|m| {
                        [
                            (m.home_team_id, m.home_team.as_str()),
                            (m.away_team_id, m.away_team.as_str()),
                        ]
                    }));
                    report.secondary_rows = table.records.len();
                    let (resolved, unresolved) =
                        secondary::resolve_records(table.records, &names, competition, season);
                    report.secondary_dropped = table.dropped + unresolved;
                    report.enriched = merge_secondary(&mut matches, &resolved);
                }
                Err(err) => warn!(
                    competition,
                    season,
                    error = %format!("{err:#}"),
                    "secondary payload unreadable, continuing without it"
                ),
            }
        }
        Err(err) => warn!(
            competition,
            season,
            error = %format!("{err:#}"),
            "secondary payload unavailable, continuing without it"
        ),
    }

    let (created, located) = ensure_teams(store, &matches)?;
    report.teams_created = created;
    report.teams_located = located;

    matches.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.id.cmp(&b.id)));
    store
        .bulk_save(&mut matches)
        .with_context(|| format!("save matches for {}", unit.label()))?;

    info!(
        competition,
        season,
        fixtures = report.fixtures_parsed,
        new = report.new,
        kept = report.kept,
        refreshed = report.refreshed,
        enriched = report.enriched,
        teams_created = report.teams_created,
        "unit ingested"
    );
    Ok(IngestOutcome { matches, report })
}

fn load_persisted(store: &Store, competition: &str, season: &str) -> Result<HashMap<String, Match>> {
    let rows = store
        .find_where::<Match>(
            "competition = ?1 AND season = ?2",
            &[
                Value::Text(competition.to_string()),
                Value::Text(season.to_string()),
            ],
        )
        .with_context(|| format!("load persisted matches for {competition} {season}"))?;
    Ok(rows.into_iter().map(|m| (m.id.clone(), m)).collect())
}

/// The provider occasionally lists a fixture twice (e.g. under a postponed round and its new
/// date on the same day); the later listing wins.
fn dedup_by_id(matches: Vec<Match>) -> Vec<Match> {
    let mut by_id: BTreeMap<String, Match> = BTreeMap::new();
    for m in matches {
        if let Some(prev) = by_id.insert(m.id.clone(), m) {
            debug!(match_id = %prev.id, "duplicate fixture in primary payload");
        }
    }
    by_id.into_values().collect()
}

/// Creates teams seen for the first time and back-fills coordinates the static table knows.
/// Returns (created, located).
fn ensure_teams(store: &mut Store, matches: &[Match]) -> Result<(usize, usize)> {
    let mut seen: BTreeMap<i64, &str> = BTreeMap::new();
    for m in matches {
        seen.entry(m.home_team_id).or_insert(&m.home_team);
        seen.entry(m.away_team_id).or_insert(&m.away_team);
    }

    let mut created = 0;
    let mut located = 0;
    let mut dirty = Vec::new();
    for (id, name) in seen {
        let existing = store
            .find_by_primary_key::<Team>(&[("id", Value::Integer(id))])
            .with_context(|| format!("load team {id}"))?;
        let (mut team, is_new) = match existing {
            Some(team) => (team, false),
            None => (Team::new(id, name), true),
        };
        let moved = geo::backfill_location(&mut team);
        if moved {
            located += 1;
        } else if is_new {
            debug!(team = %team.name, "no known location for team");
        }
        if is_new {
            created += 1;
        }
        if is_new || moved {
            dirty.push(team);
        }
    }
    if !dirty.is_empty() {
        store.bulk_save(&mut dirty).context("save teams")?;
    }
    Ok((created, located))
}
