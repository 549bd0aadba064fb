use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value;

use pitchcast::config::{ModelConfig, Unit};
use pitchcast::http_client::PayloadFetcher;
use pitchcast::ingest;
use pitchcast::model::{self, Match, MatchStatus, Team, TeamStats};
use pitchcast::payload_cache::PayloadCache;
use pitchcast::store::Store;
use pitchcast::update::{self, UpdateSummary};

const ARSENAL: i64 = 9825;
const CHELSEA: i64 = 8455;
const LIVERPOOL: i64 = 8650;
const MAN_CITY: i64 = 8456;

const LIVERPOOL_ARSENAL_UNPLAYED: &str = r#""status":{"utcTime":"2025-09-13T14:00:00.000Z","started":false,"finished":false,"cancelled":false}"#;
const LIVERPOOL_ARSENAL_PLAYED: &str = r#""status":{"utcTime":"2025-09-13T14:00:00.000Z","started":true,"finished":true,"cancelled":false,"scoreStr":"2 - 1"}"#;

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

/// Serves the Premier League page and results table; every other URL fails.
struct StubFetcher {
    primary_html: String,
    secondary_csv: Option<String>,
    calls: AtomicUsize,
}

impl StubFetcher {
    fn new() -> Self {
        Self {
            primary_html: fixture("primary_page.html"),
            secondary_csv: Some(fixture("secondary.csv")),
            calls: AtomicUsize::new(0),
        }
    }

    fn without_secondary() -> Self {
        Self {
            secondary_csv: None,
            ..Self::new()
        }
    }

    fn with_primary(html: String) -> Self {
        Self {
            primary_html: html,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PayloadFetcher for StubFetcher {
    fn fetch_text(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.contains("fotmob") && url.contains("premier-league") {
            return Ok(self.primary_html.clone());
        }
        if url.contains("football-data") && url.ends_with("/E0.csv") {
            return self
                .secondary_csv
                .clone()
                .ok_or_else(|| anyhow!("HTTP 503 for {url}"));
        }
        Err(anyhow!("HTTP 404 for {url}"))
    }
}

struct Harness {
    store: Store,
    cache: PayloadCache,
    cfg: ModelConfig,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open_in_memory().unwrap();
        model::register_all(&mut store).unwrap();
        Self {
            store,
            cache: PayloadCache::new(dir.path().join("payloads")),
            cfg: ModelConfig {
                current_season: "2025/2026".to_string(),
                simulation_trials: 5_000,
                ..ModelConfig::default()
            },
            _dir: dir,
        }
    }

    fn run(&mut self, fetcher: &StubFetcher, units: &[&str], now: DateTime<Utc>) -> UpdateSummary {
        let units = units
            .iter()
            .map(|raw| Unit::parse(raw).unwrap())
            .collect::<Vec<_>>();
        update::run_update(
            &mut self.store,
            fetcher,
            &self.cache,
            &units,
            2,
            &self.cfg,
            now,
        )
    }

    fn fixture_between(&self, home: i64, away: i64) -> Match {
        let mut rows = self
            .store
            .find_where::<Match>(
                "home_team_id = ?1 AND away_team_id = ?2",
                &[Value::Integer(home), Value::Integer(away)],
            )
            .unwrap();
        assert_eq!(rows.len(), 1, "one fixture {home} v {away}");
        rows.remove(0)
    }

    fn matches_without_timestamps(&self) -> Vec<Match> {
        let mut rows = self.store.find_all::<Match>().unwrap();
        for m in &mut rows {
            m.updated_at = None;
        }
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }

    fn snapshots(&self) -> Vec<TeamStats> {
        let mut rows = self.store.find_all::<TeamStats>().unwrap();
        rows.sort_by_key(|s| (s.team_id, s.round));
        rows
    }
}

fn before_round_four() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap()
}

const PL_CURRENT: &str = "premier_league:2025/2026";

#[test]
fn update_ingests_enriches_aggregates_and_predicts() {
    let mut h = Harness::new();
    let fetcher = StubFetcher::new();
    let summary = h.run(&fetcher, &[PL_CURRENT], before_round_four());

    assert_eq!(summary.units.len(), 1);
    let unit = &summary.units[0];
    assert!(unit.succeeded(), "{:?}", unit.error);
    assert_eq!(unit.ingest.fixtures_parsed, 10);
    assert_eq!(unit.ingest.fixtures_dropped, 1);
    assert_eq!(unit.ingest.new, 10);
    assert_eq!(unit.ingest.teams_created, 4);
    assert_eq!(unit.ingest.teams_located, 4);
    assert_eq!(unit.ingest.secondary_rows, 7);
    assert_eq!(unit.ingest.secondary_dropped, 2);
    assert_eq!(unit.ingest.enriched, 6);
    assert_eq!(unit.rounds, 5);
    assert_eq!(unit.eligible, 4);
    assert_eq!(unit.predicted, 4);

    assert_eq!(h.store.count::<Match>().unwrap(), 10);
    assert_eq!(h.store.count::<Team>().unwrap(), 4);
    // Four teams, five rounds, one fixture each per round.
    assert_eq!(h.store.count::<TeamStats>().unwrap(), 20);

    let opener = h.fixture_between(ARSENAL, CHELSEA);
    assert_eq!(opener.status, MatchStatus::Finished);
    assert_eq!((opener.home_goals, opener.away_goals), (2, 1));
    assert_eq!(opener.referee.as_deref(), Some("M Oliver"));
    assert_eq!(opener.odds_home, Some(1.78));
    assert_eq!(opener.home_shots_on_target, Some(6));
    assert!(!opener.has_prediction());

    let city_home = h.fixture_between(MAN_CITY, ARSENAL);
    assert_eq!(city_home.home_team, "Manchester City");
    assert_eq!(city_home.referee.as_deref(), Some("C Pawson"));

    for (home, away) in [
        (LIVERPOOL, ARSENAL),
        (MAN_CITY, CHELSEA),
        (ARSENAL, MAN_CITY),
        (LIVERPOOL, CHELSEA),
    ] {
        let m = h.fixture_between(home, away);
        assert!(m.has_prediction(), "{home} v {away} predicted");
        let total = m.prob_home.unwrap() + m.prob_draw.unwrap() + m.prob_away.unwrap();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(m.prob_over_1_5.unwrap() >= m.prob_over_2_5.unwrap());
        let xg = m.expected_home_goals.unwrap();
        assert!((h.cfg.min_goals_floor..=h.cfg.max_goals_cap).contains(&xg));
        assert_eq!(m.predicted_home_goals, xg.round() as i64);
        assert!(m.travel_factor.unwrap() < 1.0, "long trips trim the away side");
    }

    let arsenal = h
        .store
        .find_by_primary_key::<Team>(&[("id", Value::Integer(ARSENAL))])
        .unwrap()
        .unwrap();
    assert!(arsenal.location().is_some());
}

#[test]
fn rerun_with_same_input_changes_nothing() {
    let mut h = Harness::new();
    let fetcher = StubFetcher::new();
    h.run(&fetcher, &[PL_CURRENT], before_round_four());
    let first_matches = h.matches_without_timestamps();
    let first_stats = h.snapshots();

    let summary = h.run(&fetcher, &[PL_CURRENT], before_round_four());
    let unit = &summary.units[0];
    assert!(unit.succeeded());
    assert_eq!(unit.ingest.new, 0);
    assert_eq!(unit.ingest.kept, 6);
    assert_eq!(unit.ingest.refreshed, 4);
    assert_eq!(unit.ingest.teams_created, 0);

    assert_eq!(h.matches_without_timestamps(), first_matches);
    assert_eq!(h.snapshots(), first_stats);
}

#[test]
fn result_arriving_later_keeps_the_prediction_made_before_kickoff() {
    let mut h = Harness::new();
    h.run(&StubFetcher::new(), &[PL_CURRENT], before_round_four());
    let before = h.fixture_between(LIVERPOOL, ARSENAL);
    assert!(before.has_prediction());

    let page = fixture("primary_page.html");
    let played = page.replace(LIVERPOOL_ARSENAL_UNPLAYED, LIVERPOOL_ARSENAL_PLAYED);
    assert_ne!(played, page);
    let after_round_four = Utc.with_ymd_and_hms(2025, 9, 15, 9, 0, 0).unwrap();
    let summary = h.run(
        &StubFetcher::with_primary(played.clone()),
        &[PL_CURRENT],
        after_round_four,
    );
    assert!(summary.units[0].succeeded());

    let after = h.fixture_between(LIVERPOOL, ARSENAL);
    assert_eq!(after.status, MatchStatus::Finished);
    assert_eq!((after.home_goals, after.away_goals), (2, 1));
    assert_eq!(after.predicted_home_goals, before.predicted_home_goals);
    assert_eq!(after.predicted_away_goals, before.predicted_away_goals);
    assert_eq!(after.prob_home, before.prob_home);
    assert_eq!(after.expected_away_goals, before.expected_away_goals);

    // Settled now: a third pass keeps the stored row as it is.
    let summary = h.run(&StubFetcher::with_primary(played), &[PL_CURRENT], after_round_four);
    assert_eq!(summary.units[0].ingest.kept, 7);
    let settled = h.fixture_between(LIVERPOOL, ARSENAL);
    assert_eq!(settled.prob_home, before.prob_home);
}

#[test]
fn missing_results_table_only_loses_enrichment() {
    let mut h = Harness::new();
    let summary = h.run(
        &StubFetcher::without_secondary(),
        &[PL_CURRENT],
        before_round_four(),
    );

    let unit = &summary.units[0];
    assert!(unit.succeeded(), "{:?}", unit.error);
    assert_eq!(unit.ingest.enriched, 0);
    assert_eq!(unit.predicted, 4);
    assert!(h.fixture_between(ARSENAL, CHELSEA).referee.is_none());
}

#[test]
fn failing_unit_does_not_stop_the_others() {
    let mut h = Harness::new();
    let summary = h.run(
        &StubFetcher::new(),
        &["laliga:2025/2026", PL_CURRENT],
        before_round_four(),
    );

    assert_eq!(summary.units.len(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.succeeded(), 1);
    let failed = summary.units.iter().find(|u| !u.succeeded()).unwrap();
    assert_eq!(failed.unit, "laliga:2025/2026");
    assert!(failed.error.as_deref().unwrap().contains("primary payload"));
    assert_eq!(summary.predicted(), 4);
    assert_eq!(h.store.count::<Match>().unwrap(), 10);
}

#[test]
fn past_season_is_read_from_the_cache_on_later_runs() {
    let mut h = Harness::new();
    let fetcher = StubFetcher::new();
    let past = "premier_league:2024/2025";

    let first = h.run(&fetcher, &[past], before_round_four());
    assert!(!first.units[0].ingest.primary_from_cache);
    let calls = fetcher.calls();
    assert_eq!(calls, 2);

    let second = h.run(&fetcher, &[past], before_round_four());
    assert!(second.units[0].ingest.primary_from_cache);
    assert_eq!(fetcher.calls(), calls);
    // Only the active season is forecast.
    assert_eq!(second.units[0].eligible, 0);
}

#[test]
fn current_season_is_fetched_every_run() {
    let mut h = Harness::new();
    let fetcher = StubFetcher::new();
    h.run(&fetcher, &[PL_CURRENT], before_round_four());
    h.run(&fetcher, &[PL_CURRENT], before_round_four());
    assert_eq!(fetcher.calls(), 4);
}

#[test]
fn unit_can_be_updated_from_an_explicit_fetch() {
    let mut h = Harness::new();
    let unit = Unit::parse(PL_CURRENT).unwrap();
    let fetched = ingest::fetch_unit(&StubFetcher::new(), &h.cache, &unit, &h.cfg);
    assert!(fetched.primary.is_ok());

    let done = update::update_unit(&mut h.store, fetched, &h.cfg, before_round_four()).unwrap();
    assert_eq!(done.unit, PL_CURRENT);
    assert_eq!(done.predicted, 4);
    assert_eq!(done.snapshots, 20);
}
