//! Cumulative per-team, per-round statistics.
//!
//! Rounds are replayed in ascending order from the first one every time a unit is updated.
//! Round N snapshots are built from the latest earlier snapshot of each team plus round N's
//! finished matches, then persisted in one transaction before round N+1 is looked at.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Context, Result};
use rusqlite::types::Value;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::StoreError;
use crate::model::{FormResult, Match, MatchStatus, RoundAverage, TeamStats};
use crate::store::Store;

/// First positive integer token in a free-text round label (`"Round 12"`, `"12"`, `"MD 3 of 38"`).
pub fn parse_round_label(label: &str) -> Option<u32> {
    label
        .split(|c: char| !c.is_ascii_digit())
        .filter(|tok| !tok.is_empty())
        .find_map(|tok| tok.parse::<u32>().ok())
        .filter(|n| *n > 0)
}

pub fn round_of(m: &Match) -> Option<u32> {
    m.round.or_else(|| parse_round_label(&m.round_label))
}

/// Fixtures grouped by round, each round sorted by kickoff. Fixtures without a usable round
/// number are left out and logged.
pub fn group_by_round(matches: &[Match]) -> BTreeMap<u32, Vec<&Match>> {
    let mut rounds: BTreeMap<u32, Vec<&Match>> = BTreeMap::new();
    for m in matches {
        match round_of(m) {
            Some(round) => rounds.entry(round).or_default().push(m),
            None => warn!(
                match_id = %m.id,
                competition = %m.competition,
                season = %m.season,
                label = %m.round_label,
                "round label has no number, fixture left out of statistics"
            ),
        }
    }
    for fixtures in rounds.values_mut() {
        fixtures.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.id.cmp(&b.id)));
    }
    rounds
}

fn counts_toward_stats(m: &Match) -> bool {
    m.status == MatchStatus::Finished && m.has_result()
}

fn guard(mean: f64) -> f64 {
    if mean.is_finite() && mean > 0.0 { mean } else { 1.0 }
}

fn per_game(total: u32, games: u32) -> f64 {
    if games == 0 {
        0.0
    } else {
        f64::from(total) / f64::from(games)
    }
}

impl TeamStats {
    /// Layers one finished match on top of this snapshot.
    pub fn apply_result(&mut self, scored: i64, conceded: i64, at_home: bool) {
        let scored_n = u32::try_from(scored).unwrap_or(0);
        let conceded_n = u32::try_from(conceded).unwrap_or(0);
        let result = FormResult::from_goals(scored, conceded);
        let (games, wins, draws, losses, goals_for, goals_against) = if at_home {
            (
                &mut self.games_home,
                &mut self.wins_home,
                &mut self.draws_home,
                &mut self.losses_home,
                &mut self.goals_for_home,
                &mut self.goals_against_home,
            )
        } else {
            (
                &mut self.games_away,
                &mut self.wins_away,
                &mut self.draws_away,
                &mut self.losses_away,
                &mut self.goals_for_away,
                &mut self.goals_against_away,
            )
        };
        *games += 1;
        match result {
            FormResult::Win => *wins += 1,
            FormResult::Draw => *draws += 1,
            FormResult::Loss => *losses += 1,
        }
        *goals_for += scored_n;
        *goals_against += conceded_n;
        self.form.push(result);
        self.refresh_per_game();
    }

    pub fn refresh_per_game(&mut self) {
        self.scored_home_per_game = per_game(self.goals_for_home, self.games_home);
        self.scored_away_per_game = per_game(self.goals_for_away, self.games_away);
        self.conceded_home_per_game = per_game(self.goals_against_home, self.games_home);
        self.conceded_away_per_game = per_game(self.goals_against_away, self.games_away);
    }

    /// Blends goal ratios against the round's league means with recent form. A venue with no
    /// games yet counts as league average there.
    pub fn apply_strengths(&mut self, avg: &RoundAverage, cfg: &ModelConfig) {
        let ratio = |value: f64, games: u32, mean: f64| {
            if games == 0 { 1.0 } else { value / guard(mean) }
        };
        let form_factor = self.form_value() / guard(avg.max_form);
        let sw = cfg.stats_weight();
        let fw = cfg.form_weight;
        let attack = |raw: f64| sw * raw + fw * form_factor * raw;
        let defense = |raw: f64| sw * raw + fw * (2.0 - form_factor) * raw;

        self.attack_home = attack(ratio(
            self.scored_home_per_game,
            self.games_home,
            avg.mean_home_goals_per_game,
        ));
        self.attack_away = attack(ratio(
            self.scored_away_per_game,
            self.games_away,
            avg.mean_away_goals_per_game,
        ));
        self.defense_home = defense(ratio(
            self.conceded_home_per_game,
            self.games_home,
            avg.mean_home_conceded_per_game,
        ));
        self.defense_away = defense(ratio(
            self.conceded_away_per_game,
            self.games_away,
            avg.mean_away_conceded_per_game,
        ));
    }
}

impl RoundAverage {
    /// League-wide means over one snapshot per team. Home figures only count teams that have
    /// played at home (likewise away), so a side yet to host doesn't drag the mean to zero.
    pub fn from_snapshots<'a>(
        competition: &str,
        season: &str,
        round: u32,
        snapshots: impl IntoIterator<Item = &'a TeamStats>,
    ) -> Self {
        let snapshots = snapshots.into_iter().collect::<Vec<_>>();
        let home = snapshots
            .iter()
            .filter(|s| s.games_home > 0)
            .collect::<Vec<_>>();
        let away = snapshots
            .iter()
            .filter(|s| s.games_away > 0)
            .collect::<Vec<_>>();
        let mean = |values: Vec<f64>| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };
        let max = |values: Vec<f64>| values.into_iter().fold(0.0_f64, f64::max);

        Self {
            competition: competition.to_string(),
            season: season.to_string(),
            round,
            teams: snapshots.len(),
            mean_home_goals_per_game: mean(home.iter().map(|s| s.scored_home_per_game).collect()),
            max_home_goals_per_game: max(home.iter().map(|s| s.scored_home_per_game).collect()),
            mean_away_goals_per_game: mean(away.iter().map(|s| s.scored_away_per_game).collect()),
            max_away_goals_per_game: max(away.iter().map(|s| s.scored_away_per_game).collect()),
            mean_home_conceded_per_game: mean(
                home.iter().map(|s| s.conceded_home_per_game).collect(),
            ),
            mean_away_conceded_per_game: mean(
                away.iter().map(|s| s.conceded_away_per_game).collect(),
            ),
            mean_form: mean(snapshots.iter().map(|s| s.form_value()).collect()),
            max_form: max(snapshots.iter().map(|s| s.form_value()).collect()),
        }
    }
}

/// Most recent snapshot strictly before `before_round`, if the team has one.
pub fn latest_stats(
    store: &Store,
    team_id: i64,
    competition: &str,
    season: &str,
    before_round: u32,
) -> Result<Option<TeamStats>, StoreError> {
    let mut rows = store.find_where::<TeamStats>(
        "team_id = ?1 AND competition = ?2 AND season = ?3 AND round < ?4 \
         ORDER BY round DESC LIMIT 1",
        &[
            Value::Integer(team_id),
            Value::Text(competition.to_string()),
            Value::Text(season.to_string()),
            Value::Integer(i64::from(before_round)),
        ],
    )?;
    Ok(rows.pop())
}

/// The team's standing as of `round`: the snapshot for that round or the latest before it,
/// or a zero baseline when there is none.
pub fn stats_as_of(
    store: &Store,
    team_id: i64,
    competition: &str,
    season: &str,
    round: u32,
) -> Result<TeamStats, StoreError> {
    Ok(
        latest_stats(store, team_id, competition, season, round.saturating_add(1))?
            .unwrap_or_else(|| TeamStats::baseline(team_id, competition, season, round)),
    )
}

/// Rebuilds a round's average from persisted snapshots (latest per team up to that round).
pub fn load_round_average(
    store: &Store,
    competition: &str,
    season: &str,
    round: u32,
) -> Result<Option<RoundAverage>, StoreError> {
    let rows = store.find_where::<TeamStats>(
        "competition = ?1 AND season = ?2 AND round <= ?3 ORDER BY team_id, round DESC",
        &[
            Value::Text(competition.to_string()),
            Value::Text(season.to_string()),
            Value::Integer(i64::from(round)),
        ],
    )?;
    if rows.is_empty() {
        return Ok(None);
    }
    let mut seen = HashSet::new();
    let latest = rows
        .iter()
        .filter(|s| seen.insert(s.team_id))
        .collect::<Vec<_>>();
    Ok(Some(RoundAverage::from_snapshots(
        competition,
        season,
        round,
        latest,
    )))
}

#[derive(Debug, Clone, Default)]
pub struct AggregateOutcome {
    pub averages: BTreeMap<u32, RoundAverage>,
    pub snapshots_saved: usize,
    pub rounds: usize,
    pub fixtures_without_round: usize,
    pub orphans_removed: usize,
}

impl AggregateOutcome {
    pub fn last_round(&self) -> Option<u32> {
        self.averages.keys().next_back().copied()
    }

    /// Average of the latest aggregated round strictly before `round`.
    pub fn average_before(&self, round: u32) -> Option<&RoundAverage> {
        self.averages.range(..round).next_back().map(|(_, avg)| avg)
    }
}

/// Replays every round of one unit and persists one snapshot per team per round it has a
/// fixture in. `matches` must all belong to `competition`/`season`.
pub fn aggregate_unit(
    store: &mut Store,
    competition: &str,
    season: &str,
    matches: &[Match],
    cfg: &ModelConfig,
) -> Result<AggregateOutcome> {
    let rounds = group_by_round(matches);
    let mut outcome = AggregateOutcome {
        fixtures_without_round: matches.len() - rounds.values().map(Vec::len).sum::<usize>(),
        ..AggregateOutcome::default()
    };

    outcome.orphans_removed = remove_orphans(store, competition, season, &rounds)
        .with_context(|| format!("clear stale snapshots for {competition} {season}"))?;

    // Latest snapshot of every team seen so far; the round average is taken over all of them.
    let mut league: HashMap<i64, TeamStats> = HashMap::new();

    for (&round, fixtures) in &rounds {
        let mut current: BTreeMap<i64, TeamStats> = BTreeMap::new();
        for m in fixtures {
            for team_id in [m.home_team_id, m.away_team_id] {
                if current.contains_key(&team_id) {
                    continue;
                }
                let prior = latest_stats(store, team_id, competition, season, round)
                    .with_context(|| format!("load prior stats for team {team_id}"))?
                    .unwrap_or_else(|| TeamStats::baseline(team_id, competition, season, round));
                let mut snap = prior;
                snap.round = round;
                current.insert(team_id, snap);
            }
        }

        for m in fixtures.iter().filter(|m| counts_toward_stats(m)) {
            if let Some(home) = current.get_mut(&m.home_team_id) {
                home.apply_result(m.home_goals, m.away_goals, true);
            }
            if let Some(away) = current.get_mut(&m.away_team_id) {
                away.apply_result(m.away_goals, m.home_goals, false);
            }
        }

        for snap in current.values() {
            league.insert(snap.team_id, snap.clone());
        }
        let avg = RoundAverage::from_snapshots(competition, season, round, league.values());
        let mut batch = current
            .into_values()
            .map(|mut snap| {
                snap.apply_strengths(&avg, cfg);
                snap
            })
            .collect::<Vec<_>>();
        for snap in &batch {
            league.insert(snap.team_id, snap.clone());
        }

        outcome.snapshots_saved += store
            .bulk_save(&mut batch)
            .with_context(|| format!("save round {round} snapshots for {competition} {season}"))?;
        debug!(competition, season, round, teams = batch.len(), "round aggregated");
        outcome.averages.insert(round, avg);
    }

    outcome.rounds = rounds.len();
    info!(
        competition,
        season,
        rounds = outcome.rounds,
        snapshots = outcome.snapshots_saved,
        "statistics aggregated"
    );
    Ok(outcome)
}

/// Deletes snapshots of this unit for (team, round) pairs that no longer have a fixture, so a
/// rescheduled match can't leave a stale row behind for later lookups.
fn remove_orphans(
    store: &Store,
    competition: &str,
    season: &str,
    rounds: &BTreeMap<u32, Vec<&Match>>,
) -> Result<usize, StoreError> {
    let wanted = rounds
        .iter()
        .flat_map(|(round, fixtures)| {
            fixtures
                .iter()
                .flat_map(move |m| [(m.home_team_id, *round), (m.away_team_id, *round)])
        })
        .collect::<HashSet<_>>();
    let existing = store.find_where::<TeamStats>(
        "competition = ?1 AND season = ?2",
        &[
            Value::Text(competition.to_string()),
            Value::Text(season.to_string()),
        ],
    )?;
    let mut removed = 0;
    for snap in existing {
        if !wanted.contains(&(snap.team_id, snap.round)) && store.delete(&snap)? {
            removed += 1;
        }
    }
    if removed > 0 {
        debug!(competition, season, removed, "removed stale snapshots");
    }
    Ok(removed)
}
