use std::collections::HashMap;

use tracing::debug;

use crate::ingest::secondary::ResolvedRecord;
use crate::model::{Match, MatchStatus};

/// Largest kickoff-date gap (days) at which a secondary row still counts as the same fixture.
pub const DATE_TOLERANCE_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    /// Not seen before.
    pub new: usize,
    /// Persisted copy was final; fresh parse discarded.
    pub kept: usize,
    /// Fresh parse replaced the persisted copy.
    pub refreshed: usize,
}

/// Whether a persisted match must be re-derived from a fresh parse. Only a finished match
/// carrying its result is settled; everything else (scheduled, live, cancelled, predicted or
/// not) follows the provider.
pub fn needs_reprocess(persisted: &Match) -> bool {
    !(persisted.status == MatchStatus::Finished && persisted.has_result())
}

/// Chooses, per fixture, between the persisted row and the fresh parse.
pub fn reconcile(fresh: Vec<Match>, persisted: &HashMap<String, Match>) -> (Vec<Match>, ReconcileCounts) {
    let mut counts = ReconcileCounts::default();
    let mut out = Vec::with_capacity(fresh.len());
    for mut m in fresh {
        let Some(old) = persisted.get(&m.id) else {
            counts.new += 1;
            out.push(m);
            continue;
        };
        if !needs_reprocess(old) {
            counts.kept += 1;
            out.push(old.clone());
            continue;
        }

        counts.refreshed += 1;
        m.carry_prediction_from(old);
        m.fill_enrichment_from(old);
        if !m.has_result() && old.has_result() && m.status != MatchStatus::Cancelled {
            m.set_result(old.home_goals, old.away_goals);
        }
        if m.round.is_none() {
            m.round = old.round;
        }
        out.push(m);
    }
    (out, counts)
}

/// Copies enrichment from the nearest-dated secondary row for the same home/away pair.
/// Returns how many matches found a partner row.
pub fn merge_secondary(matches: &mut [Match], records: &[ResolvedRecord]) -> usize {
    let mut by_pair: HashMap<(i64, i64), Vec<&ResolvedRecord>> = HashMap::new();
    for r in records {
        by_pair
            .entry((r.home_team_id, r.away_team_id))
            .or_default()
            .push(r);
    }

    let mut enriched = 0;
    for m in matches.iter_mut() {
        let Some(candidates) = by_pair.get(&(m.home_team_id, m.away_team_id)) else {
            continue;
        };
        let day = m.kickoff.date_naive();
        let nearest = candidates
            .iter()
            .map(|r| ((r.record.date - day).num_days().abs(), *r))
            .filter(|(gap, _)| *gap <= DATE_TOLERANCE_DAYS)
            .min_by_key(|(gap, _)| *gap);
        let Some((_, partner)) = nearest else {
            continue;
        };

        if m.has_result()
            && let (Some(h), Some(a)) = (partner.record.home_goals, partner.record.away_goals)
            && (h, a) != (m.home_goals, m.away_goals)
        {
            debug!(
                match_id = %m.id,
                primary = %format!("{}-{}", m.home_goals, m.away_goals),
                secondary = %format!("{h}-{a}"),
                "result conflict between providers, keeping primary"
            );
        }
        partner.record.enrich(m);
        enriched += 1;
    }
    enriched
}
