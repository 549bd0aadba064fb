use chrono::{Duration, TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::hint::black_box;

use pitchcast::config::ModelConfig;
use pitchcast::ingest::html_embed::{DATA_SCRIPT_ID, extract_script_json};
use pitchcast::ingest::primary::parse_primary_payload;
use pitchcast::ingest::secondary::parse_secondary_payload;
use pitchcast::model::{self, Match};
use pitchcast::predict::OutcomeGrid;
use pitchcast::stats;
use pitchcast::store::Store;

/// Double round robin (circle method) for an even number of sides, every fixture played
/// with a deterministic score.
fn synthetic_season(teams: i64) -> Vec<Match> {
    let start = Utc.with_ymd_and_hms(2024, 8, 10, 14, 0, 0).unwrap();
    let rotating = teams - 1;
    let mut out = Vec::new();
    let mut round = 0u32;
    for leg in 0..2 {
        for r in 0..rotating {
            round += 1;
            let kickoff = start + Duration::days(7 * i64::from(round));
            for i in 0..teams / 2 {
                let (x, y) = if i == 0 {
                    (rotating, r)
                } else {
                    ((r + i) % rotating, (r + rotating - i) % rotating)
                };
                let (h, a) = if leg == 0 { (x, y) } else { (y, x) };
                let mut m = Match::new(
                    "premier_league",
                    "2024/2025",
                    kickoff,
                    &round.to_string(),
                    h + 1,
                    &format!("Team {}", h + 1),
                    a + 1,
                    &format!("Team {}", a + 1),
                );
                m.round = Some(round);
                m.set_result((h * 7 + a * 3 + i64::from(round)) % 4, (a * 5 + h) % 3);
                out.push(m);
            }
        }
    }
    out
}

fn bench_outcome_grid_analytic(c: &mut Criterion) {
    c.bench_function("outcome_grid_analytic", |b| {
        b.iter(|| {
            let grid = OutcomeGrid::analytic(black_box(1.55), black_box(1.10), 10, -0.10);
            black_box(grid.outcome_probs());
        })
    });
}

fn bench_outcome_grid_simulate(c: &mut Criterion) {
    c.bench_function("outcome_grid_simulate_20k", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(42);
            let grid = OutcomeGrid::simulate(
                black_box(1.55),
                black_box(1.10),
                10,
                -0.10,
                20_000,
                &mut rng,
            );
            black_box(grid.prob_total_over(2.5));
        })
    });
}

fn bench_primary_parse(c: &mut Criterion) {
    let payload = extract_script_json(PRIMARY_PAGE_HTML, DATA_SCRIPT_ID)
        .unwrap()
        .to_string();
    c.bench_function("primary_parse", |b| {
        b.iter(|| {
            let parsed =
                parse_primary_payload(black_box(&payload), "premier_league", "2025/2026").unwrap();
            black_box(parsed.matches.len());
        })
    });
}

fn bench_secondary_parse(c: &mut Criterion) {
    c.bench_function("secondary_parse", |b| {
        b.iter(|| {
            let parsed =
                parse_secondary_payload(black_box(SECONDARY_CSV), "premier_league", "2025/2026")
                    .unwrap();
            black_box(parsed.records.len());
        })
    });
}

fn bench_aggregate_season(c: &mut Criterion) {
    let matches = synthetic_season(20);
    let cfg = ModelConfig::default();
    c.bench_function("aggregate_season_20_teams", |b| {
        b.iter(|| {
            let mut store = Store::open_in_memory().unwrap();
            model::register_all(&mut store).unwrap();
            let outcome = stats::aggregate_unit(
                &mut store,
                "premier_league",
                "2024/2025",
                black_box(&matches),
                &cfg,
            )
            .unwrap();
            black_box(outcome.snapshots_saved);
        })
    });
}

criterion_group!(
    perf,
    bench_outcome_grid_analytic,
    bench_outcome_grid_simulate,
    bench_primary_parse,
    bench_secondary_parse,
    bench_aggregate_season
);
criterion_main!(perf);

static PRIMARY_PAGE_HTML: &str = include_str!("../tests/fixtures/primary_page.html");
static SECONDARY_CSV: &str = include_str!("../tests/fixtures/secondary.csv");
