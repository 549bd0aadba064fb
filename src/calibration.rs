use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn of(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn sum(&self) -> f64 {
        self.home + self.draw + self.away
    }

    /// Most likely outcome; ties go to home, then draw.
    pub fn favourite(&self) -> Outcome {
        Outcome::ALL
            .into_iter()
            .fold(Outcome::Home, |best, o| if self.of(o) > self.of(best) { o } else { best })
    }
}

pub fn classify_outcome(home_goals: i64, away_goals: i64) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

/// Outcome frequencies, the no-skill baseline a model has to beat.
pub fn empirical_outcome_probs(outcomes: &[Outcome]) -> Prob3 {
    if outcomes.is_empty() {
        return Prob3::uniform();
    }
    let n = outcomes.len() as f64;
    let share = |o: Outcome| outcomes.iter().filter(|x| **x == o).count() as f64 / n;
    Prob3 {
        home: share(Outcome::Home),
        draw: share(Outcome::Draw),
        away: share(Outcome::Away),
    }
}

/// Mean Brier score, mean log loss and hit rate of the favourite. Mismatched or empty input
/// scores as zero samples.
pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    let samples = predictions.len();
    if samples == 0 || samples != outcomes.len() {
        return Metrics {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        };
    }

    let (brier, log_loss, hits) = predictions.iter().zip(outcomes).fold(
        (0.0_f64, 0.0_f64, 0usize),
        |(brier, log_loss, hits), (p, actual)| {
            let squared = Outcome::ALL
                .iter()
                .map(|o| {
                    let y = if o == actual { 1.0 } else { 0.0 };
                    (p.of(*o) - y).powi(2)
                })
                .sum::<f64>();
            let surprise = -p.of(*actual).clamp(1e-12, 1.0).ln();
            let hit = usize::from(p.favourite() == *actual);
            (brier + squared, log_loss + surprise, hits + hit)
        },
    );

    let n = samples as f64;
    Metrics {
        samples,
        brier: brier / n,
        log_loss: log_loss / n,
        accuracy: hits as f64 / n,
    }
}

pub fn calibration_bins(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let class_prob = p.of(class).clamp(0.0, 1.0);
        let idx = ((class_prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += class_prob;
        if *outcome == class {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Dixon-Coles low-score adjustment. `rho < 0` lifts 0-0 and 1-1 and trims 1-0 and 0-1.
pub fn dc_tau(home_goals: u32, away_goals: u32, lambda_home: f64, lambda_away: f64, rho: f64) -> f64 {
    match (home_goals, away_goals) {
        (0, 0) => 1.0 - lambda_home * lambda_away * rho,
        (0, 1) => 1.0 + lambda_home * rho,
        (1, 0) => 1.0 + lambda_away * rho,
        (1, 1) => 1.0 - rho,
        _ => 1.0,
    }
}

pub fn poisson_pmf(goals: u32, lambda: f64) -> f64 {
    let numer = lambda.powi(goals as i32) * (-lambda).exp();
    let denom = (1..=goals).fold(1.0_f64, |acc, k| acc * k as f64).max(1.0);
    numer / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let preds = vec![
            Prob3 {
                home: 1.0,
                draw: 0.0,
                away: 0.0,
            },
            Prob3 {
                home: 0.0,
                draw: 1.0,
                away: 0.0,
            },
            Prob3 {
                home: 0.0,
                draw: 0.0,
                away: 1.0,
            },
        ];
        let outcomes = vec![Outcome::Home, Outcome::Draw, Outcome::Away];
        let m = evaluate_probs(&preds, &outcomes);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn uniform_forecast_scores_two_thirds_brier() {
        let outcomes = vec![Outcome::Home, Outcome::Away];
        let m = evaluate_probs(&[Prob3::uniform(); 2], &outcomes);
        assert!((m.brier - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.log_loss - 3.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn negative_rho_favours_draws() {
        let (lh, la, rho) = (1.4, 1.1, -0.1);
        assert!(dc_tau(0, 0, lh, la, rho) > 1.0);
        assert!(dc_tau(1, 1, lh, la, rho) > 1.0);
        assert!(dc_tau(1, 0, lh, la, rho) < 1.0);
        assert!(dc_tau(0, 1, lh, la, rho) < 1.0);
        assert_eq!(dc_tau(2, 2, lh, la, rho), 1.0);
    }

    #[test]
    fn poisson_pmf_sums_to_one() {
        let total: f64 = (0..30).map(|k| poisson_pmf(k, 2.3)).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((poisson_pmf(0, 1.5) - (-1.5_f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn bins_split_by_probability() {
        let preds = [
            Prob3 {
                home: 0.15,
                draw: 0.3,
                away: 0.55,
            },
            Prob3 {
                home: 0.65,
                draw: 0.2,
                away: 0.15,
            },
        ];
        let bins = calibration_bins(&preds, &[Outcome::Away, Outcome::Home], Outcome::Home, 4);
        assert_eq!(bins.len(), 4);
        assert_eq!(bins[0].count, 1);
        assert_eq!(bins[2].count, 1);
        assert_eq!(bins[2].actual_rate, 1.0);
    }
}
