use std::env;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "pitchcast";
const DEFAULT_UNITS: &str = "premier_league:2025/2026";
const DEFAULT_CURRENT_SEASON: &str = "2025/2026";

/// Every hand-tunable constant of the statistics and prediction model. Built once per run
/// (or once per tuning trial) and passed by reference; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Share of strength that comes from recent form rather than raw goal ratios.
    pub form_weight: f64,
    /// Monte Carlo draws per match; 0 sums the Poisson grid analytically instead.
    pub simulation_trials: u32,
    pub min_goals_floor: f64,
    pub max_goals_cap: f64,
    /// Largest goal count tracked per side in the outcome grid.
    pub grid_max_goals: u32,
    /// Dixon-Coles rho, negative.
    pub dc_rho: f64,
    pub derby_distance_km: f64,
    pub derby_boost: f64,
    /// Ascending distance thresholds (km) for the short, medium, long and very long bands.
    pub travel_thresholds_km: [f64; 4],
    /// Away-goal multipliers for those four bands.
    pub travel_penalties: [f64; 4],
    pub over_low_line: f64,
    pub over_high_line: f64,
    pub current_season: String,
    /// Matches kicking off sooner than this are no longer (re)predicted.
    pub prediction_cutoff_minutes: i64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            form_weight: 0.30,
            simulation_trials: 20_000,
            min_goals_floor: 0.20,
            max_goals_cap: 3.80,
            grid_max_goals: 10,
            dc_rho: -0.10,
            derby_distance_km: 30.0,
            derby_boost: 1.08,
            travel_thresholds_km: [100.0, 250.0, 450.0, 800.0],
            travel_penalties: [0.98, 0.96, 0.94, 0.92],
            over_low_line: 1.5,
            over_high_line: 2.5,
            current_season: DEFAULT_CURRENT_SEASON.to_string(),
            prediction_cutoff_minutes: 15,
        }
    }
}

impl ModelConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            form_weight: env_f64("PITCHCAST_FORM_WEIGHT", d.form_weight).clamp(0.0, 1.0),
            simulation_trials: env_parse("PITCHCAST_SIM_TRIALS", d.simulation_trials)
                .min(1_000_000),
            min_goals_floor: env_f64("PITCHCAST_MIN_GOALS", d.min_goals_floor).clamp(0.0, 2.0),
            max_goals_cap: env_f64("PITCHCAST_MAX_GOALS", d.max_goals_cap).clamp(0.5, 10.0),
            grid_max_goals: env_parse("PITCHCAST_GRID_MAX_GOALS", d.grid_max_goals).clamp(6, 20),
            dc_rho: env_f64("PITCHCAST_DC_RHO", d.dc_rho).clamp(-0.30, -0.001),
            derby_distance_km: env_f64("PITCHCAST_DERBY_KM", d.derby_distance_km).max(0.0),
            derby_boost: env_f64("PITCHCAST_DERBY_BOOST", d.derby_boost).clamp(1.0, 1.5),
            travel_thresholds_km: env_f64_list("PITCHCAST_TRAVEL_KM", d.travel_thresholds_km),
            travel_penalties: env_f64_list("PITCHCAST_TRAVEL_PENALTIES", d.travel_penalties),
            over_low_line: env_f64("PITCHCAST_OVER_LOW", d.over_low_line),
            over_high_line: env_f64("PITCHCAST_OVER_HIGH", d.over_high_line),
            current_season: env::var("PITCHCAST_CURRENT_SEASON")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(d.current_season),
            prediction_cutoff_minutes: env_parse(
                "PITCHCAST_CUTOFF_MINUTES",
                d.prediction_cutoff_minutes,
            )
            .clamp(0, 24 * 60),
        }
    }

    pub fn stats_weight(&self) -> f64 {
        1.0 - self.form_weight
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.form_weight) {
            return Err(anyhow!("form_weight must be within 0..=1"));
        }
        if self.dc_rho >= 0.0 {
            return Err(anyhow!("dc_rho must be negative, got {}", self.dc_rho));
        }
        if self.min_goals_floor < 0.0 || self.min_goals_floor >= self.max_goals_cap {
            return Err(anyhow!(
                "goal clamp is empty: floor {} cap {}",
                self.min_goals_floor,
                self.max_goals_cap
            ));
        }
        if self
            .travel_thresholds_km
            .windows(2)
            .any(|w| w[0] >= w[1])
        {
            return Err(anyhow!("travel thresholds must be strictly ascending"));
        }
        if self.derby_distance_km > self.travel_thresholds_km[0] {
            return Err(anyhow!("derby distance must not exceed the shortest travel band"));
        }
        if self.travel_penalties.iter().any(|p| *p <= 0.0 || *p > 1.0) {
            return Err(anyhow!("travel penalties must be within (0, 1]"));
        }
        if self.derby_boost < 1.0 {
            return Err(anyhow!("derby boost must be at least 1.0"));
        }
        if self.over_low_line >= self.over_high_line {
            return Err(anyhow!("over lines must be ascending"));
        }
        Ok(())
    }
}

/// Where a competition lives at each provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Competition {
    pub key: &'static str,
    pub name: &'static str,
    pub primary_league_id: u32,
    pub secondary_division: &'static str,
}

pub const COMPETITIONS: &[Competition] = &[
    Competition {
        key: "premier_league",
        name: "Premier League",
        primary_league_id: 47,
        secondary_division: "E0",
    },
    Competition {
        key: "championship",
        name: "Championship",
        primary_league_id: 48,
        secondary_division: "E1",
    },
    Competition {
        key: "laliga",
        name: "LaLiga",
        primary_league_id: 87,
        secondary_division: "SP1",
    },
    Competition {
        key: "bundesliga",
        name: "Bundesliga",
        primary_league_id: 54,
        secondary_division: "D1",
    },
    Competition {
        key: "serie_a",
        name: "Serie A",
        primary_league_id: 55,
        secondary_division: "I1",
    },
    Competition {
        key: "ligue_1",
        name: "Ligue 1",
        primary_league_id: 53,
        secondary_division: "F1",
    },
];

pub fn competition(key: &str) -> Option<&'static Competition> {
    let key = key.trim().to_ascii_lowercase();
    COMPETITIONS.iter().find(|c| c.key == key)
}

/// One (competition, season) pair: the unit of ingestion and prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub competition: &'static Competition,
    pub season: String,
}

impl Unit {
    pub fn parse(raw: &str) -> Result<Self> {
        let (key, season) = raw
            .split_once(':')
            .ok_or_else(|| anyhow!("unit '{raw}' is not competition:season"))?;
        let competition =
            competition(key).ok_or_else(|| anyhow!("unknown competition '{}'", key.trim()))?;
        let season = season.trim();
        if season.is_empty() {
            return Err(anyhow!("unit '{raw}' has an empty season"));
        }
        Ok(Self {
            competition,
            season: season.to_string(),
        })
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.competition.key, self.season)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    pub units: Vec<Unit>,
    pub fetch_parallelism: usize,
    pub http_timeout_secs: u64,
    pub log_level: String,
    pub log_format: String,
}

impl UpdateConfig {
    pub fn from_env() -> Result<Self> {
        let base = app_cache_dir().unwrap_or_else(|| PathBuf::from(".").join(APP_DIR));
        let db_path = env::var("PITCHCAST_DB")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("pitchcast.sqlite"));
        let cache_dir = env::var("PITCHCAST_CACHE_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("payloads"));
        let raw_units = env::var("PITCHCAST_UNITS").unwrap_or_else(|_| DEFAULT_UNITS.to_string());
        let units = parse_units(&raw_units)?;

        Ok(Self {
            db_path,
            cache_dir,
            units,
            fetch_parallelism: env_parse("FETCH_PARALLELISM", 4usize).clamp(1, 16),
            http_timeout_secs: env_parse("PITCHCAST_HTTP_TIMEOUT_SECS", 20u64).clamp(2, 120),
            log_level: env::var("PITCHCAST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("PITCHCAST_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
        })
    }
}

pub fn parse_units(raw: &str) -> Result<Vec<Unit>> {
    let mut out: Vec<Unit> = Vec::new();
    for part in raw.split([',', ';', ' ']).filter(|p| !p.trim().is_empty()) {
        let unit = Unit::parse(part)?;
        if !out.contains(&unit) {
            out.push(unit);
        }
    }
    if out.is_empty() {
        return Err(anyhow!("no competition:season units configured"));
    }
    Ok(out)
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(APP_DIR));
        }
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_parse(key, default)
}

fn env_f64_list(key: &str, default: [f64; 4]) -> [f64; 4] {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    let parsed = raw
        .split(',')
        .filter_map(|p| p.trim().parse::<f64>().ok())
        .collect::<Vec<_>>();
    match parsed.as_slice() {
        [a, b, c, d] => [*a, *b, *c, *d],
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ModelConfig::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects_positive_rho_and_unordered_bands() {
        let cfg = ModelConfig {
            dc_rho: 0.05,
            ..ModelConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ModelConfig {
            travel_thresholds_km: [100.0, 90.0, 450.0, 800.0],
            ..ModelConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn units_parse_and_dedup() {
        let units = parse_units("premier_league:2024/2025, laliga:2024/2025,premier_league:2024/2025")
            .unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].competition.primary_league_id, 47);
        assert_eq!(units[1].label(), "laliga:2024/2025");
        assert!(parse_units("nowhere:2024").is_err());
        assert!(parse_units("premier_league").is_err());
    }
}
