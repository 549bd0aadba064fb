use once_cell::sync::Lazy;

use crate::config::ModelConfig;
use crate::ingest::team_names::TeamNameTable;
use crate::model::Team;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate home-ground coordinates (lat, lon).
const CLUB_LOCATIONS: &[(&str, f64, f64)] = &[
    // England
    ("Arsenal", 51.5549, -0.1084),
    ("Aston Villa", 52.5092, -1.8848),
    ("Bournemouth", 50.7352, -1.8383),
    ("Brentford", 51.4908, -0.2886),
    ("Brighton & Hove Albion", 50.8616, -0.0837),
    ("Burnley", 53.7890, -2.2302),
    ("Chelsea", 51.4817, -0.1910),
    ("Crystal Palace", 51.3983, -0.0855),
    ("Everton", 53.4388, -2.9663),
    ("Fulham", 51.4749, -0.2217),
    ("Ipswich Town", 52.0545, 1.1447),
    ("Leeds United", 53.7778, -1.5722),
    ("Leicester City", 52.6204, -1.1422),
    ("Liverpool", 53.4308, -2.9608),
    ("Luton Town", 51.8843, -0.4316),
    ("Manchester City", 53.4831, -2.2004),
    ("Manchester United", 53.4631, -2.2913),
    ("Newcastle United", 54.9756, -1.6217),
    ("Nottingham Forest", 52.9400, -1.1328),
    ("Sheffield United", 53.3703, -1.4709),
    ("Southampton", 50.9058, -1.3911),
    ("Sunderland", 54.9146, -1.3884),
    ("Tottenham Hotspur", 51.6043, -0.0664),
    ("West Ham United", 51.5386, -0.0166),
    ("Wolverhampton Wanderers", 52.5902, -2.1304),
    ("Middlesbrough", 54.5782, -1.2170),
    ("Norwich City", 52.6221, 1.3092),
    ("West Bromwich Albion", 52.5090, -1.9639),
    ("Watford", 51.6498, -0.4015),
    ("Sheffield Wednesday", 53.4114, -1.5006),
    ("Queens Park Rangers", 51.5093, -0.2322),
    ("Millwall", 51.4859, -0.0509),
    ("Coventry City", 52.4481, -1.4956),
    ("Stoke City", 52.9884, -2.1754),
    ("Swansea City", 51.6428, -3.9351),
    ("Cardiff City", 51.4728, -3.2030),
    ("Hull City", 53.7465, -0.3680),
    ("Preston North End", 53.7722, -2.6880),
    ("Blackburn Rovers", 53.7286, -2.4893),
    ("Bristol City", 51.4400, -2.6203),
    ("Derby County", 52.9149, -1.4473),
    ("Portsmouth", 50.7964, -1.0639),
    ("Plymouth Argyle", 50.3881, -4.1509),
    ("Oxford United", 51.7164, -1.2081),
    // Spain
    ("Real Madrid", 40.4531, -3.6883),
    ("Atletico Madrid", 40.4362, -3.5995),
    ("Rayo Vallecano", 40.3919, -3.6588),
    ("Getafe", 40.3257, -3.7146),
    ("Leganes", 40.3404, -3.7606),
    ("Barcelona", 41.3809, 2.1228),
    ("Espanyol", 41.3479, 2.0757),
    ("Girona", 41.9614, 2.8281),
    ("Valencia", 39.4746, -0.3583),
    ("Villarreal", 39.9441, -0.1036),
    ("Sevilla", 37.3840, -5.9705),
    ("Real Betis", 37.3565, -5.9817),
    ("Athletic Club", 43.2642, -2.9494),
    ("Real Sociedad", 43.3014, -1.9737),
    ("Osasuna", 42.7966, -1.6370),
    ("Alaves", 42.8371, -2.6880),
    ("Celta Vigo", 42.2119, -8.7398),
    ("Mallorca", 39.5900, 2.6300),
    ("Las Palmas", 28.1003, -15.4567),
    ("Real Valladolid", 41.6445, -4.7613),
    // Germany
    ("Bayern Munich", 48.2188, 11.6247),
    ("Borussia Dortmund", 51.4926, 7.4519),
    ("Bayer Leverkusen", 51.0383, 7.0022),
    ("RB Leipzig", 51.3458, 12.3483),
    ("Eintracht Frankfurt", 50.0686, 8.6455),
    ("VfB Stuttgart", 48.7922, 9.2320),
    ("VfL Wolfsburg", 52.4328, 10.8039),
    ("Borussia Monchengladbach", 51.1746, 6.3855),
    ("SC Freiburg", 48.0216, 7.8297),
    ("TSG Hoffenheim", 49.2381, 8.8876),
    ("Werder Bremen", 53.0665, 8.8376),
    ("FC Augsburg", 48.3232, 10.8862),
    ("Union Berlin", 52.4572, 13.5681),
    ("Mainz 05", 49.9839, 8.2244),
    ("FC Koln", 50.9335, 6.8750),
    ("Heidenheim", 48.6686, 10.1392),
    ("St. Pauli", 53.5545, 9.9676),
    ("Holstein Kiel", 54.3497, 10.1237),
    ("VfL Bochum", 51.4900, 7.2365),
    ("Hamburger SV", 53.5872, 9.8986),
    // Italy
    ("Inter", 45.4781, 9.1240),
    ("AC Milan", 45.4781, 9.1240),
    ("Juventus", 45.1096, 7.6413),
    ("Torino", 45.0418, 7.6500),
    ("Napoli", 40.8279, 14.1931),
    ("Roma", 41.9341, 12.4547),
    ("Lazio", 41.9341, 12.4547),
    ("Atalanta", 45.7089, 9.6808),
    ("Fiorentina", 43.7808, 11.2823),
    ("Bologna", 44.4922, 11.3098),
    ("Genoa", 44.4164, 8.9525),
    ("Hellas Verona", 45.4353, 10.9686),
    ("Udinese", 46.0818, 13.2001),
    ("Cagliari", 39.1999, 9.1376),
    ("Lecce", 40.3654, 18.2087),
    ("Empoli", 43.7262, 10.9551),
    ("Parma", 44.7949, 10.3383),
    ("Como", 45.8138, 9.0721),
    ("Venezia", 45.4278, 12.3640),
    ("Monza", 45.5829, 9.3082),
    // France
    ("Paris Saint-Germain", 48.8414, 2.2530),
    ("Marseille", 43.2698, 5.3959),
    ("Lyon", 45.7653, 4.9820),
    ("Monaco", 43.7276, 7.4155),
    ("Lille", 50.6119, 3.1305),
    ("Nice", 43.7051, 7.1926),
    ("Lens", 50.4329, 2.8149),
    ("Rennes", 48.1075, -1.7128),
    ("Nantes", 47.2561, -1.5247),
    ("Strasbourg", 48.5601, 7.7550),
    ("Toulouse", 43.5833, 1.4342),
    ("Montpellier", 43.6222, 3.8121),
    ("Reims", 49.2467, 4.0250),
    ("Brest", 48.4029, -4.4615),
    ("Le Havre", 49.4990, 0.1697),
    ("Auxerre", 47.7864, 3.5885),
    ("Angers", 47.4604, -0.5309),
    ("Saint-Etienne", 45.4608, 4.3903),
];

static LOCATION_NAMES: Lazy<TeamNameTable> = Lazy::new(|| {
    TeamNameTable::from_teams(
        CLUB_LOCATIONS
            .iter()
            .enumerate()
            .map(|(idx, (name, _, _))| (idx as i64, *name)),
    )
});

/// Known home-ground coordinates for a club name, resolved with the same rules as provider names.
pub fn club_location(name: &str) -> Option<(f64, f64)> {
    let idx = usize::try_from(LOCATION_NAMES.resolve(name)?).ok()?;
    CLUB_LOCATIONS.get(idx).map(|(_, lat, lon)| (*lat, *lon))
}

/// Fills missing coordinates from the static table. Returns true when the team changed.
pub fn backfill_location(team: &mut Team) -> bool {
    if team.location().is_some() {
        return false;
    }
    let Some((lat, lon)) = club_location(&team.name) else {
        return false;
    };
    team.latitude = Some(lat);
    team.longitude = Some(lon);
    true
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Away-goal multiplier for the distance between two grounds: the derby boost when close,
/// otherwise the penalty of the widest band the distance reaches, 1.0 below the first band.
pub fn travel_multiplier(cfg: &ModelConfig, distance_km: f64) -> f64 {
    if distance_km < cfg.derby_distance_km {
        return cfg.derby_boost;
    }
    cfg.travel_thresholds_km
        .iter()
        .zip(cfg.travel_penalties.iter())
        .rev()
        .find(|(threshold, _)| distance_km >= **threshold)
        .map(|(_, penalty)| *penalty)
        .unwrap_or(1.0)
}

/// Multiplier for a fixture; 1.0 when either side's location is unknown.
pub fn fixture_multiplier(cfg: &ModelConfig, home: &Team, away: &Team) -> f64 {
    match (home.location(), away.location()) {
        (Some(h), Some(a)) => travel_multiplier(cfg, haversine_km(h, a)),
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(name: &str) -> Team {
        let mut t = Team::new(1, name);
        assert!(backfill_location(&mut t), "{name} should be in the table");
        t
    }

    #[test]
    fn haversine_matches_known_distance() {
        // London to Manchester is roughly 262 km as the crow flies.
        let d = haversine_km((51.5074, -0.1278), (53.4808, -2.2426));
        assert!((d - 262.0).abs() < 5.0, "got {d}");
        assert_eq!(haversine_km((10.0, 10.0), (10.0, 10.0)), 0.0);
    }

    #[test]
    fn bands_pick_the_widest_reached() {
        let cfg = ModelConfig::default();
        assert_eq!(travel_multiplier(&cfg, 5.0), cfg.derby_boost);
        assert_eq!(travel_multiplier(&cfg, 60.0), 1.0);
        assert_eq!(travel_multiplier(&cfg, 150.0), 0.98);
        assert_eq!(travel_multiplier(&cfg, 300.0), 0.96);
        assert_eq!(travel_multiplier(&cfg, 500.0), 0.94);
        assert_eq!(travel_multiplier(&cfg, 2000.0), 0.92);
    }

    #[test]
    fn london_derby_and_long_trip() {
        let cfg = ModelConfig::default();
        let arsenal = located("Arsenal");
        let spurs = located("Spurs");
        let newcastle = located("Newcastle");
        let brighton = located("Brighton");
        assert_eq!(fixture_multiplier(&cfg, &arsenal, &spurs), cfg.derby_boost);
        assert_eq!(fixture_multiplier(&cfg, &brighton, &newcastle), 0.94);
    }

    #[test]
    fn zero_coordinates_mean_no_adjustment() {
        let cfg = ModelConfig::default();
        let mut home = Team::new(1, "Nowhere Town");
        home.latitude = Some(0.0);
        home.longitude = Some(0.0);
        let away = home.clone();
        assert_eq!(fixture_multiplier(&cfg, &home, &away), 1.0);
        assert!(club_location("Nowhere Town").is_none());
    }
}
