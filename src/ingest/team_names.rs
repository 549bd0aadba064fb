use std::collections::HashSet;

/// Spellings the two providers are known to disagree on. Each group lists names for one club;
/// comparison happens on the collapsed canonical form, so punctuation and "FC" don't matter.
const ALIAS_GROUPS: &[&[&str]] = &[
    &["Manchester United", "Man United", "Man Utd"],
    &["Manchester City", "Man City"],
    &["Nottingham Forest", "Nott'm Forest", "Nottm Forest"],
    &["Tottenham Hotspur", "Tottenham", "Spurs"],
    &["Wolverhampton Wanderers", "Wolves"],
    &["Brighton & Hove Albion", "Brighton"],
    &["West Ham United", "West Ham"],
    &["Newcastle United", "Newcastle"],
    &["Sheffield United", "Sheffield Utd"],
    &["Sheffield Wednesday", "Sheffield Weds"],
    &["Queens Park Rangers", "QPR"],
    &["West Bromwich Albion", "West Brom"],
    &["Atletico Madrid", "Ath Madrid"],
    &["Athletic Club", "Ath Bilbao", "Athletic Bilbao"],
    &["Real Betis", "Betis"],
    &["Real Sociedad", "Sociedad"],
    &["Celta Vigo", "Celta"],
    &["Rayo Vallecano", "Vallecano"],
    &["Espanyol", "Espanol"],
    &["Borussia Monchengladbach", "M'gladbach", "Gladbach"],
    &["Eintracht Frankfurt", "Ein Frankfurt"],
    &["Bayer Leverkusen", "Leverkusen"],
    &["Borussia Dortmund", "Dortmund"],
    &["FC Koln", "Koln", "Cologne"],
    &["Mainz 05", "Mainz"],
    &["Inter", "Internazionale", "Inter Milan"],
    &["AC Milan", "Milan"],
    &["Hellas Verona", "Verona"],
    &["Paris Saint-Germain", "Paris SG", "PSG"],
    &["Saint-Etienne", "St Etienne"],
];

/// Resolves free-text team names from the secondary provider to primary-source team ids.
#[derive(Debug, Clone, Default)]
pub struct TeamNameTable {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
    id: i64,
    key: String,
    aliases: HashSet<String>,
}

impl TeamNameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_teams<'a>(teams: impl IntoIterator<Item = (i64, &'a str)>) -> Self {
        let mut table = Self::new();
        for (id, name) in teams {
            table.insert(id, name);
        }
        table
    }

    pub fn insert(&mut self, id: i64, name: &str) {
        let key = canonical_key(name);
        if key.is_empty() || self.entries.iter().any(|e| e.id == id && e.key == key) {
            return;
        }
        self.entries.push(Entry {
            id,
            key,
            aliases: team_aliases(name),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact canonical name, then the alias groups, then token overlap. An overlap tie between
    /// two different teams is treated as unresolved rather than guessed.
    pub fn resolve(&self, name: &str) -> Option<i64> {
        let key = canonical_key(name);
        if key.is_empty() {
            return None;
        }
        if let Some(id) = unique_id(self.entries.iter().filter(|e| e.key == key)) {
            return Some(id);
        }
        if let Some(group) = alias_group(&key) {
            let in_group = self
                .entries
                .iter()
                .filter(|e| alias_group(&e.key) == Some(group));
            if let Some(id) = unique_id(in_group) {
                return Some(id);
            }
        }
        self.best_overlap(name)
    }

    fn best_overlap(&self, name: &str) -> Option<i64> {
        let wanted = team_aliases(name);
        let mut best: Option<(usize, i64)> = None;
        let mut tied = false;
        for entry in &self.entries {
            let score = wanted.intersection(&entry.aliases).count();
            if score < 2 {
                continue;
            }
            match best {
                Some((top, id)) if score == top && id != entry.id => tied = true,
                Some((top, _)) if score <= top => {}
                _ => {
                    best = Some((score, entry.id));
                    tied = false;
                }
            }
        }
        if tied {
            return None;
        }
        best.map(|(_, id)| id)
    }
}

fn unique_id<'a>(mut found: impl Iterator<Item = &'a Entry>) -> Option<i64> {
    let first = found.next()?.id;
    if found.all(|e| e.id == first) {
        Some(first)
    } else {
        None
    }
}

fn alias_group(key: &str) -> Option<usize> {
    ALIAS_GROUPS
        .iter()
        .position(|group| group.iter().any(|name| canonical_key(name) == key))
}

fn canonical_key(name: &str) -> String {
    canonical_words(name).join("")
}

/// Suffix words shared by too many clubs to identify one.
const GENERIC_WORDS: &[&str] = &[
    "city", "town", "united", "utd", "rovers", "athletic", "county", "albion", "wanderers",
    "real", "sporting", "borussia", "olympique", "stade", "north", "end",
];

fn team_aliases(name: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let all = canonical_words(name);
    let distinctive = all
        .iter()
        .filter(|w| !GENERIC_WORDS.contains(&w.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    let words = if distinctive.is_empty() { all } else { distinctive };
    if words.is_empty() {
        return out;
    }

    let collapsed = words.join("");
    if collapsed.len() >= 2 {
        out.insert(collapsed.clone());
    }
    if let Some(p) = prefix(&collapsed, 3) {
        out.insert(p);
    }

    let acronym: String = words.iter().filter_map(|w| w.chars().next()).collect();
    if acronym.len() >= 2 {
        out.insert(acronym);
    }

    for w in &words {
        if w.len() >= 2 {
            out.insert(w.clone());
        }
        if w.len() >= 3
            && let Some(p3) = prefix(w, 3)
        {
            out.insert(p3);
        }
    }
    out
}

fn canonical_words(name: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(name.len());
    for ch in name.chars() {
        let ch = fold_accent(ch);
        if ch == '\'' {
            continue;
        }
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
        } else {
            cleaned.push(' ');
        }
    }
    cleaned
        .split_whitespace()
        .filter(|w| !matches!(*w, "fc" | "cf" | "afc" | "sc" | "ac" | "club" | "the"))
        .map(str::to_string)
        .collect()
}

fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'Á' | 'À' | 'Â' | 'Ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'Ó' | 'Ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ü' => 'u',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        '’' => '\'',
        other => other,
    }
}

fn prefix(raw: &str, n: usize) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    Some(raw.chars().take(n).collect())
}
