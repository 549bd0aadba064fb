use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Which provider a cached payload came from; each gets its own subdirectory and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Fixture/result JSON lifted out of the provider's HTML page.
    Primary,
    /// Delimited historical results table.
    Secondary,
}

impl Source {
    fn dir(self) -> &'static str {
        match self {
            Source::Primary => "primary",
            Source::Secondary => "secondary",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Source::Primary => "json",
            Source::Secondary => "csv",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedPayload {
    pub body: String,
    pub from_cache: bool,
}

/// One file per (source, competition, season) holding the normalized raw payload.
#[derive(Debug, Clone)]
pub struct PayloadCache {
    root: PathBuf,
}

impl PayloadCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, source: Source, competition: &str, season: &str) -> PathBuf {
        let name = format!(
            "{}_{}.{}",
            sanitize(competition),
            sanitize(season),
            source.extension()
        );
        self.root.join(source.dir()).join(name)
    }

    pub fn load(&self, source: Source, competition: &str, season: &str) -> Option<String> {
        let raw = fs::read_to_string(self.path(source, competition, season)).ok()?;
        if raw.trim().is_empty() {
            return None;
        }
        Some(raw)
    }

    pub fn store(&self, source: Source, competition: &str, season: &str, body: &str) -> Result<()> {
        let path = self.path(source, competition, season);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("create cache dir {}", dir.display()))?;
        }
        let tmp = path.with_extension(format!("{}.tmp", source.extension()));
        fs::write(&tmp, body).with_context(|| format!("write cache {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("swap cache {}", path.display()))?;
        Ok(())
    }

    /// Past seasons are immutable once cached. The current season's file is never served:
    /// it is refetched every time and the fetched body (already normalized by `fetch`)
    /// replaces it.
    pub fn get_or_fetch(
        &self,
        source: Source,
        competition: &str,
        season: &str,
        is_current_season: bool,
        fetch: impl FnOnce() -> Result<String>,
    ) -> Result<CachedPayload> {
        if !is_current_season
            && let Some(body) = self.load(source, competition, season)
        {
            debug!(competition, season, ?source, "payload cache hit");
            return Ok(CachedPayload {
                body,
                from_cache: true,
            });
        }

        let body = fetch()?;
        self.store(source, competition, season, &body)?;
        Ok(CachedPayload {
            body,
            from_cache: false,
        })
    }
}

fn sanitize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | ' ' => '-',
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_replaces_separators() {
        let cache = PayloadCache::new("/tmp/pc");
        let path = cache.path(Source::Primary, "premier_league", "2024/2025");
        assert_eq!(
            path,
            PathBuf::from("/tmp/pc/primary/premier_league_2024-2025.json")
        );
        let path = cache.path(Source::Secondary, "laliga", "2023/2024");
        assert!(path.ends_with("secondary/laliga_2023-2024.csv"));
    }

    #[test]
    fn past_season_is_served_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PayloadCache::new(dir.path());
        let first = cache
            .get_or_fetch(Source::Primary, "pl", "2020/2021", false, || Ok("{}".into()))
            .unwrap();
        assert!(!first.from_cache);
        let second = cache
            .get_or_fetch(Source::Primary, "pl", "2020/2021", false, || {
                Err(anyhow::anyhow!("network must not be touched"))
            })
            .unwrap();
        assert!(second.from_cache);
        assert_eq!(second.body, "{}");
    }

    #[test]
    fn current_season_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PayloadCache::new(dir.path());
        cache.store(Source::Secondary, "pl", "2025/2026", "old").unwrap();
        let got = cache
            .get_or_fetch(Source::Secondary, "pl", "2025/2026", true, || Ok("new".into()))
            .unwrap();
        assert!(!got.from_cache);
        assert_eq!(cache.load(Source::Secondary, "pl", "2025/2026").as_deref(), Some("new"));
    }
}
