//! Turning extracted posts into relation records.
//!
//! Extraction gives us, per post, a source band and the bands it is
//! recommended "for fans of". Each band is looked up in a metadata service
//! for popularity and follower counts. The service sits behind
//! [`ArtistLookup`]; lookups go through a [`MetadataCache`] that lives for
//! one run and is loaded from and saved back to the store explicitly.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::normalize::{normalize, normalize_value};
use crate::record::{clean_country, BandMention, RawMention, RelationRecord};

static FFO_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(f[./\- ]?f[./\- ]?o|f[./\- ]?o[./\- ]?f|for fans of|sounds like|if you like)\b",
    )
    .expect("FFO pattern is valid")
});

/// Streaming-service metrics for one artist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistMetrics {
    #[serde(default)]
    pub followers: Option<u64>,
    #[serde(default)]
    pub popularity: Option<u8>,
}

/// A metadata service. `Ok(None)` means the artist was not found.
pub trait ArtistLookup {
    fn lookup(&self, name: &str) -> Result<Option<ArtistMetrics>>;
}

/// Lookup backed by a JSON object of `name → {followers, popularity}`,
/// e.g. a dump of earlier service responses.
#[derive(Debug, Default)]
pub struct CatalogLookup {
    entries: HashMap<String, ArtistMetrics>,
}

impl CatalogLookup {
    pub fn from_entries(entries: HashMap<String, ArtistMetrics>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(name, m)| (normalize(&name), m))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let entries: HashMap<String, ArtistMetrics> =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::from_entries(entries))
    }
}

impl ArtistLookup for CatalogLookup {
    fn lookup(&self, name: &str) -> Result<Option<ArtistMetrics>> {
        Ok(self.entries.get(&normalize(name)).copied())
    }
}

/// Lookup results keyed by normalized name. "Not found" is cached too, so a
/// band is asked about at most once per run.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: HashMap<String, Option<ArtistMetrics>>,
    hits: usize,
    misses: usize,
}

impl MetadataCache {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, Option<ArtistMetrics>>) -> Self {
        Self {
            entries,
            ..Default::default()
        }
    }

    pub fn entries(&self) -> &HashMap<String, Option<ArtistMetrics>> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    /// Cached value for `name`, computing and remembering it on a miss.
    /// Empty identities are never looked up.
    pub fn get_or_compute<F>(&mut self, name: &str, compute: F) -> Option<ArtistMetrics>
    where
        F: FnOnce(&str) -> Option<ArtistMetrics>,
    {
        let key = normalize(name);
        if key.is_empty() {
            return None;
        }
        if let Some(cached) = self.entries.get(&key) {
            self.hits += 1;
            return *cached;
        }
        self.misses += 1;
        let value = compute(&key);
        self.entries.insert(key, value);
        value
    }
}

/// One post after entity extraction. `banda_fuente` and `bandas_ffo` are
/// accepted as aliases.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedPost {
    #[serde(default)]
    pub title: Option<String>,
    /// Post body, when kept; used to drop posts without an FFO phrase.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "banda_fuente")]
    pub source: Option<RawMention>,
    #[serde(default, alias = "bandas_ffo")]
    pub recommended: Vec<RawMention>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub posts: usize,
    pub duplicate_posts: usize,
    pub skipped_posts: usize,
    pub skipped_bands: usize,
    pub records: usize,
}

impl ExtractedPost {
    /// Title and body are searched together. A post whose body was not kept
    /// is trusted as extracted.
    fn has_ffo_phrase(&self) -> bool {
        match &self.text {
            Some(text) => {
                mentions_ffo(&format!("{} {text}", self.title.as_deref().unwrap_or_default()))
            }
            None => true,
        }
    }
}

/// Whether `text` contains an FFO-style phrase ("FFO", "f.f.o", "for fans
/// of", "sounds like", "if you like", ...).
pub fn mentions_ffo(text: &str) -> bool {
    FFO_PHRASE.is_match(text)
}

/// Drop posts whose title was already seen. Untitled posts are kept.
pub fn dedup_posts(posts: Vec<ExtractedPost>) -> (Vec<ExtractedPost>, usize) {
    let mut seen = HashSet::new();
    let before = posts.len();
    let kept: Vec<ExtractedPost> = posts
        .into_iter()
        .filter(|p| match &p.title {
            Some(t) => seen.insert(t.clone()),
            None => true,
        })
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Resolve every band through `cache`/`lookup` and emit one record per
/// surviving (source, recommended) pair.
///
/// A post is skipped when it has no source, no recommendations, no FFO
/// phrase in a present body, or a source without popularity. A
/// recommended band without popularity is skipped on its own.
pub fn enrich_posts(
    posts: Vec<ExtractedPost>,
    lookup: &dyn ArtistLookup,
    cache: &mut MetadataCache,
) -> (Vec<RelationRecord>, EnrichReport) {
    let (posts, duplicate_posts) = dedup_posts(posts);
    let mut report = EnrichReport {
        posts: posts.len() + duplicate_posts,
        duplicate_posts,
        ..Default::default()
    };
    let mut records = Vec::new();

    for (i, post) in posts.iter().enumerate() {
        if !post.has_ffo_phrase() {
            debug!(post = i, "no FFO phrase, skipping post");
            report.skipped_posts += 1;
            continue;
        }
        let Some(source) = post.source.as_ref().filter(|_| !post.recommended.is_empty()) else {
            report.skipped_posts += 1;
            continue;
        };
        let Some(source) = resolve(source, lookup, cache) else {
            debug!(post = i, "source band has no popularity, skipping post");
            report.skipped_posts += 1;
            continue;
        };
        for raw in &post.recommended {
            match resolve(raw, lookup, cache) {
                Some(recommended) => records.push(RelationRecord::new(source.clone(), recommended)),
                None => report.skipped_bands += 1,
            }
        }
    }

    report.records = records.len();
    info!(
        records = report.records,
        skipped_posts = report.skipped_posts,
        cache_hits = cache.hits(),
        lookups = cache.misses(),
        "enrichment finished"
    );
    (records, report)
}

/// A mention with metrics attached, or `None` when the name is empty or the
/// service knows no popularity for it.
fn resolve(
    raw: &RawMention,
    lookup: &dyn ArtistLookup,
    cache: &mut MetadataCache,
) -> Option<BandMention> {
    let name = normalize_value(&raw.name);
    let metrics = cache.get_or_compute(&name, |key| match lookup.lookup(key) {
        Ok(m) => m,
        Err(e) => {
            warn!(band = key, error = %e, "metadata lookup failed");
            None
        }
    })?;
    let Some(popularity) = metrics.popularity.filter(|p| *p <= 100) else {
        if let Some(p) = metrics.popularity {
            debug!(band = %name, popularity = p, "popularity out of range, treating as absent");
        }
        return None;
    };
    Some(BandMention {
        name,
        country: clean_country(&raw.country),
        followers: metrics.followers,
        popularity: Some(popularity),
    })
}
