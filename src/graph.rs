//! The band graph and the builder that folds relation records into it.

use std::collections::{BTreeSet, HashMap};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::normalize::normalize;
use crate::record::{BandMention, RelationRecord, UNKNOWN_COUNTRY};

/// A graph vertex: one normalized band identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub country: Option<String>,
    pub followers: Option<u64>,
    pub popularity: Option<u8>,
}

impl Band {
    fn from_mention(name: String, m: &BandMention) -> Self {
        Self {
            name,
            country: m.country.clone(),
            followers: m.followers,
            popularity: m.popularity,
        }
    }

    pub fn country_or_unknown(&self) -> &str {
        self.country.as_deref().unwrap_or(UNKNOWN_COUNTRY)
    }
}

/// An undirected weighted edge between two band indices, `a <= b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub a: usize,
    pub b: usize,
    pub weight: u32,
}

impl Connection {
    /// The endpoint opposite `idx`.
    pub fn other(&self, idx: usize) -> usize {
        if self.a == idx {
            self.b
        } else {
            self.a
        }
    }
}

/// How node attributes are resolved when a band is mentioned again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// The latest mention replaces every attribute, absent values included.
    #[default]
    LastWriteWins,
    /// Attributes are fixed by the first mention.
    FirstWriteWins,
    /// The latest present value of each attribute wins.
    PreferNonNull,
}

/// What to do with a record whose two bands normalize to the same identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SelfLoopPolicy {
    #[default]
    Reject,
    Allow,
}

/// In-memory band graph. Bands and connections keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandGraph {
    bands: Vec<Band>,
    index: HashMap<String, usize>,
    connections: Vec<Connection>,
    edge_index: HashMap<(usize, usize), usize>,
    adjacency: Vec<Vec<usize>>,
}

impl BandGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn band_at(&self, idx: usize) -> &Band {
        &self.bands[idx]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.index_of(name).map(|i| &self.bands[i])
    }

    /// All identities, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bands.iter().map(|b| b.name.clone()).collect();
        names.sort();
        names
    }

    /// Distinct known countries, sorted. "Unknown" is left out.
    pub fn countries(&self) -> Vec<String> {
        self.bands
            .iter()
            .filter_map(|b| b.country.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// `(neighbor index, weight)` in edge-creation order.
    pub fn neighbors(&self, idx: usize) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.adjacency
            .get(idx)
            .into_iter()
            .flatten()
            .map(move |&e| {
                let c = &self.connections[e];
                (c.other(idx), c.weight)
            })
    }

    #[cfg(test)]
    pub fn weight(&self, a: &str, b: &str) -> Option<u32> {
        let (a, b) = (self.index_of(a)?, self.index_of(b)?);
        self.edge_index
            .get(&edge_key(a, b))
            .map(|&e| self.connections[e].weight)
    }

    /// Sum of the weights of every connection touching `idx`.
    pub fn weighted_degree(&self, idx: usize) -> u64 {
        self.neighbors(idx).map(|(_, w)| u64::from(w)).sum()
    }

    /// Bands with the heaviest weighted degree, ties by name.
    pub fn top_bands(&self, limit: usize) -> Vec<(&Band, u64)> {
        let mut ranked: Vec<(&Band, u64)> = (0..self.bands.len())
            .map(|i| (&self.bands[i], self.weighted_degree(i)))
            .collect();
        ranked.sort_by(|x, y| y.1.cmp(&x.1).then_with(|| x.0.name.cmp(&y.0.name)));
        ranked.truncate(limit);
        ranked
    }

    /// Insert or update a band under `policy`. Returns its index.
    pub fn upsert_band(&mut self, name: String, mention: &BandMention, policy: MergePolicy) -> usize {
        if let Some(&idx) = self.index.get(&name) {
            let band = &mut self.bands[idx];
            match policy {
                MergePolicy::LastWriteWins => {
                    band.country = mention.country.clone();
                    band.followers = mention.followers;
                    band.popularity = mention.popularity;
                }
                MergePolicy::FirstWriteWins => {}
                MergePolicy::PreferNonNull => {
                    if mention.country.is_some() {
                        band.country = mention.country.clone();
                    }
                    if mention.followers.is_some() {
                        band.followers = mention.followers;
                    }
                    if mention.popularity.is_some() {
                        band.popularity = mention.popularity;
                    }
                }
            }
            return idx;
        }
        self.push_band(Band::from_mention(name, mention))
    }

    /// Append a band verbatim. Used when restoring a snapshot.
    pub(crate) fn push_band(&mut self, band: Band) -> usize {
        let idx = self.bands.len();
        self.index.insert(band.name.clone(), idx);
        self.bands.push(band);
        self.adjacency.push(Vec::new());
        idx
    }

    /// Add one mention to the `a`–`b` connection. Returns the new weight.
    pub fn connect(&mut self, a: usize, b: usize) -> u32 {
        let key = edge_key(a, b);
        if let Some(&e) = self.edge_index.get(&key) {
            self.connections[e].weight += 1;
            return self.connections[e].weight;
        }
        self.push_connection(a, b, 1);
        1
    }

    /// Append a connection with a given weight. Used when restoring a snapshot.
    pub(crate) fn push_connection(&mut self, a: usize, b: usize, weight: u32) {
        let (a, b) = edge_key(a, b);
        let e = self.connections.len();
        self.connections.push(Connection { a, b, weight });
        self.edge_index.insert((a, b), e);
        self.adjacency[a].push(e);
        if a != b {
            self.adjacency[b].push(e);
        }
    }
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    #[serde(default)]
    pub self_loops: SelfLoopPolicy,
    #[serde(default)]
    pub merge: MergePolicy,
}

/// Counters from one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub records: usize,
    pub skipped_empty: usize,
    pub skipped_self_loops: usize,
}

impl BuildReport {
    pub fn skipped(&self) -> usize {
        self.skipped_empty + self.skipped_self_loops
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub graph: BandGraph,
    pub report: BuildReport,
}

pub struct GraphBuilder {
    options: BuildOptions,
}

impl GraphBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    /// Fold `records`, in order, into a fresh graph.
    pub fn build(&self, records: &[RelationRecord]) -> BuildOutcome {
        let mut graph = BandGraph::new();
        let mut report = BuildReport {
            records: records.len(),
            ..Default::default()
        };

        for (i, rec) in records.iter().enumerate() {
            let source = normalize(&rec.source.name);
            let recommended = normalize(&rec.recommended.name);
            if source.is_empty() || recommended.is_empty() {
                debug!(index = i, "skipping record with an empty band name");
                report.skipped_empty += 1;
                continue;
            }
            if source == recommended && self.options.self_loops == SelfLoopPolicy::Reject {
                debug!(index = i, band = %source, "skipping self-recommendation");
                report.skipped_self_loops += 1;
                continue;
            }
            let s = graph.upsert_band(source, &rec.source, self.options.merge);
            let r = graph.upsert_band(recommended, &rec.recommended, self.options.merge);
            graph.connect(s, r);
        }

        info!(
            bands = graph.band_count(),
            connections = graph.connection_count(),
            skipped = report.skipped(),
            "graph built"
        );
        BuildOutcome { graph, report }
    }
}
