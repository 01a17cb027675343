//! Filtered, ranked recommendations from the direct neighbors of a band.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fuzzy;
use crate::graph::BandGraph;
use crate::normalize::normalize;

/// Neighbor filters. Every active predicate must hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default = "default_max_followers")]
    pub max_followers: u64,
    /// 0..=100.
    #[serde(default = "default_max_popularity")]
    pub max_popularity: u8,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Empty means every country.
    #[serde(default)]
    pub countries: BTreeSet<String>,
}

fn default_max_followers() -> u64 {
    100_000
}
fn default_max_popularity() -> u8 {
    70
}
fn default_min_connections() -> u32 {
    1
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            max_followers: default_max_followers(),
            max_popularity: default_max_popularity(),
            min_connections: default_min_connections(),
            countries: BTreeSet::new(),
        }
    }
}

impl Filters {
    pub fn accepts(&self, r: &Recommendation) -> bool {
        r.followers.unwrap_or(0) <= self.max_followers
            && r.popularity.unwrap_or(0) <= self.max_popularity
            && r.connections >= self.min_connections
            && (self.countries.is_empty() || self.countries.contains(&r.country))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Most shared mentions first.
    #[default]
    Connections,
    /// Least popular first, for hidden gems.
    Popularity,
    /// Largest audience first.
    Followers,
}

impl SortKey {
    pub fn next(self) -> Self {
        match self {
            SortKey::Connections => SortKey::Popularity,
            SortKey::Popularity => SortKey::Followers,
            SortKey::Followers => SortKey::Connections,
        }
    }

    fn compare(self, x: &Recommendation, y: &Recommendation) -> Ordering {
        let primary = match self {
            SortKey::Connections => y.connections.cmp(&x.connections),
            SortKey::Popularity => x.popularity.unwrap_or(0).cmp(&y.popularity.unwrap_or(0)),
            SortKey::Followers => y.followers.unwrap_or(0).cmp(&x.followers.unwrap_or(0)),
        };
        primary.then_with(|| x.band.cmp(&y.band))
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SortKey::Connections => "connections",
            SortKey::Popularity => "popularity",
            SortKey::Followers => "followers",
        })
    }
}

/// One neighbor of the selected band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub band: String,
    pub connections: u32,
    pub popularity: Option<u8>,
    pub followers: Option<u64>,
    pub country: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown band \"{name}\"")]
    UnknownBand {
        name: String,
        suggestions: Vec<String>,
    },
}

/// Resolve a user-supplied name to a band index: exact identity first, then
/// its normalized form.
pub fn resolve(graph: &BandGraph, name: &str) -> Result<usize, QueryError> {
    graph
        .index_of(name)
        .or_else(|| graph.index_of(&normalize(name)))
        .ok_or_else(|| QueryError::UnknownBand {
            name: name.to_string(),
            suggestions: suggest(graph, name, 5),
        })
}

/// Filtered, sorted direct neighbors of `selected`.
///
/// `Ok(vec![])` when the band exists but nothing passes the filters;
/// [`QueryError::UnknownBand`] when it does not exist.
pub fn recommend(
    graph: &BandGraph,
    selected: &str,
    filters: &Filters,
    sort: SortKey,
) -> Result<Vec<Recommendation>, QueryError> {
    let idx = resolve(graph, selected)?;

    let mut results: Vec<Recommendation> = graph
        .neighbors(idx)
        .filter(|&(n, _)| n != idx)
        .map(|(n, weight)| {
            let band = graph.band_at(n);
            Recommendation {
                band: band.name.clone(),
                connections: weight,
                popularity: band.popularity,
                followers: band.followers,
                country: band.country_or_unknown().to_string(),
            }
        })
        .filter(|r| filters.accepts(r))
        .collect();

    results.sort_by(|x, y| sort.compare(x, y));
    Ok(results)
}

/// Closest identities to `name`, best first.
pub fn suggest(graph: &BandGraph, name: &str, limit: usize) -> Vec<String> {
    let candidates = graph.names();
    let query = normalize(name);
    let query = if query.is_empty() { name } else { query.as_str() };
    fuzzy::fuzzy_search(query, &candidates, None)
        .into_iter()
        .take(limit)
        .map(|(c, _, _)| c.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BuildOptions, GraphBuilder};
    use crate::record::{BandMention, RelationRecord};

    fn mention(name: &str, popularity: u8, followers: u64, country: &str) -> BandMention {
        BandMention::new(name)
            .popularity(popularity)
            .followers(followers)
            .country(country)
    }

    /// A–B twice, A–C once, A–D, A–E, and an isolated-ish pair F–G.
    fn setup_graph() -> BandGraph {
        let a = || mention("A", 60, 50_000, "Sweden");
        let b = mention("B", 50, 200, "Norway");
        let c = mention("C", 80, 5, "Norway");
        let d = mention("D", 10, 90_000, "USA");
        let e = mention("E", 10, 90_000, "Sweden");
        let records = vec![
            RelationRecord::new(a(), b.clone()),
            RelationRecord::new(a(), b),
            RelationRecord::new(a(), c),
            RelationRecord::new(a(), d),
            RelationRecord::new(e, a()),
            RelationRecord::new(BandMention::new("F"), BandMention::new("G")),
        ];
        GraphBuilder::new(BuildOptions::default()).build(&records).graph
    }

    fn names(r: &[Recommendation]) -> Vec<&str> {
        r.iter().map(|r| r.band.as_str()).collect()
    }

    #[test]
    fn test_popularity_cap_example() {
        let records = vec![
            RelationRecord::new(BandMention::new("A"), mention("B", 50, 200, "X")),
            RelationRecord::new(BandMention::new("A"), mention("B", 50, 200, "X")),
            RelationRecord::new(BandMention::new("A"), mention("C", 80, 5, "X")),
        ];
        let g = GraphBuilder::new(BuildOptions::default()).build(&records).graph;
        let r = recommend(&g, "A", &Filters::default(), SortKey::Connections).unwrap();
        assert_eq!(names(&r), vec!["B"]);
        assert_eq!(r[0].connections, 2);
    }

    #[test]
    fn test_sort_by_connections_descending() {
        let g = setup_graph();
        let r = recommend(&g, "A", &Filters::default(), SortKey::Connections).unwrap();
        // C is over the popularity cap; D and E tie on one connection.
        assert_eq!(names(&r), vec!["B", "D", "E"]);
    }

    #[test]
    fn test_sort_by_popularity_ascending() {
        let g = setup_graph();
        let r = recommend(&g, "A", &Filters::default(), SortKey::Popularity).unwrap();
        assert_eq!(names(&r), vec!["D", "E", "B"]);
        assert!(r.windows(2).all(|w| w[0].popularity <= w[1].popularity));
    }

    #[test]
    fn test_sort_by_followers_descending() {
        let g = setup_graph();
        let r = recommend(&g, "A", &Filters::default(), SortKey::Followers).unwrap();
        assert_eq!(names(&r), vec!["D", "E", "B"]);
        assert!(r.windows(2).all(|w| w[0].followers >= w[1].followers));
    }

    #[test]
    fn test_filters_conjunction() {
        let g = setup_graph();
        let filters = Filters {
            max_followers: 100_000,
            max_popularity: 100,
            min_connections: 1,
            countries: ["Norway".to_string()].into(),
        };
        let r = recommend(&g, "A", &filters, SortKey::Connections).unwrap();
        assert_eq!(names(&r), vec!["B", "C"]);

        let filters = Filters {
            min_connections: 2,
            max_popularity: 100,
            ..Default::default()
        };
        let r = recommend(&g, "A", &filters, SortKey::Connections).unwrap();
        assert_eq!(names(&r), vec!["B"]);

        let filters = Filters {
            max_followers: 1_000,
            max_popularity: 100,
            ..Default::default()
        };
        let r = recommend(&g, "A", &filters, SortKey::Connections).unwrap();
        assert_eq!(names(&r), vec!["B", "C"]);
    }

    #[test]
    fn test_included_iff_all_predicates_hold() {
        let g = setup_graph();
        let a = g.index_of("A").unwrap();
        let grid = [
            Filters::default(),
            Filters {
                max_popularity: 55,
                max_followers: 60_000,
                ..Default::default()
            },
            Filters {
                countries: ["Sweden".to_string(), "USA".to_string()].into(),
                ..Default::default()
            },
            Filters {
                max_popularity: 0,
                ..Default::default()
            },
        ];
        for filters in grid {
            let r = recommend(&g, "A", &filters, SortKey::Connections).unwrap();
            for (n, w) in g.neighbors(a) {
                let band = g.band_at(n);
                let candidate = Recommendation {
                    band: band.name.clone(),
                    connections: w,
                    popularity: band.popularity,
                    followers: band.followers,
                    country: band.country_or_unknown().to_string(),
                };
                let included = r.iter().any(|x| x.band == band.name);
                assert_eq!(included, filters.accepts(&candidate), "{filters:?} {}", band.name);
            }
        }
    }

    #[test]
    fn test_missing_metrics_compare_as_zero() {
        let g = setup_graph();
        let filters = Filters {
            max_followers: 0,
            max_popularity: 0,
            ..Default::default()
        };
        let r = recommend(&g, "F", &filters, SortKey::Popularity).unwrap();
        assert_eq!(names(&r), vec!["G"]);
        assert_eq!(r[0].country, "Unknown");
        assert_eq!(r[0].popularity, None);
    }

    #[test]
    fn test_empty_result_is_not_an_error() {
        let g = setup_graph();
        let filters = Filters {
            countries: ["Japan".to_string()].into(),
            ..Default::default()
        };
        assert_eq!(recommend(&g, "A", &filters, SortKey::Connections), Ok(vec![]));
    }

    #[test]
    fn test_isolated_band() {
        use crate::graph::SelfLoopPolicy;
        let records = vec![RelationRecord::new(BandMention::new("Solo"), BandMention::new("solo"))];
        let g = GraphBuilder::new(BuildOptions {
            self_loops: SelfLoopPolicy::Allow,
            ..Default::default()
        })
        .build(&records)
        .graph;
        let r = recommend(&g, "Solo", &Filters::default(), SortKey::Connections).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn test_unknown_band() {
        let g = setup_graph();
        match recommend(&g, "Nope", &Filters::default(), SortKey::Connections) {
            Err(QueryError::UnknownBand { name, .. }) => assert_eq!(name, "Nope"),
            other => panic!("expected UnknownBand, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_normalizes_input() {
        let g = setup_graph();
        assert_eq!(g.band_at(resolve(&g, "a").unwrap()).name, "A");
        assert_eq!(g.band_at(resolve(&g, " \"b\" ").unwrap()).name, "B");
    }

    #[test]
    fn test_suggestions() {
        let records = vec![RelationRecord::new(
            BandMention::new("Meshuggah"),
            BandMention::new("Periphery"),
        )];
        let g = GraphBuilder::new(BuildOptions::default()).build(&records).graph;
        let err = recommend(&g, "Meshugah", &Filters::default(), SortKey::Connections).unwrap_err();
        let QueryError::UnknownBand { suggestions, .. } = err;
        assert_eq!(suggestions, vec!["Meshuggah".to_string()]);
        assert_eq!(suggest(&g, "peri", 5), vec!["Periphery".to_string()]);
    }

    #[test]
    fn test_sort_key_cycle() {
        assert_eq!(SortKey::Connections.next(), SortKey::Popularity);
        assert_eq!(SortKey::Followers.next(), SortKey::Connections);
        assert_eq!(SortKey::Popularity.to_string(), "popularity");
    }
}
