//! Relation records and the validation that turns loosely typed extraction
//! output into them.
//!
//! Extraction hands us JSON of uneven shape: numbers as strings, missing
//! keys, the odd `null` name. [`RawRecord`] accepts all of it; [`validate`]
//! is the only way to get a [`RelationRecord`], so everything past this
//! module can rely on the documented defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::normalize::normalize_value;

/// Country assigned to a band nobody could place.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Country placeholders that mean "absent".
const COUNTRY_PLACEHOLDERS: &[&str] = &["unknown", "desconocido", "n/a", "none", "null"];

/// One band as seen in a single mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandMention {
    /// Normalized identity, never empty.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<u64>,
    /// 0..=100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u8>,
}

#[cfg(test)]
impl BandMention {
    pub fn new(name: &str) -> Self {
        Self {
            name: crate::normalize::normalize(name),
            country: None,
            followers: None,
            popularity: None,
        }
    }

    pub fn country(mut self, country: &str) -> Self {
        self.country = clean_country(&Value::String(country.to_string()));
        self
    }

    pub fn followers(mut self, followers: u64) -> Self {
        self.followers = Some(followers);
        self
    }

    pub fn popularity(mut self, popularity: u8) -> Self {
        self.popularity = Some(popularity.min(100));
        self
    }
}

/// A source band recommending one other band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub source: BandMention,
    pub recommended: BandMention,
}

impl RelationRecord {
    pub fn new(source: BandMention, recommended: BandMention) -> Self {
        Self {
            source,
            recommended,
        }
    }
}

/// A mention straight out of extraction. Spanish field names (`nombre`,
/// `pais_origen`) are accepted as aliases.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMention {
    #[serde(default, alias = "nombre")]
    pub name: Value,
    #[serde(default, alias = "pais_origen")]
    pub country: Value,
    #[serde(default)]
    pub followers: Value,
    #[serde(default)]
    pub popularity: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default, alias = "fuente")]
    pub source: Option<RawMention>,
    #[serde(default, alias = "ffo")]
    pub recommended: Option<RawMention>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing {0} band")]
    Missing(&'static str),
    #[error("{0} band name is empty after normalization")]
    EmptyName(&'static str),
}

/// Validate one raw record.
///
/// Defaults: a country that is missing, blank or a placeholder such as
/// "Desconocido" is absent; popularity outside 0..=100 or non-integral is
/// absent; negative or non-integral followers are absent.
pub fn validate(raw: &RawRecord) -> Result<RelationRecord, RecordError> {
    let source = raw.source.as_ref().ok_or(RecordError::Missing("source"))?;
    let recommended = raw
        .recommended
        .as_ref()
        .ok_or(RecordError::Missing("recommended"))?;
    Ok(RelationRecord {
        source: validate_mention(source).ok_or(RecordError::EmptyName("source"))?,
        recommended: validate_mention(recommended)
            .ok_or(RecordError::EmptyName("recommended"))?,
    })
}

/// `None` when the name does not survive normalization.
pub fn validate_mention(raw: &RawMention) -> Option<BandMention> {
    let name = normalize_value(&raw.name);
    if name.is_empty() {
        return None;
    }
    Some(BandMention {
        name,
        country: clean_country(&raw.country),
        followers: as_count(&raw.followers),
        popularity: as_count(&raw.popularity)
            .filter(|p| *p <= 100)
            .map(|p| p as u8),
    })
}

pub(crate) fn clean_country(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    if s.is_empty() || COUNTRY_PLACEHOLDERS.contains(&s.to_lowercase().as_str()) {
        return None;
    }
    Some(s.to_string())
}

/// Non-negative integer from a number or numeric string.
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Outcome of validating a batch.
#[derive(Debug, Default)]
pub struct Validated {
    pub records: Vec<RelationRecord>,
    /// (input position, reason) for every rejected record.
    pub rejected: Vec<(usize, RecordError)>,
}

/// Validate a JSON array of raw records, keeping input order.
pub fn validate_batch(raw: &[RawRecord]) -> Validated {
    let mut out = Validated::default();
    for (i, r) in raw.iter().enumerate() {
        match validate(r) {
            Ok(rec) => out.records.push(rec),
            Err(e) => {
                tracing::debug!(index = i, error = %e, "rejected relation record");
                out.rejected.push((i, e));
            }
        }
    }
    out
}
