//! Joins fare tables to station coordinates and groups the resulting
//! (distance, fare) observations by canonical line id.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::geo::{haversine_km, LatLng};
use crate::normalize::{normalize_name, LineAliases};

/// A station from the reference dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

/// Raw fares: line id -> `"FROM||TO"` -> fare.
///
/// Fares stay as untyped JSON so that a bad entry skips one pair instead of
/// failing the whole file. Both levels keep the file's key order.
pub type FareTable = IndexMap<String, IndexMap<String, Value>>;

/// Canonical line id -> samples, in fare-table order. Lines appear in the
/// order their first raw id appears in the fare table.
pub type TrainingSet = IndexMap<String, Vec<TrainingSample>>;

const KEY_SEPARATOR: &str = "||";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub from: String,
    pub to: String,
    pub distance_km: f64,
    pub fare: f64,
}

/// Why a fare entry did not become a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingLineId { line: String },
    NonNumericFare { line: String, key: String },
    MalformedKey { line: String, key: String },
    UnknownStation { line: String, key: String, name: String },
    InvalidDistance { line: String, key: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingLineId { line } => write!(f, "line {line:?} has no canonical id"),
            SkipReason::NonNumericFare { line, key } => {
                write!(f, "{line} {key}: fare is not numeric")
            }
            SkipReason::MalformedKey { line, key } => {
                write!(f, "{line} {key}: key is not FROM||TO")
            }
            SkipReason::UnknownStation { line, key, name } => {
                write!(f, "{line} {key}: no station named {name:?}")
            }
            SkipReason::InvalidDistance { line, key } => {
                write!(f, "{line} {key}: distance is zero or not finite")
            }
        }
    }
}

/// Result of one sample-building pass.
#[derive(Debug, Clone, Default)]
pub struct SampleBuild {
    pub set: TrainingSet,
    pub skipped: Vec<SkipReason>,
}

impl SampleBuild {
    pub fn sample_count(&self) -> usize {
        self.set.values().map(Vec::len).sum()
    }
}

/// Index stations by normalized name. Later duplicates replace earlier ones.
pub fn index_stations(stations: &[Station]) -> HashMap<String, LatLng> {
    let mut index = HashMap::with_capacity(stations.len());
    for station in stations {
        let key = normalize_name(&station.name);
        if let Some(prev) = index.insert(key, LatLng::new(station.lat, station.lng)) {
            debug!(
                "Station {:?} shadows an earlier entry at {:?}",
                station.name, prev
            );
        }
    }
    index
}

pub fn build_training_set(
    fares: &FareTable,
    stations: &[Station],
    aliases: &LineAliases,
) -> SampleBuild {
    let index = index_stations(stations);
    let mut build = SampleBuild::default();

    for (line, pairs) in fares {
        let Some(canonical) = aliases.normalize_line_id(Some(line.as_str())) else {
            skip(&mut build.skipped, SkipReason::MissingLineId { line: line.clone() });
            continue;
        };

        let mut samples = Vec::new();
        for (key, fare) in pairs {
            match sample_for(line, key, fare, &index) {
                Ok(sample) => samples.push(sample),
                Err(reason) => skip(&mut build.skipped, reason),
            }
        }

        if !samples.is_empty() {
            build.set.entry(canonical).or_default().extend(samples);
        }
    }

    build
}

fn skip(skipped: &mut Vec<SkipReason>, reason: SkipReason) {
    debug!("Skipping fare entry: {}", reason);
    skipped.push(reason);
}

fn sample_for(
    line: &str,
    key: &str,
    fare: &Value,
    index: &HashMap<String, LatLng>,
) -> Result<TrainingSample, SkipReason> {
    let Some(fare) = fare.as_f64() else {
        return Err(SkipReason::NonNumericFare {
            line: line.to_string(),
            key: key.to_string(),
        });
    };

    let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
    let [from, to] = parts.as_slice() else {
        return Err(SkipReason::MalformedKey {
            line: line.to_string(),
            key: key.to_string(),
        });
    };

    let from = normalize_name(from);
    let to = normalize_name(to);
    let locate = |name: &String| {
        index
            .get(name)
            .copied()
            .ok_or_else(|| SkipReason::UnknownStation {
                line: line.to_string(),
                key: key.to_string(),
                name: name.clone(),
            })
    };
    let a = locate(&from)?;
    let b = locate(&to)?;

    let distance = haversine_km(a, b);
    if !distance.is_finite() || distance <= 0.0 {
        return Err(SkipReason::InvalidDistance {
            line: line.to_string(),
            key: key.to_string(),
        });
    }

    Ok(TrainingSample {
        from,
        to,
        distance_km: (distance * 1000.0).round() / 1000.0,
        fare,
    })
}
