//! The metric codebook: a fixed, externally supplied catalog of qualitative
//! metrics.
//!
//! The codebook document is a JSON object mapping metric name to definition:
//!
//! ```json
//! {
//!   "Failure Severity": {
//!     "description": "How severe are the failures the method surfaces?",
//!     "values": [
//!       { "value": "High",   "description": "..." },
//!       { "value": "Medium", "description": "..." },
//!       { "value": "Low",    "description": "..." }
//!     ],
//!     "aliases": ["Failure Impact"]
//!   }
//! }
//! ```
//!
//! `values` is an array because the enumeration order is part of the metric
//! (it drives prompt rendering and report row order). `aliases` lists names
//! the same metric carried in older store documents; loading a store
//! canonicalizes assessment keys through the alias table so a renamed metric
//! is one metric, not two.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read codebook {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("codebook {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("codebook defines no metrics")]
    Empty,
    #[error("metric {metric:?} has no allowed values")]
    NoValues { metric: String },
    #[error("metric {metric:?} lists value {value:?} more than once")]
    DuplicateValue { metric: String, value: String },
    #[error("name {name:?} is claimed by more than one metric")]
    NameCollision { name: String },
}

/// One allowed value of a metric, with its rubric description.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricValue {
    pub value: String,
    #[serde(default)]
    pub description: String,
}

/// One metric of the codebook. Immutable after load.
#[derive(Debug, Clone)]
pub struct MetricDefinition {
    pub name: String,
    pub description: String,
    /// Allowed values in enumeration order.
    pub values: Vec<MetricValue>,
    /// Names this metric carried in older documents.
    pub aliases: Vec<String>,
}

impl MetricDefinition {
    pub fn allowed_values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|v| v.value.as_str())
    }

    /// Case-insensitive lookup returning the canonical casing of a value.
    pub fn canonical_value(&self, raw: &str) -> Option<&str> {
        let raw = raw.trim();
        self.values
            .iter()
            .find(|v| v.value.eq_ignore_ascii_case(raw))
            .map(|v| v.value.as_str())
    }
}

#[derive(Deserialize)]
struct MetricBody {
    #[serde(default)]
    description: String,
    values: Vec<MetricValue>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Catalog entries in file order. A custom visitor keeps the document's
/// metric order without pulling in an order-preserving map type.
struct RawCodebook(Vec<(String, MetricBody)>);

impl<'de> Deserialize<'de> for RawCodebook {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RawVisitor;

        impl<'de> Visitor<'de> for RawVisitor {
            type Value = RawCodebook;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from metric name to metric definition")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((name, body)) = map.next_entry::<String, MetricBody>()? {
                    entries.push((name, body));
                }
                Ok(RawCodebook(entries))
            }
        }

        deserializer.deserialize_map(RawVisitor)
    }
}

/// The loaded codebook: metric definitions in document order plus the
/// alias-resolution table.
pub struct Codebook {
    metrics: Vec<MetricDefinition>,
    by_name: BTreeMap<String, usize>,
    canonical: BTreeMap<String, String>,
}

impl Codebook {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawCodebook =
            serde_json::from_str(&text).map_err(|source| CatalogError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Self::build(raw)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CatalogError> {
        let raw: RawCodebook =
            serde_json::from_str(text).map_err(|source| CatalogError::Parse {
                path: "<inline>".to_string(),
                source,
            })?;
        Self::build(raw)
    }

    fn build(raw: RawCodebook) -> Result<Self, CatalogError> {
        if raw.0.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut metrics = Vec::with_capacity(raw.0.len());
        let mut by_name = BTreeMap::new();
        let mut canonical = BTreeMap::new();

        for (index, (name, body)) in raw.0.into_iter().enumerate() {
            if body.values.is_empty() {
                return Err(CatalogError::NoValues { metric: name });
            }
            for (i, value) in body.values.iter().enumerate() {
                if body.values[..i]
                    .iter()
                    .any(|earlier| earlier.value == value.value)
                {
                    return Err(CatalogError::DuplicateValue {
                        metric: name,
                        value: value.value.clone(),
                    });
                }
            }

            if by_name.insert(name.clone(), index).is_some() || canonical.contains_key(&name) {
                return Err(CatalogError::NameCollision { name });
            }
            for alias in &body.aliases {
                if by_name.contains_key(alias)
                    || canonical
                        .insert(alias.clone(), name.clone())
                        .is_some()
                {
                    return Err(CatalogError::NameCollision {
                        name: alias.clone(),
                    });
                }
            }

            metrics.push(MetricDefinition {
                name,
                description: body.description,
                values: body.values,
                aliases: body.aliases,
            });
        }

        // An alias may not shadow a later metric's canonical name either.
        for metric in &metrics {
            for alias in &metric.aliases {
                if by_name.contains_key(alias) {
                    return Err(CatalogError::NameCollision {
                        name: alias.clone(),
                    });
                }
            }
        }

        Ok(Self {
            metrics,
            by_name,
            canonical,
        })
    }

    /// Metrics in codebook document order.
    pub fn metrics(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.iter()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Look a metric up by canonical name or alias.
    pub fn get(&self, name: &str) -> Option<&MetricDefinition> {
        let name = self.canonical.get(name).map(String::as_str).unwrap_or(name);
        self.by_name.get(name).map(|&i| &self.metrics[i])
    }

    /// Resolve a (possibly legacy) metric name to its canonical form.
    /// Unknown names pass through unchanged.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.canonical.get(name).map(String::as_str).unwrap_or(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODEBOOK: &str = r#"{
        "Failure Severity": {
            "description": "Severity of surfaced failures",
            "values": [
                { "value": "High", "description": "crashes or safety violations" },
                { "value": "Medium", "description": "functional deviations" },
                { "value": "Low", "description": "cosmetic" }
            ]
        },
        "Root-Cause Analysis": {
            "description": "Support for diagnosing failures",
            "values": [
                { "value": "High", "description": "" },
                { "value": "Medium", "description": "" },
                { "value": "Low", "description": "" }
            ],
            "aliases": ["Failure Diagnostics"]
        }
    }"#;

    #[test]
    fn preserves_document_order() {
        let codebook = Codebook::from_json_str(CODEBOOK).unwrap();
        let names: Vec<_> = codebook.metrics().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Failure Severity", "Root-Cause Analysis"]);
        let values: Vec<_> = codebook
            .get("Failure Severity")
            .unwrap()
            .allowed_values()
            .collect();
        assert_eq!(values, ["High", "Medium", "Low"]);
    }

    #[test]
    fn resolves_aliases_to_canonical_names() {
        let codebook = Codebook::from_json_str(CODEBOOK).unwrap();
        assert_eq!(
            codebook.canonical_name("Failure Diagnostics"),
            "Root-Cause Analysis"
        );
        assert_eq!(
            codebook.get("Failure Diagnostics").unwrap().name,
            "Root-Cause Analysis"
        );
        // Unknown names pass through.
        assert_eq!(codebook.canonical_name("Novelty"), "Novelty");
    }

    #[test]
    fn canonical_value_is_case_insensitive() {
        let codebook = Codebook::from_json_str(CODEBOOK).unwrap();
        let metric = codebook.get("Failure Severity").unwrap();
        assert_eq!(metric.canonical_value("high"), Some("High"));
        assert_eq!(metric.canonical_value(" MEDIUM "), Some("Medium"));
        assert_eq!(metric.canonical_value("Unknown"), None);
    }

    #[test]
    fn rejects_duplicate_values() {
        let bad = r#"{
            "M": { "description": "", "values": [
                { "value": "High", "description": "" },
                { "value": "High", "description": "" }
            ]}
        }"#;
        assert!(matches!(
            Codebook::from_json_str(bad),
            Err(CatalogError::DuplicateValue { .. })
        ));
    }

    #[test]
    fn rejects_alias_colliding_with_metric_name() {
        let bad = r#"{
            "A": { "description": "", "values": [{ "value": "x", "description": "" }],
                   "aliases": ["B"] },
            "B": { "description": "", "values": [{ "value": "x", "description": "" }] }
        }"#;
        assert!(matches!(
            Codebook::from_json_str(bad),
            Err(CatalogError::NameCollision { .. })
        ));
    }
}
