//! Core domain types for graph-grounded question answering.
//!
//! These types flow between the graph layer (which produces facts), the
//! prompt composer (which consumes them) and the inference client.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Scalars ───────────────────────────────────────────────────────

/// A single property value projected off a graph node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

// ── Facts ─────────────────────────────────────────────────────────

/// A flat, immutable record projected from one graph node.
///
/// Facts are built from a fixed column list: every requested column is
/// present, and a property the node does not carry is stored as
/// [`Scalar::Null`] rather than omitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Fact {
    fields: BTreeMap<String, Scalar>,
}

impl Fact {
    /// Project `columns` using `lookup`; missing values default to `Null`.
    pub fn project<S, F>(columns: &[S], mut lookup: F) -> Self
    where
        S: AsRef<str>,
        F: FnMut(&str) -> Option<Scalar>,
    {
        let fields = columns
            .iter()
            .map(|c| {
                let c = c.as_ref();
                (c.to_string(), lookup(c).unwrap_or_default())
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Scalar> {
        self.fields.get(field)
    }

    /// The field as text, if it is a non-empty string.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field)
            .and_then(Scalar::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Fact {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The node shapes of the question-answering data set, each with a fixed
/// label and projected field list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    /// A policy or regulation text.
    Policy,
    /// A named entity extracted from source documents.
    Entity,
    /// A question with its reference answer.
    Question,
}

impl FactKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Policy => "Policy",
            Self::Entity => "HotpotEntity",
            Self::Question => "HotpotQuestion",
        }
    }

    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Policy => &["content"],
            Self::Entity => &["name", "entity_type"],
            Self::Question => &["question", "answer"],
        }
    }
}

// ── Schema ────────────────────────────────────────────────────────

/// Node labels and relationship types present in the graph at one moment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SchemaSummary {
    pub labels: BTreeSet<String>,
    pub relationship_types: BTreeSet<String>,
}

impl SchemaSummary {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.relationship_types.is_empty()
    }
}

// ── Prompt / Answer ───────────────────────────────────────────────

/// The grounded prompt sent to the inference service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text produced by the inference service for one prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub model: String,
}
