//! Read-only query shapes and their Cypher rendering.
//!
//! Labels and property names cannot be bound as Cypher parameters, so they
//! are validated and backtick-quoted before being spliced into the query
//! text. Values (keywords, limits) are always passed as parameters.

use neo4rs::{query, Query};

use crate::client::GraphError;

/// A read query understood by every graph backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadQuery {
    /// `CALL db.labels()`.
    Labels,
    /// `CALL db.relationshipTypes()`.
    RelationshipTypes,
    /// Up to `limit` nodes of `label`, projecting `fields`.
    SampleByLabel {
        label: String,
        fields: Vec<String>,
        limit: usize,
    },
    /// Up to `limit` nodes of `label` whose `property` contains `keyword`.
    Contains {
        label: String,
        property: String,
        keyword: String,
        fields: Vec<String>,
        limit: usize,
    },
    /// Number of nodes carrying `label`.
    CountByLabel { label: String },
}

/// Column produced by [`ReadQuery::Labels`].
pub const LABEL_COLUMN: &str = "label";
/// Column produced by [`ReadQuery::RelationshipTypes`].
pub const RELATIONSHIP_TYPE_COLUMN: &str = "relationshipType";
/// Column produced by [`ReadQuery::CountByLabel`].
pub const COUNT_COLUMN: &str = "count";

impl ReadQuery {
    pub fn sample_by_label(label: &str, fields: &[&str], limit: usize) -> Self {
        Self::SampleByLabel {
            label: label.to_string(),
            fields: owned(fields),
            limit,
        }
    }

    pub fn first_by_label(label: &str, fields: &[&str]) -> Self {
        Self::sample_by_label(label, fields, 1)
    }

    pub fn contains(
        label: &str,
        property: &str,
        keyword: &str,
        fields: &[&str],
        limit: usize,
    ) -> Self {
        Self::Contains {
            label: label.to_string(),
            property: property.to_string(),
            keyword: keyword.to_string(),
            fields: owned(fields),
            limit,
        }
    }

    pub fn count_by_label(label: &str) -> Self {
        Self::CountByLabel {
            label: label.to_string(),
        }
    }

    /// Column names every result row is projected onto.
    pub fn columns(&self) -> Vec<String> {
        match self {
            Self::Labels => vec![LABEL_COLUMN.to_string()],
            Self::RelationshipTypes => vec![RELATIONSHIP_TYPE_COLUMN.to_string()],
            Self::SampleByLabel { fields, .. } | Self::Contains { fields, .. } => fields.clone(),
            Self::CountByLabel { .. } => vec![COUNT_COLUMN.to_string()],
        }
    }

    /// Reject identifiers that cannot be safely spliced into Cypher.
    pub fn validate(&self) -> Result<(), GraphError> {
        match self {
            Self::Labels | Self::RelationshipTypes => Ok(()),
            Self::SampleByLabel { label, fields, .. } => {
                validate_identifier(label)?;
                fields.iter().try_for_each(|f| validate_identifier(f))
            }
            Self::Contains {
                label,
                property,
                fields,
                ..
            } => {
                validate_identifier(label)?;
                validate_identifier(property)?;
                fields.iter().try_for_each(|f| validate_identifier(f))
            }
            Self::CountByLabel { label } => validate_identifier(label),
        }
    }

    /// Render the Cypher text (without parameters).
    pub fn cypher(&self) -> Result<String, GraphError> {
        self.validate()?;
        let text = match self {
            Self::Labels => format!("CALL db.labels() YIELD label RETURN label AS {LABEL_COLUMN}"),
            Self::RelationshipTypes => format!(
                "CALL db.relationshipTypes() YIELD relationshipType \
                 RETURN relationshipType AS {RELATIONSHIP_TYPE_COLUMN}"
            ),
            Self::SampleByLabel { label, fields, .. } => format!(
                "MATCH (n:`{label}`) RETURN {} LIMIT $limit",
                projection(fields)
            ),
            Self::Contains {
                label,
                property,
                fields,
                ..
            } => format!(
                "MATCH (n:`{label}`) WHERE n.`{property}` CONTAINS $keyword \
                 RETURN {} LIMIT $limit",
                projection(fields)
            ),
            Self::CountByLabel { label } => {
                format!("MATCH (n:`{label}`) RETURN count(n) AS {COUNT_COLUMN}")
            }
        };
        Ok(text)
    }

    /// Build the parameterized neo4rs query.
    pub fn to_query(&self) -> Result<Query, GraphError> {
        let q = query(&self.cypher()?);
        let q = match self {
            Self::SampleByLabel { limit, .. } => q.param("limit", limit_param(*limit)),
            Self::Contains { keyword, limit, .. } => q
                .param("keyword", keyword.clone())
                .param("limit", limit_param(*limit)),
            _ => q,
        };
        Ok(q)
    }
}

/// Labels, relationship types and property keys: ASCII letters, digits and
/// `_`, not starting with a digit.
pub fn validate_identifier(name: &str) -> Result<(), GraphError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(GraphError::InvalidIdentifier(name.to_string()))
    }
}

fn projection(fields: &[String]) -> String {
    if fields.is_empty() {
        return "n".to_string();
    }
    fields
        .iter()
        .map(|f| format!("n.`{f}` AS `{f}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}
