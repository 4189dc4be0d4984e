//! Read retrieval queries that produce grounding facts.
//!
//! Every call opens one session, runs one parameterized query and returns the
//! fully materialized result. No matches is an empty vector, never an error.

use graphqa_core::{Fact, FactKind, Scalar};

use crate::client::GraphError;
use crate::queries::{ReadQuery, COUNT_COLUMN};
use crate::session::{GraphBackend, GraphConnection};

/// Containment hits for one keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHits {
    pub keyword: String,
    pub facts: Vec<Fact>,
}

impl<B: GraphBackend> GraphConnection<B> {
    // ── Sampling ─────────────────────────────────────────────────

    /// Up to `limit` nodes of `label`. No ordering is imposed.
    pub async fn sample_by_label(
        &self,
        label: &str,
        fields: &[&str],
        limit: usize,
    ) -> Result<Vec<Fact>, GraphError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut facts = self
            .read(&ReadQuery::sample_by_label(label, fields, limit))
            .await?;
        facts.truncate(limit);
        Ok(facts)
    }

    /// At most one node of `label`.
    pub async fn first_by_label(&self, label: &str, fields: &[&str]) -> Result<Vec<Fact>, GraphError> {
        self.sample_by_label(label, fields, 1).await
    }

    pub async fn sample_kind(&self, kind: FactKind, limit: usize) -> Result<Vec<Fact>, GraphError> {
        self.sample_by_label(kind.label(), kind.fields(), limit).await
    }

    // ── Containment search ───────────────────────────────────────

    /// Up to `limit` nodes of `label` whose `property` contains `keyword`
    /// as a case-sensitive substring.
    pub async fn search_contains(
        &self,
        label: &str,
        property: &str,
        keyword: &str,
        fields: &[&str],
        limit: usize,
    ) -> Result<Vec<Fact>, GraphError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut facts = self
            .read(&ReadQuery::contains(label, property, keyword, fields, limit))
            .await?;
        facts.truncate(limit);
        Ok(facts)
    }

    /// One containment search per keyword, in input order. Blank keywords
    /// are skipped since they would match every node.
    pub async fn search_keywords<S: AsRef<str>>(
        &self,
        label: &str,
        property: &str,
        keywords: &[S],
        fields: &[&str],
        limit: usize,
    ) -> Result<Vec<KeywordHits>, GraphError> {
        let mut hits = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let keyword = keyword.as_ref();
            if keyword.trim().is_empty() {
                tracing::debug!("Skipping blank keyword");
                continue;
            }
            let facts = self
                .search_contains(label, property, keyword, fields, limit)
                .await?;
            tracing::debug!(keyword, hits = facts.len(), "Keyword search");
            hits.push(KeywordHits {
                keyword: keyword.to_string(),
                facts,
            });
        }
        Ok(hits)
    }

    /// Containment search on the first field of `kind` (e.g. entity name).
    pub async fn search_kind(
        &self,
        kind: FactKind,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<Fact>, GraphError> {
        let fields = kind.fields();
        self.search_contains(kind.label(), fields[0], keyword, fields, limit)
            .await
    }

    // ── Counting ─────────────────────────────────────────────────

    pub async fn count_by_label(&self, label: &str) -> Result<i64, GraphError> {
        let facts = self.read(&ReadQuery::count_by_label(label)).await?;
        Ok(facts
            .first()
            .and_then(|f| f.get(COUNT_COLUMN))
            .and_then(Scalar::as_i64)
            .unwrap_or(0))
    }
}
