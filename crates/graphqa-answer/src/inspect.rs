//! Diagnostic walk over the graph: what is loaded and what keywords hit.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::Serialize;

use graphqa_core::{Fact, FactKind};
use graphqa_graph::{GraphBackend, GraphConnection};

use crate::error::Result;

/// Keywords searched when none are given on the command line.
pub const DEFAULT_KEYWORDS: &[&str] = &["Scott", "Ed", "Wood", "Derrickson", "director", "filmmaker"];

/// Number of question/answer pairs listed.
const QUESTION_SAMPLE: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct KindReport {
    pub label: String,
    pub count: i64,
    pub samples: Vec<Fact>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordReport {
    pub keyword: String,
    pub names: Vec<String>,
}

/// Snapshot of the graph contents relevant to question answering.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub labels: BTreeSet<String>,
    pub entities: Option<KindReport>,
    pub keyword_hits: Vec<KeywordReport>,
    pub questions: Option<KindReport>,
    pub relationship_types: BTreeSet<String>,
}

/// Build the report. Kinds whose label is absent are left out rather than
/// queried.
pub async fn inspect<B, S>(
    graph: &GraphConnection<B>,
    keywords: &[S],
    sample_limit: usize,
    keyword_limit: usize,
) -> Result<InspectReport>
where
    B: GraphBackend,
    S: AsRef<str>,
{
    let labels = graph.labels().await?;

    let entity = FactKind::Entity;
    let (entities, keyword_hits) = if labels.contains(entity.label()) {
        let report = kind_report(graph, entity, sample_limit).await?;
        let hits = if report.count > 0 {
            let name = entity.fields()[0];
            graph
                .search_keywords(entity.label(), name, keywords, &[name], keyword_limit)
                .await?
                .into_iter()
                .map(|h| KeywordReport {
                    names: h.facts.iter().filter_map(|f| f.text(name)).map(str::to_string).collect(),
                    keyword: h.keyword,
                })
                .collect()
        } else {
            Vec::new()
        };
        (Some(report), hits)
    } else {
        tracing::warn!(label = entity.label(), "Entity label not found");
        (None, Vec::new())
    };

    let question = FactKind::Question;
    let questions = if labels.contains(question.label()) {
        Some(kind_report(graph, question, QUESTION_SAMPLE).await?)
    } else {
        None
    };

    let relationship_types = graph.relationship_types().await?;

    Ok(InspectReport {
        labels,
        entities,
        keyword_hits,
        questions,
        relationship_types,
    })
}

async fn kind_report<B: GraphBackend>(
    graph: &GraphConnection<B>,
    kind: FactKind,
    limit: usize,
) -> Result<KindReport> {
    let count = graph.count_by_label(kind.label()).await?;
    let samples = if count > 0 {
        graph.sample_kind(kind, limit).await?
    } else {
        Vec::new()
    };
    Ok(KindReport {
        label: kind.label().to_string(),
        count,
        samples,
    })
}

impl InspectReport {
    /// Human-readable rendering for the console.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Node labels: {}", join(&self.labels));

        match &self.entities {
            Some(entities) => {
                let _ = writeln!(out, "{} nodes: {}", entities.label, entities.count);
                for (i, fact) in entities.samples.iter().enumerate() {
                    let name = fact.text("name").unwrap_or("-");
                    let kind = fact.text("entity_type").unwrap_or("-");
                    let _ = writeln!(out, "  {}. {name} ({kind})", i + 1);
                }
                for hit in &self.keyword_hits {
                    if hit.names.is_empty() {
                        let _ = writeln!(out, "  '{}': no matches", hit.keyword);
                    } else {
                        let _ = writeln!(out, "  '{}': {}", hit.keyword, hit.names.join(", "));
                    }
                }
            }
            None => {
                let _ = writeln!(out, "{} label not found", FactKind::Entity.label());
            }
        }

        if let Some(questions) = &self.questions {
            let _ = writeln!(out, "{} nodes: {}", questions.label, questions.count);
            for (i, fact) in questions.samples.iter().enumerate() {
                let _ = writeln!(out, "  {}. Q: {}", i + 1, fact.text("question").unwrap_or("-"));
                let _ = writeln!(out, "     A: {}", fact.text("answer").unwrap_or("-"));
            }
        }

        let _ = write!(out, "Relationship types: {}", join(&self.relationship_types));
        out
    }
}

fn join(set: &BTreeSet<String>) -> String {
    if set.is_empty() {
        "(none)".to_string()
    } else {
        set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    }
}
