//! Schema introspection: which labels and relationship types exist right now.
//!
//! Nothing here is cached; the graph may change between calls.

use std::collections::BTreeSet;

use graphqa_core::SchemaSummary;

use crate::client::GraphError;
use crate::queries::{ReadQuery, LABEL_COLUMN, RELATIONSHIP_TYPE_COLUMN};
use crate::session::{GraphBackend, GraphConnection};

impl<B: GraphBackend> GraphConnection<B> {
    /// Node labels currently present in the graph.
    pub async fn labels(&self) -> Result<BTreeSet<String>, GraphError> {
        self.catalog(&ReadQuery::Labels, LABEL_COLUMN).await
    }

    /// Relationship types currently present in the graph.
    pub async fn relationship_types(&self) -> Result<BTreeSet<String>, GraphError> {
        self.catalog(&ReadQuery::RelationshipTypes, RELATIONSHIP_TYPE_COLUMN)
            .await
    }

    pub async fn schema_summary(&self) -> Result<SchemaSummary, GraphError> {
        Ok(SchemaSummary {
            labels: self.labels().await?,
            relationship_types: self.relationship_types().await?,
        })
    }

    pub async fn has_label(&self, label: &str) -> Result<bool, GraphError> {
        Ok(self.labels().await?.contains(label))
    }

    async fn catalog(&self, query: &ReadQuery, column: &str) -> Result<BTreeSet<String>, GraphError> {
        let facts = self.read(query).await?;
        Ok(facts
            .iter()
            .filter_map(|f| f.text(column))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::memory::MemoryGraph;
    use crate::session::GraphConnection;

    #[tokio::test]
    async fn empty_graph_has_empty_schema() {
        let graph = MemoryGraph::new();
        let conn = GraphConnection::new(graph.clone());

        let summary = conn.schema_summary().await.unwrap();

        assert!(summary.labels.is_empty());
        assert!(summary.relationship_types.is_empty());
        assert!(summary.is_empty());
        assert_eq!(graph.sessions_opened(), graph.sessions_closed());
    }

    #[tokio::test]
    async fn schema_reflects_current_graph() {
        let graph = MemoryGraph::new();
        let conn = GraphConnection::new(graph.clone());
        assert!(!conn.has_label("Policy").await.unwrap());

        let q = graph.add_node(&["HotpotQuestion"], [("question", "Which film?")]);
        let e = graph.add_node(&["HotpotEntity"], [("name", "Doctor Strange")]);
        graph.add_relationship(q, "MENTIONS", e);
        graph.add_node(&["Policy"], [("content", "Policy X requires annual filing")]);

        let summary = conn.schema_summary().await.unwrap();
        assert_eq!(
            summary.labels.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["HotpotEntity", "HotpotQuestion", "Policy"]
        );
        assert!(summary.relationship_types.contains("MENTIONS"));
        assert!(conn.has_label("Policy").await.unwrap());
    }
}
