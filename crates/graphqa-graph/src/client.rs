//! Neo4j connection management and the Bolt-backed read session.

use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Row, Txn};

use graphqa_core::config::Neo4jSettings;
use graphqa_core::{Fact, Scalar};

use crate::queries::ReadQuery;
use crate::session::{GraphBackend, ReadSession};

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Graph connection already closed")]
    Closed,

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Invalid label or property name: {0:?}")]
    InvalidIdentifier(String),

    #[error("Query failed: {0}")]
    Failed(String),
}

impl GraphError {
    /// Whether the error means the graph could not be reached at all, as
    /// opposed to a single query failing.
    pub fn is_connection(&self) -> bool {
        matches!(self, GraphError::Connection(_) | GraphError::Closed)
    }
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Neo4jSettings::default().into()
    }
}

impl From<Neo4jSettings> for GraphConfig {
    fn from(s: Neo4jSettings) -> Self {
        Self {
            uri: s.uri,
            user: s.user,
            password: s.password,
            max_connections: s.max_connections,
            fetch_size: s.fetch_size,
        }
    }
}

/// Bolt connection pool to a Neo4j server.
///
/// Sessions are explicit transactions that are always rolled back, so
/// nothing issued through this backend can be committed.
pub struct Neo4jGraph {
    graph: Option<Graph>,
}

impl Neo4jGraph {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        // The pool connects lazily; one round trip proves the server is there.
        verify_connectivity(&graph)
            .await
            .map_err(|e| GraphError::Connection(format!("{}: {e}", config.uri)))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph: Some(graph) })
    }
}

/// Run `RETURN 1` in a transaction that is rolled back.
async fn verify_connectivity(graph: &Graph) -> Result<(), neo4rs::Error> {
    let mut txn = graph.start_txn().await?;
    txn.run(neo4rs::query("RETURN 1")).await?;
    txn.rollback().await
}

#[async_trait]
impl GraphBackend for Neo4jGraph {
    type Session = Neo4jSession;

    async fn open_session(&self) -> Result<Neo4jSession, GraphError> {
        let graph = self.graph.as_ref().ok_or(GraphError::Closed)?;
        let txn = graph
            .start_txn()
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        Ok(Neo4jSession { txn: Some(txn) })
    }

    async fn shutdown(&mut self) {
        if self.graph.take().is_some() {
            tracing::info!("Released Neo4j connection pool");
        }
    }
}

/// One read transaction on a pooled Bolt connection.
pub struct Neo4jSession {
    txn: Option<Txn>,
}

#[async_trait]
impl ReadSession for Neo4jSession {
    async fn run(&mut self, query: &ReadQuery) -> Result<Vec<Fact>, GraphError> {
        let txn = self.txn.as_mut().ok_or(GraphError::Closed)?;
        let columns = query.columns();

        let mut stream = txn.execute(query.to_query()?).await?;
        let mut facts = Vec::new();
        while let Some(row) = stream.next(txn.handle()).await? {
            facts.push(row_to_fact(&row, &columns));
        }
        Ok(facts)
    }

    async fn close(&mut self) -> Result<(), GraphError> {
        match self.txn.take() {
            Some(txn) => Ok(txn.rollback().await?),
            None => Ok(()),
        }
    }
}

/// Project the named columns of a row into a Fact.
fn row_to_fact(row: &Row, columns: &[String]) -> Fact {
    Fact::project(columns, |column| Some(row_scalar(row, column)))
}

/// Read one column as a scalar; nulls, absent columns and non-scalar values
/// (nodes, lists, temporals) become `Null`.
fn row_scalar(row: &Row, column: &str) -> Scalar {
    if let Ok(v) = row.get::<Option<String>>(column) {
        return v.map(Scalar::Text).unwrap_or(Scalar::Null);
    }
    if let Ok(v) = row.get::<i64>(column) {
        return Scalar::Int(v);
    }
    if let Ok(v) = row.get::<f64>(column) {
        return Scalar::Float(v);
    }
    if let Ok(v) = row.get::<bool>(column) {
        return Scalar::Bool(v);
    }
    Scalar::Null
}
