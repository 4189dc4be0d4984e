//! Scoped acquisition and release of graph sessions.
//!
//! A [`GraphConnection`] owns a backend for the lifetime of the process.
//! Every read opens one session, runs exactly one query, materializes the
//! result, and closes the session before returning, whether or not the
//! query succeeded. No session or row cursor escapes a read.

use async_trait::async_trait;

use graphqa_core::Fact;

use crate::client::GraphError;
use crate::queries::ReadQuery;

/// A graph database able to hand out read sessions.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    type Session: ReadSession;

    /// Acquire a session. Failure here is a connection error.
    async fn open_session(&self) -> Result<Self::Session, GraphError>;

    /// Release the underlying connection.
    async fn shutdown(&mut self);
}

/// A short-lived read session.
#[async_trait]
pub trait ReadSession: Send {
    /// Run one read query and materialize every row.
    async fn run(&mut self, query: &ReadQuery) -> Result<Vec<Fact>, GraphError>;

    async fn close(&mut self) -> Result<(), GraphError>;
}

/// Process-wide handle to the graph, released exactly once.
pub struct GraphConnection<B: GraphBackend> {
    backend: B,
    closed: bool,
}

impl<B: GraphBackend> GraphConnection<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Execute one read query in its own session.
    pub async fn read(&self, query: &ReadQuery) -> Result<Vec<Fact>, GraphError> {
        if self.closed {
            return Err(GraphError::Closed);
        }
        query.validate()?;

        let mut session = self.backend.open_session().await?;
        let result = session.run(query).await;
        let closed = session.close().await;

        match (result, closed) {
            (Ok(facts), close_result) => {
                if let Err(close_err) = close_result {
                    tracing::warn!(error = %close_err, "Failed to close session after read");
                }
                tracing::debug!(rows = facts.len(), query = ?query, "Read query completed");
                Ok(facts)
            }
            (Err(e), close_result) => {
                if let Err(close_err) = close_result {
                    tracing::warn!(error = %close_err, "Failed to close session after query error");
                }
                Err(e)
            }
        }
    }

    /// Release the connection. Only the first call reaches the backend.
    pub async fn close(&mut self) {
        if self.closed {
            tracing::debug!("Graph connection already closed");
            return;
        }
        self.backend.shutdown().await;
        self.closed = true;
    }
}
