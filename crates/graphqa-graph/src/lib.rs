//! graphqa-graph: read-only Neo4j access for grounding answers.
//!
//! All graph reads flow through a [`GraphConnection`], which scopes every
//! query to its own session and releases the connection exactly once.
//! No write path is exposed.

pub mod client;
pub mod memory;
pub mod queries;
pub mod retrieval;
pub mod schema;
pub mod session;

pub use client::{GraphConfig, GraphError, Neo4jGraph};
pub use memory::MemoryGraph;
pub use queries::ReadQuery;
pub use retrieval::KeywordHits;
pub use session::{GraphBackend, GraphConnection, ReadSession};
