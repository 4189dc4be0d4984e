//! In-memory property graph backend.
//!
//! Evaluates the same [`ReadQuery`] shapes as the Neo4j backend against a
//! small node/relationship store held in process. Used for offline runs and
//! tests. It records how many sessions were opened and closed and can be
//! told to fail queries, fail session closes, or refuse sessions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use graphqa_core::{Fact, Scalar};

use crate::client::GraphError;
use crate::queries::{ReadQuery, COUNT_COLUMN, LABEL_COLUMN, RELATIONSHIP_TYPE_COLUMN};
use crate::session::{GraphBackend, ReadSession};

#[derive(Debug, Clone)]
struct MemoryNode {
    labels: BTreeSet<String>,
    properties: BTreeMap<String, Scalar>,
}

#[derive(Debug, Default)]
struct Store {
    nodes: Vec<MemoryNode>,
    relationships: Vec<(usize, String, usize)>,
}

#[derive(Debug, Default)]
struct Inner {
    store: Mutex<Store>,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    shutdowns: AtomicUsize,
    fail_queries: AtomicBool,
    fail_closes: AtomicBool,
    refuse_sessions: AtomicBool,
}

/// Shared in-memory graph. Clones observe the same store and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    inner: Arc<Inner>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its index.
    pub fn add_node<K, V>(&self, labels: &[&str], properties: impl IntoIterator<Item = (K, V)>) -> usize
    where
        K: Into<String>,
        V: Into<Scalar>,
    {
        let node = MemoryNode {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        };
        let mut store = self.store();
        store.nodes.push(node);
        store.nodes.len() - 1
    }

    /// Connect two existing nodes.
    pub fn add_relationship(&self, from: usize, rel_type: &str, to: usize) {
        self.store()
            .relationships
            .push((from, rel_type.to_string(), to));
    }

    /// Make every subsequent query fail after its session opens.
    pub fn fail_queries(&self, fail: bool) {
        self.inner.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make session close report an error after releasing the session.
    pub fn fail_closes(&self, fail: bool) {
        self.inner.fail_closes.store(fail, Ordering::SeqCst);
    }

    /// Make session acquisition fail, as an unreachable server would.
    pub fn refuse_sessions(&self, refuse: bool) {
        self.inner.refuse_sessions.store(refuse, Ordering::SeqCst);
    }

    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.inner.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.inner.shutdowns.load(Ordering::SeqCst)
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        lock(&self.inner.store)
    }
}

fn lock(store: &Mutex<Store>) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl GraphBackend for MemoryGraph {
    type Session = MemorySession;

    async fn open_session(&self) -> Result<MemorySession, GraphError> {
        if self.inner.refuse_sessions.load(Ordering::SeqCst) {
            return Err(GraphError::Connection("connection refused".to_string()));
        }
        self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            inner: Arc::clone(&self.inner),
            open: true,
        })
    }

    async fn shutdown(&mut self) {
        self.inner.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// A session over a [`MemoryGraph`].
pub struct MemorySession {
    inner: Arc<Inner>,
    open: bool,
}

#[async_trait]
impl ReadSession for MemorySession {
    async fn run(&mut self, query: &ReadQuery) -> Result<Vec<Fact>, GraphError> {
        if !self.open {
            return Err(GraphError::Closed);
        }
        if self.inner.fail_queries.load(Ordering::SeqCst) {
            return Err(GraphError::Failed("injected query failure".to_string()));
        }
        Ok(evaluate(&lock(&self.inner.store), query))
    }

    async fn close(&mut self) -> Result<(), GraphError> {
        if self.open {
            self.open = false;
            self.inner.sessions_closed.fetch_add(1, Ordering::SeqCst);
            if self.inner.fail_closes.load(Ordering::SeqCst) {
                return Err(GraphError::Failed("injected close failure".to_string()));
            }
        }
        Ok(())
    }
}

fn evaluate(store: &Store, query: &ReadQuery) -> Vec<Fact> {
    match query {
        ReadQuery::Labels => {
            let labels: BTreeSet<&String> = store.nodes.iter().flat_map(|n| &n.labels).collect();
            labels
                .into_iter()
                .map(|l| single(LABEL_COLUMN, l.as_str()))
                .collect()
        }
        ReadQuery::RelationshipTypes => {
            let types: BTreeSet<&String> = store.relationships.iter().map(|(_, t, _)| t).collect();
            types
                .into_iter()
                .map(|t| single(RELATIONSHIP_TYPE_COLUMN, t.as_str()))
                .collect()
        }
        ReadQuery::SampleByLabel {
            label,
            fields,
            limit,
        } => with_label(store, label)
            .take(*limit)
            .map(|n| project(n, fields))
            .collect(),
        ReadQuery::Contains {
            label,
            property,
            keyword,
            fields,
            limit,
        } => with_label(store, label)
            .filter(|n| {
                n.properties
                    .get(property)
                    .and_then(Scalar::as_str)
                    .is_some_and(|v| v.contains(keyword.as_str()))
            })
            .take(*limit)
            .map(|n| project(n, fields))
            .collect(),
        ReadQuery::CountByLabel { label } => {
            let count = with_label(store, label).count() as i64;
            vec![single(COUNT_COLUMN, count)]
        }
    }
}

fn with_label<'a>(store: &'a Store, label: &'a str) -> impl Iterator<Item = &'a MemoryNode> + 'a {
    store.nodes.iter().filter(move |n| n.labels.contains(label))
}

fn project(node: &MemoryNode, fields: &[String]) -> Fact {
    Fact::project(fields, |f| node.properties.get(f).cloned())
}

fn single(column: &str, value: impl Into<Scalar>) -> Fact {
    [(column, value.into())].into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn evaluates_catalog_queries() {
        let graph = MemoryGraph::new();
        let a = graph.add_node(&["HotpotEntity"], [("name", "Ed Wood")]);
        let b = graph.add_node(&["HotpotQuestion", "Question"], [("question", "Who?")]);
        graph.add_relationship(b, "MENTIONS", a);
        graph.add_relationship(b, "MENTIONS", a);

        let mut session = graph.open_session().await.unwrap();
        let labels = session.run(&ReadQuery::Labels).await.unwrap();
        let types = session.run(&ReadQuery::RelationshipTypes).await.unwrap();
        session.close().await.unwrap();

        let labels: Vec<_> = labels.iter().filter_map(|f| f.text(LABEL_COLUMN)).collect();
        assert_eq!(labels, vec!["HotpotEntity", "HotpotQuestion", "Question"]);
        assert_eq!(types.len(), 1);
    }

    #[tokio::test]
    async fn count_by_label() {
        let graph = MemoryGraph::new();
        for i in 0..3_i64 {
            graph.add_node(&["Policy"], [("seq", i)]);
        }
        let mut session = graph.open_session().await.unwrap();
        let facts = session
            .run(&ReadQuery::count_by_label("Policy"))
            .await
            .unwrap();
        assert_eq!(facts[0].get(COUNT_COLUMN).and_then(Scalar::as_i64), Some(3));
    }

    #[tokio::test]
    async fn close_counts_once_per_session() {
        let graph = MemoryGraph::new();
        let mut session = graph.open_session().await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(graph.sessions_closed(), 1);
        assert!(matches!(
            session.run(&ReadQuery::Labels).await,
            Err(GraphError::Closed)
        ));
    }
}
