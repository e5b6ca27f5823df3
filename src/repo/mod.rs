use anyhow::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::domain::{BalancingOperation, Event, NodeRecord};

/// Commit hook invoked after successful in-memory mutations
///
/// Implementations must not block for long; callers hold no locks while
/// committing but do wait for the call to return. An `Err` is logged by the
/// caller and never rolls back in-memory state.
pub trait GridStore: Send + Sync {
    fn commit_node(&self, record: &NodeRecord) -> Result<()>;
    fn commit_balancing(&self, operation: &BalancingOperation) -> Result<()>;
    fn commit_event(&self, event: &Event) -> Result<()>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl GridStore for NullStore {
    fn commit_node(&self, _: &NodeRecord) -> Result<()> {
        Ok(())
    }

    fn commit_balancing(&self, _: &BalancingOperation) -> Result<()> {
        Ok(())
    }

    fn commit_event(&self, _: &Event) -> Result<()> {
        Ok(())
    }
}

/// Rows kept per table by [`MemoryStore::new`]
pub const DEFAULT_RETAINED_ROWS: usize = 10_000;

/// Keeps the most recent committed rows in memory; used by tests and the
/// standalone daemon. Older rows are discarded once a table is full.
#[derive(Debug)]
pub struct MemoryStore {
    nodes: Mutex<VecDeque<NodeRecord>>,
    operations: Mutex<VecDeque<BalancingOperation>>,
    events: Mutex<VecDeque<Event>>,
    retained: usize,
    failing: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETAINED_ROWS)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retained` rows per table (at least one)
    pub fn with_capacity(retained: usize) -> Self {
        Self {
            nodes: Mutex::default(),
            operations: Mutex::default(),
            events: Mutex::default(),
            retained: retained.max(1),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent commit fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn nodes(&self) -> Vec<NodeRecord> {
        self.nodes.lock().iter().cloned().collect()
    }

    pub fn operations(&self) -> Vec<BalancingOperation> {
        self.operations.lock().iter().cloned().collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().iter().cloned().collect()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            anyhow::bail!("memory store is configured to fail");
        }
        Ok(())
    }

    fn append<T: Clone>(&self, table: &Mutex<VecDeque<T>>, row: &T) -> Result<()> {
        self.check()?;
        let mut rows = table.lock();
        if rows.len() == self.retained {
            rows.pop_front();
        }
        rows.push_back(row.clone());
        Ok(())
    }
}

impl GridStore for MemoryStore {
    fn commit_node(&self, record: &NodeRecord) -> Result<()> {
        self.append(&self.nodes, record)
    }

    fn commit_balancing(&self, operation: &BalancingOperation) -> Result<()> {
        self.append(&self.operations, operation)
    }

    fn commit_event(&self, event: &Event) -> Result<()> {
        self.append(&self.events, event)
    }
}

/// Pick the store for this process: Postgres when the `db` feature is on and
/// a URL is configured, otherwise in-memory.
pub async fn open_store(cfg: &Config) -> Result<Arc<dyn GridStore>> {
    #[cfg(feature = "db")]
    {
        if let Some(url) = cfg.db.url.as_deref() {
            let store = crate::repo::pg::PgStore::connect(url).await?;
            return Ok(Arc::new(store));
        }
    }

    #[cfg(not(feature = "db"))]
    {
        if cfg.db.url.is_some() {
            tracing::warn!("db.url is set but the `db` feature is disabled; using memory store");
        }
    }

    Ok(Arc::new(MemoryStore::with_capacity(cfg.db.memory_rows)))
}

#[cfg(feature = "db")]
pub mod pg;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeAttrs, NodeType};

    #[test]
    fn test_memory_store_records_and_fails_on_demand() {
        let store = MemoryStore::new();
        let record = NodeRecord::new("SUB_0", NodeAttrs::new(NodeType::Substation, 5000.0));
        store.commit_node(&record).unwrap();
        assert_eq!(store.nodes().len(), 1);

        store.set_failing(true);
        assert!(store.commit_node(&record).is_err());
        assert_eq!(store.nodes().len(), 1);
    }

    #[test]
    fn test_memory_store_keeps_most_recent_rows() {
        let store = MemoryStore::with_capacity(2);
        for (i, load) in [100.0, 200.0, 300.0].into_iter().enumerate() {
            let attrs = NodeAttrs::new(NodeType::Consumer, 400.0).with_load(load);
            store.commit_node(&NodeRecord::new(format!("CONS_{i}"), attrs)).unwrap();
        }
        let ids: Vec<String> = store.nodes().into_iter().map(|r| r.node_id).collect();
        assert_eq!(ids, vec!["CONS_1", "CONS_2"]);
    }

    #[tokio::test]
    async fn test_open_store_defaults_to_memory() {
        let cfg = Config::default();
        let store = open_store(&cfg).await.unwrap();
        let record = NodeRecord::new("TRF_0", NodeAttrs::new(NodeType::Transformer, 2000.0));
        assert!(store.commit_node(&record).is_ok());
    }
}
