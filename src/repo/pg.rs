#![cfg(feature = "db")]

use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::runtime::Handle;
use tracing::warn;

use super::GridStore;
use crate::domain::{BalancingOperation, Event, NodeRecord};

/// Postgres-backed commit hook
///
/// Commits are handed to the tokio runtime and written asynchronously, so
/// the hook returns as soon as the row is queued. Write failures are logged
/// from the spawned task.
pub struct PgStore {
    pub pool: PgPool,
    handle: Handle,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self {
            pool,
            handle: Handle::current(),
        })
    }

    fn spawn_write<F>(&self, table: &'static str, write: F)
    where
        F: std::future::Future<Output = sqlx::Result<()>> + Send + 'static,
    {
        self.handle.spawn(async move {
            if let Err(e) = write.await {
                warn!(table, error = %e, "Postgres commit failed");
            }
        });
    }
}

impl GridStore for PgStore {
    fn commit_node(&self, record: &NodeRecord) -> Result<()> {
        let pool = self.pool.clone();
        let r = record.clone();
        self.spawn_write("grid_nodes", async move {
            sqlx::query(
                r#"
                INSERT INTO grid_nodes (node_id, node_type, capacity, current_load, efficiency, voltage, status, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, now())
                ON CONFLICT (node_id) DO UPDATE SET
                    node_type = EXCLUDED.node_type,
                    capacity = EXCLUDED.capacity,
                    current_load = EXCLUDED.current_load,
                    efficiency = EXCLUDED.efficiency,
                    voltage = EXCLUDED.voltage,
                    status = EXCLUDED.status,
                    updated_at = now()
                "#,
            )
            .bind(&r.node_id)
            .bind(r.attrs.node_type.to_string())
            .bind(r.attrs.capacity)
            .bind(r.attrs.current_load)
            .bind(r.attrs.efficiency)
            .bind(r.attrs.voltage)
            .bind(r.attrs.status.to_string())
            .execute(&pool)
            .await?;
            Ok(())
        });
        Ok(())
    }

    fn commit_balancing(&self, operation: &BalancingOperation) -> Result<()> {
        let pool = self.pool.clone();
        let op = operation.clone();
        self.spawn_write("balancing_operations", async move {
            sqlx::query(
                r#"
                INSERT INTO balancing_operations (id, kind, from_node, to_node, amount, efficiency_gain, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(op.id)
            .bind(op.kind.to_string())
            .bind(&op.from)
            .bind(&op.to)
            .bind(op.amount)
            .bind(op.efficiency_gain)
            .bind(op.timestamp)
            .execute(&pool)
            .await?;
            Ok(())
        });
        Ok(())
    }

    fn commit_event(&self, event: &Event) -> Result<()> {
        let pool = self.pool.clone();
        let data = serde_json::to_value(&event.data)?;
        let e = event.clone();
        self.spawn_write("grid_events", async move {
            sqlx::query(
                r#"
                INSERT INTO grid_events (id, node_id, kind, priority, data, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(e.id)
            .bind(&e.node_id)
            .bind(e.kind().to_string())
            .bind(e.priority() as i16)
            .bind(data)
            .bind(e.timestamp)
            .execute(&pool)
            .await?;
            Ok(())
        });
        Ok(())
    }
}
