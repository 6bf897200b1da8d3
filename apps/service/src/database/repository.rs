use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{TransactionBehavior, params};

use crate::error::StoreError;
use crate::monitoring::types::{IntervalClass, MonitoredTarget, Order, ProbeResult};
use crate::pool::DbPool;

/// Current mapping of owner -> {url -> check interval}. Mutations change
/// what the next scheduled firing will probe; the scheduler re-reads this
/// at fire time instead of holding a snapshot.
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    /// Insert a new target or update the interval in place when
    /// (owner, url) already exists. Rejects malformed urls and new urls
    /// beyond the per-owner cap without mutating anything.
    async fn add_or_update(
        &self,
        owner: &str,
        url: &str,
        interval: IntervalClass,
    ) -> Result<(), StoreError>;

    /// Delete the target and, per the cascade policy, its log history.
    async fn remove(&self, owner: &str, url: &str) -> Result<(), StoreError>;

    /// Delete every target an owner has, along with the owner's entire
    /// log history. Always cascades; this is the full-account reset, not
    /// a per-target removal.
    async fn reset_owner(&self, owner: &str) -> Result<(), StoreError>;

    /// Targets for one owner, used at each firing to materialize batch
    /// membership.
    async fn list(&self, owner: &str) -> Result<Vec<MonitoredTarget>, StoreError>;

    /// All targets across owners, used to build per-interval batches.
    async fn list_all(&self) -> Result<Vec<MonitoredTarget>, StoreError>;
}

/// Append-only history of probe outcomes. No dedup, no retention cap;
/// callers apply their own time-window filtering over the full sequence.
#[async_trait]
pub trait UptimeLog: Send + Sync {
    async fn append(&self, result: &ProbeResult) -> Result<(), StoreError>;

    async fn query(&self, owner: &str, order: Order) -> Result<Vec<ProbeResult>, StoreError>;

    async fn query_target(
        &self,
        owner: &str,
        url: &str,
        order: Order,
    ) -> Result<Vec<ProbeResult>, StoreError>;

    /// Deletes all entries for one target. Used by manual log clearing and
    /// by registry-driven removal.
    async fn purge(&self, owner: &str, url: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_targets_per_owner: usize,
    pub cascade_logs_on_remove: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { max_targets_per_owner: 20, cascade_logs_on_remove: true }
    }
}

/// Libsql-backed implementation of both store traits.
pub struct LibsqlStore {
    pool: DbPool,
    options: StoreOptions,
}

impl LibsqlStore {
    pub fn new(pool: DbPool, options: StoreOptions) -> Self {
        Self { pool, options }
    }

    async fn conn(
        &self,
    ) -> Result<deadpool::managed::Object<crate::pool::ConnectionManager>, StoreError> {
        Ok(self.pool.get().await?)
    }
}

fn validate_url(raw: &str) -> Result<(), StoreError> {
    let invalid = |reason: String| StoreError::InvalidUrl { url: raw.to_string(), reason };

    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }

    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(())
}

fn order_sql(order: Order) -> &'static str {
    match order {
        Order::Asc => "ASC",
        Order::Desc => "DESC",
    }
}

async fn collect_results(mut rows: libsql::Rows) -> Result<Vec<ProbeResult>, StoreError> {
    let mut results = Vec::new();

    while let Some(row) = rows.next().await? {
        let observed_at: i64 = row.get(3)?;

        results.push(ProbeResult {
            owner: row.get(0)?,
            url: row.get(1)?,
            up: row.get::<i64>(2)? != 0,
            observed_at: DateTime::<Utc>::from_timestamp(observed_at, 0).unwrap_or_default(),
        });
    }

    Ok(results)
}

#[async_trait]
impl TargetRegistry for LibsqlStore {
    async fn add_or_update(
        &self,
        owner: &str,
        url: &str,
        interval: IntervalClass,
    ) -> Result<(), StoreError> {
        validate_url(url)?;

        let conn = self.conn().await?;
        let now = Utc::now().timestamp();

        // Cap check and insert must be one atomic unit: two writers racing
        // past a separate count check could both land under the cap and
        // leave the owner over it. An immediate transaction takes the
        // write lock up front, serializing concurrent adds.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate).await?;

        let updated = tx
            .execute(
                "UPDATE targets SET interval = ?, updated_at = ? WHERE owner = ? AND url = ?",
                params![interval.as_str(), now, owner, url],
            )
            .await?;

        if updated == 0 {
            let mut rows = tx
                .query("SELECT COUNT(*) FROM targets WHERE owner = ?", params![owner])
                .await?;
            let count = match rows.next().await? {
                Some(row) => row.get::<i64>(0)? as usize,
                None => 0,
            };

            if count >= self.options.max_targets_per_owner {
                tx.rollback().await?;
                return Err(StoreError::CapacityExceeded {
                    owner: owner.to_string(),
                    limit: self.options.max_targets_per_owner,
                });
            }

            tx.execute(
                "INSERT INTO targets (owner, url, interval, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![owner, url, interval.as_str(), now, now],
            )
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn remove(&self, owner: &str, url: &str) -> Result<(), StoreError> {
        let conn = self.conn().await?;

        // Target and its history go together, or not at all.
        let tx = conn.transaction().await?;
        tx.execute("DELETE FROM targets WHERE owner = ? AND url = ?", params![owner, url])
            .await?;
        if self.options.cascade_logs_on_remove {
            tx.execute("DELETE FROM probe_log WHERE owner = ? AND url = ?", params![owner, url])
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn reset_owner(&self, owner: &str) -> Result<(), StoreError> {
        let conn = self.conn().await?;

        let tx = conn.transaction().await?;
        tx.execute("DELETE FROM targets WHERE owner = ?", params![owner]).await?;
        tx.execute("DELETE FROM probe_log WHERE owner = ?", params![owner]).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn list(&self, owner: &str) -> Result<Vec<MonitoredTarget>, StoreError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT owner, url, interval FROM targets WHERE owner = ? ORDER BY url",
                params![owner],
            )
            .await?;

        let mut targets = Vec::new();
        while let Some(row) = rows.next().await? {
            let interval: String = row.get(2)?;
            targets.push(MonitoredTarget {
                owner: row.get(0)?,
                url: row.get(1)?,
                interval: interval.parse()?,
            });
        }

        Ok(targets)
    }

    async fn list_all(&self) -> Result<Vec<MonitoredTarget>, StoreError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query("SELECT owner, url, interval FROM targets ORDER BY owner, url", ())
            .await?;

        let mut targets = Vec::new();
        while let Some(row) = rows.next().await? {
            let interval: String = row.get(2)?;
            targets.push(MonitoredTarget {
                owner: row.get(0)?,
                url: row.get(1)?,
                interval: interval.parse()?,
            });
        }

        Ok(targets)
    }
}

#[async_trait]
impl UptimeLog for LibsqlStore {
    async fn append(&self, result: &ProbeResult) -> Result<(), StoreError> {
        let conn = self.conn().await?;

        conn.execute(
            "INSERT INTO probe_log (owner, url, up, observed_at) VALUES (?, ?, ?, ?)",
            params![
                result.owner.as_str(),
                result.url.as_str(),
                result.up as i64,
                result.observed_at.timestamp()
            ],
        )
        .await?;

        Ok(())
    }

    async fn query(&self, owner: &str, order: Order) -> Result<Vec<ProbeResult>, StoreError> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT owner, url, up, observed_at FROM probe_log
             WHERE owner = ? ORDER BY observed_at {dir}, id {dir}",
            dir = order_sql(order)
        );

        collect_results(conn.query(&sql, params![owner]).await?).await
    }

    async fn query_target(
        &self,
        owner: &str,
        url: &str,
        order: Order,
    ) -> Result<Vec<ProbeResult>, StoreError> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT owner, url, up, observed_at FROM probe_log
             WHERE owner = ? AND url = ? ORDER BY observed_at {dir}, id {dir}",
            dir = order_sql(order)
        );

        collect_results(conn.query(&sql, params![owner, url]).await?).await
    }

    async fn purge(&self, owner: &str, url: &str) -> Result<(), StoreError> {
        let conn = self.conn().await?;

        conn.execute("DELETE FROM probe_log WHERE owner = ? AND url = ?", params![owner, url])
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::migrations;
    use crate::pool::build_pool;

    async fn test_store(options: StoreOptions) -> (LibsqlStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let database =
            libsql::Builder::new_local(dir.path().join("vigil.db")).build().await.unwrap();
        let conn = database.connect().unwrap();
        migrations::run_migrations(&conn).await.unwrap();
        let pool = build_pool(database, 2).unwrap();

        (LibsqlStore::new(pool, options), dir)
    }

    fn result(owner: &str, url: &str, up: bool, secs: i64) -> ProbeResult {
        ProbeResult {
            owner: owner.to_string(),
            url: url.to_string(),
            up,
            observed_at: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn re_adding_a_url_updates_interval_in_place() {
        let (store, _dir) = test_store(StoreOptions::default()).await;

        store
            .add_or_update("alice", "https://example.com", IntervalClass::FiveMinutes)
            .await
            .unwrap();
        store.add_or_update("alice", "https://example.com", IntervalClass::OneHour).await.unwrap();

        let targets = store.list("alice").await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].interval, IntervalClass::OneHour);
    }

    #[tokio::test]
    async fn malformed_urls_are_rejected_without_mutation() {
        let (store, _dir) = test_store(StoreOptions::default()).await;

        for bad in ["example.com", "ftp://example.com", "http://", "not a url"] {
            let err = store
                .add_or_update("alice", bad, IntervalClass::FiveMinutes)
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidUrl { .. }), "{bad}: {err}");
        }

        assert!(store.list("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn capacity_cap_rejects_the_twenty_first_url() {
        let (store, _dir) = test_store(StoreOptions::default()).await;

        for i in 0..20 {
            store
                .add_or_update("alice", &format!("https://{i}.example.com"), IntervalClass::OneDay)
                .await
                .unwrap();
        }

        let err = store
            .add_or_update("alice", "https://21.example.com", IntervalClass::OneDay)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CapacityExceeded { limit: 20, .. }));
        assert_eq!(store.list("alice").await.unwrap().len(), 20);

        // Updating an existing target is still allowed at the cap.
        store
            .add_or_update("alice", "https://0.example.com", IntervalClass::OneHour)
            .await
            .unwrap();

        // The cap is per owner, not global.
        store.add_or_update("bob", "https://b.example.com", IntervalClass::OneDay).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_adds_cannot_breach_the_cap() {
        let options = StoreOptions { max_targets_per_owner: 5, ..Default::default() };
        let (store, _dir) = test_store(options).await;
        let store = std::sync::Arc::new(store);

        // Twice the cap's worth of adds racing on pooled connections. The
        // count check and insert run in one immediate transaction, so no
        // interleaving may land more rows than the cap allows.
        let adds = (0..10).map(|i| {
            let store = store.clone();
            async move {
                store
                    .add_or_update("alice", &format!("https://{i}.example.com"), IntervalClass::OneDay)
                    .await
            }
        });
        let results = futures::future::join_all(adds).await;

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        let targets = store.list("alice").await.unwrap();
        assert!(targets.len() <= 5, "cap breached: {} targets", targets.len());
        assert_eq!(targets.len(), accepted);
    }

    #[tokio::test]
    async fn reset_clears_an_owner_without_touching_others() {
        let (store, _dir) = test_store(StoreOptions::default()).await;

        store
            .add_or_update("alice", "https://a.example.com", IntervalClass::FiveMinutes)
            .await
            .unwrap();
        store
            .add_or_update("alice", "https://b.example.com", IntervalClass::OneHour)
            .await
            .unwrap();
        store.append(&result("alice", "https://a.example.com", true, 100)).await.unwrap();
        store.add_or_update("bob", "https://c.example.com", IntervalClass::OneDay).await.unwrap();
        store.append(&result("bob", "https://c.example.com", false, 100)).await.unwrap();

        store.reset_owner("alice").await.unwrap();

        assert!(store.list("alice").await.unwrap().is_empty());
        assert!(store.query("alice", Order::Asc).await.unwrap().is_empty());
        assert_eq!(store.list("bob").await.unwrap().len(), 1);
        assert_eq!(store.query("bob", Order::Asc).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removal_cascades_to_log_history() {
        let (store, _dir) = test_store(StoreOptions::default()).await;

        store
            .add_or_update("alice", "https://example.com", IntervalClass::FiveMinutes)
            .await
            .unwrap();
        store.append(&result("alice", "https://example.com", true, 100)).await.unwrap();
        store.append(&result("alice", "https://example.com", false, 200)).await.unwrap();

        store.remove("alice", "https://example.com").await.unwrap();

        assert!(store.list("alice").await.unwrap().is_empty());
        assert!(store
            .query_target("alice", "https://example.com", Order::Asc)
            .await
            .unwrap()
            .is_empty());

        // Re-adding starts a fresh, empty history.
        store
            .add_or_update("alice", "https://example.com", IntervalClass::FiveMinutes)
            .await
            .unwrap();
        assert!(store
            .query_target("alice", "https://example.com", Order::Asc)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn removal_keeps_logs_when_cascade_is_off() {
        let options = StoreOptions { cascade_logs_on_remove: false, ..Default::default() };
        let (store, _dir) = test_store(options).await;

        store
            .add_or_update("alice", "https://example.com", IntervalClass::FiveMinutes)
            .await
            .unwrap();
        store.append(&result("alice", "https://example.com", true, 100)).await.unwrap();

        store.remove("alice", "https://example.com").await.unwrap();

        assert!(store.list("alice").await.unwrap().is_empty());
        assert_eq!(
            store.query_target("alice", "https://example.com", Order::Asc).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn repeated_identical_results_are_all_retained() {
        let (store, _dir) = test_store(StoreOptions::default()).await;

        for _ in 0..3 {
            store.append(&result("alice", "https://example.com", true, 100)).await.unwrap();
        }

        assert_eq!(store.query("alice", Order::Asc).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn queries_order_by_observation_time() {
        let (store, _dir) = test_store(StoreOptions::default()).await;

        store.append(&result("alice", "https://a.example.com", true, 300)).await.unwrap();
        store.append(&result("alice", "https://b.example.com", false, 100)).await.unwrap();
        store.append(&result("alice", "https://a.example.com", false, 200)).await.unwrap();

        let asc = store.query("alice", Order::Asc).await.unwrap();
        let times: Vec<i64> = asc.iter().map(|r| r.observed_at.timestamp()).collect();
        assert_eq!(times, vec![100, 200, 300]);

        let desc = store.query("alice", Order::Desc).await.unwrap();
        let times: Vec<i64> = desc.iter().map(|r| r.observed_at.timestamp()).collect();
        assert_eq!(times, vec![300, 200, 100]);

        let one = store.query_target("alice", "https://a.example.com", Order::Asc).await.unwrap();
        assert_eq!(one.len(), 2);
        assert!(one.iter().all(|r| r.url == "https://a.example.com"));
    }

    #[tokio::test]
    async fn purge_clears_history_but_keeps_the_target() {
        let (store, _dir) = test_store(StoreOptions::default()).await;

        store
            .add_or_update("alice", "https://example.com", IntervalClass::FiveMinutes)
            .await
            .unwrap();
        store.append(&result("alice", "https://example.com", true, 100)).await.unwrap();
        store.append(&result("alice", "https://other.example.com", true, 100)).await.unwrap();

        store.purge("alice", "https://example.com").await.unwrap();

        assert!(store
            .query_target("alice", "https://example.com", Order::Asc)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.query("alice", Order::Asc).await.unwrap().len(), 1);
        assert_eq!(store.list("alice").await.unwrap().len(), 1);
    }
}
