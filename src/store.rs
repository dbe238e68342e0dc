//! Read side of the event store, backing the dashboard queries.
//!
//! All three query shapes run against the `message` table written by the
//! SQLite sink, over the same engine-owned pool. Query-builder string
//! interpolation is restricted to fixed allow-lists ([`GroupField`] and the
//! filter column set); every user-supplied value is bound, never spliced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::errors::StoreError;
use crate::event::Event;

/// Default page size for the recent-messages listing.
pub const DEFAULT_PAGE_SIZE: i64 = 40;

/// Group-by results are capped at the top rows by count.
const GROUP_BY_LIMIT: i64 = 20;

/// Default group-by window: the last 30 days.
const GROUP_BY_WINDOW_SECS: i64 = 30 * 24 * 3600;

const SELECT_COLUMNS: &str =
    "SELECT service, client_ip, username, password, command, created_at FROM message";

/// Create the `message` table and its indexes when missing.
///
/// The unique index across all six columns is the conflict target for the
/// sink's `INSERT OR IGNORE` dedup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS message (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service TEXT NOT NULL,
            client_ip TEXT NOT NULL,
            username TEXT,
            password TEXT,
            command TEXT,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS message_dedup
         ON message (service, client_ip, username, password, command, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS message_created_at ON message (created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Columns the group-by query may aggregate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    ClientIp,
    Username,
    Password,
    Command,
}

impl GroupField {
    /// Parse a URL path parameter; anything outside the whitelist is `None`
    /// and never reaches SQL.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "client_ip" => Some(Self::ClientIp),
            "username" => Some(Self::Username),
            "password" => Some(Self::Password),
            "command" => Some(Self::Command),
            _ => None,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::ClientIp => "client_ip",
            Self::Username => "username",
            Self::Password => "password",
            Self::Command => "command",
        }
    }
}

/// Optional equality filters for the recent-messages listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageFilter {
    pub client_ip: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub command: Option<String>,
}

impl MessageFilter {
    /// The populated `(column, value)` pairs, columns from a fixed set.
    fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("client_ip", self.client_ip.as_deref()),
            ("username", self.username.as_deref()),
            ("password", self.password.as_deref()),
            ("command", self.command.as_deref()),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.map(|v| (column, v)))
        .collect()
    }
}

/// One group-by aggregation row.
#[derive(Debug, Clone, Serialize)]
pub struct FieldCount {
    pub value: String,
    pub count: i64,
    pub last_seen: i64,
}

/// One hourly bucket of the activity chart.
#[derive(Debug, Clone, Serialize)]
pub struct ChartBucket {
    pub timestamp: String,
    pub count: i64,
}

/// Prepared queries over the `message` table.
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List messages older than `before` (default: now), newest first.
    pub async fn list_recent(
        &self,
        before: Option<i64>,
        size: Option<i64>,
        filter: &MessageFilter,
    ) -> Result<Vec<Event>, StoreError> {
        let before = before.unwrap_or_else(now_nanos);
        let size = size.unwrap_or(DEFAULT_PAGE_SIZE);

        let pairs = filter.pairs();
        let mut sql = format!("{SELECT_COLUMNS} WHERE created_at < ?");
        for (column, _) in &pairs {
            sql.push_str(" AND ");
            sql.push_str(column);
            sql.push_str(" = ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");

        let mut query = sqlx::query(&sql).bind(before);
        for (_, value) in &pairs {
            query = query.bind(*value);
        }
        let rows = query.bind(size).fetch_all(&self.pool).await?;

        let events = rows
            .iter()
            .map(Event::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Top values of `field` since `since` (default: the last 30 days),
    /// with occurrence count and most recent sighting.
    pub async fn group_by(
        &self,
        field: GroupField,
        since: Option<i64>,
    ) -> Result<Vec<FieldCount>, StoreError> {
        let since = since.unwrap_or_else(|| now_nanos() - GROUP_BY_WINDOW_SECS * 1_000_000_000);
        let column = field.column();

        let sql = format!(
            "SELECT {column}, COUNT({column}) AS count, MAX(created_at) AS last_seen
             FROM message
             WHERE created_at > ? AND {column} IS NOT NULL
             GROUP BY {column}
             ORDER BY count DESC
             LIMIT ?"
        );

        let rows = sqlx::query(&sql)
            .bind(since)
            .bind(GROUP_BY_LIMIT)
            .fetch_all(&self.pool)
            .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in &rows {
            counts.push(FieldCount {
                value: row.try_get(0)?,
                count: row.try_get(1)?,
                last_seen: row.try_get(2)?,
            });
        }
        Ok(counts)
    }

    /// Hourly event counts for one service, newest bucket first.
    ///
    /// The caller whitelists `service`; the value is bound, not spliced.
    pub async fn chart(&self, service: &str) -> Result<Vec<ChartBucket>, StoreError> {
        let rows = sqlx::query(
            "SELECT COUNT(*) AS count, created_at / 1000000000 / 3600 AS hour
             FROM message
             WHERE service = ?
             GROUP BY hour
             ORDER BY hour DESC",
        )
        .bind(service)
        .fetch_all(&self.pool)
        .await?;

        let mut buckets = Vec::with_capacity(rows.len());
        for row in &rows {
            let count: i64 = row.try_get(0)?;
            let hour: i64 = row.try_get(1)?;
            buckets.push(ChartBucket {
                timestamp: hour_label(hour),
                count,
            });
        }
        Ok(buckets)
    }

    /// Cheap readiness probe for the health route.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn hour_label(hour: i64) -> String {
    DateTime::<Utc>::from_timestamp(hour * 3600, 0)
        .map(|t| t.format("%Y-%m-%dT%H").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, SERVICE_FORM, SERVICE_SSH};
    use crate::sink::SqliteSink;
    use chrono::DateTime;

    async fn pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();
        pool
    }

    async fn insert(pool: &SqlitePool, event: &Event) {
        SqliteSink::new(pool.clone()).write(event).await.unwrap();
    }

    fn at(nanos: i64, event: Event) -> Event {
        Event {
            created_at: DateTime::from_timestamp_nanos(nanos),
            ..event
        }
    }

    #[test]
    fn group_field_whitelist() {
        assert_eq!(GroupField::parse("client_ip"), Some(GroupField::ClientIp));
        assert_eq!(GroupField::parse("username"), Some(GroupField::Username));
        assert_eq!(GroupField::parse("password"), Some(GroupField::Password));
        assert_eq!(GroupField::parse("command"), Some(GroupField::Command));
        assert_eq!(GroupField::parse("service"), None);
        assert_eq!(GroupField::parse("1; DROP TABLE message"), None);
    }

    #[tokio::test]
    async fn row_round_trip_preserves_fields() {
        let pool = pool().await;
        let auth = at(
            1_700_000_000_123_456_789,
            Event::new(SERVICE_SSH)
                .with_remote("203.0.113.9")
                .with_auth("root", "toor"),
        );
        let cmd = at(
            1_700_000_001_000_000_042,
            Event::new(SERVICE_SSH)
                .with_remote("203.0.113.9:50022")
                .with_command("uname -a"),
        );
        insert(&pool, &auth).await;
        insert(&pool, &cmd).await;

        let store = EventStore::new(pool);
        let events = store
            .list_recent(None, None, &MessageFilter::default())
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        // Newest first.
        assert_eq!(events[0].command.as_deref(), Some("uname -a"));
        assert!(events[0].auth.is_none());
        assert_eq!(events[0].created_at_nanos(), 1_700_000_001_000_000_042);

        let restored = &events[1];
        assert_eq!(restored.service, SERVICE_SSH);
        assert_eq!(restored.remote, "203.0.113.9");
        assert_eq!(restored.auth, auth.auth);
        assert_eq!(restored.command, None);
        assert_eq!(restored.created_at_nanos(), 1_700_000_000_123_456_789);
    }

    #[tokio::test]
    async fn auth_needs_both_credential_columns() {
        let pool = pool().await;
        sqlx::query(
            "INSERT INTO message (service, client_ip, username, password, command, created_at)
             VALUES ('ssh', '203.0.113.9', 'root', NULL, NULL, 1)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = EventStore::new(pool);
        let events = store
            .list_recent(None, None, &MessageFilter::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].auth.is_none());
    }

    #[tokio::test]
    async fn list_respects_before_and_size() {
        let pool = pool().await;
        for i in 0..5 {
            insert(
                &pool,
                &at(
                    1_000 + i,
                    Event::new(SERVICE_SSH)
                        .with_remote("203.0.113.9")
                        .with_command(format!("cmd-{i}")),
                ),
            )
            .await;
        }

        let store = EventStore::new(pool);
        let events = store
            .list_recent(Some(1_003), Some(2), &MessageFilter::default())
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].command.as_deref(), Some("cmd-2"));
        assert_eq!(events[1].command.as_deref(), Some("cmd-1"));
    }

    #[tokio::test]
    async fn list_filters_are_anded() {
        let pool = pool().await;
        insert(
            &pool,
            &at(
                1,
                Event::new(SERVICE_SSH)
                    .with_remote("203.0.113.9")
                    .with_auth("root", "toor"),
            ),
        )
        .await;
        insert(
            &pool,
            &at(
                2,
                Event::new(SERVICE_SSH)
                    .with_remote("198.51.100.7")
                    .with_auth("root", "admin123"),
            ),
        )
        .await;

        let store = EventStore::new(pool);
        let filter = MessageFilter {
            username: Some("root".into()),
            password: Some("toor".into()),
            ..Default::default()
        };
        let events = store.list_recent(None, None, &filter).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].remote, "203.0.113.9");
    }

    #[tokio::test]
    async fn group_by_counts_and_orders() {
        let pool = pool().await;
        let now = now_nanos();
        for (i, user) in ["root", "root", "root", "admin"].iter().enumerate() {
            insert(
                &pool,
                &at(
                    now - i as i64,
                    Event::new(SERVICE_SSH)
                        .with_remote("203.0.113.9")
                        .with_auth(*user, format!("pw-{i}")),
                ),
            )
            .await;
        }

        let store = EventStore::new(pool);
        let counts = store.group_by(GroupField::Username, None).await.unwrap();

        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].value, "root");
        assert_eq!(counts[0].count, 3);
        assert_eq!(counts[0].last_seen, now);
        assert_eq!(counts[1].value, "admin");
        assert_eq!(counts[1].count, 1);
    }

    #[tokio::test]
    async fn group_by_skips_null_values() {
        let pool = pool().await;
        let now = now_nanos();
        insert(
            &pool,
            &at(
                now,
                Event::new(SERVICE_SSH)
                    .with_remote("203.0.113.9")
                    .with_command("ls"),
            ),
        )
        .await;

        let store = EventStore::new(pool);
        let counts = store.group_by(GroupField::Username, None).await.unwrap();
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn group_by_window_excludes_old_rows() {
        let pool = pool().await;
        insert(
            &pool,
            &at(
                1_000,
                Event::new(SERVICE_SSH)
                    .with_remote("203.0.113.9")
                    .with_auth("ancient", "pw"),
            ),
        )
        .await;

        let store = EventStore::new(pool);
        let counts = store.group_by(GroupField::Username, None).await.unwrap();
        assert!(counts.is_empty());

        let all = store
            .group_by(GroupField::Username, Some(0))
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn chart_buckets_by_hour_per_service() {
        let pool = pool().await;
        let hour = 3_600_000_000_000i64; // one hour in nanoseconds

        for nanos in [hour, hour + 1, 2 * hour] {
            insert(
                &pool,
                &at(
                    nanos,
                    Event::new(SERVICE_SSH)
                        .with_remote("203.0.113.9")
                        .with_command(format!("c-{nanos}")),
                ),
            )
            .await;
        }
        insert(
            &pool,
            &at(
                hour,
                Event::new(SERVICE_FORM)
                    .with_remote("203.0.113.9")
                    .with_auth("root", "toor"),
            ),
        )
        .await;

        let store = EventStore::new(pool);
        let buckets = store.chart(SERVICE_SSH).await.unwrap();

        assert_eq!(buckets.len(), 2);
        // Newest bucket first.
        assert_eq!(buckets[0].timestamp, "1970-01-01T02");
        assert_eq!(buckets[0].count, 1);
        assert_eq!(buckets[1].timestamp, "1970-01-01T01");
        assert_eq!(buckets[1].count, 2);
    }
}
