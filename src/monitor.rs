//! Read-only HTTP query interface over the event store.
//!
//! The monitor never writes: it exposes the three dashboard query shapes
//! plus liveness/readiness probes. Path parameters are validated against
//! fixed whitelists before any SQL is constructed; an unknown field or
//! service is a plain 404.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::EngineError;
use crate::event::{Event, SERVICE_FORM, SERVICE_SHELL, SERVICE_SSH};
use crate::store::{ChartBucket, EventStore, FieldCount, GroupField, MessageFilter};

/// Query parameters for the recent-messages listing.
#[derive(Debug, Deserialize)]
struct ListParams {
    /// Nanosecond timestamp to page from; defaults to now.
    before: Option<i64>,
    /// Page size; defaults to 40.
    size: Option<i64>,
    client_ip: Option<String>,
    username: Option<String>,
    password: Option<String>,
    command: Option<String>,
}

impl ListParams {
    fn filter(&self) -> MessageFilter {
        MessageFilter {
            client_ip: self.client_ip.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            command: self.command.clone(),
        }
    }
}

/// Services the chart endpoint accepts.
fn known_service(service: &str) -> bool {
    matches!(service, SERVICE_SSH | SERVICE_SHELL | SERVICE_FORM)
}

/// Build the monitor router over a shared event store.
pub fn router(store: EventStore) -> Router {
    Router::new()
        .route("/api/messages", get(list_messages))
        .route("/api/group_by/:field", get(group_by))
        .route("/api/chart/:service", get(chart))
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .with_state(store)
}

/// Serve the monitor API until the shutdown token is cancelled.
pub async fn serve(
    addr: String,
    store: EventStore,
    shutdown: CancellationToken,
) -> Result<(), EngineError> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| EngineError::Bind { addr, source })?;
    info!(addr = %listener.local_addr()?, "monitor API listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("monitor API stopped");
    Ok(())
}

async fn list_messages(
    State(store): State<EventStore>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Event>>, StatusCode> {
    store
        .list_recent(params.before, params.size, &params.filter())
        .await
        .map(Json)
        .map_err(internal)
}

async fn group_by(
    State(store): State<EventStore>,
    Path(field): Path<String>,
) -> Result<Json<Vec<FieldCount>>, StatusCode> {
    let Some(field) = GroupField::parse(&field) else {
        return Err(StatusCode::NOT_FOUND);
    };
    store.group_by(field, None).await.map(Json).map_err(internal)
}

async fn chart(
    State(store): State<EventStore>,
    Path(service): Path<String>,
) -> Result<Json<Vec<ChartBucket>>, StatusCode> {
    if !known_service(&service) {
        return Err(StatusCode::NOT_FOUND);
    }
    store.chart(&service).await.map(Json).map_err(internal)
}

async fn livez() -> &'static str {
    "ok"
}

async fn readyz(State(store): State<EventStore>) -> StatusCode {
    match store.ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            warn!(error = %err, "readiness probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn internal(err: crate::errors::StoreError) -> StatusCode {
    warn!(error = %err, "monitor query failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::sink::SqliteSink;
    use crate::store;

    async fn seeded_store() -> EventStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        store::ensure_schema(&pool).await.unwrap();

        SqliteSink::new(pool.clone())
            .write(
                &Event::new(SERVICE_SSH)
                    .with_remote("203.0.113.9")
                    .with_auth("root", "toor"),
            )
            .await
            .unwrap();
        EventStore::new(pool)
    }

    #[test]
    fn chart_service_whitelist() {
        assert!(known_service("ssh"));
        assert!(known_service("shell"));
        assert!(known_service("form"));
        assert!(!known_service("telnet"));
        assert!(!known_service("ssh'; DROP TABLE message"));
    }

    #[tokio::test]
    async fn unknown_group_by_field_is_404_before_sql() {
        let store = seeded_store().await;
        let result = group_by(State(store), Path("service".to_string())).await;
        assert!(matches!(result, Err(StatusCode::NOT_FOUND)));
    }

    #[tokio::test]
    async fn unknown_chart_service_is_404_before_sql() {
        let store = seeded_store().await;
        let result = chart(State(store), Path("telnet".to_string())).await;
        assert!(matches!(result, Err(StatusCode::NOT_FOUND)));
    }

    #[tokio::test]
    async fn group_by_over_recorded_events() {
        let store = seeded_store().await;
        let Json(counts) = group_by(State(store), Path("username".to_string()))
            .await
            .unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].value, "root");
        assert_eq!(counts[0].count, 1);
    }

    #[tokio::test]
    async fn list_messages_applies_query_filters() {
        let store = seeded_store().await;

        let params = ListParams {
            before: None,
            size: None,
            client_ip: None,
            username: Some("root".into()),
            password: None,
            command: None,
        };
        let Json(events) = list_messages(State(store.clone()), Query(params))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);

        let params = ListParams {
            before: None,
            size: None,
            client_ip: None,
            username: Some("nobody".into()),
            password: None,
            command: None,
        };
        let Json(events) = list_messages(State(store), Query(params)).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn readiness_probe_reports_ok() {
        let store = seeded_store().await;
        assert_eq!(readyz(State(store)).await, StatusCode::OK);
    }
}
