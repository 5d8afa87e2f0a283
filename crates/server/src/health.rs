use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use signoff_core::destinations::DestinationStore;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    destinations: Option<Arc<DestinationStore>>,
}

impl HealthState {
    pub fn new(destinations: Option<Arc<DestinationStore>>) -> Self {
        Self { destinations }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub destinations: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    state: HealthState,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let destinations = destinations_check(state.destinations.as_deref());
    let ready = destinations.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "signoff-server runtime initialized".to_string(),
        },
        destinations,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn destinations_check(store: Option<&DestinationStore>) -> HealthCheck {
    match store {
        Some(store) => HealthCheck {
            status: "ready",
            detail: format!(
                "{} logging destination(s) loaded from {}",
                store.len(),
                store.path().display()
            ),
        },
        None => HealthCheck {
            status: "degraded",
            detail: "destination store failed to load; audit summaries disabled".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use signoff_core::destinations::DestinationStore;

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_destinations_are_loaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(
            DestinationStore::open(dir.path().join("dest.json")).expect("open store"),
        );

        let (status, Json(payload)) = health(State(HealthState::new(Some(store)))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.destinations.status, "ready");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn health_reports_degraded_without_a_destination_store() {
        let (status, Json(payload)) = health(State(HealthState::new(None))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.destinations.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
