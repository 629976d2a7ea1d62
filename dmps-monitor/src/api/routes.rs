//! Route handlers.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::logging::available_modules;
use crate::supervisor::FleetStatus;

use super::server::AppState;

/// Build the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(fleet_status))
        .route("/logging", get(get_logging).put(set_logging))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoggingResponse {
    pub filter: String,
    pub modules: Vec<ModuleInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLoggingRequest {
    pub filter: String,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn fleet_status(State(state): State<AppState>) -> Json<FleetStatus> {
    Json(state.supervisor.status())
}

async fn get_logging(State(state): State<AppState>) -> Response {
    let Some(logging) = &state.logging_config else {
        return (StatusCode::SERVICE_UNAVAILABLE, "logging is not reloadable").into_response();
    };

    Json(logging_response(logging.get_filter())).into_response()
}

async fn set_logging(
    State(state): State<AppState>,
    Json(request): Json<UpdateLoggingRequest>,
) -> Response {
    let Some(logging) = &state.logging_config else {
        return (StatusCode::SERVICE_UNAVAILABLE, "logging is not reloadable").into_response();
    };

    match logging.set_filter(&request.filter) {
        Ok(()) => Json(logging_response(logging.get_filter())).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

fn logging_response(filter: String) -> LoggingResponse {
    LoggingResponse {
        filter,
        modules: available_modules()
            .into_iter()
            .map(|(name, description)| ModuleInfo {
                name: name.to_string(),
                description: description.to_string(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::roster::{DeviceDescriptor, RosterError, RosterSource};
    use crate::sink::EventSink;
    use crate::supervisor::{FleetSupervisor, SupervisorSettings};
    use dmps_event::DecodedEvent;

    struct EmptyRoster;

    #[async_trait]
    impl RosterSource for EmptyRoster {
        fn describe(&self) -> String {
            "empty".to_string()
        }

        async fn fetch(&self) -> Result<Vec<DeviceDescriptor>, RosterError> {
            Ok(Vec::new())
        }
    }

    struct NullSink;

    #[async_trait]
    impl EventSink for NullSink {
        async fn forward(&self, _event: &DecodedEvent) {}
    }

    fn state(logging: Option<Arc<crate::logging::LoggingConfig>>) -> AppState {
        let supervisor = FleetSupervisor::new(
            Arc::new(EmptyRoster),
            Arc::new(NullSink),
            SupervisorSettings {
                roster_poll_interval: std::time::Duration::from_secs(15),
                timeouts: Default::default(),
                verbose_devices: Default::default(),
            },
        );
        AppState::new(Arc::new(supervisor), logging)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = create_router(state(None))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_status_before_first_generation() {
        let response = create_router(state(None))
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["generation"].is_null());
        assert_eq!(json["roster_source"], "empty");
        assert_eq!(json["active_handlers"], 0);
    }

    #[tokio::test]
    async fn test_update_logging() {
        let (logging, _layer) = crate::logging::detached();
        let router = create_router(state(Some(logging)));

        let response = router
            .clone()
            .oneshot(
                Request::put("/logging")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"filter":"dmps_monitor=trace"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["filter"], "dmps_monitor=trace");

        let response = router
            .oneshot(
                Request::put("/logging")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"filter":"dmps_monitor=loud"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_logging_unavailable() {
        let response = create_router(state(None))
            .oneshot(Request::get("/logging").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
