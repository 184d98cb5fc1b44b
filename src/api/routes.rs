//! Request handlers for `/api/status` and `/api/history`.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::api::ApiState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub timerange: Option<String>,
}

/// Map a `timerange` query value onto a lookback window.
pub fn parse_timerange(value: &str) -> Option<chrono::Duration> {
    match value {
        "1h" => Some(chrono::Duration::hours(1)),
        "24h" => Some(chrono::Duration::hours(24)),
        "7d" => Some(chrono::Duration::days(7)),
        _ => None,
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

pub async fn get_status(State(state): State<Arc<ApiState>>) -> Response {
    match state.source.status_fields().await {
        Ok(fields) => Json(fields).into_response(),
        Err(e) => {
            error!("Error in /api/status: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn get_history(
    State(state): State<Arc<ApiState>>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let timerange = params.timerange.as_deref().unwrap_or("1h");
    let Some(window) = parse_timerange(timerange) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid timerange");
    };

    match state.store.query(window).await {
        Ok(samples) => Json(samples).into_response(),
        Err(e) => {
            error!("Error in /api/history: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use crate::error::SampleError;
    use crate::storage::{SqliteTelemetryStore, TelemetryStore};
    use crate::ups::{Snapshot, UpsSource};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct FixedSource(Option<BTreeMap<String, String>>);

    #[async_trait]
    impl UpsSource for FixedSource {
        async fn status_fields(&self) -> Result<BTreeMap<String, String>, SampleError> {
            self.0.clone().ok_or_else(|| SampleError::Timeout(5.0))
        }
    }

    fn snapshot(status: &str, charge: f64) -> Snapshot {
        Snapshot {
            status: status.to_string(),
            battery_charge_pct: charge,
            load_pct: 20.0,
            time_left_minutes: 35.5,
            line_voltage: 230.0,
            battery_voltage: 27.1,
        }
    }

    async fn app(source: FixedSource) -> (TempDir, Arc<SqliteTelemetryStore>, axum::Router) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteTelemetryStore::open(dir.path().join("ups_data.db")).unwrap());
        let state = ApiState { source: Arc::new(source), store: store.clone() };
        (dir, store, router(state))
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn known_timeranges() {
        assert_eq!(parse_timerange("1h"), Some(chrono::Duration::hours(1)));
        assert_eq!(parse_timerange("24h"), Some(chrono::Duration::hours(24)));
        assert_eq!(parse_timerange("7d"), Some(chrono::Duration::hours(168)));
        assert_eq!(parse_timerange("30d"), None);
    }

    #[tokio::test]
    async fn status_returns_raw_fields() {
        let fields: BTreeMap<String, String> =
            [("STATUS".to_string(), "ONLINE".to_string()), ("BCHARGE".to_string(), "100.0 Percent".to_string())]
                .into_iter()
                .collect();
        let (_dir, _store, app) = app(FixedSource(Some(fields))).await;

        let (status, body) = get(app, "/api/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["STATUS"], "ONLINE");
        assert_eq!(body["BCHARGE"], "100.0 Percent");
    }

    #[tokio::test]
    async fn status_reports_sampler_failure_as_500() {
        let (_dir, _store, app) = app(FixedSource(None)).await;

        let (status, body) = get(app, "/api/status").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("did not answer"));
    }

    #[tokio::test]
    async fn history_defaults_to_last_hour_newest_first() {
        let (_dir, store, app) = app(FixedSource(None)).await;
        let old = chrono::Utc::now() - chrono::Duration::hours(2);
        store.append(&snapshot("ONLINE", 100.0), Some(old)).await.unwrap();
        store.append(&snapshot("ONBATT", 80.0), None).await.unwrap();
        store.append(&snapshot("ONBATT", 70.0), None).await.unwrap();

        let (status, body) = get(app, "/api/history").await;

        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["battery_charge_pct"], 70.0);
        assert_eq!(rows[1]["status"], "ONBATT");
        assert!(rows[0]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn history_week_includes_older_samples() {
        let (_dir, store, app) = app(FixedSource(None)).await;
        let old = chrono::Utc::now() - chrono::Duration::hours(30);
        store.append(&snapshot("ONLINE", 100.0), Some(old)).await.unwrap();

        let (status, body) = get(app, "/api/history?timerange=7d").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_timerange_is_rejected() {
        let (_dir, _store, app) = app(FixedSource(None)).await;

        let (status, body) = get(app, "/api/history?timerange=invalid").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid timerange" }));
    }

    #[tokio::test]
    async fn malformed_query_is_a_json_400() {
        let (_dir, _store, app) = app(FixedSource(None)).await;

        let (status, body) = get(app, "/api/history?timerange=1h&timerange=24h").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("timerange"), "{}", body);
    }
}
