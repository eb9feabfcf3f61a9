//! HTTP API for the collection daemon.
//!
//! Provides:
//! - `POST /render` - issue a page-render identity and page-load config
//! - `POST /collect` - form-encoded metric submission endpoint
//! - `GET /report` - aggregate averages as HTML
//! - `GET /report.json` - aggregate averages as JSON
//! - `GET /health` - basic daemon health check
//! - `GET /metrics` - Prometheus metrics export

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Form, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use wvl_common::{ACTION_LOG_TTFB, ACTION_LOG_WEBVITALS, CollectResponse, PageConfig};

use crate::metrics;
use crate::report;
use crate::storage::{Storage, SubmissionRow};

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Submission and render storage.
    pub storage: Arc<Storage>,
    /// Collection endpoint URL handed out in page-load configs.
    pub collect_url: String,
    /// Daemon version.
    pub version: &'static str,
    /// Daemon start time.
    pub started_at: Instant,
    /// Daemon PID.
    pub pid: u32,
}

/// Create the HTTP router for the daemon.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/render", post(render_handler))
        .route("/collect", post(collect_handler))
        .route("/report", get(report_handler))
        .route("/report.json", get(report_json_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(Arc::new(state))
}

#[derive(Debug, Deserialize)]
struct RenderQuery {
    /// Request path recorded with the render.
    path: Option<String>,
}

/// Handler for `POST /render` - issue a page-render identity.
///
/// The render row and its nonce are persisted before the response goes
/// out, so a submission echoing the identity always finds the mapping.
async fn render_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RenderQuery>,
) -> Response {
    let uuid = Uuid::new_v4().to_string();
    let nonce = new_nonce();
    let path = query.path.unwrap_or_else(|| "/".to_string());

    let persisted = state
        .storage
        .record_render(&uuid, &path)
        .and_then(|_| state.storage.record_nonce(&nonce));

    match persisted {
        Ok(()) => {
            metrics::RENDERS_ISSUED_TOTAL.inc();
            debug!(%uuid, %path, "page render issued");
            Json(PageConfig {
                collect_url: state.collect_url.clone(),
                nonce,
                page_render_uuid: Some(uuid),
            })
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, "failed to persist page render");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to issue page render" })),
            )
                .into_response()
        }
    }
}

/// Form fields accepted by the collection endpoint. Every schema version
/// is a subset of this set.
#[derive(Debug, Deserialize)]
struct CollectForm {
    #[serde(default)]
    action: String,
    #[serde(default)]
    nonce: String,
    ttfb: Option<f64>,
    lcp: Option<f64>,
    cls: Option<f64>,
    fcp: Option<f64>,
    inp: Option<f64>,
    #[serde(rename = "measurementSeconds")]
    measurement_seconds: Option<f64>,
    #[serde(rename = "userType", default)]
    user_type: String,
    #[serde(default)]
    url: String,
    #[serde(rename = "pageRenderUuid")]
    page_render_uuid: Option<String>,
}

/// Handler for `POST /collect` - persist one metric submission.
///
/// Application-level outcomes ride in the JSON discriminator, not the
/// status code; the client treats transport and application failures the
/// same way regardless.
async fn collect_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<CollectForm>,
) -> Json<CollectResponse> {
    Json(handle_collect(&state, &headers, form))
}

fn handle_collect(state: &AppState, headers: &HeaderMap, form: CollectForm) -> CollectResponse {
    if form.action != ACTION_LOG_WEBVITALS && form.action != ACTION_LOG_TTFB {
        metrics::SUBMISSIONS_REJECTED_TOTAL.inc();
        return CollectResponse::error("Unknown action.");
    }

    let nonce_known = match state.storage.nonce_is_known(&form.nonce) {
        Ok(known) => known,
        Err(e) => {
            warn!(error = %e, "nonce lookup failed");
            false
        }
    };
    if form.nonce.is_empty() || !nonce_known {
        metrics::SUBMISSIONS_REJECTED_TOTAL.inc();
        return CollectResponse::error("Invalid nonce.");
    }

    let Some(ttfb) = form.ttfb else {
        metrics::SUBMISSIONS_REJECTED_TOTAL.inc();
        return CollectResponse::error("Invalid data received.");
    };
    if form.url.is_empty() {
        metrics::SUBMISSIONS_REJECTED_TOTAL.inc();
        return CollectResponse::error("Invalid data received.");
    }

    // An unknown or absent correlation token stores an uncorrelated row,
    // never a rejection.
    let page_render_id = match &form.page_render_uuid {
        Some(uuid) => match state.storage.find_render(uuid) {
            Ok(found) => {
                if found.is_none() {
                    debug!(%uuid, "unknown page render token, storing uncorrelated");
                }
                found
            }
            Err(e) => {
                warn!(error = %e, "render lookup failed, storing uncorrelated");
                None
            }
        },
        None => None,
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let row = SubmissionRow {
        page_render_id,
        ttfb,
        lcp: form.lcp,
        cls: form.cls,
        fcp: form.fcp,
        inp: form.inp,
        measurement_seconds: form.measurement_seconds,
        user_type: form.user_type,
        url: form.url,
        user_agent,
    };

    match state.storage.insert_submission(&row) {
        Ok(id) => {
            metrics::SUBMISSIONS_STORED_TOTAL.inc();
            debug!(
                id,
                correlated = row.page_render_id.is_some(),
                "submission stored"
            );
            CollectResponse::ok("Performance data logged successfully.")
        }
        Err(e) => {
            warn!(error = %e, "failed to store submission");
            metrics::SUBMISSIONS_REJECTED_TOTAL.inc();
            CollectResponse::error(format!("Error logging performance data. {e}"))
        }
    }
}

/// Handler for `GET /report` - aggregate averages as HTML.
async fn report_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.storage.averages() {
        Ok(averages) => Html(report::render_html(&averages)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to compute averages: {e}"),
        )
            .into_response(),
    }
}

/// Handler for `GET /report.json` - aggregate averages as JSON.
async fn report_json_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.storage.averages() {
        Ok(averages) => Json(averages).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Handler for `GET /health` - basic daemon health check.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().as_secs();

    Json(json!({
        "status": "healthy",
        "version": state.version,
        "pid": state.pid,
        "uptime_seconds": uptime_secs,
    }))
}

/// Handler for `GET /metrics` - Prometheus metrics export.
async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            output,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

fn new_nonce() -> String {
    format!("{:016x}", fastrand::u64(..))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_test_state() -> (Arc<Storage>, AppState) {
        let storage = Arc::new(Storage::open_in_memory().expect("in-memory storage"));
        let state = AppState {
            storage: storage.clone(),
            collect_url: "http://127.0.0.1:8787/collect".to_string(),
            version: "0.4.0-test",
            started_at: Instant::now(),
            pid: 12345,
        };
        (storage, state)
    }

    fn form_encode(fields: &[(&str, &str)]) -> String {
        fn escape(value: &str) -> String {
            let mut out = String::new();
            for byte in value.bytes() {
                match byte {
                    b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                        out.push(byte as char)
                    }
                    other => out.push_str(&format!("%{:02X}", other)),
                }
            }
            out
        }
        fields
            .iter()
            .map(|(name, value)| format!("{}={}", escape(name), escape(value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn collect_request(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/collect")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::USER_AGENT, "Mozilla/5.0 (integration test)")
            .body(Body::from(body))
            .unwrap()
    }

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn valid_fields<'a>(nonce: &'a str, uuid: Option<&'a str>) -> Vec<(&'a str, &'a str)> {
        let mut fields = vec![
            ("lcp", "1500"),
            ("cls", "0.03"),
            ("ttfb", "170"),
            ("fcp", "800"),
            ("inp", "24"),
            ("measurementSeconds", "4.9"),
            ("action", "log_webvitals"),
            ("userType", "guest"),
            ("url", "https://example.com/post/42"),
            ("nonce", nonce),
        ];
        if let Some(uuid) = uuid {
            fields.push(("pageRenderUuid", uuid));
        }
        fields
    }

    #[tokio::test]
    async fn render_issues_identity_and_persists_it() {
        let (storage, state) = make_test_state();
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/render?path=/blog/post")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        let uuid = json["pageRenderUuid"].as_str().unwrap();
        let nonce = json["nonce"].as_str().unwrap();
        assert_eq!(json["collectUrl"], "http://127.0.0.1:8787/collect");

        // Mapping and nonce existed before the response was produced.
        let render_id = storage.find_render(uuid).unwrap().unwrap();
        assert_eq!(
            storage.render_path(render_id).unwrap(),
            Some("/blog/post".to_string())
        );
        assert!(storage.nonce_is_known(nonce).unwrap());
    }

    #[tokio::test]
    async fn collect_persists_a_correlated_submission() {
        let (storage, state) = make_test_state();
        let render_id = storage.record_render("uuid-1", "/post/42").unwrap();
        storage.record_nonce("nonce-1").unwrap();
        let router = create_router(state);

        let body = form_encode(&valid_fields("nonce-1", Some("uuid-1")));
        let response = router.oneshot(collect_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], "Performance data logged successfully.");

        let stored = storage.latest_submission().unwrap().unwrap();
        assert_eq!(stored.page_render_id, Some(render_id));
        assert_eq!(stored.ttfb, 170.0);
        assert_eq!(stored.lcp, Some(1500.0));
        assert_eq!(stored.user_type, "guest");
        assert_eq!(
            stored.user_agent,
            Some("Mozilla/5.0 (integration test)".to_string())
        );
    }

    #[tokio::test]
    async fn collect_rejects_missing_url_without_persisting() {
        let (storage, state) = make_test_state();
        storage.record_nonce("nonce-1").unwrap();
        let router = create_router(state);

        let body = form_encode(&[
            ("ttfb", "170"),
            ("action", "log_webvitals"),
            ("userType", "guest"),
            ("nonce", "nonce-1"),
        ]);
        let response = router.oneshot(collect_request(body)).await.unwrap();

        let json = response_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["data"], "Invalid data received.");
        assert_eq!(storage.submission_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn collect_rejects_missing_ttfb_without_persisting() {
        let (storage, state) = make_test_state();
        storage.record_nonce("nonce-1").unwrap();
        let router = create_router(state);

        let body = form_encode(&[
            ("action", "log_webvitals"),
            ("userType", "guest"),
            ("url", "https://example.com/"),
            ("nonce", "nonce-1"),
        ]);
        let response = router.oneshot(collect_request(body)).await.unwrap();

        let json = response_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["data"], "Invalid data received.");
        assert_eq!(storage.submission_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn collect_rejects_unissued_nonce() {
        let (storage, state) = make_test_state();
        let router = create_router(state);

        let body = form_encode(&valid_fields("never-issued", None));
        let response = router.oneshot(collect_request(body)).await.unwrap();

        let json = response_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["data"], "Invalid nonce.");
        assert_eq!(storage.submission_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn collect_rejects_unknown_action() {
        let (storage, state) = make_test_state();
        storage.record_nonce("nonce-1").unwrap();
        let router = create_router(state);

        let body = form_encode(&[
            ("ttfb", "170"),
            ("action", "log_something_else"),
            ("url", "https://example.com/"),
            ("nonce", "nonce-1"),
        ]);
        let response = router.oneshot(collect_request(body)).await.unwrap();

        let json = response_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["data"], "Unknown action.");
    }

    #[tokio::test]
    async fn unknown_render_token_stores_uncorrelated_row() {
        let (storage, state) = make_test_state();
        storage.record_nonce("nonce-1").unwrap();
        let router = create_router(state);

        let body = form_encode(&valid_fields("nonce-1", Some("never-issued-uuid")));
        let response = router.oneshot(collect_request(body)).await.unwrap();

        let json = response_json(response).await;
        assert_eq!(json["success"], true);

        let stored = storage.latest_submission().unwrap().unwrap();
        assert_eq!(stored.page_render_id, None);
    }

    #[tokio::test]
    async fn legacy_ttfb_action_is_accepted() {
        let (storage, state) = make_test_state();
        storage.record_nonce("nonce-1").unwrap();
        let router = create_router(state);

        let body = form_encode(&[
            ("ttfb", "230"),
            ("action", "log_ttfb"),
            ("userType", "logged_in"),
            ("url", "https://example.com/legacy"),
            ("nonce", "nonce-1"),
        ]);
        let response = router.oneshot(collect_request(body)).await.unwrap();

        let json = response_json(response).await;
        assert_eq!(json["success"], true);

        let stored = storage.latest_submission().unwrap().unwrap();
        assert_eq!(stored.ttfb, 230.0);
        assert_eq!(stored.lcp, None);
        assert_eq!(stored.user_type, "logged_in");
    }

    #[tokio::test]
    async fn report_json_exposes_averages() {
        let (storage, state) = make_test_state();
        storage.record_nonce("nonce-1").unwrap();
        let router = create_router(state);

        for (ttfb, lcp) in [("100", "1000"), ("300", "2000")] {
            let body = form_encode(&[
                ("lcp", lcp),
                ("cls", "0.02"),
                ("ttfb", ttfb),
                ("fcp", "800"),
                ("inp", "0"),
                ("measurementSeconds", "5"),
                ("action", "log_webvitals"),
                ("userType", "guest"),
                ("url", "https://example.com/"),
                ("nonce", "nonce-1"),
            ]);
            let response = router.clone().oneshot(collect_request(body)).await.unwrap();
            assert_eq!(response_json(response).await["success"], true);
        }

        let response = router
            .oneshot(Request::builder().uri("/report.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = response_json(response).await;
        assert_eq!(json["samples"], 2);
        assert_eq!(json["ttfb"], 200.0);
        assert_eq!(json["lcp"], 1500.0);
    }

    #[tokio::test]
    async fn report_html_shows_empty_state() {
        let (_storage, state) = make_test_state();
        let router = create_router(state);

        let response = router
            .oneshot(Request::builder().uri("/report").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("Web Vitals Averages"));
        assert!(html.contains("No data available."));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_storage, state) = make_test_state();
        let router = create_router(state);

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], "0.4.0-test");
        assert_eq!(json["pid"], 12345);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        // Register metrics first
        let _ = metrics::register_metrics();

        let (_storage, state) = make_test_state();
        let router = create_router(state);

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("# HELP") || text.is_empty());
    }
}
