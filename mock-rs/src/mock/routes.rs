//! HTTP surface of a mock engine
//!
//! Control routes are fixed and always present; every other request falls
//! through to the contract, matched against resource patterns in order.

use super::engine::MockEngine;
use crate::archive::TAR_CONTENT_TYPE;
use crate::errors::MockError;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Upload a tar archive of examples
pub const EXAMPLES_ROUTE: &str = "/_examples";

/// Arm an expectation for a case
pub const EXPECT_ROUTE: &str = "/_expect";

/// Read and reset the recording of a case
pub const RECORDINGS_ROUTE: &str = "/_recordings";

/// Ask the owning server to reload its examples
pub const RELOAD_ROUTE: &str = "/_reload";

/// Query parameter naming the case on control routes
pub const CASE_PARAM: &str = "case";

#[derive(Debug, Deserialize)]
struct CaseQuery {
    case: Option<String>,
}

impl CaseQuery {
    fn require(self) -> Result<String, MockError> {
        match self.case {
            Some(case) if !case.is_empty() => Ok(case),
            _ => Err(MockError::InvalidInput(format!(
                "casename required as query parameter '{}'",
                CASE_PARAM
            ))),
        }
    }
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.to_string()).into_response()
    }
}

/// Build the router for `engine`
pub fn build_router(engine: Arc<MockEngine>, max_upload_bytes: usize) -> Router {
    let mut router = Router::new()
        .route(EXAMPLES_ROUTE, post(upload_examples))
        .route(EXPECT_ROUTE, get(expect))
        .route(RECORDINGS_ROUTE, get(recordings));

    if engine.reload_handle().is_some() {
        router = router.route(RELOAD_ROUTE, post(reload));
    }

    router
        .fallback(dispatch)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(engine)
}

async fn upload_examples(
    State(engine): State<Arc<MockEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, MockError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    engine.upload_examples(content_type, body).await?;
    Ok(StatusCode::CREATED)
}

async fn expect(
    State(engine): State<Arc<MockEngine>>,
    Query(query): Query<CaseQuery>,
) -> Result<StatusCode, MockError> {
    let case = query.require()?;
    engine.arm_expectation(&case)?;
    Ok(StatusCode::OK)
}

async fn recordings(
    State(engine): State<Arc<MockEngine>>,
    Query(query): Query<CaseQuery>,
) -> Result<Response, MockError> {
    let case = query.require()?;
    let recording = engine.read_and_reset_recording(&case)?;
    Ok(Json(recording).into_response())
}

async fn reload(State(engine): State<Arc<MockEngine>>) -> Result<StatusCode, MockError> {
    let handle = engine
        .reload_handle()
        .ok_or_else(|| MockError::NotFound("reload is not available".to_string()))?;
    handle.reload()?;
    info!("Reload requested over {}", RELOAD_ROUTE);
    Ok(StatusCode::ACCEPTED)
}

async fn dispatch(State(engine): State<Arc<MockEngine>>, method: Method, uri: Uri) -> Response {
    let path = uri.path();
    let Some(resource) = engine.contract().match_path(path) else {
        return MockError::NotFound(format!("No resource matches '{}'", path)).into_response();
    };

    match engine.dispatch(resource.pattern(), &method) {
        Ok(pair) => pair.generate_response(),
        Err(err) => {
            warn!(%method, path, "{}", err);
            err.into_response()
        }
    }
}
