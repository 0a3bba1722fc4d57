//! HTTP transport
//!
//! - `GET /api/cpv-codes?parent=CODE` lists direct children (roots without `parent`)
//! - `GET /api/cpv-codes/search?query=TEXT&language=de|fr|it|en` returns the match forest

use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use cpv_core::Error;
use cpv_core::api::codes::{self, ListCodesRequest, SearchCodesRequest};
use cpv_core::domain::taxonomy::{CpvCode, SearchResult, TaxonomyService};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Clone)]
struct AppState {
    service: TaxonomyService,
}

/// Build the API router over a taxonomy service
pub fn router(service: TaxonomyService) -> Router {
    Router::new()
        .route("/api/cpv-codes", get(list_codes))
        .route("/api/cpv-codes/search", get(search_codes))
        .with_state(AppState { service })
}

/// Serve the API until Ctrl-C
pub async fn serve(service: TaxonomyService, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Serving cpv API");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")
}

/// GET /api/cpv-codes
async fn list_codes(
    State(state): State<AppState>,
    Query(request): Query<ListCodesRequest>,
) -> Result<Json<Vec<CpvCode>>, ApiError> {
    Ok(Json(codes::list(&state.service, &request).await?))
}

/// GET /api/cpv-codes/search
async fn search_codes(
    State(state): State<AppState>,
    Query(request): Query<SearchCodesRequest>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    Ok(Json(codes::search(&state.service, &request).await?))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Core error rendered as a JSON response
#[derive(Debug)]
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::CodeNotFound(_) => StatusCode::NOT_FOUND,
            Error::SearchUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "Request failed");
        } else {
            warn!(code = self.0.code(), error = %self.0, "Request rejected");
        }

        let body = ErrorBody {
            error: self.0.code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use cpv_core::domain::taxonomy::{Language, Localized, NewCode};
    use cpv_core::storage::Database;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn test_app() -> (Router, Database) {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        let service = TaxonomyService::from_pool(db.pool().clone());
        service
            .import(vec![
                NewCode::new(
                    "A",
                    Localized::default()
                        .with(Language::De, "Bauarbeiten")
                        .with(Language::En, "Construction work"),
                    None,
                ),
                NewCode::new(
                    "A1",
                    Localized::default()
                        .with(Language::De, "Strassenbau")
                        .with(Language::En, "Road works"),
                    Some("A"),
                ),
            ])
            .await
            .unwrap();
        (router(service), db)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_list_roots_and_children() {
        let (app, _db) = test_app().await;

        let (status, body) = get_json(app.clone(), "/api/cpv-codes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["code"], "A");
        assert_eq!(body[0]["hasChildren"], true);
        assert!(body[0]["parentCode"].is_null());

        let (status, body) = get_json(app, "/api/cpv-codes?parent=A").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["code"], "A1");
        assert_eq!(body[0]["parentCode"], "A");
        assert_eq!(body[0]["label"]["en"], "Road works");
    }

    #[tokio::test]
    async fn test_search_returns_forest() {
        let (app, _db) = test_app().await;

        let (status, body) = get_json(app, "/api/cpv-codes/search?query=strassenbau&language=de").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["code"], "A");
        assert_eq!(body[0]["children"][0]["code"], "A1");
        assert!(body[0]["children"][0]["children"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_without_matches_is_empty_array() {
        let (app, _db) = test_app().await;

        let (status, body) = get_json(app, "/api/cpv-codes/search?query=zeppelin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_missing_query_is_bad_request() {
        let (app, _db) = test_app().await;

        let (status, body) = get_json(app.clone(), "/api/cpv-codes/search").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "E400");

        let (status, _) = get_json(app, "/api/cpv-codes/search?query=bau&language=xx").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_parent_is_not_found() {
        let (app, _db) = test_app().await;

        let (status, body) = get_json(app, "/api/cpv-codes?parent=NOPE").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "E401");
        assert!(body["message"].as_str().unwrap().contains("NOPE"));
    }

    #[test]
    fn test_status_mapping() {
        let status = |e: Error| ApiError(e).status();
        assert_eq!(status(Error::InvalidQuery("blank".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(Error::CodeNotFound("X".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(Error::SearchUnavailable("timeout".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(Error::PathIntegrity("cycle".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(Error::Decode("eof".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_closed_store_is_service_unavailable() {
        let (app, db) = test_app().await;
        db.close().await;

        let (status, body) = get_json(app, "/api/cpv-codes/search?query=road").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "E300");
    }
}
