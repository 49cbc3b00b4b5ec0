//! HTTP surface over [`ClassificationService`].

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::api::{ClassifyRequest, ClassifyResponse, ErrorBody, HealthResponse, ServiceMetadata};
use crate::service::{ClassificationService, ServiceError};

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { detail: self.to_string() })).into_response()
    }
}

/// Builds the router: `GET /`, `GET /health`, `POST /classify`, with permissive CORS.
pub fn router(service: Arc<ClassificationService>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/classify", post(classify))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Serves `service` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, service: Arc<ClassificationService>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn root(State(service): State<Arc<ClassificationService>>) -> Json<ServiceMetadata> {
    Json(service.metadata())
}

async fn health(State(service): State<Arc<ClassificationService>>) -> Json<HealthResponse> {
    Json(service.health().into())
}

async fn classify(
    State(service): State<Arc<ClassificationService>>,
    payload: Result<Json<ClassifyRequest>, JsonRejection>,
) -> Result<Json<ClassifyResponse>, ServiceError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected classify request: {}", rejection.body_text());
        ServiceError::Validation(rejection.body_text())
    })?;
    service.classify(request).await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::test_support::{fixture_predictor, predictor_with, FixedLogitsBackend};
    use crate::service::ServiceConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn ready_router() -> Router {
        let service =
            ClassificationService::with_predictor(Arc::new(fixture_predictor()), ServiceConfig::default())
                .unwrap();
        router(Arc::new(service))
    }

    fn classify_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/classify")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_classify_ok() {
        let response = ready_router()
            .oneshot(classify_request(r#"{"text": "great product", "top_k": 1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["text"], "great product");
        assert_eq!(body["predictions"][0]["label"], "positive");
    }

    #[tokio::test]
    async fn test_unready_is_503() {
        let app = router(Arc::new(ClassificationService::new(ServiceConfig::default())));
        let response = app
            .oneshot(classify_request(r#"{"text": "great"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["detail"], "Model is not loaded");
    }

    #[tokio::test]
    async fn test_invalid_body_is_422() {
        let response = ready_router()
            .oneshot(classify_request(r#"{"text": "great", "top_k": 42}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = ready_router()
            .oneshot(classify_request(r#"{"top_k": 2}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_non_finite_scores_are_500() {
        let predictor = predictor_with(Arc::new(FixedLogitsBackend(vec![0.0, f32::INFINITY, 1.0])));
        let service = ClassificationService::with_predictor(Arc::new(predictor), ServiceConfig::default()).unwrap();
        let response = router(Arc::new(service))
            .oneshot(classify_request(r#"{"text": "great product", "top_k": 1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = json_body(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.contains("non-finite"), "unexpected detail: {}", detail);
    }

    #[tokio::test]
    async fn test_health_and_root() {
        let app = router(Arc::new(ClassificationService::new(ServiceConfig::default())));
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], false);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["health"], "/health");
    }
}
