//! Axum Router Configuration

use crate::{
    handlers,
    models::{ErrorResponse, SpeakPayload, SpeakResponse, StatusResponse},
    state::AppState,
};

use axum::{
    Router,
    http::{HeaderValue, header::ACCESS_CONTROL_ALLOW_ORIGIN},
    routing::post,
};
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::speak, handlers::preflight),
    components(schemas(SpeakPayload, SpeakResponse, StatusResponse, ErrorResponse)),
    tags(
        (name = "Robot Speech Bridge", description = "Relays text to the robot's speech process")
    )
)]
pub struct ApiDoc;

/// The OpenAPI description of the bridge, titled for this service.
pub fn openapi_document() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = "Robot Speech Bridge".to_string();
    doc.info.description =
        Some("Accepts text over HTTP and has the robot speak it.".to_string());
    doc
}

/// Creates the bridge router. Any origin may call it, and preflights are
/// answered by [`handlers::preflight`] itself.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(handlers::speak).options(handlers::preflight))
        .with_state(app_state)
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use tower::ServiceExt;

    #[cfg(unix)]
    fn app(dir: &std::path::Path) -> Router {
        use crate::forward::tests::{shell_device, test_config};
        create_router(Arc::new(AppState::new(test_config(dir, shell_device("true")))))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cross_origin_preflight_reaches_handler() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"status":"ok"}"#);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_every_response_allows_any_origin() {
        let dir = tempfile::tempdir().unwrap();
        for body in [r#"{"text":"hello"}"#, "{}"] {
            let response = app(dir.path())
                .oneshot(
                    Request::builder()
                        .method(Method::POST)
                        .uri("/")
                        .header("origin", "http://localhost:3000")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        }
    }

    #[test]
    fn test_openapi_documents_both_methods() {
        let doc = openapi_document();
        assert_eq!(doc.info.title, "Robot Speech Bridge");
        assert!(doc.components.as_ref().is_some_and(|c| c.schemas.contains_key("SpeakPayload")));
        let root = doc.paths.paths.get("/").expect("root path documented");
        assert!(root.post.is_some());
        assert!(root.options.is_some());
    }
}
