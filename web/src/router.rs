use crate::{
    controller::{health_check_controller, product_event_controller},
    sse, AppState,
};
use axum::http::{header, HeaderValue, Method};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
// The SSE endpoint itself is a long-lived streaming response and is
// documented on the crate instead.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Catalog Sync API"
        ),
        paths(
            health_check_controller::health_check,
            product_event_controller::create,
        ),
        components(
            schemas(
                product_event_controller::ProductEventRequest,
            )
        ),
        tags(
            (name = "catalog_sync", description = "Product Catalog Sync & Event Streaming API")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(product_event_routes(app_state.clone()))
        .merge(sse_routes(app_state.clone()))
        .merge(RapiDoc::with_openapi("/api-docs/openapi2.json", ApiDoc::openapi()).path("/rapidoc"))
        .layer(cors_layer(&app_state))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn product_event_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/products/events", post(product_event_controller::create))
        .with_state(app_state)
}

fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/sse/events", get(sse::handler::events))
        .with_state(app_state)
}

fn cors_layer(app_state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = app_state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::sse::ShutdownHandle;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use clap::Parser;
    use events::{EventLog, MemoryEventLog};
    use service::config::{Config, ServerMode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(mode: ServerMode) -> (AppState, Arc<MemoryEventLog>) {
        let mut config = Config::try_parse_from(["catalog-sync-test"]).unwrap();
        config.mode = mode;
        let log = Arc::new(MemoryEventLog::new());
        let state = AppState::new(
            config,
            log.clone() as Arc<dyn EventLog>,
            Arc::new(ShutdownHandle::new()),
        );
        (state, log)
    }

    #[tokio::test]
    async fn health_check_responds_ok() {
        let (state, _log) = test_state(ServerMode::Direct);
        let app = define_routes(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"healthy");
    }

    #[tokio::test]
    async fn sse_endpoint_sets_streaming_headers() {
        let (state, _log) = test_state(ServerMode::Direct);
        let app = define_routes(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/sse/events")
                    .header("user-agent", "router-test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["content-type"], "text/event-stream");
        assert_eq!(headers["cache-control"], "no-cache");
        assert_eq!(headers["x-accel-buffering"], "no");
    }

    #[tokio::test]
    async fn publishing_an_event_appends_to_the_log() {
        let (state, log) = test_state(ServerMode::Direct);
        let app = define_routes(state);

        let body = serde_json::json!({
            "event": "product.updated",
            "product": {"id": 42, "price": "19.99"}
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/products/events")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(log.len("catalog-events"), 1);
    }

    #[tokio::test]
    async fn proxy_mode_refuses_event_publication() {
        let (state, log) = test_state(ServerMode::Proxy);
        let app = define_routes(state);

        let body = serde_json::json!({
            "event": "product.created",
            "product": {"id": 1}
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/products/events")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(log.is_empty("catalog-events"));
    }

    #[tokio::test]
    async fn unknown_event_name_is_unprocessable() {
        let (state, log) = test_state(ServerMode::Direct);
        let app = define_routes(state);

        let body = serde_json::json!({
            "event": "product.materialized",
            "product": {"id": 1}
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/products/events")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(log.is_empty("catalog-events"));
    }
}
