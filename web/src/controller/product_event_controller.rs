use serde::Deserialize;
use utoipa::ToSchema;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::controller::ApiResponse;
use crate::{AppState, Error};
use events::DomainEvent;
use log::*;
use service::config::ServerMode;

/// Request body for publishing a catalog change event.
///
/// This is the event-writer surface the mutation path (model layer, CSV
/// import) calls after a committed change; the product entity is carried
/// opaquely and forwarded as the SSE `data:` payload.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductEventRequest {
    /// One of `product.created`, `product.updated`, `product.deleted`,
    /// `product.restored`, `product.imported`.
    pub event: String,
    /// The product entity as it should appear on the wire.
    #[schema(value_type = Object)]
    pub product: Value,
}

fn domain_event(request: ProductEventRequest) -> Option<DomainEvent> {
    let product = request.product;
    match request.event.as_str() {
        "product.created" => Some(DomainEvent::ProductCreated { product }),
        "product.updated" => Some(DomainEvent::ProductUpdated { product }),
        "product.deleted" => Some(DomainEvent::ProductDeleted { product }),
        "product.restored" => Some(DomainEvent::ProductRestored { product }),
        "product.imported" => Some(DomainEvent::ProductImported { product }),
        _ => None,
    }
}

/// POST publish a catalog change event to the event log
#[utoipa::path(
    post,
    path = "/products/events",
    request_body = ProductEventRequest,
    responses(
        (status = 201, description = "Event appended to the catalog stream"),
        (status = 409, description = "This deployment does not own the catalog stream"),
        (status = 422, description = "Unprocessable Entity"),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn create(
    State(app_state): State<AppState>,
    Json(request): Json<ProductEventRequest>,
) -> Result<Response, Error> {
    debug!("POST publish catalog event: {}", request.event);

    // Only the data owner appends; proxy deployments mirror the upstream feed.
    if app_state.config.mode != ServerMode::Direct {
        return Ok((StatusCode::CONFLICT, "NOT THE CATALOG OWNER").into_response());
    }

    let Some(event) = domain_event(request) else {
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, "UNKNOWN EVENT NAME").into_response());
    };

    let entry_id = app_state.event_writer.publish(&event).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            StatusCode::CREATED.as_u16(),
            json!({"entry_id": entry_id, "event": event.event_name()}),
        )),
    )
        .into_response())
}
