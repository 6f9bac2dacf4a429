mod poll;
mod vote;

use axum::extract::Request;
use axum::http::{HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde_json::{json, Value};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use uuid::Uuid;

use crate::config::ConfigError;
use crate::db::PollStore;
use crate::error::PollError;
use crate::service::PollService;

/// Routes for the poll API, with request logging and the optional CORS policy.
pub fn router<S>(service: PollService<S>, cors_origins: &[String]) -> Result<Router, ConfigError>
where
    S: PollStore + 'static,
{
    let app = Router::new()
        .route("/api/poll", post(poll::create_handler::<S>))
        .route("/api/poll/:poll_id", get(poll::get_handler::<S>))
        .route(
            "/api/poll/:poll_id/submit-rankings",
            post(vote::submit_rankings_handler::<S>),
        )
        .route("/api/poll/:poll_id/end", post(poll::end_handler::<S>))
        .route("/api/poll/:poll_id/results", get(poll::results_handler::<S>))
        .route("/health", get(healthcheck))
        .with_state(service);

    let app = match cors_layer(cors_origins)? {
        Some(cors) => app.layer(cors),
        None => app,
    };

    Ok(app.layer(middleware::from_fn(log_request)))
}

fn cors_layer(origins: &[String]) -> Result<Option<CorsLayer>, ConfigError> {
    if origins.is_empty() {
        return Ok(None);
    }

    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidOrigin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Credentials rule out wildcards, so methods and headers are mirrored instead.
    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
    ))
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    if method != Method::OPTIONS {
        info!("{} {} -> {}", method, path, response.status().as_u16());
    }
    response
}

async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// Anything that is not a UUID cannot name a poll.
fn parse_poll_id(raw: &str) -> Result<Uuid, PollError> {
    Uuid::parse_str(raw).map_err(|_| PollError::poll_not_found(raw))
}
