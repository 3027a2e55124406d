use std::time::Duration;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use habridge_contracts::{ErrorKind, error_response};
use serde_json::Value;

use crate::bridge;
use crate::config::{BridgeConfig, StartupError};
use crate::forward::HaClient;

#[derive(Clone)]
pub struct AppState {
    pub config: BridgeConfig,
    ha: HaClient,
}

pub fn router(config: BridgeConfig) -> Result<Router, StartupError> {
    let ha = HaClient::new(
        config.base_url.clone(),
        Duration::from_millis(config.forward_timeout_ms),
        &config.user_agent,
    )
    .map_err(|_| StartupError {
        code: "ERR_HTTP_CLIENT_INIT",
        message: "failed to initialize downstream HTTP client".to_string(),
    })?;

    if config.debug && config.fallback_token.is_some() {
        tracing::warn!(
            "debug fallback token is armed; directives without a token will \
             bypass account-linking authorization"
        );
    }

    let state = AppState { config, ha };

    Ok(Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/v1/directive", post(directive))
        .with_state(state))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// The directive surface always answers 200; failures ride inside the
/// response envelope.
async fn directive(
    State(state): State<AppState>,
    req: Result<Json<Value>, JsonRejection>,
) -> Json<Value> {
    let response = match req {
        Ok(Json(raw)) => bridge::handle_directive(&state.config, &state.ha, raw).await,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "rejecting malformed directive body");
            crate::metrics::observe_directive("bad_request");
            error_response(
                ErrorKind::InternalError,
                "request body is not a valid JSON directive",
                None,
            )
        }
    };

    crate::metrics::observe_http_request("/v1/directive", "POST", 200);
    Json(response)
}
