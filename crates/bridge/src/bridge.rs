use std::time::Instant;

use habridge_contracts::{DirectiveEnvelope, ErrorKind, error_response};
use serde_json::Value;
use tracing::Instrument;

use crate::config::BridgeConfig;
use crate::forward::{ForwardError, HaClient};

/// Resolve the bearer credential for one directive: in-envelope locations in
/// priority order, then the debug-only fallback token.
pub fn extract_token<'a>(
    directive: &'a DirectiveEnvelope,
    config: &'a BridgeConfig,
) -> Option<&'a str> {
    directive
        .bearer_token()
        .or_else(|| config.debug_fallback_token())
}

/// Handle one directive end to end. Infallible at this boundary: every
/// failure is converted to a synthesized error envelope.
pub async fn handle_directive(config: &BridgeConfig, ha: &HaClient, raw: Value) -> Value {
    let directive = DirectiveEnvelope::new(raw);

    let span = tracing::info_span!(
        "directive",
        namespace = directive.namespace().unwrap_or("<missing>"),
        name = directive.name().unwrap_or("<missing>"),
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    async {
        let correlation = directive.correlation_token().map(|s| s.to_string());

        if config.debug {
            log_inbound_preview(&directive);
        }

        let Some(token) = extract_token(&directive, config) else {
            tracing::warn!("no usable bearer token found in directive");
            tracing::Span::current().record("outcome", "auth_error");
            crate::metrics::observe_directive("auth_error");
            return error_response(
                ErrorKind::InvalidAuthorizationCredential,
                "no usable bearer token found in directive",
                correlation.as_deref(),
            );
        };
        let token = token.to_string();

        if config.debug {
            let request_bytes = serde_json::to_vec(directive.as_value())
                .map(|body| body.len())
                .unwrap_or(0);
            tracing::debug!(
                authorization = "Bearer <redacted>",
                content_type = "application/json",
                user_agent = %config.user_agent,
                request_bytes,
                "forwarding directive downstream"
            );
        }

        let started = Instant::now();
        let result = ha.forward(directive.as_value(), &token).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        tracing::Span::current().record("latency_ms", latency_ms);

        match result {
            Ok(body) => {
                if config.debug {
                    tracing::debug!(latency_ms, "downstream round trip ok");
                }
                tracing::Span::current().record("outcome", "ok");
                crate::metrics::observe_forward("ok", started.elapsed());
                crate::metrics::observe_directive("ok");
                body
            }
            Err(err) => {
                // Full detail stays in the log; the caller only sees the
                // classified kind and a safe message.
                tracing::warn!(error = %err, latency_ms, "directive forwarding failed");
                tracing::Span::current().record("outcome", "error");
                crate::metrics::observe_forward("error", started.elapsed());
                let kind = classify(&err);
                crate::metrics::observe_directive(match kind {
                    ErrorKind::InvalidAuthorizationCredential => "auth_error",
                    ErrorKind::InternalError => "internal_error",
                });
                error_response(kind, safe_message(&err), correlation.as_deref())
            }
        }
    }
    .instrument(span)
    .await
}

fn classify(err: &ForwardError) -> ErrorKind {
    match err {
        ForwardError::BadStatus(status, _)
            if *status == reqwest::StatusCode::UNAUTHORIZED
                || *status == reqwest::StatusCode::FORBIDDEN =>
        {
            ErrorKind::InvalidAuthorizationCredential
        }
        _ => ErrorKind::InternalError,
    }
}

fn safe_message(err: &ForwardError) -> &'static str {
    match err {
        ForwardError::EmptyBaseUrl => "bridge is not configured with a downstream base URL",
        ForwardError::Timeout | ForwardError::Http(_) => "could not reach downstream service",
        ForwardError::BadStatus(status, _)
            if *status == reqwest::StatusCode::UNAUTHORIZED
                || *status == reqwest::StatusCode::FORBIDDEN =>
        {
            "downstream service rejected the bearer token"
        }
        ForwardError::BadStatus(_, _) => "downstream service returned an error status",
        ForwardError::InvalidResponse => "downstream service returned an unreadable response",
    }
}

fn log_inbound_preview(directive: &DirectiveEnvelope) {
    tracing::debug!(
        namespace = directive.namespace().unwrap_or("<missing>"),
        name = directive.name().unwrap_or("<missing>"),
        message_id = directive.message_id().unwrap_or("<missing>"),
        correlation_token = %directive
            .correlation_token()
            .map(truncate_token)
            .unwrap_or_else(|| "<missing>".to_string()),
        "inbound directive header"
    );
}

fn truncate_token(token: &str) -> String {
    const PREVIEW_CHARS: usize = 8;
    let preview: String = token.chars().take(PREVIEW_CHARS).collect();
    if token.chars().count() > PREVIEW_CHARS {
        format!("{}...", preview)
    } else {
        preview
    }
}
