use serde_json::{Value, json};
use ulid::Ulid;

/// Error kinds the bridge reports in a synthesized response envelope.
///
/// `InvalidAuthorizationCredential` tells the caller to prompt for
/// re-authorization; everything else collapses to `InternalError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidAuthorizationCredential,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidAuthorizationCredential => "INVALID_AUTHORIZATION_CREDENTIAL",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// A smart-home directive envelope.
///
/// The document is opaque pass-through data except for the handful of paths
/// the bridge reads: the header fields and the possible token locations.
/// Every accessor returns `None` when any key along its path is absent or the
/// leaf is not a non-empty string.
#[derive(Debug, Clone)]
pub struct DirectiveEnvelope {
    value: Value,
}

impl DirectiveEnvelope {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    fn str_at(&self, path: &[&str]) -> Option<&str> {
        let mut node = &self.value;
        for key in path {
            node = node.get(key)?;
        }
        node.as_str().filter(|s| !s.is_empty())
    }

    pub fn endpoint_scope_token(&self) -> Option<&str> {
        self.str_at(&["directive", "endpoint", "scope", "token"])
    }

    pub fn payload_scope_token(&self) -> Option<&str> {
        self.str_at(&["directive", "payload", "scope", "token"])
    }

    pub fn grantee_token(&self) -> Option<&str> {
        self.str_at(&["directive", "payload", "grantee", "token"])
    }

    /// First in-envelope token location holding a non-empty string, in
    /// priority order: endpoint scope, payload scope, payload grantee.
    pub fn bearer_token(&self) -> Option<&str> {
        self.endpoint_scope_token()
            .or_else(|| self.payload_scope_token())
            .or_else(|| self.grantee_token())
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str_at(&["directive", "header", "namespace"])
    }

    pub fn name(&self) -> Option<&str> {
        self.str_at(&["directive", "header", "name"])
    }

    pub fn message_id(&self) -> Option<&str> {
        self.str_at(&["directive", "header", "messageId"])
    }

    pub fn correlation_token(&self) -> Option<&str> {
        self.str_at(&["directive", "header", "correlationToken"])
    }
}

/// Synthesize an Alexa `ErrorResponse` envelope.
///
/// Fresh message id per response; the inbound correlation token is copied
/// through when the caller could locate one.
pub fn error_response(kind: ErrorKind, message: &str, correlation_token: Option<&str>) -> Value {
    let mut header = json!({
        "namespace": "Alexa",
        "name": "ErrorResponse",
        "payloadVersion": "3",
        "messageId": Ulid::new().to_string(),
    });
    if let Some(token) = correlation_token {
        header["correlationToken"] = Value::String(token.to_string());
    }

    json!({
        "event": {
            "header": header,
            "payload": {
                "type": kind.as_str(),
                "message": message,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive_with(extra: Value) -> DirectiveEnvelope {
        let mut value = json!({
            "directive": {
                "header": {
                    "namespace": "Alexa.PowerController",
                    "name": "TurnOn",
                    "messageId": "msg-1",
                    "correlationToken": "ct-42"
                }
            }
        });
        if let Some(obj) = extra.as_object() {
            for (key, val) in obj {
                value["directive"][key] = val.clone();
            }
        }
        DirectiveEnvelope::new(value)
    }

    #[test]
    fn endpoint_scope_token_wins_over_lower_priority_locations() {
        let directive = directive_with(json!({
            "endpoint": { "scope": { "token": "endpoint-token" } },
            "payload": {
                "scope": { "token": "payload-token" },
                "grantee": { "token": "grantee-token" }
            }
        }));
        assert_eq!(directive.bearer_token(), Some("endpoint-token"));
    }

    #[test]
    fn payload_scope_token_used_when_endpoint_scope_absent() {
        let directive = directive_with(json!({
            "payload": {
                "scope": { "token": "payload-token" },
                "grantee": { "token": "grantee-token" }
            }
        }));
        assert_eq!(directive.bearer_token(), Some("payload-token"));
    }

    #[test]
    fn grantee_token_used_when_both_scopes_absent() {
        let directive = directive_with(json!({
            "payload": { "grantee": { "token": "grantee-token" } }
        }));
        assert_eq!(directive.bearer_token(), Some("grantee-token"));
    }

    #[test]
    fn empty_string_token_does_not_count_as_found() {
        let directive = directive_with(json!({
            "endpoint": { "scope": { "token": "" } },
            "payload": { "scope": { "token": "payload-token" } }
        }));
        assert_eq!(directive.bearer_token(), Some("payload-token"));
    }

    #[test]
    fn missing_keys_at_any_depth_yield_none() {
        let directive = DirectiveEnvelope::new(json!({ "directive": {} }));
        assert_eq!(directive.bearer_token(), None);
        assert_eq!(directive.namespace(), None);
        assert_eq!(directive.correlation_token(), None);

        let not_an_object = DirectiveEnvelope::new(json!("just a string"));
        assert_eq!(not_an_object.bearer_token(), None);
    }

    #[test]
    fn non_string_token_yields_none() {
        let directive = directive_with(json!({
            "endpoint": { "scope": { "token": 12345 } }
        }));
        assert_eq!(directive.bearer_token(), None);
    }

    #[test]
    fn header_accessors_read_inbound_header() {
        let directive = directive_with(json!({}));
        assert_eq!(directive.namespace(), Some("Alexa.PowerController"));
        assert_eq!(directive.name(), Some("TurnOn"));
        assert_eq!(directive.message_id(), Some("msg-1"));
        assert_eq!(directive.correlation_token(), Some("ct-42"));
    }

    #[test]
    fn error_response_carries_fixed_header_and_payload() {
        let response = error_response(ErrorKind::InternalError, "boom", Some("ct-42"));

        let header = &response["event"]["header"];
        assert_eq!(header["namespace"], "Alexa");
        assert_eq!(header["name"], "ErrorResponse");
        assert_eq!(header["payloadVersion"], "3");
        assert_eq!(header["correlationToken"], "ct-42");
        assert!(
            header["messageId"]
                .as_str()
                .is_some_and(|id| !id.is_empty())
        );

        let payload = &response["event"]["payload"];
        assert_eq!(payload["type"], "INTERNAL_ERROR");
        assert_eq!(payload["message"], "boom");
    }

    #[test]
    fn error_response_omits_correlation_token_when_unavailable() {
        let response = error_response(
            ErrorKind::InvalidAuthorizationCredential,
            "no usable bearer token",
            None,
        );

        let header = &response["event"]["header"];
        assert!(header.get("correlationToken").is_none());
        assert_eq!(
            response["event"]["payload"]["type"],
            "INVALID_AUTHORIZATION_CREDENTIAL"
        );
    }

    #[test]
    fn error_responses_generate_distinct_message_ids() {
        let first = error_response(ErrorKind::InternalError, "a", None);
        let second = error_response(ErrorKind::InternalError, "b", None);
        assert_ne!(
            first["event"]["header"]["messageId"],
            second["event"]["header"]["messageId"]
        );
    }
}
