use std::time::Duration;

use reqwest::header;
use serde_json::Value;

pub const SMART_HOME_PATH: &str = "/api/alexa/smart_home";

const BODY_EXCERPT_MAX: usize = 256;

#[derive(Debug)]
pub enum ForwardError {
    EmptyBaseUrl,
    Timeout,
    Http(reqwest::Error),
    BadStatus(reqwest::StatusCode, String),
    InvalidResponse,
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::EmptyBaseUrl => write!(f, "downstream base URL is not configured"),
            ForwardError::Timeout => write!(f, "downstream request timed out"),
            ForwardError::Http(err) => write!(f, "downstream HTTP error: {}", err),
            ForwardError::BadStatus(status, excerpt) => {
                write!(f, "downstream returned status {}: {}", status, excerpt)
            }
            ForwardError::InvalidResponse => {
                write!(f, "downstream returned invalid JSON response")
            }
        }
    }
}

impl std::error::Error for ForwardError {}

impl From<reqwest::Error> for ForwardError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            ForwardError::Timeout
        } else {
            ForwardError::Http(value)
        }
    }
}

/// Outbound client for the Home Assistant smart-home endpoint.
///
/// One POST per directive, bounded by the configured timeout so a hung
/// downstream cannot outlive the caller's own deadline.
#[derive(Clone)]
pub struct HaClient {
    base_url: String,
    http: reqwest::Client,
}

impl HaClient {
    pub fn new(
        base_url: String,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, ForwardError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(ForwardError::Http)?;

        Ok(Self { base_url, http })
    }

    /// Forward the unmodified directive envelope with bearer auth.
    pub async fn forward(&self, directive: &Value, token: &str) -> Result<Value, ForwardError> {
        if self.base_url.trim().is_empty() {
            return Err(ForwardError::EmptyBaseUrl);
        }

        let url = self.smart_home_url();
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .json(directive)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ForwardError::BadStatus(status, excerpt(&body)));
        }

        resp.json::<Value>()
            .await
            .map_err(|_| ForwardError::InvalidResponse)
    }

    fn smart_home_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), SMART_HOME_PATH)
    }
}

fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_MAX {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT_MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
