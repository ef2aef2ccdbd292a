//! HTTP-backed country detection.
//!
//! Asks an IP geolocation endpoint for the visitor's country code. The
//! endpoint is expected to answer with a bare ISO 3166-1 alpha-2 code as
//! plain text (`https://ipapi.co/country/` does). Any failure surfaces as a
//! `LookupError`; `order_roster` turns that into the default ordering.

use std::time::Duration;

use peerchat_core::roster::CountryLookup;
use peerchat_types::error::LookupError;
use tracing::debug;

/// Default geolocation endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://ipapi.co/country/";

/// Detection must never hold up startup for long.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct HttpCountryLookup {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpCountryLookup {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT, DEFAULT_TIMEOUT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("peerchat/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            endpoint: endpoint.into(),
            http,
        }
    }
}

impl Default for HttpCountryLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpCountryLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCountryLookup")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

fn request_error(e: reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Timeout
    } else {
        LookupError::Unavailable(e.to_string())
    }
}

/// Validate a plain-text response body as an alpha-2 country code.
fn parse_country_code(body: &str) -> Result<String, LookupError> {
    let code = body.trim();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(LookupError::InvalidResponse(format!(
            "expected a two-letter country code, got {:?}",
            code.chars().take(32).collect::<String>()
        )))
    }
}

impl CountryLookup for HttpCountryLookup {
    async fn detect_country(&self) -> Result<String, LookupError> {
        let response = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Unavailable(format!("HTTP {status}")));
        }

        let body = response.text().await.map_err(request_error)?;
        let code = parse_country_code(&body)?;
        debug!(country = %code, "detected visitor country");
        Ok(code)
    }
}
