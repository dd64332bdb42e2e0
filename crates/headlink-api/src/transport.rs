// HTTP transport for outbound action calls.
//
// Button mappings of kind `api_call` hit arbitrary HTTP endpoints. This
// module owns the reqwest client construction (TLS, timeout, user agent)
// and the single request shape those actions need.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::error::Error;

const USER_AGENT: &str = concat!("headlink/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode for outbound calls.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (internal endpoints with self-signed certs).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

/// Method used by an `api_call` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMethod {
    Get,
    Post,
}

impl CallMethod {
    /// Case-insensitive parse. An empty method means GET; anything other
    /// than GET or POST is rejected.
    pub fn parse(method: &str) -> Option<Self> {
        if method.is_empty() || method.eq_ignore_ascii_case("GET") {
            Some(Self::Get)
        } else if method.eq_ignore_ascii_case("POST") {
            Some(Self::Post)
        } else {
            None
        }
    }
}

/// Thin client for action HTTP calls.
#[derive(Debug, Clone)]
pub struct ActionHttpClient {
    http: reqwest::Client,
}

impl ActionHttpClient {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
        })
    }

    /// Issue the request and return the response status code.
    ///
    /// POST sends `body` verbatim as `application/json`. GET ignores it.
    /// Status handling is left to the caller.
    pub async fn call(&self, method: CallMethod, url: &str, body: &str) -> Result<u16, Error> {
        let url = Url::parse(url)?;
        let request = match method {
            CallMethod::Get => self.http.request(Method::GET, url),
            CallMethod::Post => self
                .http
                .request(Method::POST, url)
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_owned()),
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        tracing::debug!(status, "Action HTTP call completed");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse() {
        assert_eq!(CallMethod::parse("POST"), Some(CallMethod::Post));
        assert_eq!(CallMethod::parse("post"), Some(CallMethod::Post));
        assert_eq!(CallMethod::parse("get"), Some(CallMethod::Get));
        assert_eq!(CallMethod::parse(""), Some(CallMethod::Get));
        assert_eq!(CallMethod::parse("DELETE"), None);
    }

    #[test]
    fn missing_ca_file_is_tls_error() {
        let config = TransportConfig {
            tls: TlsMode::CustomCa(PathBuf::from("/nonexistent/ca.pem")),
            ..TransportConfig::default()
        };
        assert!(matches!(config.build_client(), Err(Error::Tls(_))));
    }
}
