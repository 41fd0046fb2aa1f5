//! HTTP client for CalDAV operations.
//!
//! Wraps `reqwest` with the pieces CalDAV needs: PROPFIND/REPORT methods
//! with `Depth` headers, PUT for event upload, and a 401 retry path that
//! negotiates Digest or Basic authentication.

use reqwest::{Client, Method, Response, StatusCode};
use tracing::{debug, trace, warn};

use crate::error::{CalDavError, CalDavResult};

use super::auth::{DigestAuth, basic_auth};
use super::config::CalDavConfig;

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
const ICS_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

/// HTTP client for CalDAV operations.
pub struct CalDavClient {
    client: Client,
    config: CalDavConfig,
    /// Digest auth state, cached once the server has challenged us.
    digest_auth: Option<DigestAuth>,
}

impl CalDavClient {
    /// Creates a new client from the given configuration.
    pub fn new(config: CalDavConfig) -> CalDavResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                CalDavError::network(format!("failed to create HTTP client: {}", e)).with_source(e)
            })?;

        Ok(Self {
            client,
            config,
            digest_auth: None,
        })
    }

    /// Performs a PROPFIND request (calendar discovery, property lookup).
    pub async fn propfind(&mut self, url: &str, body: &str, depth: u8) -> CalDavResult<String> {
        self.request("PROPFIND", url, Some(body), XML_CONTENT_TYPE, Some(depth))
            .await
    }

    /// Performs a REPORT request (calendar-query).
    pub async fn report(&mut self, url: &str, body: &str) -> CalDavResult<String> {
        self.request("REPORT", url, Some(body), XML_CONTENT_TYPE, Some(1))
            .await
    }

    /// Uploads an iCalendar object to the given resource URL.
    ///
    /// Sends `If-None-Match: *` so an existing resource is never
    /// overwritten by a freshly generated UID.
    pub async fn put_ics(&mut self, url: &str, ics: &str) -> CalDavResult<String> {
        self.request("PUT", url, Some(ics), ICS_CONTENT_TYPE, None)
            .await
    }

    /// Performs an HTTP request, retrying once with authentication if the
    /// server challenges.
    async fn request(
        &mut self,
        method: &str,
        url: &str,
        body: Option<&str>,
        content_type: &str,
        depth: Option<u8>,
    ) -> CalDavResult<String> {
        let response = self
            .send(method, url, body, content_type, depth, false)
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let www_auth = response
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            let Some(challenge) = www_auth else {
                return Err(CalDavError::authentication(
                    "server rejected request without an authentication challenge",
                ));
            };

            debug!("received 401, negotiating authentication");

            if challenge.starts_with("Digest ") {
                self.digest_auth = DigestAuth::parse(&challenge);
            }

            if self.digest_auth.is_none() && !challenge.contains("Basic")
                && !self.config.has_credentials()
            {
                return Err(CalDavError::authentication(
                    "server requires authentication but no usable method was offered",
                ));
            }

            let response = self
                .send(method, url, body, content_type, depth, true)
                .await?;
            return self.read_response(response).await;
        }

        self.read_response(response).await
    }

    /// Sends a single request, optionally with an Authorization header.
    async fn send(
        &mut self,
        method: &str,
        url: &str,
        body: Option<&str>,
        content_type: &str,
        depth: Option<u8>,
        authenticated: bool,
    ) -> CalDavResult<Response> {
        let http_method = Method::from_bytes(method.as_bytes())
            .map_err(|_| CalDavError::invalid_response(format!("invalid HTTP method: {}", method)))?;

        let mut request = self.client.request(http_method, url);

        if body.is_some() {
            request = request.header("Content-Type", content_type);
        }
        if let Some(d) = depth {
            request = request.header("Depth", d.to_string());
        }
        if method == "PUT" {
            request = request.header("If-None-Match", "*");
        }

        if authenticated {
            let (username, password) = match (&self.config.username, &self.config.password) {
                (Some(u), Some(p)) => (u.clone(), p.clone()),
                _ => {
                    return Err(CalDavError::authentication(
                        "credentials required but not configured",
                    ));
                }
            };

            let uri_path = url::Url::parse(url)
                .map(|u| u.path().to_string())
                .unwrap_or_else(|_| url.to_string());

            let auth_header = if let Some(ref mut digest) = self.digest_auth {
                digest.authorize(method, &uri_path, &username, &password)
            } else {
                basic_auth(&username, &password)
            };
            request = request.header("Authorization", auth_header);
        }

        if let Some(b) = body {
            request = request.body(b.to_string());
        }

        trace!(method = %method, url = %url, authenticated, "sending request");

        request
            .send()
            .await
            .map_err(|e| CalDavError::network(format!("request failed: {}", e)).with_source(e))
    }

    /// Maps the response status to an error class and extracts the body.
    async fn read_response(&self, response: Response) -> CalDavResult<String> {
        let status = response.status();
        trace!(status = %status, "received response");

        match status {
            StatusCode::OK
            | StatusCode::CREATED
            | StatusCode::NO_CONTENT
            | StatusCode::MULTI_STATUS => response.text().await.map_err(|e| {
                CalDavError::network(format!("failed to read response: {}", e)).with_source(e)
            }),
            StatusCode::UNAUTHORIZED => Err(CalDavError::authentication(
                "authentication failed: invalid credentials",
            )),
            StatusCode::FORBIDDEN => Err(CalDavError::authentication(
                "access denied by the server",
            )),
            StatusCode::NOT_FOUND => Err(CalDavError::not_found("calendar or resource not found")),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(CalDavError::rate_limited("too many requests to server"))
            }
            s if s.is_server_error() => {
                let body = response.text().await.unwrap_or_default();
                Err(CalDavError::server(format!("server error ({}): {}", s, body)))
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %s, body = %body, "unexpected response status");
                Err(CalDavError::invalid_response(format!(
                    "unexpected status {}: {}",
                    s, body
                )))
            }
        }
    }

    /// Returns the base URL from the configuration.
    pub fn base_url(&self) -> &url::Url {
        &self.config.url
    }
}
