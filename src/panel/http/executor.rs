//! Authenticated request execution with one-shot session renewal.

use crate::panel::error::Error;
use crate::panel::session::{SessionState, SessionStore};
use crate::panel::{HTTP_CONNECT_TIMEOUT, HTTP_TIMEOUT};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

/// Request body sent to a panel.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded` fields, in order.
    Form(Vec<(String, String)>),
}

/// Status, headers and body of a panel response, read in full.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_str(&self.body).map_err(|e| {
            Error::Decode(format!(
                "{e} (HTTP {}, body: {})",
                self.status.as_u16(),
                truncate(&self.body, 200)
            ))
        })
    }

    /// `HTTP <code>: <body>` description for non-success responses.
    #[must_use]
    pub fn error_text(&self) -> String {
        format!("HTTP {}: {}", self.status.as_u16(), self.body)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Backend-specific authentication behaviour.
#[async_trait]
pub trait PanelAuth: Send + Sync {
    /// Short panel name used in errors and logs.
    fn panel(&self) -> &'static str;

    /// Log in and return the opaque session artifact.
    async fn login(&self, http: &reqwest::Client, base_url: &str) -> Result<String, Error>;

    /// Attach the session artifact to an outgoing request.
    fn attach(&self, request: RequestBuilder, credential: &str) -> RequestBuilder;

    /// Whether the panel rejected the request because the session is no longer valid.
    fn is_session_rejected(&self, response: &RawResponse) -> bool;
}

/// Issues authenticated calls against one panel.
///
/// The first call logs in. A call rejected as unauthenticated renews the
/// session once and is retried once; a second rejection is returned as
/// [`Error::SessionExpired`].
#[derive(Debug)]
pub struct RequestExecutor<A> {
    http: reqwest::Client,
    base_url: String,
    auth: A,
    session: SessionStore,
}

impl<A: PanelAuth> RequestExecutor<A> {
    /// Create an executor for the panel at `base_url`.
    pub fn new(base_url: impl Into<String>, auth: A, accept_invalid_certs: bool) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            session: SessionStore::new(),
        }
    }

    /// Panel base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn session_state(&self) -> SessionState {
        self.session.state().await
    }

    /// Execute `method path` with `payload`, logging in or renewing as needed.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: &Payload,
    ) -> Result<RawResponse, Error> {
        let ticket = self.session.current(|| self.login()).await?;
        let response = self.send(&method, path, payload, &ticket.credential).await?;
        if !self.auth.is_session_rejected(&response) {
            return Ok(response);
        }

        tracing::warn!(
            panel = self.auth.panel(),
            %method,
            path,
            "session rejected, logging in again"
        );
        let renewed = self.session.renew(&ticket, || self.login()).await?;
        let response = self.send(&method, path, payload, &renewed.credential).await?;
        if self.auth.is_session_rejected(&response) {
            self.session.invalidate(&renewed).await;
            return Err(Error::SessionExpired {
                panel: self.auth.panel(),
            });
        }
        Ok(response)
    }

    async fn login(&self) -> Result<String, Error> {
        tracing::debug!(panel = self.auth.panel(), "logging in");
        let credential = self.auth.login(&self.http, &self.base_url).await?;
        tracing::info!(panel = self.auth.panel(), "logged in to panel");
        Ok(credential)
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        payload: &Payload,
        credential: &str,
    ) -> Result<RawResponse, Error> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .auth
            .attach(self.http.request(method.clone(), &url), credential);

        request = match payload {
            Payload::Empty => request,
            Payload::Json(body) => request.json(body),
            Payload::Form(fields) => request.form(fields),
        };

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        tracing::debug!(%method, path, status = status.as_u16(), "panel response");

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
