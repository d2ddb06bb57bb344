//! 3x-ui panel client.

use super::types::{
    ClientEntry, ClientSettings, Envelope, InboundConfiguration, InboundSummary, RawInbound,
};
use super::uri::{build_vless_uri, server_host};
use crate::config::PanelConfig;
use crate::panel::error::Error;
use crate::panel::http::{PanelAuth, Payload, RawResponse, RequestExecutor};
use crate::panel::types::{Credential, DataCap, Expiry, ProvisioningResult};
use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Method, RequestBuilder, StatusCode};
use uuid::Uuid;

const PANEL: &str = "3x-ui";
/// Cookie name 3x-ui uses for its session.
const SESSION_COOKIE: &str = "3x-ui";
const API_PREFIX: &str = "/panel/api/inbounds";

/// Cookie-session login against `POST /login`.
pub struct XuiAuth {
    username: String,
    password: String,
}

impl XuiAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for XuiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XuiAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Pick the session cookie out of `Set-Cookie` headers as `name=value`.
///
/// Prefers the `3x-ui` cookie and falls back to the first cookie set.
fn session_cookie(response: &RawResponse) -> Option<String> {
    let pairs: Vec<(&str, &str)> = response
        .headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(_, value)| !value.is_empty())
        .collect();

    pairs
        .iter()
        .find(|(name, _)| *name == SESSION_COOKIE)
        .or_else(|| pairs.first())
        .map(|(name, value)| format!("{name}={value}"))
}

#[async_trait]
impl PanelAuth for XuiAuth {
    fn panel(&self) -> &'static str {
        PANEL
    }

    async fn login(&self, http: &reqwest::Client, base_url: &str) -> Result<String, Error> {
        let response = http
            .post(format!("{base_url}/login"))
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?;

        let raw = RawResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.text().await?,
        };

        let envelope: Envelope<serde_json::Value> =
            raw.json().map_err(|e| Error::Authentication {
                panel: PANEL,
                reason: e.to_string(),
            })?;
        if !envelope.success {
            return Err(Error::Authentication {
                panel: PANEL,
                reason: envelope.failure_message(),
            });
        }

        session_cookie(&raw).ok_or_else(|| Error::Authentication {
            panel: PANEL,
            reason: "login succeeded but no session cookie was set".to_string(),
        })
    }

    fn attach(&self, request: RequestBuilder, credential: &str) -> RequestBuilder {
        request.header(COOKIE, credential)
    }

    /// 3x-ui has no structured "session expired" code in its envelope: a 401
    /// is checked first, then a best-effort match on "login" in the message.
    fn is_session_rejected(&self, response: &RawResponse) -> bool {
        if response.status == StatusCode::UNAUTHORIZED {
            return true;
        }
        serde_json::from_str::<Envelope<serde_json::Value>>(&response.body)
            .is_ok_and(|env| !env.success && env.msg.to_lowercase().contains("login"))
    }
}

/// Client for the 3x-ui inbound API.
#[derive(Debug)]
pub struct TunnelPanelClient {
    executor: RequestExecutor<XuiAuth>,
    server_host: String,
}

impl TunnelPanelClient {
    pub fn new(config: &PanelConfig) -> Result<Self, Error> {
        let server_host = server_host(&config.base_url)?;
        let auth = XuiAuth::new(&config.username, &config.password);
        Ok(Self {
            executor: RequestExecutor::new(&config.base_url, auth, config.accept_invalid_certs),
            server_host,
        })
    }

    /// Host that issued URIs point at.
    #[must_use]
    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    /// Create a client on `inbound_id` under a freshly generated UUID.
    ///
    /// `identity` is only the display label (the panel's `email` field).
    pub async fn create_credential(
        &self,
        identity: &str,
        data_cap: DataCap,
        expiry: Expiry,
        device_limit: u32,
        inbound_id: u32,
    ) -> ProvisioningResult {
        let client_id = Uuid::new_v4().to_string();
        self.add_client(&client_id, identity, data_cap, expiry, device_limit, inbound_id)
            .await
            .into()
    }

    async fn add_client(
        &self,
        client_id: &str,
        identity: &str,
        data_cap: DataCap,
        expiry: Expiry,
        device_limit: u32,
        inbound_id: u32,
    ) -> Result<Credential, Error> {
        let settings = ClientSettings {
            clients: vec![ClientEntry {
                id: client_id.to_string(),
                flow: String::new(),
                email: identity.to_string(),
                limit_ip: device_limit,
                total_gb: data_cap.as_bytes(),
                expiry_time: expiry.epoch_millis(),
                enable: true,
                tg_id: String::new(),
                sub_id: String::new(),
                reset: 0,
            }],
        };
        let payload = Payload::Form(vec![
            ("id".to_string(), inbound_id.to_string()),
            ("settings".to_string(), serde_json::to_string(&settings)?),
        ]);

        let response = self
            .executor
            .execute(Method::POST, &format!("{API_PREFIX}/addClient"), &payload)
            .await?;
        let envelope: Envelope<serde_json::Value> = response.json()?;
        if !envelope.success {
            tracing::warn!(identity, inbound_id, msg = %envelope.msg, "3x-ui rejected client");
            return Err(Error::Api(envelope.failure_message()));
        }

        tracing::info!(identity, inbound_id, client_id, "created 3x-ui client");
        Ok(Credential {
            id: client_id.to_string(),
            identity: identity.to_string(),
            subscription_url: None,
            connection_uris: Vec::new(),
        })
    }

    /// Fetch and decode one inbound. Never cached.
    pub async fn inbound(&self, inbound_id: u32) -> Result<InboundConfiguration, Error> {
        let response = self
            .executor
            .execute(Method::GET, &format!("{API_PREFIX}/get/{inbound_id}"), &Payload::Empty)
            .await?;
        let envelope: Envelope<RawInbound> = response.json()?;
        if !envelope.success {
            return Err(Error::Api(envelope.failure_message()));
        }
        let raw = envelope
            .obj
            .ok_or_else(|| Error::Decode(format!("inbound {inbound_id} missing from response")))?;
        InboundConfiguration::try_from(raw)
    }

    /// List all inbounds on the panel.
    pub async fn list_inbounds(&self) -> Result<Vec<InboundSummary>, Error> {
        let response = self
            .executor
            .execute(Method::GET, &format!("{API_PREFIX}/list"), &Payload::Empty)
            .await?;
        let envelope: Envelope<Vec<RawInbound>> = response.json()?;
        if !envelope.success {
            return Err(Error::Api(envelope.failure_message()));
        }
        Ok(envelope
            .obj
            .unwrap_or_default()
            .iter()
            .map(InboundSummary::from)
            .collect())
    }

    /// Build the share link for `credential_id` on `inbound_id`.
    ///
    /// Returns `None` when the inbound cannot be fetched or decoded; the
    /// credential itself is unaffected.
    pub async fn build_connection_uri(&self, credential_id: &str, inbound_id: u32) -> Option<String> {
        match self.inbound(inbound_id).await {
            Ok(inbound) => Some(build_vless_uri(credential_id, &self.server_host, &inbound)),
            Err(e) => {
                tracing::warn!(inbound_id, error = %e, "could not build connection URI");
                None
            }
        }
    }
}
