//! Marzban panel client.

use super::types::{ProtocolCatalog, ProxyConfiguration, UserCreate, UserInfo};
use crate::config::PanelConfig;
use crate::panel::error::{Error, FailureKind, format_api_error};
use crate::panel::http::{PanelAuth, Payload, RawResponse, RequestExecutor};
use crate::panel::types::{Credential, DataCap, Expiry, ProvisioningResult};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;

const PANEL: &str = "marzban";
const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;

/// Bearer-token login against `POST /api/admin/token`.
pub struct MarzbanAuth {
    username: String,
    password: String,
}

impl MarzbanAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for MarzbanAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarzbanAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl PanelAuth for MarzbanAuth {
    fn panel(&self) -> &'static str {
        PANEL
    }

    async fn login(&self, http: &reqwest::Client, base_url: &str) -> Result<String, Error> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: Option<String>,
        }

        let response = http
            .post(format!("{base_url}/api/admin/token"))
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
                ("grant_type", "password"),
            ])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status != StatusCode::OK {
            return Err(Error::Authentication {
                panel: PANEL,
                reason: format!("HTTP {}: {text}", status.as_u16()),
            });
        }

        let token: TokenResponse = serde_json::from_str(&text).map_err(|e| Error::Authentication {
            panel: PANEL,
            reason: format!("unreadable token response: {e}"),
        })?;
        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Authentication {
                panel: PANEL,
                reason: "token response has no access_token".to_string(),
            })
    }

    fn attach(&self, request: RequestBuilder, credential: &str) -> RequestBuilder {
        request.bearer_auth(credential)
    }

    fn is_session_rejected(&self, response: &RawResponse) -> bool {
        response.status == StatusCode::UNAUTHORIZED
    }
}

/// Check a Marzban username: 3 to 32 characters of `a-z`, `0-9` and `_`.
pub fn validate_username(username: &str) -> Result<(), Error> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(Error::Validation(format!(
            "username '{username}' must be {USERNAME_MIN}-{USERNAME_MAX} characters"
        )));
    }
    if let Some(c) = username
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_'))
    {
        return Err(Error::Validation(format!(
            "username '{username}' contains '{c}'; only a-z, 0-9 and _ are allowed"
        )));
    }
    Ok(())
}

/// `HTTP <status>: <reason>`, with the reason pulled out of a JSON `detail` when present.
fn api_error(response: &RawResponse) -> Error {
    Error::Api(format_api_error(&response.error_text()))
}

/// Client for the Marzban user API.
#[derive(Debug)]
pub struct ProxyPanelClient {
    executor: RequestExecutor<MarzbanAuth>,
}

impl ProxyPanelClient {
    pub fn new(config: &PanelConfig) -> Result<Self, Error> {
        url::Url::parse(&config.base_url).map_err(|e| {
            Error::Validation(format!("invalid panel URL {:?}: {e}", config.base_url))
        })?;
        let auth = MarzbanAuth::new(&config.username, &config.password);
        Ok(Self {
            executor: RequestExecutor::new(&config.base_url, auth, config.accept_invalid_certs),
        })
    }

    /// Protocols and inbound tags currently configured on the panel.
    pub async fn protocol_catalog(&self) -> Result<ProtocolCatalog, Error> {
        let response = self
            .executor
            .execute(Method::GET, "/api/inbounds", &Payload::Empty)
            .await?;
        if !response.is_success() {
            return Err(api_error(&response));
        }
        let raw: HashMap<String, Vec<serde_json::Value>> = response.json()?;
        let catalog = ProtocolCatalog::from_raw(raw);
        if !catalog.unrecognized().is_empty() {
            tracing::debug!(protocols = ?catalog.unrecognized(), "ignoring unknown protocols");
        }
        Ok(catalog)
    }

    /// Create an active user with every known protocol the panel offers.
    pub async fn create_user(
        &self,
        identity: &str,
        data_cap: DataCap,
        expiry: Expiry,
    ) -> ProvisioningResult {
        self.add_user(identity, data_cap, expiry).await.into()
    }

    async fn add_user(
        &self,
        identity: &str,
        data_cap: DataCap,
        expiry: Expiry,
    ) -> Result<Credential, Error> {
        validate_username(identity)?;

        // Only a panel-side rejection of the catalog query falls back to the default.
        let catalog = match self.protocol_catalog().await {
            Ok(catalog) => catalog,
            Err(e) if e.kind() == FailureKind::Backend => {
                tracing::warn!(error = %e, "protocol catalog unavailable, using shadowsocks default");
                ProtocolCatalog::default()
            }
            Err(e) => return Err(e),
        };
        let config = ProxyConfiguration::from_catalog(&catalog);

        let body = UserCreate {
            username: identity,
            config: &config,
            expire: expiry.epoch_seconds(),
            data_limit: data_cap.as_bytes(),
            data_limit_reset_strategy: "no_reset",
            status: "active",
        };
        let response = self
            .executor
            .execute(Method::POST, "/api/user", &Payload::Json(serde_json::to_value(&body)?))
            .await?;
        if !matches!(response.status, StatusCode::OK | StatusCode::CREATED) {
            tracing::warn!(identity, status = response.status.as_u16(), "marzban rejected user");
            return Err(api_error(&response));
        }

        let user: UserInfo = response.json()?;
        tracing::info!(identity, links = user.links.len(), "created marzban user");
        Ok(Credential {
            id: identity.to_string(),
            identity: identity.to_string(),
            subscription_url: self.absolute_subscription_url(user.subscription_url.as_deref()),
            connection_uris: user.links,
        })
    }

    /// Look up an existing user.
    pub async fn get_user(&self, username: &str) -> Result<UserInfo, Error> {
        let response = self
            .executor
            .execute(Method::GET, &format!("/api/user/{username}"), &Payload::Empty)
            .await?;
        if !response.is_success() {
            return Err(api_error(&response));
        }
        let mut user: UserInfo = response.json()?;
        user.subscription_url = self.absolute_subscription_url(user.subscription_url.as_deref());
        Ok(user)
    }

    /// Resolve a panel-relative subscription path against the base URL.
    fn absolute_subscription_url(&self, url: Option<&str>) -> Option<String> {
        let url = url.filter(|u| !u.is_empty())?;
        if url.starts_with("http") {
            return Some(url.to_string());
        }
        let base = self.executor.base_url();
        if url.starts_with('/') {
            Some(format!("{base}{url}"))
        } else {
            Some(format!("{base}/{url}"))
        }
    }
}
