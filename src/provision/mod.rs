//! Caller-facing provisioning across both panels.
//!
//! [`ProvisioningFacade`] takes one uniform [`ProvisioningRequest`] plus a
//! [`Backend`] selector and returns a [`ProvisioningOutcome`] holding exactly
//! one [`ProvisioningResult`] per requested key. Nothing here returns `Err`:
//! configuration and panel failures become `Failure` entries.

mod identity;

pub use identity::{key_identity, sanitize_identity, unique_identity};

use crate::config::{Config, PlanConfig};
use crate::panel::{
    Backend, DataCap, Error, Expiry, FailureKind, ProvisioningResult, ProxyPanelClient,
    TunnelPanelClient,
};
use std::fmt;

/// A backend-neutral request for one or more keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRequest {
    /// Display label (3x-ui) or username (Marzban).
    pub identity: String,
    /// Concurrent connection limit; only the tunnel panel enforces it.
    pub device_limit: u32,
    pub data_cap: DataCap,
    pub expiry: Expiry,
    /// Inbound to create tunnel credentials on. Ignored by the proxy panel.
    pub inbound_id: Option<u32>,
    /// Number of independent keys to issue.
    pub keys: u32,
}

impl ProvisioningRequest {
    /// A single key with no device or traffic limit beyond the defaults.
    pub fn new(identity: impl Into<String>, expiry_days: u32) -> Self {
        Self {
            identity: identity.into(),
            device_limit: 1,
            data_cap: DataCap::UNLIMITED,
            expiry: Expiry::in_days(expiry_days),
            inbound_id: None,
            keys: 1,
        }
    }

    /// Resolve `plan` for `identity`; the expiry starts now.
    pub fn from_plan(plan: &PlanConfig, identity: impl Into<String>) -> Result<(Backend, Self), Error> {
        let backend = Backend::from_id(&plan.backend)?;
        let expiry = Expiry::checked_in_days(plan.expiry_days).ok_or_else(|| {
            Error::Validation(format!("expiry of {} days is out of range", plan.expiry_days))
        })?;
        let request = Self {
            identity: identity.into(),
            device_limit: plan.devices,
            data_cap: DataCap::megabytes(plan.data_mb),
            expiry,
            inbound_id: plan.inbound_id,
            keys: plan.keys,
        };
        request.validate(backend)?;
        Ok((backend, request))
    }

    /// Checks that need no network access.
    pub fn validate(&self, backend: Backend) -> Result<(), Error> {
        if self.keys == 0 {
            return Err(Error::Validation("at least one key must be requested".into()));
        }
        if self.identity.trim().is_empty() {
            return Err(Error::Validation("identity must not be empty".into()));
        }
        if backend == Backend::Tunnel && self.inbound_id.is_none() {
            return Err(Error::Validation(
                "tunnel requests need an inbound id".into(),
            ));
        }
        Ok(())
    }
}

/// How a batch went as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Complete,
    Partial,
    Failed,
}

/// Results of one request, in key order.
#[derive(Debug, Clone)]
pub struct ProvisioningOutcome {
    pub backend: Backend,
    pub request: ProvisioningRequest,
    pub results: Vec<ProvisioningResult>,
}

impl ProvisioningOutcome {
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        let ok = self.results.iter().filter(|r| r.is_success()).count();
        match ok {
            0 => BatchStatus::Failed,
            n if n == self.results.len() => BatchStatus::Complete,
            _ => BatchStatus::Partial,
        }
    }

    #[must_use]
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}

impl fmt::Display for ProvisioningOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status() {
            BatchStatus::Complete => "created",
            BatchStatus::Partial => "partially created",
            BatchStatus::Failed => "failed",
        };
        writeln!(
            f,
            "{} key(s) {status}: {}/{}",
            self.backend,
            self.success_count(),
            self.results.len()
        )?;
        write!(f, "Data: {}  Expiry: {}", self.request.data_cap, self.request.expiry)?;
        if self.backend == Backend::Tunnel {
            write!(f, "  Devices: {}", self.request.device_limit)?;
        }
        writeln!(f)?;

        for (i, result) in self.results.iter().enumerate() {
            match result {
                ProvisioningResult::Success(credential) => {
                    writeln!(f, "[{}] {}", i + 1, credential.identity)?;
                    if credential.id != credential.identity {
                        writeln!(f, "    id:  {}", credential.id)?;
                    }
                    if let Some(sub) = &credential.subscription_url {
                        writeln!(f, "    sub: {sub}")?;
                    }
                    for uri in &credential.connection_uris {
                        writeln!(f, "    key: {uri}")?;
                    }
                    if credential.subscription_url.is_none() && credential.connection_uris.is_empty() {
                        writeln!(f, "    (no connection link available; use the id above)")?;
                    }
                }
                ProvisioningResult::Failure(failure) => {
                    writeln!(f, "[{}] FAILED ({}): {}", i + 1, failure.kind, failure.message)?;
                }
            }
        }
        Ok(())
    }
}

/// Dispatches requests to whichever panels are configured.
#[derive(Debug, Default)]
pub struct ProvisioningFacade {
    tunnel: Option<TunnelPanelClient>,
    proxy: Option<ProxyPanelClient>,
}

impl ProvisioningFacade {
    #[must_use]
    pub fn new(tunnel: Option<TunnelPanelClient>, proxy: Option<ProxyPanelClient>) -> Self {
        Self { tunnel, proxy }
    }

    /// Build clients for every panel present in `config`.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let tunnel = config.tunnel.as_ref().map(TunnelPanelClient::new).transpose()?;
        let proxy = config.proxy.as_ref().map(ProxyPanelClient::new).transpose()?;
        Ok(Self::new(tunnel, proxy))
    }

    #[must_use]
    pub fn tunnel(&self) -> Option<&TunnelPanelClient> {
        self.tunnel.as_ref()
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&ProxyPanelClient> {
        self.proxy.as_ref()
    }

    /// Issue `request.keys` credentials on `backend`, one after another.
    ///
    /// A failed key does not stop the remaining ones.
    pub async fn provision(&self, backend: Backend, request: &ProvisioningRequest) -> ProvisioningOutcome {
        let results = match self.check(backend, request) {
            Ok(()) => self.provision_keys(backend, request).await,
            Err(e) => {
                tracing::warn!(backend = backend.id(), error = %e, "request rejected");
                let count = request.keys.max(1);
                (0..count)
                    .map(|_| ProvisioningResult::failure(FailureKind::Validation, e.display_message()))
                    .collect()
            }
        };

        ProvisioningOutcome {
            backend,
            request: request.clone(),
            results,
        }
    }

    fn check(&self, backend: Backend, request: &ProvisioningRequest) -> Result<(), Error> {
        request.validate(backend)?;
        let configured = match backend {
            Backend::Tunnel => self.tunnel.is_some(),
            Backend::Proxy => self.proxy.is_some(),
        };
        if !configured {
            return Err(Error::Validation(format!("{backend} panel is not configured")));
        }
        Ok(())
    }

    async fn provision_keys(&self, backend: Backend, request: &ProvisioningRequest) -> Vec<ProvisioningResult> {
        let mut results = Vec::with_capacity(request.keys as usize);
        for index in 1..=request.keys {
            let identity = key_identity(&request.identity, index, request.keys);
            let result = match backend {
                Backend::Tunnel => self.provision_tunnel(&identity, request).await,
                Backend::Proxy => self.provision_proxy(&identity, request).await,
            };
            if let ProvisioningResult::Failure(failure) = &result {
                tracing::warn!(
                    backend = backend.id(),
                    identity = %identity,
                    kind = %failure.kind,
                    "key {index}/{} failed: {}",
                    request.keys,
                    failure.message
                );
            }
            results.push(result);
        }
        results
    }

    async fn provision_tunnel(&self, identity: &str, request: &ProvisioningRequest) -> ProvisioningResult {
        let (Some(client), Some(inbound_id)) = (self.tunnel.as_ref(), request.inbound_id) else {
            return ProvisioningResult::failure(FailureKind::Validation, "tunnel panel is not configured");
        };

        let mut result = client
            .create_credential(
                identity,
                request.data_cap,
                request.expiry,
                request.device_limit,
                inbound_id,
            )
            .await;
        if let ProvisioningResult::Success(credential) = &mut result
            && let Some(uri) = client.build_connection_uri(&credential.id, inbound_id).await
        {
            credential.connection_uris.push(uri);
        }
        result
    }

    async fn provision_proxy(&self, identity: &str, request: &ProvisioningRequest) -> ProvisioningResult {
        let Some(client) = self.proxy.as_ref() else {
            return ProvisioningResult::failure(FailureKind::Validation, "proxy panel is not configured");
        };
        client
            .create_user(identity, request.data_cap, request.expiry)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelConfig;
    use crate::panel::testing::{MockPanel, MockResponse};
    use serde_json::json;

    fn panel_config(base_url: &str) -> PanelConfig {
        PanelConfig {
            base_url: base_url.to_string(),
            username: "admin".into(),
            password: "pw".into(),
            accept_invalid_certs: false,
        }
    }

    fn proxy_facade(panel: &MockPanel) -> ProvisioningFacade {
        let proxy = ProxyPanelClient::new(&panel_config(&panel.base_url)).unwrap();
        ProvisioningFacade::new(None, Some(proxy))
    }

    fn user(username: &str) -> MockResponse {
        MockResponse::json(json!({
            "username": username,
            "links": [format!("ss://{username}@1.2.3.4:1080")],
            "subscription_url": format!("/sub/{username}")
        }))
    }

    fn catalog() -> MockResponse {
        MockResponse::json(json!({ "shadowsocks": [{ "tag": "Shadowsocks TCP" }] }))
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure() {
        let panel = MockPanel::start(vec![
            MockResponse::json(json!({ "access_token": "tok" })),
            catalog(),
            user("bob_1"),
            catalog(),
            MockResponse::status(409, r#"{"detail":"User already exists"}"#),
            catalog(),
            user("bob_3"),
        ])
        .await;
        let facade = proxy_facade(&panel);
        let request = ProvisioningRequest {
            keys: 3,
            ..ProvisioningRequest::new("bob", 30)
        };

        let outcome = facade.provision(Backend::Proxy, &request).await;
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.status(), BatchStatus::Partial);
        assert_eq!(outcome.results[0].credential().unwrap().id, "bob_1");
        assert_eq!(outcome.results[1].error().unwrap().kind, FailureKind::Backend);
        assert_eq!(outcome.results[2].credential().unwrap().id, "bob_3");

        let requests = panel.finish().await;
        let created: Vec<String> = requests
            .iter()
            .filter(|r| r.method == "POST" && r.path == "/api/user")
            .map(|r| r.json()["username"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(created, ["bob_1", "bob_2", "bob_3"]);

        let summary = outcome.to_string();
        assert!(summary.contains("partially created: 2/3"));
        assert!(summary.contains("Data: unlimited"));
        assert!(summary.contains("[2] FAILED (backend): HTTP 409: User already exists"));
    }

    #[tokio::test]
    async fn test_batch_labels_of_long_identity_fit() {
        let base = "alexanderthegreatofmacedon_12345";
        let panel = MockPanel::start(vec![
            MockResponse::json(json!({ "access_token": "tok" })),
            catalog(),
            user("alexanderthegreatofmacedon_123_1"),
            catalog(),
            user("alexanderthegreatofmacedon_123_2"),
        ])
        .await;
        let facade = proxy_facade(&panel);
        let request = ProvisioningRequest {
            keys: 2,
            ..ProvisioningRequest::new(base, 30)
        };

        let outcome = facade.provision(Backend::Proxy, &request).await;
        assert_eq!(outcome.status(), BatchStatus::Complete);

        let requests = panel.finish().await;
        let created: Vec<String> = requests
            .iter()
            .filter(|r| r.path == "/api/user")
            .map(|r| r.json()["username"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            created,
            ["alexanderthegreatofmacedon_123_1", "alexanderthegreatofmacedon_123_2"]
        );
    }

    #[tokio::test]
    async fn test_single_key_keeps_identity() {
        let panel = MockPanel::start(vec![
            MockResponse::json(json!({ "access_token": "tok" })),
            catalog(),
            user("alice"),
        ])
        .await;
        let facade = proxy_facade(&panel);

        let outcome = facade
            .provision(Backend::Proxy, &ProvisioningRequest::new("alice", 30))
            .await;
        assert_eq!(outcome.status(), BatchStatus::Complete);
        let credential = outcome.results[0].credential().unwrap();
        assert_eq!(credential.id, "alice");
        assert_eq!(
            credential.subscription_url.as_deref(),
            Some(format!("{}/sub/alice", panel.base_url).as_str())
        );
        panel.finish().await;
    }

    #[tokio::test]
    async fn test_tunnel_credential_with_uri() {
        let inbound = json!({
            "success": true,
            "msg": "",
            "obj": {
                "id": 5,
                "remark": "main",
                "port": 2083,
                "protocol": "vless",
                "streamSettings": json!({
                    "network": "ws",
                    "security": "tls",
                    "wsSettings": { "path": "/ws" },
                    "tlsSettings": { "serverName": "vpn.example.com" }
                }).to_string()
            }
        });
        let panel = MockPanel::start(vec![
            MockResponse::json(json!({ "success": true, "msg": "" }))
                .with_header("Set-Cookie", "3x-ui=abc; Path=/"),
            MockResponse::json(json!({ "success": true, "msg": "", "obj": null })),
            MockResponse::json(inbound),
        ])
        .await;
        let tunnel = TunnelPanelClient::new(&panel_config(&panel.base_url)).unwrap();
        let facade = ProvisioningFacade::new(Some(tunnel), None);
        let request = ProvisioningRequest {
            inbound_id: Some(5),
            ..ProvisioningRequest::new("john_doe", 30)
        };

        let outcome = facade.provision(Backend::Tunnel, &request).await;
        let credential = outcome.results[0].credential().unwrap();
        assert_eq!(credential.identity, "john_doe");
        assert_eq!(credential.connection_uris.len(), 1);
        assert_eq!(
            credential.connection_uris[0],
            format!(
                "vless://{}@127.0.0.1:2083?type=ws&security=tls&path=/ws&host=127.0.0.1\
                 &sni=vpn.example.com#main",
                credential.id
            )
        );
        assert!(outcome.to_string().contains("Devices: 1"));
        panel.finish().await;
    }

    #[tokio::test]
    async fn test_tunnel_credential_survives_missing_uri() {
        let panel = MockPanel::start(vec![
            MockResponse::json(json!({ "success": true, "msg": "" }))
                .with_header("Set-Cookie", "3x-ui=abc; Path=/"),
            MockResponse::json(json!({ "success": true, "msg": "", "obj": null })),
            MockResponse::status(500, "internal error"),
        ])
        .await;
        let tunnel = TunnelPanelClient::new(&panel_config(&panel.base_url)).unwrap();
        let facade = ProvisioningFacade::new(Some(tunnel), None);
        let request = ProvisioningRequest {
            inbound_id: Some(5),
            ..ProvisioningRequest::new("john_doe", 30)
        };

        let outcome = facade.provision(Backend::Tunnel, &request).await;
        assert_eq!(outcome.status(), BatchStatus::Complete);
        assert!(outcome.results[0].credential().unwrap().connection_uris.is_empty());
        assert!(outcome.to_string().contains("no connection link available"));
        panel.finish().await;
    }

    #[tokio::test]
    async fn test_unconfigured_backend_fails_every_key() {
        let facade = ProvisioningFacade::default();
        let request = ProvisioningRequest {
            keys: 2,
            ..ProvisioningRequest::new("bob", 30)
        };

        let outcome = facade.provision(Backend::Proxy, &request).await;
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.status(), BatchStatus::Failed);
        for result in &outcome.results {
            assert_eq!(result.error().unwrap().kind, FailureKind::Validation);
        }
    }

    #[tokio::test]
    async fn test_tunnel_without_inbound_is_rejected() {
        let tunnel = TunnelPanelClient::new(&panel_config("http://127.0.0.1:9")).unwrap();
        let facade = ProvisioningFacade::new(Some(tunnel), None);

        let outcome = facade
            .provision(Backend::Tunnel, &ProvisioningRequest::new("bob", 30))
            .await;
        assert_eq!(outcome.results.len(), 1);
        let failure = outcome.results[0].error().unwrap();
        assert_eq!(failure.kind, FailureKind::Validation);
        assert!(failure.message.contains("inbound id"));
    }

    #[test]
    fn test_request_from_plan() {
        let config: Config = toml::from_str(
            r#"
[plans.trial]
backend = "vless"
devices = 1
data_mb = 512
expiry_days = 1
inbound_id = 2

[plans.broken]
backend = "wireguard"
expiry_days = 1
"#,
        )
        .unwrap();

        let trial = &config.plans["trial"];
        let (backend, request) = ProvisioningRequest::from_plan(trial, "bob").unwrap();
        assert_eq!(backend, Backend::Tunnel);
        assert_eq!(request.data_cap.as_bytes(), 512 * 1024 * 1024);
        assert_eq!(request.inbound_id, Some(2));
        assert_eq!(request.keys, 1);

        let broken = &config.plans["broken"];
        assert!(matches!(
            ProvisioningRequest::from_plan(broken, "bob"),
            Err(Error::Validation(_))
        ));

        let mut no_inbound = trial.clone();
        no_inbound.inbound_id = None;
        assert!(ProvisioningRequest::from_plan(&no_inbound, "bob").is_err());

        let mut forever = trial.clone();
        forever.expiry_days = 200_000_000;
        assert!(matches!(
            ProvisioningRequest::from_plan(&forever, "bob"),
            Err(Error::Validation(msg)) if msg.contains("out of range")
        ));
    }
}
