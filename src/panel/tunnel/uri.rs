//! VLESS share-link construction.
//!
//! The output format is consumed by existing client apps, so parameter order
//! and the absence of percent-encoding are part of the contract.

use super::types::{InboundConfiguration, Security, Transport};
use crate::panel::error::Error;
use url::Url;

/// Host part of the panel base URL, without port or path.
pub fn server_host(base_url: &str) -> Result<String, Error> {
    let url = Url::parse(base_url)
        .map_err(|e| Error::Validation(format!("invalid panel URL {base_url:?}: {e}")))?;
    url.host_str()
        .map(ToString::to_string)
        .ok_or_else(|| Error::Validation(format!("panel URL {base_url:?} has no host")))
}

/// Ordered query parameters for `inbound`.
#[must_use]
pub fn query_params(inbound: &InboundConfiguration, server_host: &str) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("type", inbound.transport.network().to_string()),
        ("security", inbound.security.name().to_string()),
    ];

    match &inbound.transport {
        Transport::WebSocket { path, host } => {
            params.push(("path", path.clone()));
            params.push(("host", host.clone().unwrap_or_else(|| server_host.to_string())));
        }
        Transport::Grpc { service_name } => params.push(("serviceName", service_name.clone())),
        Transport::Tcp { header_type } => params.push(("headerType", header_type.clone())),
        Transport::Other(_) => {}
    }

    match &inbound.security {
        Security::Tls {
            server_name,
            fingerprint,
            alpn,
        } => {
            params.push((
                "sni",
                server_name.clone().unwrap_or_else(|| server_host.to_string()),
            ));
            if let Some(fp) = fingerprint {
                params.push(("fp", fp.clone()));
            }
            if !alpn.is_empty() {
                params.push(("alpn", alpn.join(",")));
            }
        }
        Security::Reality {
            server_name,
            fingerprint,
            public_key,
            short_id,
            spider_x,
        } => {
            params.push(("sni", server_name.clone()));
            params.push(("fp", fingerprint.clone()));
            params.push(("pbk", public_key.clone()));
            if let Some(sid) = short_id {
                params.push(("sid", sid.clone()));
            }
            if let Some(spx) = spider_x {
                params.push(("spx", spx.clone()));
            }
        }
        Security::None | Security::Other(_) => {}
    }

    params
}

/// `vless://<id>@<host>:<port>?<params>#<remark>`
#[must_use]
pub fn build_vless_uri(credential_id: &str, server_host: &str, inbound: &InboundConfiguration) -> String {
    let query = query_params(inbound, server_host)
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "vless://{credential_id}@{server_host}:{}?{query}#{}",
        inbound.port, inbound.remark
    )
}
