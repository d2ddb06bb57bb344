//! 3x-ui wire types and the decoded inbound configuration.

use crate::panel::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Standard 3x-ui response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    pub obj: Option<T>,
}

impl<T> Envelope<T> {
    /// Message to report when `success` is false.
    pub fn failure_message(&self) -> String {
        if self.msg.is_empty() {
            "Unknown error".to_string()
        } else {
            self.msg.clone()
        }
    }
}

/// Settings blob for `addClient`, sent JSON-encoded in a form field.
#[derive(Debug, Serialize)]
pub(crate) struct ClientSettings {
    pub clients: Vec<ClientEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClientEntry {
    pub id: String,
    pub flow: String,
    pub email: String,
    pub limit_ip: u32,
    /// Bytes, despite the name. 0 = unlimited.
    #[serde(rename = "totalGB")]
    pub total_gb: u64,
    /// Milliseconds since epoch.
    pub expiry_time: i64,
    pub enable: bool,
    pub tg_id: String,
    pub sub_id: String,
    pub reset: u32,
}

/// Inbound object as returned by `/get/{id}` and `/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawInbound {
    #[serde(default)]
    pub id: u32,
    pub remark: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    #[serde(default)]
    pub enable: bool,
    /// JSON-encoded stream settings.
    pub stream_settings: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStreamSettings {
    network: Option<String>,
    security: Option<String>,
    ws_settings: Option<RawWsSettings>,
    grpc_settings: Option<RawGrpcSettings>,
    tcp_settings: Option<RawTcpSettings>,
    tls_settings: Option<RawTlsSettings>,
    reality_settings: Option<RawRealitySettings>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWsSettings {
    path: Option<String>,
    #[serde(default)]
    headers: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGrpcSettings {
    service_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTcpSettings {
    header: Option<RawTcpHeader>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTcpHeader {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Client-side values newer panels keep under a nested `settings` object.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNestedSecurity {
    fingerprint: Option<String>,
    public_key: Option<String>,
    spider_x: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTlsSettings {
    server_name: Option<String>,
    fingerprint: Option<String>,
    #[serde(default)]
    alpn: Vec<String>,
    #[serde(default)]
    settings: RawNestedSecurity,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRealitySettings {
    #[serde(default)]
    server_names: Vec<String>,
    fingerprint: Option<String>,
    public_key: Option<String>,
    #[serde(default)]
    short_ids: Vec<String>,
    spider_x: Option<String>,
    #[serde(default)]
    settings: RawNestedSecurity,
}

/// Network framing of an inbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp { header_type: String },
    /// `host` is `None` when the inbound sets no `Host` header.
    WebSocket { path: String, host: Option<String> },
    Grpc { service_name: String },
    /// Any other network (kcp, httpupgrade, ...); only its name is carried.
    Other(String),
}

impl Transport {
    /// Value of the `type` URI parameter.
    #[must_use]
    pub fn network(&self) -> &str {
        match self {
            Self::Tcp { .. } => "tcp",
            Self::WebSocket { .. } => "ws",
            Self::Grpc { .. } => "grpc",
            Self::Other(name) => name,
        }
    }
}

/// Security layer wrapped around the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Security {
    None,
    /// `server_name` is `None` when the inbound leaves SNI to the server host.
    Tls {
        server_name: Option<String>,
        fingerprint: Option<String>,
        alpn: Vec<String>,
    },
    Reality {
        server_name: String,
        fingerprint: String,
        public_key: String,
        short_id: Option<String>,
        spider_x: Option<String>,
    },
    Other(String),
}

impl Security {
    /// Value of the `security` URI parameter.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Tls { .. } => "tls",
            Self::Reality { .. } => "reality",
            Self::Other(name) => name,
        }
    }
}

/// A 3x-ui inbound with its stream settings decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundConfiguration {
    pub id: u32,
    pub remark: String,
    pub port: u16,
    pub protocol: String,
    pub transport: Transport,
    pub security: Security,
}

/// One row of the inbound listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundSummary {
    pub id: u32,
    pub remark: String,
    pub protocol: String,
    pub port: u16,
    pub enable: bool,
}

const DEFAULT_PORT: u16 = 443;
const DEFAULT_REMARK: &str = "vless";
const DEFAULT_REALITY_FINGERPRINT: &str = "chrome";

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl From<&RawInbound> for InboundSummary {
    fn from(raw: &RawInbound) -> Self {
        Self {
            id: raw.id,
            remark: raw.remark.clone().unwrap_or_default(),
            protocol: raw.protocol.clone().unwrap_or_default(),
            port: raw.port.unwrap_or(DEFAULT_PORT),
            enable: raw.enable,
        }
    }
}

impl TryFrom<RawInbound> for InboundConfiguration {
    type Error = Error;

    fn try_from(raw: RawInbound) -> Result<Self, Error> {
        let stream: RawStreamSettings = match raw.stream_settings.as_deref().map(str::trim) {
            None | Some("") => RawStreamSettings::default(),
            Some(encoded) => serde_json::from_str(encoded).map_err(|e| {
                Error::Decode(format!("inbound {} stream settings: {e}", raw.id))
            })?,
        };

        let network = stream.network.unwrap_or_else(|| "tcp".to_string());
        let transport = match network.as_str() {
            "tcp" => Transport::Tcp {
                header_type: stream
                    .tcp_settings
                    .and_then(|t| t.header)
                    .and_then(|h| h.kind)
                    .unwrap_or_else(|| "none".to_string()),
            },
            "ws" => {
                let ws = stream.ws_settings.unwrap_or_default();
                Transport::WebSocket {
                    path: ws.path.unwrap_or_else(|| "/".to_string()),
                    host: ws
                        .headers
                        .get("Host")
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string),
                }
            }
            "grpc" => Transport::Grpc {
                service_name: stream
                    .grpc_settings
                    .and_then(|g| g.service_name)
                    .unwrap_or_default(),
            },
            _ => Transport::Other(network),
        };

        let security_name = stream.security.unwrap_or_else(|| "none".to_string());
        let security = match security_name.as_str() {
            "none" => Security::None,
            "tls" => {
                let tls = stream.tls_settings.unwrap_or_default();
                Security::Tls {
                    server_name: tls.server_name,
                    fingerprint: non_empty(tls.fingerprint.or(tls.settings.fingerprint)),
                    alpn: tls.alpn,
                }
            }
            "reality" => {
                let reality = stream.reality_settings.unwrap_or_default();
                Security::Reality {
                    server_name: reality.server_names.into_iter().next().unwrap_or_default(),
                    fingerprint: reality
                        .fingerprint
                        .or(reality.settings.fingerprint)
                        .unwrap_or_else(|| DEFAULT_REALITY_FINGERPRINT.to_string()),
                    public_key: reality
                        .public_key
                        .or(reality.settings.public_key)
                        .unwrap_or_default(),
                    short_id: non_empty(reality.short_ids.into_iter().next()),
                    spider_x: non_empty(reality.spider_x.or(reality.settings.spider_x)),
                }
            }
            _ => Security::Other(security_name),
        };

        Ok(Self {
            id: raw.id,
            remark: raw.remark.unwrap_or_else(|| DEFAULT_REMARK.to_string()),
            port: raw.port.unwrap_or(DEFAULT_PORT),
            protocol: raw.protocol.unwrap_or_else(|| "vless".to_string()),
            transport,
            security,
        })
    }
}
