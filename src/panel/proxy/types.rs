//! Marzban wire types and the protocol-keyed proxy configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Proxy protocols this crate knows how to configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Shadowsocks,
    Vless,
    Vmess,
    Trojan,
}

impl ProxyProtocol {
    pub const ALL: &'static [ProxyProtocol] = &[
        ProxyProtocol::Shadowsocks,
        ProxyProtocol::Vless,
        ProxyProtocol::Vmess,
        ProxyProtocol::Trojan,
    ];

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Shadowsocks => "shadowsocks",
            Self::Vless => "vless",
            Self::Vmess => "vmess",
            Self::Trojan => "trojan",
        }
    }

    /// Case-insensitive lookup; unknown names return `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.id().eq_ignore_ascii_case(name))
    }

    /// Settings a new user gets for this protocol; the panel fills in secrets.
    #[must_use]
    pub fn default_settings(self) -> ProxySettings {
        match self {
            Self::Shadowsocks => ProxySettings::Shadowsocks {},
            Self::Vless => ProxySettings::Vless {
                flow: String::new(),
            },
            Self::Vmess => ProxySettings::Vmess {},
            Self::Trojan => ProxySettings::Trojan {
                password: String::new(),
            },
        }
    }
}

/// Per-protocol user settings, serialized as the bare settings object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProxySettings {
    Shadowsocks {},
    Vless { flow: String },
    Vmess {},
    Trojan { password: String },
}

impl ProxySettings {
    #[must_use]
    pub fn protocol(&self) -> ProxyProtocol {
        match self {
            Self::Shadowsocks {} => ProxyProtocol::Shadowsocks,
            Self::Vless { .. } => ProxyProtocol::Vless,
            Self::Vmess {} => ProxyProtocol::Vmess,
            Self::Trojan { .. } => ProxyProtocol::Trojan,
        }
    }
}

/// Inbound tags the panel currently has configured, per known protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolCatalog {
    tags: BTreeMap<ProxyProtocol, Vec<String>>,
    unrecognized: Vec<String>,
}

impl ProtocolCatalog {
    /// Build from the `/api/inbounds` body: protocol name → inbound entries.
    ///
    /// Entries may be objects with a `tag` field or bare tag strings.
    #[must_use]
    pub fn from_raw(raw: HashMap<String, Vec<serde_json::Value>>) -> Self {
        let mut catalog = Self::default();
        for (name, entries) in raw {
            let Some(protocol) = ProxyProtocol::from_name(&name) else {
                catalog.unrecognized.push(name);
                continue;
            };
            let tags = entries.iter().filter_map(|entry| match entry {
                serde_json::Value::String(tag) => Some(tag.clone()),
                serde_json::Value::Object(obj) => {
                    obj.get("tag").and_then(|t| t.as_str()).map(ToString::to_string)
                }
                _ => None,
            });
            catalog.tags.entry(protocol).or_default().extend(tags);
        }
        catalog.unrecognized.sort();
        catalog
    }

    #[must_use]
    pub fn tags(&self, protocol: ProxyProtocol) -> Option<&[String]> {
        self.tags.get(&protocol).map(Vec::as_slice)
    }

    pub fn protocols(&self) -> impl Iterator<Item = ProxyProtocol> + '_ {
        self.tags.keys().copied()
    }

    /// Protocol names the panel reported that are not configured by this crate.
    #[must_use]
    pub fn unrecognized(&self) -> &[String] {
        &self.unrecognized
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// The `proxies` and `inbounds` maps of a new user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyConfiguration {
    pub proxies: BTreeMap<ProxyProtocol, ProxySettings>,
    pub inbounds: BTreeMap<ProxyProtocol, Vec<String>>,
}

impl ProxyConfiguration {
    /// One entry per known protocol in `catalog`.
    ///
    /// With no known protocol, falls back to a bare shadowsocks proxy and no
    /// explicit inbound binding, leaving inbound selection to the panel.
    #[must_use]
    pub fn from_catalog(catalog: &ProtocolCatalog) -> Self {
        if catalog.is_empty() {
            return Self::shadowsocks_only();
        }

        let mut proxies = BTreeMap::new();
        let mut inbounds = BTreeMap::new();
        for protocol in catalog.protocols() {
            proxies.insert(protocol, protocol.default_settings());
            inbounds.insert(
                protocol,
                catalog.tags(protocol).unwrap_or_default().to_vec(),
            );
        }
        Self { proxies, inbounds }
    }

    #[must_use]
    pub fn shadowsocks_only() -> Self {
        let settings = ProxyProtocol::Shadowsocks.default_settings();
        Self {
            proxies: BTreeMap::from([(settings.protocol(), settings)]),
            inbounds: BTreeMap::new(),
        }
    }
}

/// Body of `POST /api/user`.
#[derive(Debug, Serialize)]
pub(crate) struct UserCreate<'a> {
    pub username: &'a str,
    #[serde(flatten)]
    pub config: &'a ProxyConfiguration,
    /// Seconds since epoch.
    pub expire: i64,
    /// Bytes. 0 = unlimited.
    pub data_limit: u64,
    pub data_limit_reset_strategy: &'static str,
    pub status: &'static str,
}

/// User object returned by the panel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserInfo {
    pub username: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Seconds since epoch, `None` for no expiry.
    #[serde(default)]
    pub expire: Option<i64>,
    /// Bytes, `None` or 0 for unlimited.
    #[serde(default)]
    pub data_limit: Option<u64>,
    #[serde(default)]
    pub used_traffic: u64,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub subscription_url: Option<String>,
}
