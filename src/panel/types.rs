//! Types shared by both panel clients.

use super::error::{Error, FailureKind};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const BYTES_PER_MB: u64 = 1024 * 1024;
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Traffic allowance in bytes. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataCap(u64);

impl DataCap {
    pub const UNLIMITED: DataCap = DataCap(0);

    #[must_use]
    pub const fn bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn megabytes(mb: u64) -> Self {
        Self(mb.saturating_mul(BYTES_PER_MB))
    }

    #[must_use]
    pub const fn gigabytes(gb: u64) -> Self {
        Self(gb.saturating_mul(BYTES_PER_GB))
    }

    #[must_use]
    pub const fn as_bytes(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_unlimited(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DataCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => f.write_str("unlimited"),
            b if b % BYTES_PER_GB == 0 => write!(f, "{} GB", b / BYTES_PER_GB),
            b if b % BYTES_PER_MB == 0 => write!(f, "{} MB", b / BYTES_PER_MB),
            b => write!(f, "{b} bytes"),
        }
    }
}

/// Absolute expiry instant of an issued credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Expiry(DateTime<Utc>);

impl Expiry {
    /// `days` from now.
    #[must_use]
    pub fn in_days(days: u32) -> Self {
        Self::from_base(Utc::now(), days)
    }

    /// `days` after `base`, clamped to the latest representable instant.
    #[must_use]
    pub fn from_base(base: DateTime<Utc>, days: u32) -> Self {
        Self::checked_from_base(base, days).unwrap_or(Self(DateTime::<Utc>::MAX_UTC))
    }

    /// `days` from now, or `None` if that is past the representable range.
    #[must_use]
    pub fn checked_in_days(days: u32) -> Option<Self> {
        Self::checked_from_base(Utc::now(), days)
    }

    #[must_use]
    pub fn checked_from_base(base: DateTime<Utc>, days: u32) -> Option<Self> {
        base.checked_add_signed(Duration::days(i64::from(days)))
            .map(Self)
    }

    #[must_use]
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    /// Milliseconds since the Unix epoch (3x-ui `expiryTime`).
    #[must_use]
    pub fn epoch_millis(self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Seconds since the Unix epoch (Marzban `expire`).
    #[must_use]
    pub fn epoch_seconds(self) -> i64 {
        self.0.timestamp()
    }

    #[must_use]
    pub fn instant(self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M UTC"))
    }
}

/// An issued credential and the ways to connect with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    /// UUID (3x-ui) or username (Marzban).
    pub id: String,
    /// Display label the credential was created under.
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_url: Option<String>,
    /// Ready-to-import connection URIs.
    pub connection_uris: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisioningFailure {
    #[serde(serialize_with = "serialize_kind")]
    pub kind: FailureKind,
    pub message: String,
}

fn serialize_kind<S: serde::Serializer>(kind: &FailureKind, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(kind.as_str())
}

impl From<Error> for ProvisioningFailure {
    fn from(error: Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.display_message(),
        }
    }
}

/// Outcome of provisioning one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProvisioningResult {
    Success(Credential),
    Failure(ProvisioningFailure),
}

impl ProvisioningResult {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure(ProvisioningFailure {
            kind,
            message: message.into(),
        })
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            Self::Success(c) => Some(c),
            Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ProvisioningFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f),
        }
    }
}

impl From<Result<Credential, Error>> for ProvisioningResult {
    fn from(result: Result<Credential, Error>) -> Self {
        match result {
            Ok(credential) => Self::Success(credential),
            Err(error) => Self::Failure(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_data_cap_conversions() {
        assert_eq!(DataCap::gigabytes(1).as_bytes(), 1_073_741_824);
        assert_eq!(DataCap::gigabytes(50).as_bytes(), 50 * 1024 * 1024 * 1024);
        assert_eq!(DataCap::megabytes(512).as_bytes(), 536_870_912);
        assert!(DataCap::gigabytes(0).is_unlimited());
        assert!(DataCap::UNLIMITED.is_unlimited());
    }

    #[test]
    fn test_data_cap_display() {
        assert_eq!(DataCap::UNLIMITED.to_string(), "unlimited");
        assert_eq!(DataCap::gigabytes(30).to_string(), "30 GB");
        assert_eq!(DataCap::megabytes(512).to_string(), "512 MB");
        assert_eq!(DataCap::bytes(1000).to_string(), "1000 bytes");
    }

    #[test]
    fn test_expiry_epochs() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let expiry = Expiry::from_base(base, 30);
        assert_eq!(expiry.epoch_seconds(), base.timestamp() + 30 * 86_400);
        assert_eq!(expiry.epoch_millis(), expiry.epoch_seconds() * 1000);
        assert_eq!(expiry.to_string(), "2026-01-31 00:00 UTC");
    }

    #[test]
    fn test_expiry_out_of_range() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(Expiry::checked_from_base(base, 200_000_000).is_none());
        assert!(Expiry::checked_from_base(base, 36_500).is_some());
        assert_eq!(
            Expiry::from_base(base, u32::MAX).instant(),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn test_result_from_error_keeps_kind() {
        let result: ProvisioningResult = Err::<Credential, _>(Error::Validation(
            "username too short".into(),
        ))
        .into();
        let failure = result.error().unwrap();
        assert_eq!(failure.kind, FailureKind::Validation);
        assert!(failure.message.contains("username too short"));
    }

    #[test]
    fn test_result_serializes_with_status_tag() {
        let result = ProvisioningResult::Success(Credential {
            id: "bob_1".into(),
            identity: "bob_1".into(),
            subscription_url: None,
            connection_uris: vec![],
        });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["id"], "bob_1");
        assert!(value.get("subscription_url").is_none());
    }
}
