//! Control files coordinating background generation of projections.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// State record persisted next to a projection, keyed by the same storage key.
///
/// A control file is written with `in_process = true` when a build starts and
/// flipped to `exists = true, in_process = false` when the artifact has been
/// uploaded. A build that crashes leaves `in_process` set; once the file is
/// older than the staleness threshold another builder may take over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlFile {
    /// Storage key of the projection this file describes.
    pub key: String,
    pub exists: bool,
    pub in_process: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub item_count: u64,
    pub size_bytes: u64,
    /// Roles required to view the projection. Empty means open.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl ControlFile {
    /// Control file for a build that is starting now.
    pub fn in_process(key: impl Into<String>, item_count: u64, roles: Vec<String>) -> Self {
        Self {
            key: key.into(),
            exists: false,
            in_process: true,
            created: OffsetDateTime::now_utc(),
            item_count,
            size_bytes: 0,
            roles,
        }
    }

    /// Mark the build as finished with the uploaded artifact size.
    pub fn complete(&mut self, size_bytes: u64) {
        self.exists = true;
        self.in_process = false;
        self.size_bytes = size_bytes;
    }

    /// Whether the projection requires an authorization decision before serving.
    pub fn requires_auth(&self) -> bool {
        !self.roles.is_empty()
    }

    /// True if a build is recorded as running but started more than
    /// `threshold_secs` ago.
    pub fn is_stale(&self, threshold_secs: u64) -> bool {
        self.is_stale_at(threshold_secs, OffsetDateTime::now_utc())
    }

    pub fn is_stale_at(&self, threshold_secs: u64, now: OffsetDateTime) -> bool {
        let threshold = Duration::seconds(i64::try_from(threshold_secs).unwrap_or(i64::MAX));
        self.in_process && now - self.created > threshold
    }

    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Externally observable outcome of a request for a persisted projection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistedProjectionStatus {
    Unknown,
    Available,
    InProcess,
    NotFound,
    Restricted,
    Error,
}

impl PersistedProjectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Available => "available",
            Self::InProcess => "inprocess",
            Self::NotFound => "notfound",
            Self::Restricted => "restricted",
            Self::Error => "error",
        }
    }
}
