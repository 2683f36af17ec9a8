//! Asset identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a single deliverable asset as `customer/space/name`.
///
/// The canonical string form is used as the cache key, the keyed-lock key and
/// the root of every blob store key derived for the asset.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId {
    customer: u32,
    space: u32,
    name: String,
}

impl AssetId {
    /// Create from components, validating the name.
    pub fn new(customer: u32, space: u32, name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::Error::Format(
                "asset name cannot be empty".to_string(),
            ));
        }
        if name.contains('/') {
            return Err(crate::Error::Format(format!(
                "asset name cannot contain '/': {name}"
            )));
        }
        Ok(Self {
            customer,
            space,
            name,
        })
    }

    /// Parse the canonical `customer/space/name` form.
    pub fn parse(value: &str) -> crate::Result<Self> {
        let parts: Vec<&str> = value.split('/').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(crate::Error::Format(format!(
                "asset id must have 3 non-empty parts (customer/space/name): {value}"
            )));
        }

        let customer = parse_segment(parts[0])
            .ok_or_else(|| crate::Error::Format(format!("invalid customer in asset id: {value}")))?;
        let space = parse_segment(parts[1])
            .ok_or_else(|| crate::Error::Format(format!("invalid space in asset id: {value}")))?;

        Self::new(customer, space, parts[2])
    }

    pub fn customer(&self) -> u32 {
        self.customer
    }

    pub fn space(&self) -> u32 {
        self.space
    }

    /// The asset's local name within its space.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the stored original in the storage bucket.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }

    /// Key of the largest pre-rendered thumbnail in the thumbs bucket.
    pub fn largest_thumbnail_key(&self) -> String {
        format!("{self}/low.jpg")
    }

    /// Key of a thumbnail addressed by an image-request suffix in the thumbs bucket.
    pub fn thumbnail_key(&self, suffix: &str) -> String {
        format!("{self}/{}", suffix.trim_start_matches('/'))
    }
}

/// Parse a numeric segment, accepting only its canonical decimal form so
/// every accepted id formats back to the same string.
fn parse_segment(part: &str) -> Option<u32> {
    part.parse::<u32>().ok().filter(|n| n.to_string() == part)
}

impl FromStr for AssetId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AssetId {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AssetId> for String {
    fn from(value: AssetId) -> Self {
        value.to_string()
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({self})")
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.customer, self.space, self.name)
    }
}
