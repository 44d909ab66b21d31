//! Core type definitions for Tierkeep
//!
//! This module defines the identifiers, node metadata records and storage
//! location descriptors that the reaper and the API layer share.

use chrono::{DateTime, Duration, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Unique identifier for a node (a stored object's metadata record)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
pub struct NodeId(String);

impl NodeId {
    /// Create a node ID from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the node ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:?})", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a storage location (e.g. "local", "anl-s3", "tape")
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
pub struct LocationId(String);

impl LocationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocationId({:?})", self.0)
    }
}

impl From<&str> for LocationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Seconds from the Unix epoch back to 0001-01-01T00:00:00Z, the timestamp
/// some writers store to mean "no expiration".
pub const ZERO_TIMESTAMP_SECS: i64 = -62_135_596_800;

/// The "never" sentinel timestamp (0001-01-01T00:00:00Z)
#[must_use]
pub fn zero_time() -> DateTime<Utc> {
    DateTime::from_timestamp(ZERO_TIMESTAMP_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Check whether a timestamp is the "never" sentinel
#[must_use]
pub fn is_zero_time(t: &DateTime<Utc>) -> bool {
    t.timestamp() == ZERO_TIMESTAMP_SECS && t.timestamp_subsec_nanos() == 0
}

/// Parse a node expiration spec of the form `<digits><unit>`
///
/// Units are `M` (minutes), `H` (hours) and `D` (days), e.g. `30M`, `12H`, `7D`.
pub fn parse_expire_spec(spec: &str) -> Result<Duration> {
    let invalid = || Error::invalid_argument(format!("expiration must be <number>M|H|D, got {spec:?}"));

    let unit = spec.chars().last().ok_or_else(invalid)?;
    let digits = &spec[..spec.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let amount: i64 = digits.parse().map_err(|_| invalid())?;

    let duration = match unit {
        'M' => Duration::try_minutes(amount),
        'H' => Duration::try_hours(amount),
        'D' => Duration::try_days(amount),
        _ => None,
    };
    duration.ok_or_else(invalid)
}

/// Metadata record describing a stored object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier
    pub id: NodeId,
    /// Locations holding a replica of the node's file, in preference order
    #[serde(default)]
    pub locations: Vec<LocationId>,
    /// When the node expires; `None` or the zero timestamp mean never
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl Node {
    /// Create a node with no locations and no expiration
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            locations: Vec::new(),
            expiration: None,
        }
    }

    /// Add a replica location
    #[must_use]
    pub fn with_location(mut self, location: impl Into<LocationId>) -> Self {
        self.locations.push(location.into());
        self
    }

    /// Set an absolute expiration timestamp
    #[must_use]
    pub const fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Set the expiration from a `<number>M|H|D` spec relative to `now`
    pub fn with_expiration_from(self, spec: &str, now: DateTime<Utc>) -> Result<Self> {
        let ttl = parse_expire_spec(spec)?;
        let expiration = now
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::invalid_argument(format!("expiration {spec} overflows")))?;
        Ok(self.with_expiration(expiration))
    }

    /// Whether the node carries a real (non-sentinel) expiration
    #[must_use]
    pub fn has_expiration(&self) -> bool {
        self.expiration.as_ref().is_some_and(|t| !is_zero_time(t))
    }
}

/// Selection criteria for expired nodes
///
/// A node matches when its expiration is present, is not the zero
/// timestamp, and is strictly earlier than `now`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpirationQuery {
    pub now: DateTime<Utc>,
}

impl ExpirationQuery {
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Check a raw expiration field against the query
    #[must_use]
    pub fn matches(&self, expiration: Option<&DateTime<Utc>>) -> bool {
        match expiration {
            Some(t) => !is_zero_time(t) && *t < self.now,
            None => false,
        }
    }

    /// Check a node against the query
    #[must_use]
    pub fn matches_node(&self, node: &Node) -> bool {
        self.matches(node.expiration.as_ref())
    }
}

/// Storage location descriptor, loaded once at startup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDescriptor {
    /// Location identifier referenced by `Node::locations`
    pub id: LocationId,
    /// Human readable description
    #[serde(default)]
    pub description: String,
    /// Backend kind (e.g. "S3", "TSM", "local")
    #[serde(default)]
    pub kind: String,
    /// Base URL of the backend
    #[serde(default)]
    pub url: String,
    /// Durable long-term storage, as opposed to a cache tier
    #[serde(default)]
    pub persistent: bool,
    /// Priority for pushing files upstream (0 lowest, 100 highest)
    #[serde(default)]
    pub priority: i32,
    /// Minimum node priority this location accepts
    #[serde(default)]
    pub min_priority: i32,
    /// Storage tier (0 = cache, 3 = ssd, 5 = disk, 10 = tape)
    #[serde(default)]
    pub tier: i32,
    /// Cost per GB
    #[serde(default)]
    pub cost: i32,
}

impl LocationDescriptor {
    /// Create a descriptor with only the fields the reaper consumes
    pub fn new(id: impl Into<LocationId>, persistent: bool) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind: String::new(),
            url: String::new(),
            persistent,
            priority: 0,
            min_priority: 0,
            tier: 0,
            cost: 0,
        }
    }
}
