//! Session and subscription identifiers.
//!
//! Both use UUID v7, so ids sort by creation time in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

/// Identifies one registered header subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

macro_rules! v7_id {
    ($name:ident) => {
        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Creation time in milliseconds since the Unix epoch.
            pub fn timestamp_ms(&self) -> Option<u64> {
                let (secs, nanos) = self.0.get_timestamp()?.to_unix();
                Some(secs * 1000 + u64::from(nanos) / 1_000_000)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

v7_id!(SessionId);
v7_id!(SubscriptionId);
