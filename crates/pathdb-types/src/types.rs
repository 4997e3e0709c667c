//! Common types used throughout the pathdb server.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// The default tenant, addressed on the wire as the empty string.
pub const DEFAULT_TENANT: &str = "default";

/// Resolve a wire tenant string ("" means "default").
pub fn tenant_or_default(tenant: &str) -> &str {
	if tenant.is_empty() {
		DEFAULT_TENANT
	} else {
		tenant
	}
}

// Timestamp //
//***********//

/// Millisecond Unix epoch timestamp.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(res.as_millis() as i64)
	}

	pub fn from_now(delta_ms: i64) -> Timestamp {
		Timestamp(Self::now().0 + delta_ms)
	}

	pub fn as_millis(&self) -> i64 {
		self.0
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

// vim: ts=4
