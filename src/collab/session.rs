use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::capability::CapabilityProfile;

/// One checked-in actor. Created by `check_in`, refreshed by heartbeat,
/// removed by `check_out` or the timeout sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSession {
    pub session_id: String,
    pub actor_name: String,
    pub actor_version: String,
    pub capabilities: CapabilityProfile,
    pub checked_in_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl ActorSession {
    pub fn new(
        session_id: impl Into<String>,
        actor_name: impl Into<String>,
        actor_version: impl Into<String>,
        capabilities: CapabilityProfile,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            actor_name: actor_name.into(),
            actor_version: actor_version.into(),
            capabilities,
            checked_in_at: now,
            last_heartbeat_at: now,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, staleness: Duration) -> bool {
        now - self.last_heartbeat_at > staleness
    }
}
