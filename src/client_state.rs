/// file: src/client_state.rs
/// description: Connection state, reconnection policy and session binding owned by the manager
use crate::{channel::LinkId, types::SessionId};
use serde::Serialize;
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Error => "ERROR",
        })
    }
}

/// Outcome of registering a failed or lost connection with the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule attempt number `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// The ceiling was reached. `first` is true only the first time it is reported.
    Exhausted { attempts: u32, first: bool },
}

/// Bounded linear backoff: attempt `n` waits `base_delay * n`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    attempt_count: u32,
    max_attempts: u32,
    base_delay: Duration,
    exhausted_reported: bool,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempt_count: 0,
            max_attempts,
            base_delay,
            exhausted_reported: false,
        }
    }

    /// Count one more failure and decide whether another attempt is allowed.
    ///
    /// The failure that brings the count to `max_attempts` schedules nothing.
    pub fn register_failure(&mut self) -> ReconnectDecision {
        if self.attempt_count < self.max_attempts {
            self.attempt_count += 1;
        }

        if self.attempt_count >= self.max_attempts {
            let first = !self.exhausted_reported;
            self.exhausted_reported = true;
            return ReconnectDecision::Exhausted {
                attempts: self.attempt_count,
                first,
            };
        }

        ReconnectDecision::Retry {
            attempt: self.attempt_count,
            delay: self.delay_for(self.attempt_count),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Call after a successful connection or an explicit reset.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
        self.exhausted_reported = false;
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

/// Read-only view returned by `ConnectionManager::connection_stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub connected: bool,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub connection_id: Option<String>,
    pub events_received: u64,
    pub connected_for: Option<Duration>,
    pub since_last_event: Option<Duration>,
}

#[derive(Debug)]
pub struct ManagerState {
    pub connection: ConnectionState,
    pub policy: ReconnectPolicy,
    pub session: Option<SessionId>,
    pub connection_id: Option<String>,
    pub initialized: bool,
    /// Set by an explicit `disconnect()`; every reconnection path checks it.
    pub explicit_close: bool,
    /// Bumped on explicit disconnect/reconnect so older timers can tell they are stale.
    pub epoch: u64,
    /// Link of the latest `open`; signals from any other link are stale.
    pub link: LinkId,
    pub events_received: u64,
    pub last_event_time: Option<Instant>,
    pub connected_since: Option<Instant>,
}

impl ManagerState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            policy,
            session: None,
            connection_id: None,
            initialized: false,
            explicit_close: false,
            epoch: 0,
            link: 0,
            events_received: 0,
            last_event_time: None,
            connected_since: None,
        }
    }

    /// Enters `Connecting` and allocates the link id for the next `open`.
    pub fn begin_connecting(&mut self) -> LinkId {
        self.connection = ConnectionState::Connecting;
        self.link += 1;
        self.link
    }

    pub fn mark_connected(&mut self) -> String {
        let connection_id = uuid::Uuid::new_v4().to_string();
        self.connection = ConnectionState::Connected;
        self.connection_id = Some(connection_id.clone());
        self.connected_since = Some(Instant::now());
        self.policy.reset();
        connection_id
    }

    pub fn mark_lost(&mut self, state: ConnectionState) {
        self.connection = state;
        self.session = None;
        self.connection_id = None;
        self.connected_since = None;
    }

    pub fn record_event(&mut self) {
        self.events_received += 1;
        self.last_event_time = Some(Instant::now());
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            connected: self.connection == ConnectionState::Connected,
            attempt_count: self.policy.attempt_count(),
            max_attempts: self.policy.max_attempts(),
            connection_id: self.connection_id.clone(),
            events_received: self.events_received,
            connected_for: self.connected_since.map(|t| t.elapsed()),
            since_last_event: self.last_event_time.map(|t| t.elapsed()),
        }
    }
}

pub type SharedManagerState = Arc<Mutex<ManagerState>>;
