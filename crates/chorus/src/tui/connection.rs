use std::time::Duration;

pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Disconnected,
}

/// What to do after the stream dropped or a reconnect attempt failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reconnect {
    After(Duration),
    GaveUp,
}

/// Tracks the event-stream connection and its bounded retry schedule.
///
/// Every connect attempt bumps the epoch; anything tagged with an older epoch
/// belongs to a stream that has been replaced.
#[derive(Debug, Clone)]
pub struct ConnectionSupervisor {
    state: ConnectionState,
    attempt: u32,
    backoff: Duration,
    max_attempts: u32,
    epoch: u64,
}

impl ConnectionSupervisor {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Connected,
            attempt: 0,
            backoff: INITIAL_BACKOFF,
            max_attempts,
            epoch: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[cfg(test)]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch
    }

    /// Starts a new connect attempt and returns its epoch.
    pub fn begin_attempt(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    pub fn on_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempt = 0;
        self.backoff = INITIAL_BACKOFF;
    }

    pub fn on_failure(&mut self) -> Reconnect {
        if self.attempt >= self.max_attempts {
            self.state = ConnectionState::Disconnected;
            return Reconnect::GaveUp;
        }
        let delay = self.backoff;
        self.attempt += 1;
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
        self.state = ConnectionState::Reconnecting;
        Reconnect::After(delay)
    }

    /// Operator-initiated retry after giving up. Returns the new attempt's
    /// epoch, or `None` when a connection is live or already being retried.
    pub fn manual_reconnect(&mut self) -> Option<u64> {
        if self.state != ConnectionState::Disconnected {
            return None;
        }
        self.attempt = 0;
        self.backoff = INITIAL_BACKOFF;
        self.state = ConnectionState::Reconnecting;
        Some(self.begin_attempt())
    }
}
