use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Order in which a search handle drains its backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BacklogOrder {
    /// Oldest buffered entry first (arrival order)
    #[default]
    Fifo,
    /// Most recently buffered entry first.
    ///
    /// Matches the tail-pop draining of older bindings. Only observable when
    /// more than one entry is buffered.
    Lifo,
}

/// Client configuration for resource limits and loop behavior
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum buffered entries per search before NOMEM is queued
    pub backlog_capacity: usize,

    /// Drain order for search backlogs
    pub backlog_order: BacklogOrder,

    /// Upper bound for a single pump of the engine (None = block indefinitely)
    pub loop_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backlog_capacity: 1 << 20,
            backlog_order: BacklogOrder::Fifo,
            loop_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-search backlog capacity
    pub fn with_backlog_capacity(mut self, capacity: usize) -> Self {
        self.backlog_capacity = capacity;
        self
    }

    /// Set the backlog drain order
    pub fn with_backlog_order(mut self, order: BacklogOrder) -> Self {
        self.backlog_order = order;
        self
    }

    /// Bound each pump of the engine
    pub fn with_loop_timeout(mut self, timeout: Duration) -> Self {
        self.loop_timeout = Some(timeout);
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.backlog_capacity == 0 {
            return Err("backlog_capacity must be greater than 0".to_string());
        }

        if let Some(timeout) = self.loop_timeout {
            if timeout.is_zero() {
                return Err("loop_timeout must be greater than 0 when set".to_string());
            }
        }

        Ok(())
    }
}
