use std::time::Duration;

use d7modem_frame::{DEFAULT_INGRESS_CAPACITY, DEFAULT_TX_QUEUE_CAPACITY};

/// How long a command waits for its completed tag response.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime settings for a [`crate::Modem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemConfig {
    /// Upper bound on blocking for synchronous commands, and the deadline
    /// after which an unanswered asynchronous command is expired.
    pub command_timeout: Duration,
    /// Capacity of the received-byte queue. Bytes beyond it are dropped.
    pub ingress_capacity: usize,
    /// Capacity of the transmit queue; must hold one maximal frame.
    pub tx_queue_capacity: usize,
    /// Longest the receive worker sleeps before re-checking for shutdown.
    pub poll_interval: Duration,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            ingress_capacity: DEFAULT_INGRESS_CAPACITY,
            tx_queue_capacity: DEFAULT_TX_QUEUE_CAPACITY,
            poll_interval: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_firmware_budgets() {
        let config = ModemConfig::default();
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert_eq!(config.ingress_capacity, 256);
        assert_eq!(config.tx_queue_capacity, 262);
    }
}
