//! Ledger configuration.

use std::time::Duration;

use audit_chain_core::{Ed25519PublicKey, EventFilter, GenesisDescriptor};

use crate::error::{LedgerError, Result};

/// Configuration for a [`Ledger`](crate::Ledger).
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Pending entries that trigger a block on the threshold tick.
    pub entries_per_block: usize,

    /// Period of the time-based block trigger.
    pub block_interval: Duration,

    /// How often the scheduler checks the pending threshold.
    pub threshold_poll_interval: Duration,

    /// Upper bound on every individual store call.
    pub persist_timeout: Duration,

    /// Consecutive failed block cycles before production halts.
    pub max_build_attempts: u32,

    /// Buffer size of the notification broadcast channel.
    pub notification_capacity: usize,

    /// Fixed origin of the block chain.
    pub genesis: GenesisDescriptor,

    /// Which incoming events the event consumer records.
    pub loggable: EventFilter,

    /// Previously used signing keys still accepted during validation.
    pub retired_keys: Vec<Ed25519PublicKey>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            entries_per_block: 100,
            block_interval: Duration::from_secs(300),
            threshold_poll_interval: Duration::from_secs(30),
            persist_timeout: Duration::from_secs(10),
            max_build_attempts: 3,
            notification_capacity: 1024,
            genesis: GenesisDescriptor::default(),
            loggable: EventFilter::default(),
            retired_keys: Vec::new(),
        }
    }
}

impl LedgerConfig {
    pub fn with_entries_per_block(mut self, n: usize) -> Self {
        self.entries_per_block = n;
        self
    }

    pub fn with_block_interval(mut self, interval: Duration) -> Self {
        self.block_interval = interval;
        self
    }

    pub fn with_threshold_poll_interval(mut self, interval: Duration) -> Self {
        self.threshold_poll_interval = interval;
        self
    }

    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        self.persist_timeout = timeout;
        self
    }

    pub fn with_max_build_attempts(mut self, attempts: u32) -> Self {
        self.max_build_attempts = attempts;
        self
    }

    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    pub fn with_genesis(mut self, genesis: GenesisDescriptor) -> Self {
        self.genesis = genesis;
        self
    }

    pub fn with_loggable(mut self, filter: EventFilter) -> Self {
        self.loggable = filter;
        self
    }

    /// Accept signatures from a key this node no longer signs with.
    pub fn with_retired_key(mut self, key: Ed25519PublicKey) -> Self {
        self.retired_keys.push(key);
        self
    }

    /// Reject settings the scheduler and channels cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(LedgerError::InvalidConfig(msg.to_string()));

        if self.entries_per_block == 0 {
            return invalid("entries_per_block must be at least 1");
        }
        if self.block_interval.is_zero() || self.threshold_poll_interval.is_zero() {
            return invalid("scheduler intervals must be non-zero");
        }
        if self.persist_timeout.is_zero() {
            return invalid("persist_timeout must be non-zero");
        }
        if self.max_build_attempts == 0 {
            return invalid("max_build_attempts must be at least 1");
        }
        if self.notification_capacity == 0 {
            return invalid("notification_capacity must be at least 1");
        }
        Ok(())
    }
}
