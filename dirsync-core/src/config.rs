//! Configuration for the directory replication provider.
//!
//! Mirrors the single `checkpoint <ops> <minutes>` keyword the spec allows
//! (§6) plus the handful of values the spec leaves as "implementation
//! constant" (§4.1 CSN buffer size, §4.4 sync-id-set batch size, §5 session
//! channel capacity). Loaded from a `toml` document; every field has a
//! `Default`, so an empty config file is valid.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Environment variable overriding the checkpoint operation count.
pub const ENV_CHECKPOINT_OPS: &str = "DIRSYNC_CHECKPOINT_OPS";
/// Environment variable overriding the checkpoint interval, in minutes.
pub const ENV_CHECKPOINT_MINUTES: &str = "DIRSYNC_CHECKPOINT_MINUTES";

/// How often the context CSN high-water mark should be checkpointed.
///
/// Persistence of the checkpoint itself is out of scope (spec §1
/// Non-goals); this type only carries the cadence so a hosting
/// application can wire its own persistence on the same schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointPolicy {
    /// Checkpoint after this many committed writes. Zero disables the
    /// operation-count trigger.
    pub ops: u32,
    /// Checkpoint at least this often, in minutes. Zero disables the
    /// time-based trigger.
    pub minutes: u32,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self { ops: 0, minutes: 0 }
    }
}

impl CheckpointPolicy {
    /// True if neither trigger is configured.
    pub fn is_disabled(&self) -> bool {
        self.ops == 0 && self.minutes == 0
    }
}

/// Implementation constants the spec leaves unspecified in size, only in
/// existence (spec §4.1, §4.4, §5, §9 "Supplemented features").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum encoded CSN length the cookie codec accepts (spec §4.1).
    pub csn_buffer_size: usize,
    /// Batch size for `syncIdSet` UUID enumeration (spec §4.4 FIND_PRESENT).
    pub id_set_batch_size: usize,
    /// Bounded capacity of a persistent session's live-delivery channel
    /// (spec §5 "Rust lock mapping").
    pub session_channel_capacity: usize,
    /// Backlog length past which a session is terminated as too slow to
    /// keep up (spec §10 "Session lag / too-slow-consumer handling").
    pub max_backlog: usize,
    /// Base-validator retry backoff, in milliseconds, on `BUSY`/`LOCK_RETRY`
    /// from the store (spec §7).
    pub retry_backoff_ms: u64,
    /// Maximum retry attempts before surfacing the store error.
    pub max_retries: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            csn_buffer_size: 128,
            id_set_batch_size: 64,
            session_channel_capacity: 256,
            max_backlog: 4096,
            retry_backoff_ms: 50,
            max_retries: 3,
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub checkpoint: CheckpointPolicy,
    pub limits: Limits,
}

impl ProviderConfig {
    /// Load configuration from a TOML file, applying environment overrides
    /// for the checkpoint policy (spec §6).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config: Self = toml::from_str(&text)
            .map_err(|e| CoreError::config(format!("failed to parse {}: {e}", path.display())))?;
        config.apply_env_overrides()?;
        debug!(?config, "loaded provider configuration");
        Ok(config)
    }

    /// Configuration with defaults, environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(ENV_CHECKPOINT_OPS) {
            self.checkpoint.ops = raw
                .parse()
                .map_err(|e| CoreError::config(format!("{ENV_CHECKPOINT_OPS}: {e}")))?;
            info!(ops = self.checkpoint.ops, "checkpoint ops overridden from environment");
        }
        if let Ok(raw) = std::env::var(ENV_CHECKPOINT_MINUTES) {
            self.checkpoint.minutes = raw
                .parse()
                .map_err(|e| CoreError::config(format!("{ENV_CHECKPOINT_MINUTES}: {e}")))?;
            info!(
                minutes = self.checkpoint.minutes,
                "checkpoint interval overridden from environment"
            );
        }
        Ok(())
    }

    /// Parse the single `checkpoint <ops> <minutes>` configuration keyword
    /// (spec §6), as it would appear in a hosting application's own config
    /// file syntax.
    pub fn parse_checkpoint_keyword(line: &str) -> Result<CheckpointPolicy> {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("checkpoint") => {}
            _ => return Err(CoreError::config("expected 'checkpoint <ops> <minutes>'")),
        }
        let ops: u32 = parts
            .next()
            .ok_or_else(|| CoreError::config("checkpoint: missing <ops>"))?
            .parse()
            .map_err(|e| CoreError::config(format!("checkpoint: invalid <ops>: {e}")))?;
        let minutes: u32 = parts
            .next()
            .ok_or_else(|| CoreError::config("checkpoint: missing <minutes>"))?
            .parse()
            .map_err(|e| CoreError::config(format!("checkpoint: invalid <minutes>: {e}")))?;
        if parts.next().is_some() {
            return Err(CoreError::config("checkpoint: too many arguments"));
        }
        Ok(CheckpointPolicy { ops, minutes })
    }
}
