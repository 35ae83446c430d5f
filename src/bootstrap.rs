//! Identity bootstrapper — load the stored identity or generate a new one.
//!
//! ```text
//! NoIdentity ──valid record──────────────────────────────► Running
//!     │
//!     └─absent / malformed / invalid──► Generating ──► AwaitingProfile ──submit──► Running
//! ```
//!
//! Malformed local state never blocks startup: parse and validation
//! failures collapse into "absent" and the generation path runs. A fresh
//! identity is NOT persisted here; the profile gate writes it once the
//! first-run form has been submitted.

use std::fmt;

use tracing::{debug, info};

use crate::entropy::{self, EntropySource};
use crate::error::AppError;
use crate::record::IdentityRecord;
use crate::store::IdentityStore;

/// Number of 32-bit words in a player id (128 bits).
pub const PLAYER_ID_WORDS: usize = 4;
pub const PLAYER_ID_SEPARATOR: &str = "-";
pub const DEFAULT_GUEST_PREFIX: &str = "Guest ";

/// Startup phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    NoIdentity,
    Generating,
    AwaitingProfile,
    Running,
}

impl fmt::Display for BootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoIdentity => "no_identity",
            Self::Generating => "generating",
            Self::AwaitingProfile => "awaiting_profile",
            Self::Running => "running",
        };
        f.write_str(s)
    }
}

/// Outcome of [`Bootstrapper::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bootstrap {
    /// Freshly generated, not yet persisted.
    AwaitingProfile(IdentityRecord),
    /// Loaded from the store; ready to launch.
    Ready(IdentityRecord),
}

impl Bootstrap {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::AwaitingProfile(_))
    }

    pub fn state(&self) -> BootState {
        match self {
            Self::AwaitingProfile(_) => BootState::AwaitingProfile,
            Self::Ready(_) => BootState::Running,
        }
    }

    pub fn record(&self) -> &IdentityRecord {
        match self {
            Self::AwaitingProfile(r) | Self::Ready(r) => r,
        }
    }

    pub fn into_record(self) -> IdentityRecord {
        match self {
            Self::AwaitingProfile(r) | Self::Ready(r) => r,
        }
    }
}

pub struct Bootstrapper<E> {
    store: IdentityStore,
    entropy: E,
    guest_prefix: String,
}

impl<E: EntropySource> Bootstrapper<E> {
    pub fn new(store: IdentityStore, entropy: E) -> Self {
        Self { store, entropy, guest_prefix: DEFAULT_GUEST_PREFIX.to_string() }
    }

    pub fn with_guest_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.guest_prefix = prefix.into();
        self
    }

    /// Load-or-generate. Only an entropy failure is an error.
    pub fn resolve(&mut self) -> Result<Bootstrap, AppError> {
        debug!(state = %BootState::NoIdentity, "resolving identity");

        if let Some(record) = self.store.load().as_deref().and_then(IdentityRecord::parse) {
            info!(player_id = %record.player_id, name = %record.name, "identity loaded");
            return Ok(Bootstrap::Ready(record));
        }

        debug!(state = %BootState::Generating, "no valid identity stored");
        let record = self.generate()?;
        info!(player_id = %record.player_id, name = %record.name, "identity generated");
        Ok(Bootstrap::AwaitingProfile(record))
    }

    fn generate(&mut self) -> Result<IdentityRecord, AppError> {
        let player_id = generate_player_id(&mut self.entropy)?;
        let number = entropy::guest_number(&mut self.entropy)?;
        Ok(IdentityRecord::new(player_id, guest_name(&self.guest_prefix, number)))
    }
}

/// 128 random bits as four decimal words joined with `-`.
pub fn generate_player_id(source: &mut dyn EntropySource) -> Result<String, AppError> {
    let mut words = [0u32; PLAYER_ID_WORDS];
    source.fill_u32(&mut words)?;
    Ok(words.iter().map(u32::to_string).collect::<Vec<_>>().join(PLAYER_ID_SEPARATOR))
}

/// `prefix` followed by `number` in uppercase hex, no padding.
pub fn guest_name(prefix: &str, number: u32) -> String {
    format!("{prefix}{number:X}")
}
