//! Guest player identity.
//!
//! Loads the persisted player identity or generates a new one, runs the
//! first-run profile form, launches the application with the identity, and
//! persists every identity update the application sends back.
//!
//! ```text
//! store ──► bootstrap ──► profile (fresh only) ──► launcher ──► application
//!   ▲                                                                │
//!   └──────────────────────── write-back channel ◄───────────────────┘
//! ```

pub mod bootstrap;
pub mod config;
pub mod console;
pub mod entropy;
pub mod error;
pub mod launcher;
pub mod logger;
pub mod profile;
pub mod record;
pub mod store;
