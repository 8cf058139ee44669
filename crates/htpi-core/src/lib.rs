//! Client-side runtime for the HTPI customer portal.
//!
//! Sits between `htpi-api`'s wire adapters and a front end (the `htpi` CLI):
//!
//! - **[`CredentialStore`]**: Token and cached identity in durable storage,
//!   behind a pluggable [`CredentialBackend`]. Corrupt entries read as absent.
//!
//! - **[`ConnectionManager`]**: Owns the single live event channel:
//!   authenticated connect, bounded reconnection with backoff, listener
//!   registry that survives reconnects, observable [`ConnectionStatus`].
//!
//! - **[`SessionController`]**: Login, logout and startup revalidation over
//!   REST, publishing a [`Session`] through a `watch` channel.
//!
//! - **[`DataSync`]**: Correlated request/response over channel acks plus a
//!   read-through [`QueryCache`] reconciled against server broadcasts by a
//!   pure reducer ([`CacheState::apply`]).
//!
//! - **[`Portal`]**: Composition root wiring the above together.

pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod portal;
pub mod session;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{PortalConfig, TlsVerification};
pub use connection::{ConnectionManager, ConnectionStatus, ListenerId};
pub use credentials::{CredentialBackend, CredentialStore, FileBackend, MemoryBackend};
pub use error::CoreError;
pub use portal::Portal;
pub use session::{Session, SessionController};
pub use sync::cache::{CacheEntry, CacheEvent, CacheKey, CacheState, EntryKind, QueryCache};
pub use sync::resource::Resource;
pub use sync::DataSync;

pub use htpi_api::{ProfileUpdate, ReconnectPolicy, User};
