//! # Cloud Provider Traits
//!
//! Capability interface between the sync core and remote-storage backends.
//!
//! ## Overview
//!
//! This crate defines the contract a remote-storage backend must implement so
//! the sync engine, scheduler, connection pool, and change watcher can operate
//! without knowing the backend's wire protocol. One implementation per
//! backend; one client instance per authenticated account.
//!
//! ## Capabilities
//!
//! - [`CloudProvider`](provider::CloudProvider) - paginated listing, search,
//!   download-identifier resolution, credential validation, change-event
//!   polling
//! - [`ProviderRegistry`](registry::ProviderRegistry) - backend type tag →
//!   client factory, populated at process init
//!
//! ## Error Handling
//!
//! All capabilities use [`ProviderError`](error::ProviderError). Backends
//! should map credential expiry to `AuthInvalid` and transport/timeout
//! failures to `Unavailable`/`Timeout`; the core's retry and pool-eviction
//! policy is driven by this distinction.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`; a single client is shared across
//! concurrent task executions through the connection pool.

pub mod error;
pub mod events;
pub mod provider;
pub mod registry;

pub use error::{ProviderError, Result};

// Re-export commonly used types
pub use events::{ChangeEvent, EventKind, EventPage};
pub use provider::{CloudProvider, FileListing, RemoteEntry};
pub use registry::{ProviderFactory, ProviderRegistry};
