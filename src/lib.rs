//! Workspace placeholder crate.
//!
//! Re-exports the individual workspace crates so host applications (the route
//! layer, the dashboard backend) can depend on `strmsync-workspace` without
//! wiring each crate individually.

pub use core_runtime;
pub use core_store;
pub use core_sync;
pub use provider_traits;
