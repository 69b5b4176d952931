//! Search-state synchronizer for dashboards.
//!
//! Keeps a dashboard's query, filters, time range, and refresh interval in
//! sync with the control group, the shared query/time services, and the URL,
//! and reports how the live state differs from the last saved one.
//!
//! - **[`core`]**: Pure logic (data model, filter and time comparison, state
//!   transitions). No async, no I/O.
//! - **[`reactive`]**: State cells, pulses, debouncing, and subscription
//!   lifetimes on top of tokio channels.
//! - **[`services`]**: Collaborator traits and in-memory implementations.
//! - **[`sync`]**: Query-service binding and URL mirroring.
//! - **[`manager`]**: The synchronizer itself.
//! - **[`io`]**: Config and state files.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod manager;
pub mod reactive;
pub mod services;
pub mod sync;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
