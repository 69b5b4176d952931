//! Push-based state plumbing on top of tokio channels.
//!
//! Reactions run as tokio tasks owned by [`Subscription`]s; nothing here is
//! process-global.

pub mod cell;
pub mod debounce;
pub mod pulse;
pub mod subscription;
pub mod switched;

pub use cell::StateCell;
pub use debounce::Debouncer;
pub use pulse::{Pulse, next_pulse};
pub use subscription::{Subscription, Subscriptions};
pub use switched::{SwitchedReceiver, change_stream, merge_changes};
