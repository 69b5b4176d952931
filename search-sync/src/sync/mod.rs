//! Synchronization between local search state and the shared services.

pub mod query_binding;
pub mod url;

pub use query_binding::{QueryStateBinding, SyncTargets, connect_to_query_state};
pub use url::GlobalUrlSync;
