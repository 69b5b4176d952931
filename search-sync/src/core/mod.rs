//! Deterministic, pure logic for search state.
//!
//! Core modules must be free of I/O side effects and of task spawning. They
//! operate on in-memory values and return deterministic outputs suitable for
//! tests.

pub mod compare;
pub mod filters;
pub mod state_update;
pub mod time;
pub mod types;
