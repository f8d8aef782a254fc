//! Error recovery for the provisioning loop
//!
//! Failed provisioning steps are retried indefinitely; [`Backoff`] spaces the
//! retries out so an unreachable server is not hammered every tick.

pub mod backoff;

pub use backoff::{Backoff, BackoffPolicy, MAX_BACKOFF_DELAY};
