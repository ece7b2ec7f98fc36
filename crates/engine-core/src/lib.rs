pub mod classify;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod run_state;
pub mod source;
pub mod store;
pub mod transform;
pub mod version;
