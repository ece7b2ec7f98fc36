pub mod adapter;
pub mod entry;
pub mod error;
pub mod file;
pub mod http;
pub mod transform;
