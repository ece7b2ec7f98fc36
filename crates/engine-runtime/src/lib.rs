pub mod error;
pub mod executor;
pub mod fetch;
pub mod scheduler;
pub mod summary;
pub mod transform;

#[cfg(test)]
mod tests;
