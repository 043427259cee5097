//! Master-side administrative operations built on the `fate-saga` engine:
//! importing an exported table and shutting down a tablet server.

mod error;
pub mod config;
pub mod context;
pub mod export;
pub mod operations;
pub mod paths;
pub mod providers;
pub mod tables;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod mocks;

pub use error::{OperationError, Result};
