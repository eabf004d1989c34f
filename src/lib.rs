pub mod bundle;
pub mod cli;
pub mod config;
pub mod error;
pub mod publish;
pub mod test_utils;
pub mod transport;

pub use error::{Result, ShipError};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
