//! ragway-core
//!
//! Domain types, the error taxonomy and the capability traits every other
//! ragway crate builds on.

pub mod config;
pub mod error;
pub mod runtime;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use tokio_util::sync::CancellationToken;
