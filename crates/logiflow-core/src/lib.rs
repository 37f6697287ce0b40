//! # Logiflow Core
//! Configuration and error types shared by the automation engine and the daemon.

pub mod config;
pub mod error;

pub use config::LogiflowConfig;
pub use error::{LogiflowError, Result};
