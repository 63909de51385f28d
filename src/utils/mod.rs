//! The `utils` module provides a collection of utility functions and common
//! definitions used across `amqpc`: the shared error type and logging setup.

pub mod error;
pub mod logging;

pub use error::{AmqpError, ErrorKind, Result};
