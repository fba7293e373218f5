//! Dual-path arithmetic operators for a secure collaborative query engine.
//!
//! Every operator runs either directly on plaintext columns or on additive
//! secret shares, chosen per invocation from the visibility of its operands.

pub mod additive;
pub mod computation;
pub mod config;
pub mod error;
pub mod execution;
pub mod host;
pub mod kernels;
pub mod networking;
pub mod prelude;
pub mod testing;
pub mod types;

pub use error::{Error, Result};
