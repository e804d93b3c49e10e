// Library entry shared by the podqueue binary and the integration tests

#![allow(clippy::result_large_err)]

pub mod cache;
pub mod config;
pub mod error;
pub mod player;
pub mod queue;
pub mod scheduler;
pub mod session;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result};
