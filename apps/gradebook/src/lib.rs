//! # gradebook
//!
//! Library surface of the gradebook binary, exposed for integration tests.

pub mod api;
pub mod cli;
pub mod config;
