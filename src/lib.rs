//! ChainPulse metrics gateway library
//!
//! This library exposes the core modules for use in the binary, benchmarks
//! and integration tests.

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
