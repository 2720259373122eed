//! Test utilities for the storage service.
//!
//! This crate provides utilities to facilitate testing of the storage service against a remote
//! store without credentials or network access. See the modules for all available utilities.

pub mod server;
pub mod tracing;
