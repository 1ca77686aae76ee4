//! Infrastructure layer for Stepflow.
//!
//! Implements the `CompileServices` port from `stepflow-core` against the npm
//! registry, and loads configuration and workflow documents from disk.

pub mod config;
pub mod registry;
pub mod source;
