//! Shared domain types for Stepflow.
//!
//! This crate contains the data model every compiler pass works on: the node
//! arena, resolved control-flow and reference links, the process diagram
//! model, configuration, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, thiserror.

pub mod config;
pub mod diagram;
pub mod error;
pub mod node;
pub mod tree;
