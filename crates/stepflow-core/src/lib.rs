//! Step tree compiler for Stepflow.
//!
//! Turns a YAML step-tree document into an indexed, control-flow-resolved
//! node tree, a deduplicated dependency list, and positioned process
//! diagrams. Depends only on `stepflow-types`; network and filesystem access
//! come in through the [`services::CompileServices`] port.

pub mod compiler;
pub mod control_flow;
pub mod diagram;
pub mod indexer;
pub mod lowering;
pub mod references;
pub mod registry;
pub mod services;
pub mod tree_builder;

pub use compiler::{Compilation, Compiler};
