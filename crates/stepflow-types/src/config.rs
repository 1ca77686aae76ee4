//! Configuration types for Stepflow.
//!
//! `StepflowConfig` represents `stepflow.toml`: diagram layout constants,
//! package registry access, and compiler strictness. Every field has a
//! default, so an empty file is a valid configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepflowConfig {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub compiler: CompilerConfig,
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Constants of the layered diagram layout, in diagram units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_node_width")]
    pub node_width: f64,
    #[serde(default = "default_node_height")]
    pub node_height: f64,
    /// Side of the square used for events and gateways.
    #[serde(default = "default_marker_size")]
    pub marker_size: f64,
    /// Gap between nodes sharing a rank.
    #[serde(default = "default_node_separation")]
    pub node_separation: f64,
    /// Gap between consecutive ranks.
    #[serde(default = "default_rank_separation")]
    pub rank_separation: f64,
    /// Offset added to every coordinate.
    #[serde(default = "default_margin")]
    pub margin: f64,
    /// Barycenter sweeps (one down + one up each) used to order ranks.
    #[serde(default = "default_ordering_sweeps")]
    pub ordering_sweeps: usize,
}

fn default_node_width() -> f64 {
    120.0
}

fn default_node_height() -> f64 {
    80.0
}

fn default_marker_size() -> f64 {
    36.0
}

fn default_node_separation() -> f64 {
    40.0
}

fn default_rank_separation() -> f64 {
    60.0
}

fn default_margin() -> f64 {
    50.0
}

fn default_ordering_sweeps() -> usize {
    4
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: default_node_width(),
            node_height: default_node_height(),
            marker_size: default_marker_size(),
            node_separation: default_node_separation(),
            rank_separation: default_rank_separation(),
            margin: default_margin(),
            ordering_sweeps: default_ordering_sweeps(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Package registry access for version lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub url: String,
    /// Never contact the registry; use pinned versions or `default_range`.
    #[serde(default)]
    pub offline: bool,
    /// Range used offline for packages without a pin.
    #[serde(default = "default_range")]
    pub default_range: String,
    /// Package name -> version range, bypassing lookups.
    #[serde(default)]
    pub pinned: HashMap<String, String>,
}

fn default_registry_url() -> String {
    "https://registry.npmjs.org".to_string()
}

fn default_range() -> String {
    "*".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            offline: false,
            default_range: default_range(),
            pinned: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Treat unresolved `next` targets as fatal instead of warnings.
    #[serde(default)]
    pub strict_targets: bool,
}
