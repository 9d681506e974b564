//! Core contracts and helpers for Seedforge.
//!
//! This crate defines the canonical schema types consumed from the schema
//! provider, the foreign-key dependency graph with its ordering and leveling
//! algorithms, and the run-scoped identifier store shared across crates.

pub mod error;
pub mod graph;
pub mod ids;
pub mod schema;

pub use error::{Error, Result};
pub use graph::{
    DependencyGraph, DependencyNode, TopoOrder, build_graph, group_by_level, topological_sort,
};
pub use ids::IdStore;
pub use schema::{
    EnumDefinition, FieldDefinition, FieldType, ParsedSchema, RelationInfo, RelationKind,
    TableDefinition,
};

/// Current contract version for `schema.json` input documents.
pub const SCHEMA_VERSION: &str = "0.1";
