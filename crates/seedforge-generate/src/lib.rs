//! Generation orchestration for Seedforge.
//!
//! Coordinates level-by-level, batched, concurrently-dispatched row
//! generation against a pluggable [`RowGenerator`] capability, resolves
//! foreign-key placeholders against the run's identifier store, and drives
//! persistence through a [`SeedSink`].

pub mod context;
pub mod engine;
pub mod errors;
pub mod generator;
pub mod orchestrator;
pub mod pattern;
pub mod report;
pub mod resolver;

pub use context::{GenerationContext, RelationTarget};
pub use engine::{Engine, RunOptions, RunResult, SeedSink, SinkReport, plan_counts};
pub use errors::GenerationError;
pub use generator::{GeneratedBatch, GeneratedRow, RowGenerator, extract_ids};
pub use orchestrator::{
    GenerateOptions, GenerationSource, TableOutcome, batch_size_for, generate_level,
    generate_table, split_batches,
};
pub use pattern::PatternGenerator;
pub use report::{RunReport, TableReport};
pub use resolver::{
    IntegrityViolation, ViolationKind, resolve_rows, resolve_self_references, validate_rows,
};
