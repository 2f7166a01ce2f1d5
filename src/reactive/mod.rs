//! Reactive analysis.
//!
//! [`analyze`] builds the dependency graph over a program's reactive
//! declarations and rejects cycles; [`batch`] groups simultaneous updates so
//! that a shared dependent is recomputed once per group.

pub mod batch;
pub mod graph;

pub use batch::{Batch, Batches, Update, batch};
pub use graph::{ReactiveGraph, ReactiveVariable, UpdateChain, analyze};
