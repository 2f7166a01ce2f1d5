//! MTM component compiler
//!
//! Compiles framework-neutral `.mtm` component files into React, Vue,
//! Svelte and Solid source, tracking which declared values are reactive so
//! that updates propagate the same way in every target.
//!
//! # Pipeline
//!
//! - [`parser::parse`] - frontmatter, syntax detection, the [`ast::Program`]
//!   and type inference
//! - [`reactive::analyze`] - the acyclic [`reactive::ReactiveGraph`] and its
//!   update chains; [`reactive::batch`] groups simultaneous updates
//! - [`codegen::generate`] - one backend per [`config::Target`]
//! - [`session::CompilerSession`] - cache, worker pool and metrics around
//!   the pipeline
//!
//! # Concurrency Model
//!
//! Parsing, analysis and generation are pure functions of their input. A
//! session fans files out to a fixed worker pool and is the only writer to
//! its cache, so no locks are involved:
//!
//! ```rust,ignore
//! use mtm_compiler::{CompilerConfig, CompilerSession};
//!
//! let mut session = CompilerSession::new(CompilerConfig::default())?;
//! let report = session.compile_batch(&["src/Counter.mtm", "src/Todo.mtm"]);
//! for error in &report.errors {
//!     eprintln!("{}: {}", error.file, error.message);
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod ast;
pub mod cache;
pub mod codegen;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod helpers;
pub mod location;
pub mod parser;
pub mod plugin;
pub mod pool;
pub mod reactive;
pub mod session;
pub mod syntax;

pub use config::{CompilerConfig, Target};
pub use error::{CompileError, ErrorKind, ErrorReport, Warning, WarningKind};
pub use plugin::{MtmPlugin, TransformOutput};
pub use session::{BuildReport, CompiledModule, CompilerSession, Metrics};
