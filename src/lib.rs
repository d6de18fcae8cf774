//! # Trellis
//!
//! Compiles directive-augmented markup into plain HTML. Pages include
//! fragments and components, fill their slots, declare variables and evaluate
//! `{{ }}` expressions; the output is a single assembled document per page.
//!
//! ## Compilation Invariants
//!
//! 1. **Masters Are Immutable**: the cache owns every parsed fragment and
//!    component. Compilation always works on a deep clone.
//!
//! 2. **Explicit Scope**: a fragment sees exactly what its `FragmentContext`
//!    carries: its parameters, supplied slot content and, for components, the
//!    instance data layered over the parameters. Nothing leaks in from the
//!    caller.
//!
//! 3. **Declaration Order**: `<var>` bindings apply to later siblings and their
//!    descendants, never to earlier ones.
//!
//! 4. **Single Substitution**: supplied slot content is compiled in the
//!    caller's context and inserted once, without being evaluated again.
//!
//! 5. **Content Addressing**: identical created resources (extracted
//!    stylesheets) share one output path per pipeline.
//!
//! 6. **Fail Whole**: any error aborts the top-level call. A page that fails
//!    is never written.

pub mod cache;
pub mod compiler;
pub mod component;
pub mod config;
pub mod discovery;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod finalize;
pub mod parse;
pub mod pipeline;
pub mod resources;
pub mod scope;
pub mod static_eval;

#[cfg(test)]
mod compiler_tests;
#[cfg(test)]
mod parse_tests;

pub use cache::PipelineCache;
pub use component::{Component, Fragment, FragmentContext, ResolutionContext, Style, StyleMode};
pub use config::PipelineConfig;
pub use discovery::FsStore;
pub use document::{Document, NodeId, NodeKind};
pub use error::{EvaluationError, PipelineError, Result, StructuralError};
pub use evaluator::{Evaluator, Invocable, JsEvaluator};
pub use finalize::{DefaultFormatter, Formatter, Page, PendingLink, StyleBindings};
pub use parse::{HtmlSyntax, ResourceParser, Serializer};
pub use pipeline::{compile_pages_parallel, PageResult, Pipeline};
pub use resources::{MemoryStore, ResourceKind, ResourceStore};
pub use scope::{compose_scope, Scope};
