//! Error taxonomy for the compilation pipeline.
//!
//! Every error is fatal to the top-level call that raised it. Nothing in the
//! core retries or recovers.

use thiserror::Error;

use crate::document::NodeId;
use crate::resources::ResourceKind;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A `get*` lookup on the cache without a prior `has*` check.
    #[error("cache miss: no {kind} cached under `{key}`")]
    CacheMiss { kind: &'static str, key: String },

    #[error("resource not found: {kind} `{path}`")]
    ResourceNotFound { kind: ResourceKind, path: String },

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("slot `{name}` in `{path}` is required but no content was supplied")]
    SlotResolution { name: String, path: String },

    #[error("cyclic inclusion: {}", chain.join(" -> "))]
    CyclicInclusion { chain: Vec<String> },

    #[error("content for slot `{name}` supplied more than once to `{target}`")]
    DuplicateContent { name: String, target: String },

    #[error("slot `{name}` is defined more than once in `{path}`")]
    DuplicateSlot { name: String, path: String },

    #[error("content `{name}` in `{path}` is not a direct child of a fragment or component reference")]
    StrayContent { name: String, path: String },

    #[error("invalid <{directive}> in `{path}`: {reason}")]
    InvalidDirective {
        directive: &'static str,
        path: String,
        reason: String,
    },

    #[error("failed to parse `{path}`: {message}")]
    Parse { path: String, message: String },

    #[error("i/o error on `{path}`")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline configuration")]
    Config(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn cache_miss(kind: &'static str, key: impl Into<String>) -> Self {
        Self::CacheMiss {
            kind,
            key: key.into(),
        }
    }

    pub fn not_found(kind: ResourceKind, path: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            kind,
            path: path.into(),
        }
    }
}

/// An embedded expression or script failed to compile or raised when invoked.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("failed to evaluate `{source_text}`: {kind}")]
pub struct EvaluationError {
    pub source_text: String,
    pub kind: EvalErrorKind,
}

impl EvaluationError {
    pub fn new(source_text: impl Into<String>, kind: EvalErrorKind) -> Self {
        Self {
            source_text: source_text.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalErrorKind {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unsupported construct: {0}")]
    Unsupported(String),
    #[error("`{0}` is not defined")]
    UnknownIdentifier(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("`{0}` is not a function")]
    NotCallable(String),
}

/// Illegal tree mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StructuralError {
    #[error("node {0:?} is the document root and cannot have siblings")]
    RootSibling(NodeId),
    #[error("node {0:?} is the document root and cannot be moved")]
    RootMove(NodeId),
    #[error("node {0:?} has no parent")]
    Detached(NodeId),
    #[error("node {0:?} does not belong to this document")]
    UnknownNode(NodeId),
    #[error("node {node:?} cannot be inserted relative to its own descendant {anchor:?}")]
    Cycle { node: NodeId, anchor: NodeId },
    #[error("replace_self on {0:?} needs at least one replacement")]
    EmptyReplacement(NodeId),
}
