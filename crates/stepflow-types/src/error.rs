use thiserror::Error;

/// Errors from external dependency lookups (version ranges, hosted atoms).
///
/// Produced by `CompileServices` implementations. Retry policy, if any,
/// belongs to the implementation, never to the compiler.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("http error: {0}")]
    Http(String),

    #[error("package '{0}' not found")]
    NotFound(String),

    #[error("invalid registry response: {0}")]
    InvalidResponse(String),

    #[error("registry lookups disabled (offline), no pinned version for '{0}'")]
    Offline(String),
}

/// Fatal compile errors. Any of these aborts the whole compile.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("step '{index_key}' matches no registered block kind")]
    UnrecognizedBlockKind { index_key: String },

    #[error("duplicate step key '{0}'")]
    DuplicateIndexKey(String),

    #[error("step '{index_key}' names unknown next target '{target}'")]
    UnresolvedNamedTarget { index_key: String, target: String },

    #[error("flow '{0}' not found")]
    FlowNotFound(String),

    #[error("dependency lookup for '{package}' (required by '{index_key}') failed: {source}")]
    DependencyLookupFailure {
        index_key: String,
        package: String,
        #[source]
        source: LookupError,
    },

    #[error("diagram serialization failed: {0}")]
    Serialize(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Non-fatal findings recorded on a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileWarning {
    #[error("step '{index_key}' names unknown next target '{target}'")]
    UnresolvedNamedTarget { index_key: String, target: String },
}
