use thiserror::Error;

/// The engine's typed error taxonomy. Every fallible stage of the pipeline
/// surfaces one of these variants so callers can discriminate on kind rather
/// than parsing message text.
#[derive(Debug, Error)]
pub enum MiniformError {
    #[error("lex error at {line}:{col}: unexpected character '{ch}'")]
    LexError { line: usize, col: usize, ch: char },

    #[error("parse error at {line}:{col}: {message}")]
    ParseError {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("resolve error: {0}")]
    ResolveError(String),

    #[error("dependency cycle detected: {0}")]
    CycleError(String),

    #[error("plan error: {0}")]
    PlanError(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("state error: {0}")]
    StateError(String),

    #[error("state is locked: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, MiniformError>;

impl MiniformError {
    pub fn config(msg: impl Into<String>) -> Self {
        MiniformError::ConfigError(msg.into())
    }

    pub fn resolve(msg: impl Into<String>) -> Self {
        MiniformError::ResolveError(msg.into())
    }

    pub fn plan(msg: impl Into<String>) -> Self {
        MiniformError::PlanError(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        MiniformError::ProviderError(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        MiniformError::StateError(msg.into())
    }
}
