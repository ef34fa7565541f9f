//! Error handling for the point engine
//!
//! This module defines the crate-wide error type and a Result alias. Pipeline
//! faults that happen at run time (listener failures, stale inputs, overrun
//! ticks) are contained and logged where they occur; only construction and
//! lookup failures surface as `Err` to callers.

use thiserror::Error;

/// Main error type for point engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed or insufficient pipeline constructor arguments
    #[error("Configuration error: {0}")]
    Config(String),

    /// A point with this name is already registered
    #[error("Duplicate point name: {0}")]
    DuplicateName(String),

    /// No point with this name is registered
    #[error("Unknown point: {0}")]
    UnknownPoint(String),

    /// A declared input point has not appeared in the registry
    #[error("Unresolved reference from {owner} to {target}")]
    UnresolvedReference { owner: String, target: String },

    /// A listener failed while an event was being delivered
    #[error("Delivery to listener '{listener}' failed: {message}")]
    Delivery { listener: String, message: String },

    /// Errors related to Rhai script compilation or evaluation
    #[error("Script error: {0}")]
    Script(String),

    /// Errors raised by a notification transport
    #[error("Notification error: {0}")]
    Notify(String),

    /// Errors related to the shared scheduler
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EngineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        EngineError::Script(err.to_string())
    }

    /// Whether this error (or the error it wraps) is a configuration error.
    pub fn is_config(&self) -> bool {
        match self {
            EngineError::Config(_) => true,
            EngineError::WithContext { source, .. } => source.is_config(),
            _ => false,
        }
    }
}

/// Result type alias for point engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| EngineError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| EngineError::from_rhai_error(e).with_context(f()))
    }
}
